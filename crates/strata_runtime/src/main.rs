//! Strata Engine Runtime
//!
//! Boots logging, loads settings, spawns a particle population and drives
//! the scheduler for a fixed number of frames.

mod cli;
mod demo;

use anyhow::{Context, Result};
use clap::Parser;
use cli::Cli;
use std::path::Path;
use std::sync::Arc;
use strata_core::ecs::{ComponentRegistry, EntityManager, Scheduler, SystemRegistry};
use strata_core::settings::{EngineSettings, SystemEntry};

fn load_settings(path: Option<&Path>) -> Result<EngineSettings> {
    let mut settings = match path {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading settings from {}", path.display()))?;
            EngineSettings::from_json_str(&text)
                .with_context(|| format!("parsing {}", path.display()))?
        }
        None => EngineSettings::default(),
    };
    if settings.systems.is_empty() {
        settings.systems = ["movement", "lifetime", "spawner", "stats"]
            .into_iter()
            .enumerate()
            .map(|(priority, name)| SystemEntry {
                name: name.to_string(),
                priority: priority as i32,
            })
            .collect();
    }
    Ok(settings)
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    tracing::info!("Strata Engine v{}", strata_core::VERSION);
    let args = Cli::parse();
    let settings = load_settings(args.settings.as_deref())?;
    tracing::info!(
        tick_rate_hz = settings.tick_rate_hz,
        systems = settings.systems.len(),
        metrics = strata_metrics::ENABLED,
        "settings loaded"
    );

    let mut components = ComponentRegistry::new();
    demo::register_components(&mut components)?;
    let mut world = EntityManager::with_settings(Arc::new(components), &settings);

    let mut systems = SystemRegistry::new();
    demo::register_systems(&mut systems)?;
    let mut scheduler = Scheduler::from_settings(&settings, &systems)?;

    for seed in 0..args.entities as u64 {
        demo::spawn_particle(&mut world, seed)?;
    }
    tracing::info!(
        entities = world.entity_count(),
        archetypes = world.archetype_count(),
        "world populated"
    );

    let report_every = u64::from(settings.tick_rate_hz);
    let mut result = Ok(());
    for frame in 1..=args.frames {
        if let Err(err) = scheduler.tick(&mut world) {
            result = Err(err);
            break;
        }
        if frame.is_multiple_of(report_every) {
            tracing::info!(
                frame,
                fps = scheduler.frame_timer().fps(),
                frame_ms = scheduler.frame_timer().frame_time_ms(),
                entities = world.entity_count(),
                "frame report"
            );
        }
    }

    scheduler.teardown(&mut world);
    for name in scheduler.system_names() {
        tracing::info!(
            system = name,
            total_ms = scheduler.profiler().get_timing(name).as_secs_f64() * 1000.0,
            calls = scheduler.profiler().calls(name),
            "system timing"
        );
    }

    if let Err(err) = result {
        tracing::error!(error = %err, "simulation aborted");
        return Err(err.into());
    }
    tracing::info!(
        ticks = scheduler.time().tick_count(),
        simulated_secs = scheduler.time().total_time().as_secs_f64(),
        "shutdown complete"
    );
    Ok(())
}
