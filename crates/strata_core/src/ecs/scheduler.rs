// scheduler.rs - Priority-ordered system lifecycle
//
// One tick runs every system's `update` in priority order, then every
// `draw` in the same order, then advances the simulation clock. An update
// error aborts the rest of the tick and is returned to the driver.

use crate::ecs::{
    EntityManager, System, SystemError, SystemHandle, SystemRegistrationError, SystemRegistry,
};
use crate::settings::EngineSettings;
use crate::time::SimulationTime;
use strata_metrics::{Counter, FrameTimer, SystemProfiler};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("system '{name}' failed to update on tick {tick}")]
    UpdateFailed {
        name: String,
        tick: u64,
        #[source]
        source: SystemError,
    },

    #[error("system '{name}' failed to start")]
    StartFailed {
        name: String,
        #[source]
        source: SystemError,
    },

    #[error("scheduler has been torn down")]
    TornDown,

    #[error(transparent)]
    Registration(#[from] SystemRegistrationError),
}

/// Lifecycle position of one scheduled system.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SystemState {
    Constructed,
    Started,
    TornDown,
}

struct Scheduled {
    handle: SystemHandle,
    name: String,
    priority: i32,
    state: SystemState,
    system: Box<dyn System>,
}

/// Runs systems in ascending priority; equal priorities keep insertion
/// order.
pub struct Scheduler {
    systems: Vec<Scheduled>,
    next_handle: u32,
    time: SimulationTime,
    torn_down: bool,
    frame_timer: FrameTimer,
    profiler: SystemProfiler,
    counters: Counter,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_settings(&EngineSettings::default())
    }

    /// Empty scheduler using the clock rate and timer window from `settings`.
    pub fn with_settings(settings: &EngineSettings) -> Self {
        Self {
            systems: Vec::new(),
            next_handle: 0,
            time: SimulationTime::with_rate(settings.tick_rate_hz),
            torn_down: false,
            frame_timer: FrameTimer::new(settings.frame_samples),
            profiler: SystemProfiler::new(),
            counters: Counter::new(),
        }
    }

    /// Instantiate every system listed in `settings` through `registry`.
    pub fn from_settings(
        settings: &EngineSettings,
        registry: &SystemRegistry,
    ) -> Result<Self, SchedulerError> {
        let mut scheduler = Self::with_settings(settings);
        for entry in &settings.systems {
            let system = registry.instantiate(&entry.name)?;
            scheduler.add_boxed(system, entry.priority)?;
        }
        Ok(scheduler)
    }

    pub fn add_system<S: System + 'static>(
        &mut self,
        system: S,
        priority: i32,
    ) -> Result<SystemHandle, SchedulerError> {
        self.add_boxed(Box::new(system), priority)
    }

    /// Schedule `system`. Systems added after `start` are started at the
    /// beginning of the next tick.
    pub fn add_boxed(
        &mut self,
        system: Box<dyn System>,
        priority: i32,
    ) -> Result<SystemHandle, SchedulerError> {
        if self.torn_down {
            return Err(SchedulerError::TornDown);
        }
        let handle = SystemHandle::new(self.next_handle);
        self.next_handle += 1;

        let at = self.systems.partition_point(|s| s.priority <= priority);
        self.systems.insert(
            at,
            Scheduled {
                handle,
                name: system.name().to_string(),
                priority,
                state: SystemState::Constructed,
                system,
            },
        );
        Ok(handle)
    }

    /// Start every system that has not been started yet, in order.
    pub fn start(&mut self, world: &mut EntityManager) -> Result<(), SchedulerError> {
        if self.torn_down {
            return Err(SchedulerError::TornDown);
        }
        for entry in &mut self.systems {
            if entry.state != SystemState::Constructed {
                continue;
            }
            tracing::debug!(system = %entry.name, priority = entry.priority, "starting system");
            entry
                .system
                .start(world)
                .map_err(|source| SchedulerError::StartFailed {
                    name: entry.name.clone(),
                    source,
                })?;
            entry.state = SystemState::Started;
        }
        Ok(())
    }

    /// Run one frame: all updates, then all draws, then advance the clock.
    ///
    /// The first failing update stops the frame; later systems neither
    /// update nor draw and the clock does not advance.
    pub fn tick(&mut self, world: &mut EntityManager) -> Result<(), SchedulerError> {
        self.start(world)?;
        self.frame_timer.begin();

        let tick = self.time.tick_count();
        for entry in &mut self.systems {
            let result = self
                .profiler
                .time_system(&entry.name, || entry.system.update(world, &self.time));
            if let Err(source) = result {
                tracing::error!(system = %entry.name, tick, error = %source, "system update failed");
                self.counters.increment("update_failures", 1);
                return Err(SchedulerError::UpdateFailed {
                    name: entry.name.clone(),
                    tick,
                    source,
                });
            }
        }

        for entry in &mut self.systems {
            entry.system.draw(world);
        }

        self.time.advance_tick();
        self.counters.increment("frames", 1);
        self.frame_timer.end();
        Ok(())
    }

    /// Run `frames` ticks, stopping at the first error.
    pub fn run_frames(
        &mut self,
        world: &mut EntityManager,
        frames: u64,
    ) -> Result<(), SchedulerError> {
        for _ in 0..frames {
            self.tick(world)?;
        }
        Ok(())
    }

    /// Tear down started systems in reverse order. Further ticks fail with
    /// `TornDown`; calling this twice is harmless.
    pub fn teardown(&mut self, world: &mut EntityManager) {
        if self.torn_down {
            return;
        }
        for entry in self.systems.iter_mut().rev() {
            if entry.state == SystemState::Started {
                tracing::debug!(system = %entry.name, "tearing down system");
                entry.system.teardown(world);
            }
            entry.state = SystemState::TornDown;
        }
        self.torn_down = true;
    }

    pub fn state(&self, handle: SystemHandle) -> Option<SystemState> {
        self.systems
            .iter()
            .find(|entry| entry.handle == handle)
            .map(|entry| entry.state)
    }

    /// System names in execution order.
    pub fn system_names(&self) -> impl Iterator<Item = &str> {
        self.systems.iter().map(|entry| entry.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    pub fn time(&self) -> &SimulationTime {
        &self.time
    }

    pub fn frame_timer(&self) -> &FrameTimer {
        &self.frame_timer
    }

    pub fn profiler(&self) -> &SystemProfiler {
        &self.profiler
    }

    pub fn counters(&self) -> &Counter {
        &self.counters
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}
