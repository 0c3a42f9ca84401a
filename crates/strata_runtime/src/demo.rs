//! Demo components and systems: bouncing particles with finite lifetimes.

use glam::Vec2;
use strata_core::define_component;
use strata_core::ecs::{
    Component, ComponentRegistry, Entity, EntityManager, RegistryError, System,
    SystemRegistrationError, SystemRegistry, SystemResult,
};
use strata_core::time::SimulationTime;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Position(pub Vec2);
define_component!(Position, "Position");

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Velocity(pub Vec2);
define_component!(Velocity, "Velocity");

/// Ticks left before the entity is despawned.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Lifetime {
    pub remaining: u32,
}

impl Component for Lifetime {
    const NAME: &'static str = "Lifetime";

    fn init(&mut self) {
        self.remaining = DEFAULT_LIFETIME;
    }
}

/// Frame-lifetime tag set on particles that bounced this tick.
#[derive(Clone, Copy, Debug, Default)]
pub struct Bounced;
define_component!(Bounced, "Bounced");

const DEFAULT_LIFETIME: u32 = 240;
const BOUNDS: f32 = 1.0;

pub fn register_components(registry: &mut ComponentRegistry) -> Result<(), RegistryError> {
    registry.register::<Position>()?;
    registry.register::<Velocity>()?;
    registry.register::<Lifetime>()?;
    registry.register::<Bounced>()?;
    Ok(())
}

pub fn register_systems(registry: &mut SystemRegistry) -> Result<(), SystemRegistrationError> {
    registry.register_system("movement", || MovementSystem)?;
    registry.register_system("lifetime", LifetimeSystem::default)?;
    registry.register_system("spawner", SpawnerSystem::default)?;
    registry.register_system("stats", StatsSystem::default)?;
    Ok(())
}

/// Deterministic pseudo-random unit value for particle `seed`.
fn scatter(seed: u64) -> f32 {
    let mixed = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).rotate_left(17);
    (mixed >> 40) as f32 / (1u64 << 24) as f32 * 2.0 - 1.0
}

/// Spawn one particle through the data-driven path: construct each
/// component by name, then attach it.
pub fn spawn_particle(world: &mut EntityManager, seed: u64) -> anyhow::Result<Entity> {
    let entity = world.new_entity();
    for name in [Position::NAME, Velocity::NAME, Lifetime::NAME] {
        let (bit, value) = world.registry().construct(name)?;
        world.insert_boxed(entity, bit, value)?;
    }

    world.must_get_component_mut::<Position>(entity).0 = Vec2::new(scatter(seed), scatter(seed ^ 0xA5));
    world.must_get_component_mut::<Velocity>(entity).0 =
        Vec2::new(scatter(seed.rotate_left(7)), scatter(seed.rotate_left(29))) * 0.5;
    world.must_get_component_mut::<Lifetime>(entity).remaining =
        DEFAULT_LIFETIME / 2 + (seed % DEFAULT_LIFETIME as u64) as u32;
    Ok(entity)
}

/// Integrates velocity and reflects particles off the unit box.
pub struct MovementSystem;

impl System for MovementSystem {
    fn name(&self) -> &str {
        "movement"
    }

    fn update(&mut self, world: &mut EntityManager, time: &SimulationTime) -> SystemResult {
        let dt = time.delta_secs();
        let mut bounced = Vec::new();
        world.for_each2_mut::<Position, Velocity, _>(|entity, pos, vel| {
            pos.0 += vel.0 * dt;
            let mut hit = false;
            if pos.0.x.abs() > BOUNDS {
                vel.0.x = -vel.0.x;
                hit = true;
            }
            if pos.0.y.abs() > BOUNDS {
                vel.0.y = -vel.0.y;
                hit = true;
            }
            pos.0 = pos.0.clamp(Vec2::splat(-BOUNDS), Vec2::splat(BOUNDS));
            if hit {
                bounced.push(entity);
            }
        });

        // tag churn: clear last tick's tags, then tag this tick's bounces
        let stale: Vec<Entity> = world.query::<Bounced>().collect();
        for entity in stale {
            world.remove_component::<Bounced>(entity)?;
        }
        for entity in bounced {
            world.add_component::<Bounced>(entity)?;
        }
        Ok(())
    }
}

/// Counts lifetimes down and despawns expired particles.
#[derive(Default)]
pub struct LifetimeSystem {
    expired_total: u64,
}

impl System for LifetimeSystem {
    fn name(&self) -> &str {
        "lifetime"
    }

    fn update(&mut self, world: &mut EntityManager, _time: &SimulationTime) -> SystemResult {
        world.par_for_each_mut::<Lifetime, _>(|life| life.remaining = life.remaining.saturating_sub(1));

        let expired: Vec<Entity> = world
            .query_with::<Lifetime, _>(|life| life.remaining == 0)
            .collect();
        self.expired_total += expired.len() as u64;
        for entity in expired {
            world.despawn(entity)?;
        }
        Ok(())
    }

    fn teardown(&mut self, _world: &mut EntityManager) {
        tracing::info!(expired = self.expired_total, "lifetime system finished");
    }
}

/// Keeps the population at the size it had when the system started.
#[derive(Default)]
pub struct SpawnerSystem {
    target: usize,
    spawned: u64,
}

impl System for SpawnerSystem {
    fn name(&self) -> &str {
        "spawner"
    }

    fn start(&mut self, world: &mut EntityManager) -> SystemResult {
        self.target = world.query::<Lifetime>().count();
        self.spawned = world.entity_count() as u64;
        Ok(())
    }

    fn update(&mut self, world: &mut EntityManager, time: &SimulationTime) -> SystemResult {
        let alive = world.query::<Lifetime>().count();
        for _ in alive..self.target {
            self.spawned += 1;
            spawn_particle(world, self.spawned ^ time.tick_count().rotate_left(32))?;
        }
        Ok(())
    }
}

/// Reports population and archetype counts.
#[derive(Default)]
pub struct StatsSystem {
    draws: u64,
}

impl System for StatsSystem {
    fn name(&self) -> &str {
        "stats"
    }

    fn update(&mut self, _world: &mut EntityManager, _time: &SimulationTime) -> SystemResult {
        Ok(())
    }

    fn draw(&mut self, world: &EntityManager) {
        self.draws += 1;
        if self.draws.is_multiple_of(60) {
            let bounced = world.query::<Bounced>().count();
            tracing::debug!(
                entities = world.entity_count(),
                archetypes = world.archetype_count(),
                bounced,
                "world stats"
            );
        }
    }
}
