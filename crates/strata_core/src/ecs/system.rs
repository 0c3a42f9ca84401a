// system.rs - Per-frame behaviour driven by the scheduler

use crate::ecs::EntityManager;
use crate::time::SimulationTime;

/// Error raised by a system's `start` or `update`.
pub type SystemError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type SystemResult = Result<(), SystemError>;

/// A unit of per-frame behaviour.
///
/// Lifecycle: `start` once, then `update` and `draw` every tick, then
/// `teardown` once. `draw` only sees the world immutably and cannot fail.
pub trait System: Send {
    fn name(&self) -> &str;

    fn start(&mut self, _world: &mut EntityManager) -> SystemResult {
        Ok(())
    }

    fn update(&mut self, world: &mut EntityManager, time: &SimulationTime) -> SystemResult;

    fn draw(&mut self, _world: &EntityManager) {}

    fn teardown(&mut self, _world: &mut EntityManager) {}
}
