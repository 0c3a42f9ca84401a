//! Strata Engine Core
//!
//! Contains the fundamental simulation pieces:
//! - Archetype-based Entity Component System (ECS)
//! - Priority-ordered system scheduler
//! - Deterministic fixed-step time
//! - Engine settings

pub mod ecs;
pub mod settings;
pub mod time;

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
