use crate::ecs::SystemHandle;
use thiserror::Error;

/// Errors raised by the name-keyed system registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SystemRegistrationError {
    #[error("system '{name}' is already registered as {existing}")]
    DuplicateName {
        name: String,
        existing: SystemHandle,
    },

    #[error("no system named '{name}' is registered")]
    UnknownSystem { name: String },
}
