//! Settings management

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to parse settings: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid setting `{field}`: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

/// Engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Fixed simulation ticks per second.
    pub tick_rate_hz: u32,
    /// Frames averaged by the frame timer.
    pub frame_samples: usize,
    /// Rows reserved up front in every new archetype.
    pub archetype_row_capacity: usize,
    /// Systems to instantiate by name, in any order.
    pub systems: Vec<SystemEntry>,
}

/// A system named in settings, instantiated through the system registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemEntry {
    pub name: String,
    #[serde(default)]
    pub priority: i32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_rate_hz: crate::time::TICK_RATE_HZ,
            frame_samples: 120,
            archetype_row_capacity: 0,
            systems: Vec::new(),
        }
    }
}

impl EngineSettings {
    /// Parse and validate JSON. Missing fields take their defaults.
    pub fn from_json_str(text: &str) -> Result<Self, SettingsError> {
        let settings: Self = serde_json::from_str(text)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json_string(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.tick_rate_hz == 0 {
            return Err(SettingsError::Invalid {
                field: "tick_rate_hz",
                reason: "must be greater than zero",
            });
        }
        if self.frame_samples == 0 {
            return Err(SettingsError::Invalid {
                field: "frame_samples",
                reason: "must be greater than zero",
            });
        }
        Ok(())
    }
}
