use std::path::Path;

use serde::{Deserialize, Serialize};

/// Configuration for the allocation engine.
///
/// Holds the explicit defaults that calculations fall back to when a record
/// carries no usable usage profile of its own. Passed into goal conversion
/// and allocation rather than living in module-global state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Versions", into = "Versions")]
pub struct AllocationConfig {
    /// Mission time assumed when a record has no positive mission time.
    default_mission_time: f64,

    /// Duty cycle (percent) assumed when a record has no positive duty
    /// cycle.
    default_duty_cycle: f64,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            default_mission_time: default_mission_time(),
            default_duty_cycle: default_duty_cycle(),
        }
    }
}

impl AllocationConfig {
    /// Loads the configuration from a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if the TOML content is
    /// invalid.
    pub fn load(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {e}"))?;
        toml::from_str(&content).map_err(|e| format!("Failed to parse config file: {e}"))
    }

    /// Saves the configuration to a TOML file at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be serialized to TOML or
    /// if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content =
            toml::to_string_pretty(self).map_err(|e| format!("Failed to serialize config: {e}"))?;
        std::fs::write(path, content).map_err(|e| format!("Failed to write config file: {e}"))
    }

    /// The fallback mission time.
    #[must_use]
    pub const fn default_mission_time(&self) -> f64 {
        self.default_mission_time
    }

    /// The fallback duty cycle, in percent.
    #[must_use]
    pub const fn default_duty_cycle(&self) -> f64 {
        self.default_duty_cycle
    }

    /// Sets the fallback mission time.
    pub const fn set_default_mission_time(&mut self, value: f64) {
        self.default_mission_time = value;
    }

    /// Sets the fallback duty cycle, in percent.
    pub const fn set_default_duty_cycle(&mut self, value: f64) {
        self.default_duty_cycle = value;
    }
}

const fn default_mission_time() -> f64 {
    10.0
}

const fn default_duty_cycle() -> f64 {
    100.0
}

/// The serialized versions of the configuration.
/// This allows for future changes to the configuration format and to the
/// domain type without breaking compatibility.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "_version")]
enum Versions {
    #[serde(rename = "1")]
    V1 {
        #[serde(default = "default_mission_time")]
        default_mission_time: f64,

        #[serde(default = "default_duty_cycle")]
        default_duty_cycle: f64,
    },
}

impl From<Versions> for AllocationConfig {
    fn from(versions: Versions) -> Self {
        match versions {
            Versions::V1 {
                default_mission_time,
                default_duty_cycle,
            } => Self {
                default_mission_time,
                default_duty_cycle,
            },
        }
    }
}

impl From<AllocationConfig> for Versions {
    fn from(config: AllocationConfig) -> Self {
        Self::V1 {
            default_mission_time: config.default_mission_time,
            default_duty_cycle: config.default_duty_cycle,
        }
    }
}
