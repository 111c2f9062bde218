//! Application configuration
//!
//! Connection parameters, motion constants and interpreter settings, persisted
//! as pretty-printed JSON next to the saved programs.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::storage;

/// Connection parameters for the robot controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    /// Controller IP address.
    pub ip: String,
    /// Controller port, kept as entered by the operator.
    pub port: String,
    /// Robot name used to address the controller through the SDK.
    pub name: String,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            ip: "192.168.1.13".to_string(),
            port: "6001".to_string(),
            name: "robot".to_string(),
        }
    }
}

impl RobotConfig {
    /// Replace the fields for which a non-blank value is supplied.
    pub fn update(&mut self, ip: &str, port: &str, name: &str) {
        if !ip.trim().is_empty() {
            self.ip = ip.trim().to_string();
        }
        if !port.trim().is_empty() {
            self.port = port.trim().to_string();
        }
        if !name.trim().is_empty() {
            self.name = name.trim().to_string();
        }
    }
}

/// Constants applied to every motion command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionProfile {
    /// Acceleration percentage.
    pub acceleration: u32,
    /// Deceleration percentage.
    pub deceleration: u32,
    /// Joint velocity used by the manual homing move.
    pub home_velocity: u32,
    /// Multiplier from the speed setting to cartesian velocity.
    pub linear_velocity_scale: u32,
    /// Speed setting applied when a session starts (0-100).
    pub initial_speed: u32,
}

impl Default for MotionProfile {
    fn default() -> Self {
        Self {
            acceleration: 30,
            deceleration: 30,
            home_velocity: 60,
            linear_velocity_scale: 5,
            initial_speed: 20,
        }
    }
}

/// Interpreter settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpreterConfig {
    /// Label prefixed to top-level step diagnostics.
    pub context_label: String,
    /// Granularity at which delays poll for cancellation, in milliseconds.
    pub delay_tick_ms: u64,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            context_label: "[Blockly]".to_string(),
            delay_tick_ms: 50,
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Controller connection parameters.
    pub robot: RobotConfig,
    /// Motion constants.
    pub motion: MotionProfile,
    /// Interpreter settings.
    pub interpreter: InterpreterConfig,
}

impl AppConfig {
    /// Load a configuration file; missing fields fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = storage::read_file(path)?;
        let config: AppConfig = serde_json::from_slice(&data)
            .with_context(|| format!("Failed to deserialize config: {:?}", path))?;
        Ok(config)
    }

    /// Write the configuration atomically.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self).context("Failed to serialize config")?;
        storage::write_atomic(path, &json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn update_keeps_blank_fields() {
        let mut config = RobotConfig::default();
        config.update("10.0.0.2", "  ", "arm");
        assert_eq!(config.ip, "10.0.0.2");
        assert_eq!(config.port, "6001");
        assert_eq!(config.name, "arm");
    }

    #[test]
    fn save_and_load_config() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");

        let mut config = AppConfig::default();
        config.robot.name = "cell-2".into();
        config.motion.initial_speed = 55;
        config.save(&path).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn partial_config_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.json");
        std::fs::write(&path, br#"{"robot": {"ip": "127.0.0.1"}}"#).unwrap();

        let loaded = AppConfig::load(&path).unwrap();
        assert_eq!(loaded.robot.ip, "127.0.0.1");
        assert_eq!(loaded.robot.port, "6001");
        assert_eq!(loaded.motion, MotionProfile::default());
    }
}
