//! Engine configuration.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Heat-bath coupling applied every `thermostat_interval` steps while
/// `isothermal` is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Thermostat {
    /// Remove the drift and rescale each axis to the target temperature.
    VelocityScaling,
    /// Redraw every movable velocity from the Maxwell-Boltzmann distribution.
    #[default]
    Andersen,
    /// Redraw the velocity of one randomly chosen particle.
    AndersenSingle,
}

/// Tunables for the event scheduler.
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// let cfg = hardmd::config::EngineConfig::from_json_str(r#"{ "time_step": 0.01 }"#).unwrap();
/// assert_eq!(cfg.time_step, 0.01);
/// assert!(!cfg.ignore_overlap);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Interval covered by one call to `Simulation::step`.
    pub time_step: f64,
    /// Turn overlapped starts into a short nudge time instead of an `Error::Overlap`.
    pub ignore_overlap: bool,
    /// Recompute every prediction after each event and compare with the live queue.
    pub check_schedule: bool,
    /// Slack allowed when checking that event times never decrease.
    pub time_tolerance: f64,
    /// Seed for the initial-state helpers; `None` draws one from the OS.
    pub seed: Option<u64>,
    /// Couple the system to a heat bath at `temperature` from `Simulation::step`.
    pub isothermal: bool,
    /// Bath temperature (k_B = 1).
    pub temperature: f64,
    pub thermostat: Thermostat,
    /// Steps between two thermostat applications.
    pub thermostat_interval: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            time_step: 0.05,
            ignore_overlap: false,
            check_schedule: false,
            time_tolerance: 1e-10,
            seed: None,
            isothermal: false,
            temperature: 1.0,
            thermostat: Thermostat::default(),
            thermostat_interval: 100,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.time_step.is_finite() || self.time_step <= 0.0 {
            return Err(Error::InvalidParam(
                "time_step must be finite and > 0".into(),
            ));
        }
        if !self.time_tolerance.is_finite() || self.time_tolerance < 0.0 {
            return Err(Error::InvalidParam(
                "time_tolerance must be finite and >= 0".into(),
            ));
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(Error::InvalidParam(
                "temperature must be finite and >= 0".into(),
            ));
        }
        if self.thermostat_interval == 0 {
            return Err(Error::InvalidParam(
                "thermostat_interval must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
