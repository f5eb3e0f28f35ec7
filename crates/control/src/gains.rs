//! Gain sets and the live tuning surface
//!
//! Gains can be changed while the robot is driving. A tuning front end (a
//! dashboard thread, a console) submits new values through a
//! [`TuningHandle`]; the drivetrain drains the pending value only at the
//! start of a control cycle, so one cycle never mixes old and new gains.

use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;
use serde::{Deserialize, Serialize};

use drivecore::ConfigError;

/// Coefficients for one control axis.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GainSet {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    pub kf: f64,
}

impl GainSet {
    pub fn pd(kp: f64, kd: f64) -> Self {
        Self { kp, kd, ..Default::default() }
    }

    pub fn pdf(kp: f64, kd: f64, kf: f64) -> Self {
        Self { kp, kd, kf, ..Default::default() }
    }

    /// Gains must be finite and non-negative.
    pub fn validate(&self, axis: &str) -> Result<(), ConfigError> {
        for (name, value) in [("kp", self.kp), ("ki", self.ki), ("kd", self.kd), ("kf", self.kf)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidGain {
                    name: format!("{axis}.{name}"),
                    reason: format!("must be finite and non-negative, got {value}"),
                });
            }
        }
        Ok(())
    }
}

/// Gains shared by all four modules.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModuleGains {
    pub drive: GainSet,
    pub steer: GainSet,
}

impl ModuleGains {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.drive.validate("drive")?;
        self.steer.validate("steer")
    }
}

/// Mailbox for gain updates coming from outside the control loop.
///
/// Cloning the handle shares the mailbox. The latest submission wins; older
/// unapplied submissions are dropped.
#[derive(Debug, Clone, Default)]
pub struct TuningHandle {
    pending: Arc<Mutex<Option<ModuleGains>>>,
}

impl TuningHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `gains` for the next control cycle.
    pub fn submit(&self, gains: ModuleGains) -> Result<(), ConfigError> {
        gains.validate()?;
        let mut pending = self.lock();
        if pending.replace(gains).is_some() {
            debug!("Replacing unapplied gain update");
        }
        Ok(())
    }

    /// Remove and return the pending update, if any.
    pub fn take_pending(&self) -> Option<ModuleGains> {
        self.lock().take()
    }

    pub fn has_pending(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<ModuleGains>> {
        // A panicked submitter cannot leave an Option half-written
        self.pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
