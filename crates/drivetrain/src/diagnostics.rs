//! Movement self-check
//!
//! Drive all modules and confirm each one reports wheel motion.

use log::{info, warn};

use drivecore::{ModuleId, PerModule};

use crate::drivetrain::SwerveDrive;

/// Minimum drive velocity magnitude that counts as moving (m/s)
pub const DEFAULT_MOVEMENT_THRESHOLD: f64 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub struct MovementCheck {
    threshold: f64,
    moved: PerModule<bool>,
    samples: usize,
}

impl Default for MovementCheck {
    fn default() -> Self {
        MovementCheck::new(DEFAULT_MOVEMENT_THRESHOLD)
    }
}

impl MovementCheck {
    pub fn new(threshold: f64) -> Self {
        MovementCheck { threshold, moved: PerModule::default(), samples: 0 }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Record the measured drive velocity of every module.
    pub fn record(&mut self, drive: &SwerveDrive) {
        self.record_velocities(&PerModule::from_fn(|id| drive.module(id).velocity()));
    }

    pub fn record_velocities(&mut self, velocities: &PerModule<f64>) {
        self.samples += 1;
        for (id, moved) in self.moved.iter_mut() {
            if !*moved && velocities[id].abs() >= self.threshold {
                info!("{} module moved", id);
                *moved = true;
            }
        }
    }

    pub fn moved(&self, id: ModuleId) -> bool {
        self.moved[id]
    }

    pub fn samples(&self) -> usize {
        self.samples
    }

    /// True once every module has been seen moving.
    pub fn passed(&self) -> bool {
        self.moved.values().all(|m| *m)
    }

    /// Modules that never reached the threshold.
    pub fn failures(&self) -> Vec<ModuleId> {
        self.moved.iter().filter(|(_, m)| !**m).map(|(id, _)| id).collect()
    }

    /// Log the outcome; returns [`passed`](Self::passed).
    pub fn report(&self) -> bool {
        let failures = self.failures();
        if failures.is_empty() {
            info!("Movement check passed after {} samples", self.samples);
        } else {
            for id in &failures {
                warn!("{} module did not reach {} m/s", id, self.threshold);
            }
        }
        failures.is_empty()
    }

    pub fn reset(&mut self) {
        self.moved = PerModule::default();
        self.samples = 0;
    }
}
