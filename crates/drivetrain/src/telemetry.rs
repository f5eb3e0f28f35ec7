//! Pull-based telemetry
//!
//! A snapshot of the most recent computed and measured values. Display and
//! transport are left to the caller.

use serde::Serialize;

use control::GainSet;
use drivecore::{ModuleState, PerModule, Pose2d};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ModuleTelemetry {
    pub name: &'static str,
    /// Wheel angle relative to robot forward (rad)
    pub angle: f64,
    /// Absolute encoder angle before the zero offset (rad)
    pub raw_angle: f64,
    pub angle_offset: f64,
    pub velocity: f64,
    pub distance: f64,
    pub desired: ModuleState,
    pub optimized: ModuleState,
    pub drive_effort: f64,
    pub steer_effort: f64,
    pub sensor_healthy: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub pose: Pose2d,
    pub field_relative: bool,
    pub heading_healthy: bool,
    /// Factor applied by the last desaturation pass
    pub desaturation_factor: f64,
    pub desaturating: bool,
    pub drive_gains: GainSet,
    pub steer_gains: GainSet,
    pub modules: PerModule<ModuleTelemetry>,
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

fn round_state(state: ModuleState) -> ModuleState {
    ModuleState { angle: round3(state.angle), speed: round3(state.speed) }
}

fn round_gains(gains: GainSet) -> GainSet {
    GainSet { kp: round3(gains.kp), ki: round3(gains.ki), kd: round3(gains.kd), kf: round3(gains.kf) }
}

impl ModuleTelemetry {
    pub fn rounded(&self) -> Self {
        ModuleTelemetry {
            name: self.name,
            angle: round3(self.angle),
            raw_angle: round3(self.raw_angle),
            angle_offset: round3(self.angle_offset),
            velocity: round3(self.velocity),
            distance: round3(self.distance),
            desired: round_state(self.desired),
            optimized: round_state(self.optimized),
            drive_effort: round3(self.drive_effort),
            steer_effort: round3(self.steer_effort),
            sensor_healthy: self.sensor_healthy,
        }
    }
}

impl TelemetrySnapshot {
    /// Copy with every number rounded to 3 decimals, for display.
    pub fn rounded(&self) -> Self {
        TelemetrySnapshot {
            pose: Pose2d::new(round3(self.pose.x), round3(self.pose.y), round3(self.pose.heading)),
            field_relative: self.field_relative,
            heading_healthy: self.heading_healthy,
            desaturation_factor: round3(self.desaturation_factor),
            desaturating: self.desaturating,
            drive_gains: round_gains(self.drive_gains),
            steer_gains: round_gains(self.steer_gains),
            modules: self.modules.map(|_, m| m.rounded()),
        }
    }
}
