//! Drivetrain state types
//!
//! Plain value types shared by kinematics, control and odometry.

use nalgebra::{Rotation2, Vector2};
use serde::{Deserialize, Serialize};

use crate::angle::wrap_angle;

/// Desired or measured velocity of the robot body.
///
/// `vx` is forward, `vy` is to the left, `omega` is counter-clockwise (rad/s).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ChassisVelocity {
    pub vx: f64,
    pub vy: f64,
    pub omega: f64,
}

impl ChassisVelocity {
    pub fn new(vx: f64, vy: f64, omega: f64) -> Self {
        Self { vx, vy, omega }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Convert a field-frame command into the robot frame by rotating the
    /// translation by `-heading`.
    pub fn from_field_relative(vx: f64, vy: f64, omega: f64, heading: f64) -> Self {
        let robot = Rotation2::new(-heading) * Vector2::new(vx, vy);
        Self { vx: robot.x, vy: robot.y, omega }
    }

    pub fn translation_speed(&self) -> f64 {
        self.vx.hypot(self.vy)
    }

    pub fn is_finite(&self) -> bool {
        self.vx.is_finite() && self.vy.is_finite() && self.omega.is_finite()
    }
}

/// Wheel angle (rad, `[-π, π)`) and signed wheel speed.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModuleState {
    pub angle: f64,
    pub speed: f64,
}

impl ModuleState {
    pub fn new(angle: f64, speed: f64) -> Self {
        Self { angle: wrap_angle(angle), speed }
    }

    /// Velocity vector of the wheel contact point in the robot frame.
    pub fn velocity(&self) -> Vector2<f64> {
        Vector2::new(self.speed * self.angle.cos(), self.speed * self.angle.sin())
    }
}

/// Wheel angle (rad) and cumulative drive distance (m).
///
/// Only the difference between consecutive readings is meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModulePosition {
    pub angle: f64,
    pub distance: f64,
}

impl ModulePosition {
    pub fn new(angle: f64, distance: f64) -> Self {
        Self { angle: wrap_angle(angle), distance }
    }
}

/// Pose of the robot on the field.
///
/// `heading` is continuous: it is not wrapped, so a robot that has spun twice
/// reports `4π`. Use [`heading_wrapped`](Self::heading_wrapped) for display.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose2d {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

impl Pose2d {
    pub fn new(x: f64, y: f64, heading: f64) -> Self {
        Self { x, y, heading }
    }

    pub fn origin() -> Self {
        Self::default()
    }

    pub fn translation(&self) -> Vector2<f64> {
        Vector2::new(self.x, self.y)
    }

    pub fn heading_wrapped(&self) -> f64 {
        wrap_angle(self.heading)
    }

    /// Apply a robot-frame displacement `(dx, dy)` rotated by `frame_heading`
    /// and set the heading to `heading`.
    pub fn translated(&self, dx: f64, dy: f64, frame_heading: f64, heading: f64) -> Self {
        let field = Rotation2::new(frame_heading) * Vector2::new(dx, dy);
        Self { x: self.x + field.x, y: self.y + field.y, heading }
    }

    pub fn distance_to(&self, other: &Pose2d) -> f64 {
        (self.translation() - other.translation()).norm()
    }
}

/// Incremental robot-frame motion over one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Twist2d {
    pub dx: f64,
    pub dy: f64,
    pub dtheta: f64,
}

impl Twist2d {
    pub fn new(dx: f64, dy: f64, dtheta: f64) -> Self {
        Self { dx, dy, dtheta }
    }
}
