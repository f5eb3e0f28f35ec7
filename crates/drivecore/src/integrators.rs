use serde::{Deserialize, Serialize};

use crate::state::{Pose2d, Twist2d};

/// Advances a pose by one robot-frame twist.
pub trait Integrator {
    /// `heading` is the continuous heading the robot has at the end of the step.
    fn integrate(&self, pose: &Pose2d, twist: &Twist2d, heading: f64) -> Pose2d;
}

/// Forward Euler.
/// The whole displacement is rotated into the field frame with the end-of-step
/// heading. First order; drifts when driving and turning at the same time.
#[derive(Debug, Clone, Copy, Default)]
pub struct Euler;

impl Integrator for Euler {
    fn integrate(&self, pose: &Pose2d, twist: &Twist2d, heading: f64) -> Pose2d {
        pose.translated(twist.dx, twist.dy, heading, heading)
    }
}

/// Twist exponential.
/// Treats the step as motion along a constant-curvature arc, which is exact
/// for a constant chassis velocity over the step.
#[derive(Debug, Clone, Copy, Default)]
pub struct Exponential;

impl Integrator for Exponential {
    fn integrate(&self, pose: &Pose2d, twist: &Twist2d, heading: f64) -> Pose2d {
        let dtheta = twist.dtheta;
        let (s, c) = if dtheta.abs() < 1e-9 {
            // Taylor expansion of sin(x)/x and (1 - cos(x))/x near zero
            (1.0 - dtheta * dtheta / 6.0, 0.5 * dtheta)
        } else {
            (dtheta.sin() / dtheta, (1.0 - dtheta.cos()) / dtheta)
        };
        let dx = twist.dx * s - twist.dy * c;
        let dy = twist.dx * c + twist.dy * s;
        pose.translated(dx, dy, pose.heading, heading)
    }
}

/// Runtime-selectable integrator, as stored in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationMethod {
    #[default]
    Exponential,
    Euler,
}

impl Integrator for IntegrationMethod {
    fn integrate(&self, pose: &Pose2d, twist: &Twist2d, heading: f64) -> Pose2d {
        match self {
            IntegrationMethod::Exponential => Exponential.integrate(pose, twist, heading),
            IntegrationMethod::Euler => Euler.integrate(pose, twist, heading),
        }
    }
}

/// Accumulates wall time and hands out whole fixed-size steps.
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    pub fixed_dt: f64,
    pub accumulator: f64,
}

impl FixedTimestep {
    pub fn new(fixed_dt: f64) -> Self {
        FixedTimestep { fixed_dt, accumulator: 0.0 }
    }

    /// Adds `dt` and returns how many fixed steps are now due.
    /// The remainder stays in the accumulator for the next call.
    pub fn advance(&mut self, dt: f64) -> usize {
        self.accumulator += dt;
        let mut steps = 0;
        // Small slack so that e.g. 0.02 / 0.001 yields 20 steps, not 19
        while self.accumulator >= self.fixed_dt - 1e-12 {
            self.accumulator -= self.fixed_dt;
            steps += 1;
        }
        self.accumulator = self.accumulator.max(0.0);
        steps
    }
}
