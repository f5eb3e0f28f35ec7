//! PIDF (Proportional-Integral-Derivative-Feedforward) Controller
//!
//! A configurable closed-loop controller with anti-windup, output saturation
//! and optional continuous (wrap-around) input for angles.

use serde::{Deserialize, Serialize};

use crate::gains::GainSet;

/// Configuration for a PIDF controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PidfConfig {
    /// Proportional gain
    pub kp: f64,
    /// Integral gain
    pub ki: f64,
    /// Derivative gain
    pub kd: f64,
    /// Feedforward gain
    pub kf: f64,
    /// Integral zone: only accumulate integral when |error| < i_zone (None = always)
    pub i_zone: Option<f64>,
    /// Maximum integral accumulator magnitude (anti-windup)
    pub i_max: f64,
    /// Minimum output value
    pub output_min: f64,
    /// Maximum output value
    pub output_max: f64,
    /// Input range that wraps around, e.g. `[-π, π)` for an angle
    pub continuous_range: Option<(f64, f64)>,
}

impl Default for PidfConfig {
    fn default() -> Self {
        Self {
            kp: 0.0,
            ki: 0.0,
            kd: 0.0,
            kf: 0.0,
            i_zone: None,
            i_max: f64::MAX,
            output_min: -1.0,
            output_max: 1.0,
            continuous_range: None,
        }
    }
}

impl PidfConfig {
    /// Create a P-only controller
    pub fn p(kp: f64) -> Self {
        Self { kp, ..Default::default() }
    }

    /// Create a PI controller
    pub fn pi(kp: f64, ki: f64) -> Self {
        Self { kp, ki, ..Default::default() }
    }

    /// Create a PD controller
    pub fn pd(kp: f64, kd: f64) -> Self {
        Self { kp, kd, ..Default::default() }
    }

    /// Create a PID controller
    pub fn pid(kp: f64, ki: f64, kd: f64) -> Self {
        Self { kp, ki, kd, ..Default::default() }
    }

    /// Create a PIDF controller with all gains
    pub fn pidf(kp: f64, ki: f64, kd: f64, kf: f64) -> Self {
        Self { kp, ki, kd, kf, ..Default::default() }
    }

    /// Set output limits
    pub fn with_limits(mut self, min: f64, max: f64) -> Self {
        self.output_min = min;
        self.output_max = max;
        self
    }

    /// Set integral anti-windup limit
    pub fn with_i_max(mut self, i_max: f64) -> Self {
        self.i_max = i_max;
        self
    }

    /// Set integral zone
    pub fn with_i_zone(mut self, i_zone: f64) -> Self {
        self.i_zone = Some(i_zone);
        self
    }

    /// Treat the input as periodic over `[min, max)`
    pub fn with_continuous_input(mut self, min: f64, max: f64) -> Self {
        self.continuous_range = Some((min, max));
        self
    }

    pub fn gains(&self) -> GainSet {
        GainSet { kp: self.kp, ki: self.ki, kd: self.kd, kf: self.kf }
    }

    pub fn with_gains(mut self, gains: GainSet) -> Self {
        self.kp = gains.kp;
        self.ki = gains.ki;
        self.kd = gains.kd;
        self.kf = gains.kf;
        self
    }

    /// Map a difference into the wrap-around range, if any.
    fn wrap_difference(&self, difference: f64) -> f64 {
        match self.continuous_range {
            Some((min, max)) if max > min => {
                let period = max - min;
                let half = period / 2.0;
                (difference + half).rem_euclid(period) - half
            }
            _ => difference,
        }
    }
}

/// PIDF Controller with state
#[derive(Debug, Clone)]
pub struct PidfController {
    config: PidfConfig,
    integral: f64,
    prev_measurement: Option<f64>,
    setpoint: f64,
}

impl PidfController {
    /// Create a new controller with the given configuration
    pub fn new(config: PidfConfig) -> Self {
        Self {
            config,
            integral: 0.0,
            prev_measurement: None,
            setpoint: 0.0,
        }
    }

    /// Set the target setpoint
    pub fn set_setpoint(&mut self, setpoint: f64) {
        self.setpoint = setpoint;
    }

    /// Get the current setpoint
    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    /// Reset the controller state (integral and derivative)
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_measurement = None;
    }

    /// Setpoint minus measurement, taking the short way round for
    /// continuous inputs.
    pub fn error(&self, measurement: f64) -> f64 {
        self.config.wrap_difference(self.setpoint - measurement)
    }

    /// Update the controller with a new measurement and return the control output
    ///
    /// Uses derivative-on-measurement to avoid derivative kick on setpoint changes.
    pub fn update(&mut self, measurement: f64, dt: f64) -> f64 {
        let error = self.error(measurement);

        // Proportional term
        let p_term = self.config.kp * error;

        // Integral term with I-zone and anti-windup
        let in_i_zone = self.config.i_zone
            .map(|zone| error.abs() < zone)
            .unwrap_or(true);

        if in_i_zone && dt > 0.0 {
            self.integral += error * dt;
            // Anti-windup: clamp integral
            self.integral = self.integral.clamp(-self.config.i_max, self.config.i_max);
        }
        let i_term = self.config.ki * self.integral;

        // Derivative term (on measurement to avoid derivative kick)
        let d_term = match self.prev_measurement {
            Some(prev) if dt > 0.0 => {
                // Negative because we're using derivative on measurement, not error
                -self.config.kd * self.config.wrap_difference(measurement - prev) / dt
            }
            _ => 0.0,
        };
        self.prev_measurement = Some(measurement);

        // Feedforward term
        let f_term = self.config.kf * self.setpoint;

        // Sum and clamp output
        let output = p_term + i_term + d_term + f_term;
        output.clamp(self.config.output_min, self.config.output_max)
    }

    /// Get the current integral accumulator value
    pub fn integral(&self) -> f64 {
        self.integral
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &PidfConfig {
        &self.config
    }

    /// Update the configuration
    pub fn set_config(&mut self, config: PidfConfig) {
        self.config = config;
    }

    pub fn gains(&self) -> GainSet {
        self.config.gains()
    }

    /// Swap in new gains, keeping the integral and derivative history.
    pub fn set_gains(&mut self, gains: GainSet) {
        self.config = self.config.clone().with_gains(gains);
    }
}
