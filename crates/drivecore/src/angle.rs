//! Angle helpers
//!
//! Canonical angles live in `[-π, π)`. Headings coming from a gyro are
//! periodic; [`ContinuousHeading`] unrolls them so that integrators never see
//! a jump at the ±π seam.

use std::f64::consts::{PI, TAU};

use serde::{Deserialize, Serialize};

/// Wrap an angle into `[-π, π)`.
pub fn wrap_angle(angle: f64) -> f64 {
    (angle + PI).rem_euclid(TAU) - PI
}

/// Shortest signed angular distance from `from` to `to`, in `[-π, π)`.
pub fn angle_difference(to: f64, from: f64) -> f64 {
    wrap_angle(to - from)
}

/// Units a heading sensor reports in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AngleUnit {
    #[default]
    Degrees,
    Radians,
}

/// How the heading sensor's raw value maps onto the canonical heading
/// (radians, counter-clockwise positive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HeadingConvention {
    pub unit: AngleUnit,
    /// Set when the sensor reports clockwise-positive yaw.
    pub inverted: bool,
}

impl HeadingConvention {
    pub fn degrees() -> Self {
        Self { unit: AngleUnit::Degrees, inverted: false }
    }

    pub fn radians() -> Self {
        Self { unit: AngleUnit::Radians, inverted: false }
    }

    pub fn with_inverted(mut self, inverted: bool) -> Self {
        self.inverted = inverted;
        self
    }

    /// Convert a raw sensor value into a canonical heading in `[-π, π)`.
    pub fn canonicalize(&self, raw: f64) -> f64 {
        let radians = match self.unit {
            AngleUnit::Degrees => raw.to_radians(),
            AngleUnit::Radians => raw,
        };
        let signed = if self.inverted { -radians } else { radians };
        wrap_angle(signed)
    }

    /// Inverse of [`canonicalize`](Self::canonicalize), wrapped to the
    /// sensor's own periodic range.
    pub fn to_raw(&self, heading: f64) -> f64 {
        let signed = wrap_angle(if self.inverted { -heading } else { heading });
        match self.unit {
            AngleUnit::Degrees => signed.to_degrees(),
            AngleUnit::Radians => signed,
        }
    }
}

/// Unrolls a periodic heading into a continuous one.
///
/// Each new sample contributes the shortest signed step from the previous
/// sample, so a reading that crosses ±π adds a small step instead of a full
/// revolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContinuousHeading {
    last_sample: f64,
    continuous: f64,
}

impl ContinuousHeading {
    /// Start unrolling at `sample`, reporting `continuous` as the current value.
    pub fn new(sample: f64, continuous: f64) -> Self {
        Self { last_sample: wrap_angle(sample), continuous }
    }

    /// Feed the next periodic sample; returns the step that was added.
    pub fn advance(&mut self, sample: f64) -> f64 {
        let sample = wrap_angle(sample);
        let step = angle_difference(sample, self.last_sample);
        self.last_sample = sample;
        self.continuous += step;
        step
    }

    pub fn value(&self) -> f64 {
        self.continuous
    }

    pub fn last_sample(&self) -> f64 {
        self.last_sample
    }
}
