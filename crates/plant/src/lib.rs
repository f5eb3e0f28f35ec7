//! Simulated swerve drivetrain
//!
//! This crate provides:
//! - A first-order chassis plant that speaks the drive bus
//! - Seeded sensor noise and fault injection

pub mod chassis;
pub mod noise;

pub use chassis::{PlantConfig, SimulatedDrivetrain, WheelTruth};
pub use noise::NoiseGenerator;
