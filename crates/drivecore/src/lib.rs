//! Shared types for the swerve drivetrain crates
//!
//! This crate provides:
//! - The drivetrain data model (chassis velocity, module state/position, pose)
//! - Module identity and fixed-size per-module storage
//! - Angle wrapping and heading unrolling
//! - The sensor/actuator bus exchanged between controller and plant
//! - Pose integrators and a fixed-timestep accumulator

pub mod angle;
pub mod error;
pub mod integrators;
pub mod module;
pub mod state;
pub mod traits;

pub use angle::*;
pub use error::*;
pub use integrators::*;
pub use module::*;
pub use state::*;
pub use traits::*;
