//! Swerve drivetrain facade
//!
//! This crate provides:
//! - [`SwerveDrive`], which turns chassis velocity commands into module
//!   efforts and keeps the odometry pose
//! - JSON configuration
//! - Telemetry snapshots and a movement self-check

pub mod config;
pub mod diagnostics;
pub mod drivetrain;
pub mod telemetry;

pub use config::DrivetrainConfig;
pub use diagnostics::{DEFAULT_MOVEMENT_THRESHOLD, MovementCheck};
pub use drivetrain::SwerveDrive;
pub use telemetry::{ModuleTelemetry, TelemetrySnapshot};
