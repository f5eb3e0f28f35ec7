//! Swerve drive geometry
//!
//! - Forward and least-squares inverse kinematics
//! - Wheel speed desaturation
//! - Odometry

pub mod desaturate;
pub mod odometry;
pub mod swerve;

pub use desaturate::{desaturate_wheel_speeds, desaturation_factor};
pub use odometry::SwerveOdometry;
pub use swerve::{DEFAULT_ZERO_SPEED_EPSILON, ModuleGeometry, SwerveKinematics};
