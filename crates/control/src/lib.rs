//! Control systems for the swerve drivetrain
//!
//! This crate provides:
//! - PIDF controllers with continuous-input support
//! - Gain sets and a live tuning mailbox
//! - The per-module steer/drive controller

pub mod gains;
pub mod module_controller;
pub mod pidf;

pub use gains::*;
pub use module_controller::*;
pub use pidf::*;
