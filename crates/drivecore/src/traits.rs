//! Sensor/actuator bus and model traits
//!
//! One control cycle is a hand-off over a [`DriveBus`]: the plant (real
//! hardware glue or the simulator) fills `sensors`, the controller reads them
//! and fills `actuators`.

use serde::{Deserialize, Serialize};

use crate::error::{SensorFault, SensorReading};
use crate::module::PerModule;

/// Raw feedback from one module.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModuleReading {
    /// Absolute steer encoder angle (rad), before the mechanical zero offset.
    pub raw_angle: f64,
    /// Drive wheel surface speed (m/s).
    pub drive_velocity: f64,
    /// Cumulative drive wheel travel (m).
    pub drive_distance: f64,
}

impl ModuleReading {
    pub fn is_finite(&self) -> bool {
        self.raw_angle.is_finite() && self.drive_velocity.is_finite() && self.drive_distance.is_finite()
    }
}

/// Actuator commands for one module, each in `[-1, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ModuleEffort {
    pub drive: f64,
    pub steer: f64,
}

impl ModuleEffort {
    pub fn new(drive: f64, steer: f64) -> Self {
        Self { drive: drive.clamp(-1.0, 1.0), steer: steer.clamp(-1.0, 1.0) }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorBus {
    pub modules: PerModule<SensorReading<ModuleReading>>,
    /// Raw heading sensor value in the sensor's own convention.
    pub heading: SensorReading<f64>,
}

impl Default for SensorBus {
    fn default() -> Self {
        SensorBus {
            modules: PerModule::splat(Err(SensorFault::Unreachable)),
            heading: Err(SensorFault::Unreachable),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ActuatorBus {
    pub modules: PerModule<ModuleEffort>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DriveBus {
    pub sensors: SensorBus,
    pub actuators: ActuatorBus,
}

#[derive(Debug, Clone, Copy)]
pub struct CycleContext {
    pub dt: f64,
    pub t: f64,
}

pub trait Model {
    fn reset(&mut self);
}

/// Reads `bus.sensors`, writes `bus.actuators`.
pub trait ControlModel: Model {
    fn step_control(&mut self, ctx: CycleContext, bus: &mut DriveBus);
}

/// Reads `bus.actuators`, advances physics by `ctx.dt`, writes `bus.sensors`.
pub trait PlantModel: Model {
    fn step_plant(&mut self, ctx: CycleContext, bus: &mut DriveBus);
}
