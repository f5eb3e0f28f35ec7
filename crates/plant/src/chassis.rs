//! Simulated swerve chassis
//!
//! A deliberately simple plant for exercising the controller in closed loop:
//! first-order drive wheels, rate-limited steering, rigid-body motion from
//! the forward kinematics and sensors with mounting offsets, noise and
//! injectable faults.

use log::info;
use serde::{Deserialize, Serialize};

use drivecore::{
    ActuatorBus, ChassisVelocity, ConfigError, CycleContext, DriveBus, Exponential,
    FixedTimestep, HeadingConvention, Integrator, Model, ModuleId, ModuleReading, ModuleState,
    PerModule, PlantModel, Pose2d, SensorBus, SensorFault, Twist2d, wrap_angle,
};
use kinematics::{ModuleGeometry, SwerveKinematics};

use crate::noise::NoiseGenerator;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlantConfig {
    pub geometry: ModuleGeometry,
    /// Wheel speed at full drive effort (m/s)
    pub max_wheel_speed: f64,
    /// Drive wheel speed lag (s)
    pub drive_time_constant: f64,
    /// Steer rate at full steer effort (rad/s)
    pub max_steer_rate: f64,
    /// Physics substep (s)
    pub physics_dt: f64,
    /// Absolute encoder reading when each wheel points forward (rad)
    pub angle_offsets: PerModule<f64>,
    pub heading_convention: HeadingConvention,
    /// Steer encoder noise std dev (rad)
    pub angle_noise: f64,
    /// Drive velocity noise std dev (m/s)
    pub velocity_noise: f64,
    /// Gyro noise std dev (rad)
    pub heading_noise: f64,
    /// Chance per cycle that any one sensor reports stale
    pub dropout_probability: f64,
    pub seed: u64,
}

impl Default for PlantConfig {
    fn default() -> Self {
        PlantConfig {
            geometry: ModuleGeometry::default(),
            max_wheel_speed: 4.0,
            drive_time_constant: 0.05,
            max_steer_rate: 10.0,
            physics_dt: 1e-3,
            angle_offsets: PerModule::default(),
            heading_convention: HeadingConvention::degrees(),
            angle_noise: 0.0,
            velocity_noise: 0.0,
            heading_noise: 0.0,
            dropout_probability: 0.0,
            seed: 1,
        }
    }
}

impl PlantConfig {
    pub fn with_angle_offsets(mut self, offsets: PerModule<f64>) -> Self {
        self.angle_offsets = offsets;
        self
    }

    pub fn with_heading_convention(mut self, convention: HeadingConvention) -> Self {
        self.heading_convention = convention;
        self
    }

    pub fn with_noise(mut self, angle: f64, velocity: f64, heading: f64) -> Self {
        self.angle_noise = angle;
        self.velocity_noise = velocity;
        self.heading_noise = heading;
        self
    }

    pub fn with_dropout(mut self, probability: f64, seed: u64) -> Self {
        self.dropout_probability = probability;
        self.seed = seed;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        ConfigError::require_positive("max_wheel_speed", self.max_wheel_speed)?;
        ConfigError::require_positive("drive_time_constant", self.drive_time_constant)?;
        ConfigError::require_positive("max_steer_rate", self.max_steer_rate)?;
        ConfigError::require_positive("physics_dt", self.physics_dt)?;
        for offset in self.angle_offsets.values() {
            ConfigError::require_finite("angle_offsets", *offset)?;
        }
        Ok(())
    }
}

/// Ground truth for one wheel.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WheelTruth {
    /// Steer angle relative to robot forward (rad)
    pub angle: f64,
    /// Surface speed (m/s)
    pub speed: f64,
    /// Cumulative travel (m)
    pub distance: f64,
}

pub struct SimulatedDrivetrain {
    config: PlantConfig,
    kinematics: SwerveKinematics,
    wheels: PerModule<WheelTruth>,
    pose: Pose2d,
    chassis: ChassisVelocity,
    timestep: FixedTimestep,
    noise: NoiseGenerator,
    module_faults: PerModule<bool>,
    heading_fault: bool,
}

impl SimulatedDrivetrain {
    pub fn new(config: PlantConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let kinematics = SwerveKinematics::new(&config.geometry)?;
        Ok(SimulatedDrivetrain {
            kinematics,
            wheels: PerModule::default(),
            pose: Pose2d::origin(),
            chassis: ChassisVelocity::zero(),
            timestep: FixedTimestep::new(config.physics_dt),
            noise: NoiseGenerator::new(config.seed),
            module_faults: PerModule::default(),
            heading_fault: false,
            config,
        })
    }

    /// Place the robot; wheels keep their state.
    pub fn with_pose(mut self, pose: Pose2d) -> Self {
        self.pose = pose;
        self
    }

    pub fn config(&self) -> &PlantConfig {
        &self.config
    }

    pub fn true_pose(&self) -> Pose2d {
        self.pose
    }

    pub fn true_chassis_velocity(&self) -> ChassisVelocity {
        self.chassis
    }

    pub fn wheel(&self, id: ModuleId) -> WheelTruth {
        self.wheels[id]
    }

    /// Turn a wheel by hand, e.g. to start from a scrambled state.
    pub fn set_wheel_angle(&mut self, id: ModuleId, angle: f64) {
        self.wheels[id].angle = wrap_angle(angle);
    }

    /// Make a module's sensors unreachable until cleared.
    pub fn set_module_fault(&mut self, id: ModuleId, faulted: bool) {
        if self.module_faults[id] != faulted {
            info!("{} sensor fault {}", id, if faulted { "injected" } else { "cleared" });
        }
        self.module_faults[id] = faulted;
    }

    pub fn set_heading_fault(&mut self, faulted: bool) {
        if self.heading_fault != faulted {
            info!("Heading sensor fault {}", if faulted { "injected" } else { "cleared" });
        }
        self.heading_fault = faulted;
    }

    /// Advance physics by `dt` under the given efforts.
    pub fn advance(&mut self, dt: f64, actuators: &ActuatorBus) {
        let steps = self.timestep.advance(dt);
        for _ in 0..steps {
            self.substep(self.config.physics_dt, actuators);
        }
    }

    fn substep(&mut self, h: f64, actuators: &ActuatorBus) {
        let alpha = 1.0 - (-h / self.config.drive_time_constant).exp();
        for (id, wheel) in self.wheels.iter_mut() {
            let effort = actuators.modules[id];
            let target = effort.drive.clamp(-1.0, 1.0) * self.config.max_wheel_speed;
            wheel.speed += (target - wheel.speed) * alpha;
            wheel.angle = wrap_angle(wheel.angle + effort.steer.clamp(-1.0, 1.0) * self.config.max_steer_rate * h);
            wheel.distance += wheel.speed * h;
        }

        let states = self.wheels.map(|_, w| ModuleState { angle: w.angle, speed: w.speed });
        self.chassis = self.kinematics.to_chassis_velocity(&states);
        let twist = Twist2d::new(self.chassis.vx * h, self.chassis.vy * h, self.chassis.omega * h);
        self.pose = Exponential.integrate(&self.pose, &twist, self.pose.heading + twist.dtheta);
    }

    /// Write the current sensor values, with offsets, noise and faults applied.
    pub fn sense(&mut self, sensors: &mut SensorBus) {
        for id in ModuleId::ALL {
            let reading = if self.module_faults[id] {
                Err(SensorFault::Unreachable)
            } else if self.noise.chance(self.config.dropout_probability) {
                Err(SensorFault::Stale)
            } else {
                let wheel = self.wheels[id];
                Ok(ModuleReading {
                    raw_angle: wrap_angle(
                        wheel.angle + self.config.angle_offsets[id] + self.noise.gaussian(self.config.angle_noise),
                    ),
                    drive_velocity: wheel.speed + self.noise.gaussian(self.config.velocity_noise),
                    drive_distance: wheel.distance,
                })
            };
            sensors.modules[id] = reading;
        }

        sensors.heading = if self.heading_fault {
            Err(SensorFault::Unreachable)
        } else if self.noise.chance(self.config.dropout_probability) {
            Err(SensorFault::Stale)
        } else {
            let heading = self.pose.heading + self.noise.gaussian(self.config.heading_noise);
            Ok(self.config.heading_convention.to_raw(heading))
        };
    }
}

impl Model for SimulatedDrivetrain {
    fn reset(&mut self) {
        self.wheels = PerModule::default();
        self.pose = Pose2d::origin();
        self.chassis = ChassisVelocity::zero();
        self.timestep = FixedTimestep::new(self.config.physics_dt);
        self.noise = NoiseGenerator::new(self.config.seed);
        self.module_faults = PerModule::default();
        self.heading_fault = false;
    }
}

impl PlantModel for SimulatedDrivetrain {
    fn step_plant(&mut self, ctx: CycleContext, bus: &mut DriveBus) {
        self.advance(ctx.dt, &bus.actuators);
        self.sense(&mut bus.sensors);
    }
}
