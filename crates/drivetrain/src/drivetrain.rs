//! Swerve drivetrain facade
//!
//! Owns the four module controllers, the kinematics and the odometry.
//! Commands go in through `drive*`, sensors and actuators are exchanged once
//! per cycle in [`SwerveDrive::periodic`].

use log::{debug, info, warn};

use control::{ModuleGains, SwerveModuleController, TuningHandle};
use drivecore::{
    ChassisVelocity, ConfigError, ControlModel, CycleContext, DriveBus, Model, ModuleId,
    ModulePosition, ModuleState, PerModule, Pose2d, SensorFault, SensorReading,
};
use kinematics::{SwerveKinematics, SwerveOdometry, desaturate_wheel_speeds};

use crate::config::DrivetrainConfig;
use crate::telemetry::{ModuleTelemetry, TelemetrySnapshot};

#[derive(Debug)]
pub struct SwerveDrive {
    config: DrivetrainConfig,
    kinematics: SwerveKinematics,
    modules: PerModule<SwerveModuleController>,
    odometry: SwerveOdometry,
    /// Last good canonical heading sample (rad)
    heading_sample: f64,
    heading_healthy: bool,
    /// A good heading sample has been seen since construction
    heading_seen: bool,
    /// `ctx.dt` disagreed with the configured period
    period_mismatch: bool,
    /// Odometry still needs to be re-based on real sensor values
    odometry_pending: bool,
    field_relative: bool,
    desired: PerModule<ModuleState>,
    desaturation_factor: f64,
    tuning: TuningHandle,
}

impl SwerveDrive {
    /// Build the drivetrain. Fails only on an invalid configuration.
    pub fn new(config: DrivetrainConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let kinematics = SwerveKinematics::new(&config.geometry)?;
        let modules = PerModule::from_fn(|id| SwerveModuleController::new(id, config.module_config(id)));
        let odometry = SwerveOdometry::new(
            kinematics.clone(),
            0.0,
            PerModule::default(),
            Pose2d::origin(),
        )
        .with_integration(config.integration);

        info!(
            "Swerve drive ready: max speed {} m/s, max rotation {} rad/s, radius {:.3} m",
            config.max_speed,
            config.max_angular_speed,
            kinematics.drive_base_radius()
        );

        Ok(SwerveDrive {
            kinematics,
            modules,
            odometry,
            heading_sample: 0.0,
            heading_healthy: true,
            heading_seen: false,
            period_mismatch: false,
            odometry_pending: true,
            field_relative: config.field_relative,
            desired: PerModule::default(),
            desaturation_factor: 1.0,
            tuning: TuningHandle::new(),
            config,
        })
    }

    /// Command a chassis velocity.
    ///
    /// `vx`, `vy` are m/s, clamped to the max speed. `rot` is a fraction of
    /// the max angular speed in `[-1, 1]`. Non-finite inputs are treated as 0.
    /// Takes effect on the next [`periodic`](Self::periodic).
    pub fn drive(&mut self, vx: f64, vy: f64, rot: f64, field_relative: bool) {
        let max_speed = self.config.max_speed;
        let vx = sanitize("vx", vx, max_speed);
        let vy = sanitize("vy", vy, max_speed);
        let omega = sanitize("rot", rot, 1.0) * self.config.max_angular_speed;

        let chassis = if field_relative {
            ChassisVelocity::from_field_relative(vx, vy, omega, self.pose().heading)
        } else {
            ChassisVelocity::new(vx, vy, omega)
        };
        self.set_chassis_velocity(chassis);
    }

    /// [`drive`](Self::drive) using the stored field-relative flag.
    pub fn drive_with_mode(&mut self, vx: f64, vy: f64, rot: f64) {
        self.drive(vx, vy, rot, self.field_relative);
    }

    /// Robot-relative chassis velocity in physical units, e.g. from a path
    /// follower. No rotation scaling is applied.
    pub fn drive_chassis(&mut self, chassis: ChassisVelocity) {
        let max_speed = self.config.max_speed;
        let chassis = ChassisVelocity::new(
            sanitize("vx", chassis.vx, max_speed),
            sanitize("vy", chassis.vy, max_speed),
            sanitize("omega", chassis.omega, self.config.max_angular_speed),
        );
        self.set_chassis_velocity(chassis);
    }

    fn set_chassis_velocity(&mut self, chassis: ChassisVelocity) {
        let mut states =
            self.kinematics.to_module_states_holding(&chassis, &self.desired, self.config.zero_speed_epsilon);
        self.desaturation_factor = desaturate_wheel_speeds(&mut states, self.config.max_speed);
        self.desired = states;
        for (id, module) in self.modules.iter_mut() {
            module.set_desired_state(states[id]);
        }
    }

    pub fn set_field_relative(&mut self, field_relative: bool) {
        self.field_relative = field_relative;
    }

    pub fn field_relative(&self) -> bool {
        self.field_relative
    }

    /// Zero drive effort on every module. Wheels keep their angle.
    pub fn stop(&mut self) {
        for (id, module) in self.modules.iter_mut() {
            module.stop();
            self.desired[id].speed = 0.0;
        }
        self.desaturation_factor = 1.0;
    }

    /// One control cycle: apply pending gains, read sensors, write actuator
    /// efforts and update odometry.
    pub fn periodic(&mut self, ctx: CycleContext, bus: &mut DriveBus) {
        self.check_period(ctx.dt);
        self.apply_pending_gains();
        self.ingest_heading(bus.sensors.heading);

        for (id, module) in self.modules.iter_mut() {
            bus.actuators.modules[id] = module.update(bus.sensors.modules[id], ctx.dt);
        }

        let positions = self.module_positions();
        if self.odometry_pending {
            // Wait for every sensor so the baseline is never a placeholder
            let ready = self.heading_seen && self.modules.values().all(|m| m.has_reading());
            if !ready {
                return;
            }
            let pose = self.odometry.pose();
            self.odometry.reset_pose(pose, self.heading_sample, positions);
            self.odometry_pending = false;
            info!("Odometry started");
        }
        self.odometry.update(self.heading_sample, &positions);
    }

    fn check_period(&mut self, dt: f64) {
        let mismatch = (dt - self.config.period).abs() > 1e-6;
        if mismatch && !self.period_mismatch {
            warn!("Cycle dt {} s differs from configured period {} s", dt, self.config.period);
        }
        self.period_mismatch = mismatch;
    }

    /// True when the last cycle ran at a dt other than the configured period.
    pub fn period_mismatch(&self) -> bool {
        self.period_mismatch
    }

    /// False until heading and all modules have reported once.
    pub fn odometry_started(&self) -> bool {
        !self.odometry_pending
    }

    fn apply_pending_gains(&mut self) {
        if !self.config.tuning_enabled {
            return;
        }
        if let Some(gains) = self.tuning.take_pending() {
            info!(
                "Applying gains: drive kp {} kd {} kf {}, steer kp {} kd {}",
                gains.drive.kp, gains.drive.kd, gains.drive.kf, gains.steer.kp, gains.steer.kd
            );
            for (_, module) in self.modules.iter_mut() {
                module.apply_gains(&gains);
            }
        }
    }

    fn ingest_heading(&mut self, reading: SensorReading<f64>) {
        let reading = reading.and_then(|raw| if raw.is_finite() { Ok(raw) } else { Err(SensorFault::NonFinite) });
        match reading {
            Ok(raw) => {
                self.heading_sample = self.config.heading.canonicalize(raw);
                self.heading_seen = true;
                if !self.heading_healthy {
                    info!("Heading sensor recovered");
                    self.heading_healthy = true;
                }
            }
            Err(fault) => {
                if self.heading_healthy {
                    warn!("Heading sensor fault ({}), holding last heading", fault);
                    self.heading_healthy = false;
                }
            }
        }
    }

    fn module_positions(&self) -> PerModule<ModulePosition> {
        PerModule::from_fn(|id| self.modules[id].position())
    }

    pub fn pose(&self) -> Pose2d {
        self.odometry.pose()
    }

    /// Overwrite the pose estimate; the current sensor values become the new
    /// baseline.
    pub fn reset_pose(&mut self, pose: Pose2d) {
        let positions = self.module_positions();
        self.odometry.reset_pose(pose, self.heading_sample, positions);
        info!("Pose reset to ({:.3}, {:.3}, {:.3})", pose.x, pose.y, pose.heading);
    }

    /// Make the current heading read as `heading` (rad), keeping x and y.
    pub fn reset_heading(&mut self, heading: f64) {
        let pose = self.pose();
        self.reset_pose(Pose2d::new(pose.x, pose.y, heading));
    }

    /// Robot-relative chassis velocity reconstructed from measured module states.
    pub fn chassis_velocity(&self) -> ChassisVelocity {
        self.kinematics.to_chassis_velocity(&PerModule::from_fn(|id| self.modules[id].state()))
    }

    pub fn drive_base_radius(&self) -> f64 {
        self.kinematics.drive_base_radius()
    }

    pub fn module(&self, id: ModuleId) -> &SwerveModuleController {
        &self.modules[id]
    }

    /// Setpoints after kinematics and desaturation, before optimization.
    pub fn desired_states(&self) -> PerModule<ModuleState> {
        self.desired
    }

    pub fn desaturation_factor(&self) -> f64 {
        self.desaturation_factor
    }

    pub fn heading_healthy(&self) -> bool {
        self.heading_healthy
    }

    pub fn gains(&self) -> ModuleGains {
        self.modules[ModuleId::FrontLeft].gains()
    }

    /// Handle for submitting gains from another thread.
    pub fn tuning_handle(&self) -> TuningHandle {
        self.tuning.clone()
    }

    pub fn config(&self) -> &DrivetrainConfig {
        &self.config
    }

    pub fn kinematics(&self) -> &SwerveKinematics {
        &self.kinematics
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        let gains = self.gains();
        TelemetrySnapshot {
            pose: self.pose(),
            field_relative: self.field_relative,
            heading_healthy: self.heading_healthy,
            desaturation_factor: self.desaturation_factor,
            desaturating: self.desaturation_factor < 1.0,
            drive_gains: gains.drive,
            steer_gains: gains.steer,
            modules: PerModule::from_fn(|id| {
                let module = &self.modules[id];
                let effort = module.effort();
                ModuleTelemetry {
                    name: id.name(),
                    angle: module.angle(),
                    raw_angle: module.raw_angle(),
                    angle_offset: module.angle_offset(),
                    velocity: module.velocity(),
                    distance: module.distance(),
                    desired: module.desired(),
                    optimized: module.optimized(),
                    drive_effort: effort.drive,
                    steer_effort: effort.steer,
                    sensor_healthy: module.sensor_healthy(),
                }
            }),
        }
    }
}

/// Replace non-finite values with 0 and clamp to `±limit`.
fn sanitize(name: &str, value: f64, limit: f64) -> f64 {
    if !value.is_finite() {
        debug!("Non-finite {} command {}, using 0", name, value);
        return 0.0;
    }
    let clamped = value.clamp(-limit, limit);
    if clamped != value {
        debug!("{} command {} clamped to {}", name, value, clamped);
    }
    clamped
}

impl Model for SwerveDrive {
    fn reset(&mut self) {
        self.stop();
        for (_, module) in self.modules.iter_mut() {
            module.reset();
        }
    }
}

impl ControlModel for SwerveDrive {
    fn step_control(&mut self, ctx: CycleContext, bus: &mut DriveBus) {
        self.periodic(ctx, bus);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use control::GainSet;
    use drivecore::{ModuleEffort, ModuleReading, PlantModel, wrap_angle};
    use plant::{PlantConfig, SimulatedDrivetrain};
    use std::f64::consts::{FRAC_PI_2, PI};

    const DT: f64 = 0.02;

    fn drivetrain() -> SwerveDrive {
        SwerveDrive::new(DrivetrainConfig::default()).unwrap()
    }

    /// Drivetrain and plant with the bus primed with the first sensor values.
    fn closed_loop(config: DrivetrainConfig, plant_config: PlantConfig) -> (SwerveDrive, SimulatedDrivetrain, DriveBus) {
        let drive = SwerveDrive::new(config).unwrap();
        let mut plant = SimulatedDrivetrain::new(plant_config).unwrap();
        let mut bus = DriveBus::default();
        plant.sense(&mut bus.sensors);
        (drive, plant, bus)
    }

    fn run(drive: &mut SwerveDrive, plant: &mut SimulatedDrivetrain, bus: &mut DriveBus, seconds: f64) {
        let cycles = (seconds / DT).round() as usize;
        for i in 0..cycles {
            let ctx = CycleContext { dt: DT, t: i as f64 * DT };
            plant.step_plant(ctx, bus);
            drive.step_control(ctx, bus);
        }
    }

    fn healthy_bus(angle: f64, velocity: f64, heading_deg: f64) -> DriveBus {
        let mut bus = DriveBus::default();
        bus.sensors.modules =
            PerModule::splat(Ok(ModuleReading { raw_angle: angle, drive_velocity: velocity, drive_distance: 0.0 }));
        bus.sensors.heading = Ok(heading_deg);
        bus
    }

    #[test]
    fn test_forward_command_gives_identical_modules() {
        let mut drive = SwerveDrive::new(DrivetrainConfig::default().with_max_speed(2.0)).unwrap();
        drive.drive(1.0, 0.0, 0.0, false);

        for state in drive.desired_states().values() {
            assert_abs_diff_eq!(state.angle, 0.0, epsilon = 1e-12);
            assert_abs_diff_eq!(state.speed, 1.0, epsilon = 1e-12);
        }
        assert_eq!(drive.desaturation_factor(), 1.0);
        assert_eq!(drive.module(ModuleId::BackRight).desired().speed, drive.desired_states()[ModuleId::BackRight].speed);
    }

    #[test]
    fn test_rotation_command_turns_about_center() {
        let mut drive = drivetrain();
        drive.drive(0.0, 0.0, 1.0, false);

        let states = drive.desired_states();
        assert_abs_diff_eq!(states[ModuleId::FrontLeft].angle, 0.3_f64.atan2(-0.3), epsilon = 1e-9);
        let speed = states[ModuleId::FrontLeft].speed;
        assert_abs_diff_eq!(speed, 2.0 * PI * 0.3 * 2.0_f64.sqrt(), epsilon = 1e-9);
        for state in states.values() {
            assert_abs_diff_eq!(state.speed, speed, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_desaturation_keeps_max_speed() {
        let mut drive = drivetrain();
        drive.drive(4.0, 0.0, 1.0, false);

        let fastest = drive.desired_states().values().map(|s| s.speed.abs()).fold(0.0, f64::max);
        assert_abs_diff_eq!(fastest, 4.0, epsilon = 1e-9);
        assert!(drive.desaturation_factor() < 1.0);
        assert!(drive.telemetry().desaturating);
    }

    #[test]
    fn test_invalid_commands_are_sanitized() {
        let mut drive = drivetrain();
        drive.drive(f64::NAN, f64::INFINITY, f64::NAN, false);
        for state in drive.desired_states().values() {
            assert_eq!(state.speed, 0.0);
        }

        drive.drive(100.0, 0.0, 5.0, false);
        let chassis = drive.kinematics().to_chassis_velocity(&drive.desired_states());
        assert!(chassis.vx <= 4.0 + 1e-9);
        assert!(chassis.omega <= 2.0 * PI + 1e-9);

        drive.drive_chassis(ChassisVelocity::new(f64::NAN, 1.0, 0.0));
        let chassis = drive.kinematics().to_chassis_velocity(&drive.desired_states());
        assert_abs_diff_eq!(chassis.vx, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(chassis.vy, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_zero_command_holds_wheel_angles() {
        let mut drive = drivetrain();
        drive.drive(0.0, 1.0, 0.0, false);
        drive.drive(0.0, 0.0, 0.0, false);
        for state in drive.desired_states().values() {
            assert_abs_diff_eq!(state.angle, FRAC_PI_2, epsilon = 1e-12);
            assert_eq!(state.speed, 0.0);
        }
    }

    #[test]
    fn test_field_relative_rotates_by_heading() {
        let mut drive = drivetrain();
        drive.reset_pose(Pose2d::new(0.0, 0.0, FRAC_PI_2));
        drive.drive(1.0, 0.0, 0.0, true);
        // Field +x is robot -y when facing +y
        for state in drive.desired_states().values() {
            assert_abs_diff_eq!(state.angle, -FRAC_PI_2, epsilon = 1e-9);
            assert_abs_diff_eq!(state.speed, 1.0, epsilon = 1e-9);
        }

        drive.set_field_relative(false);
        drive.drive_with_mode(1.0, 0.0, 0.0);
        assert_abs_diff_eq!(drive.desired_states()[ModuleId::FrontRight].angle, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_reset_pose_is_exact() {
        let mut drive = drivetrain();
        let mut bus = healthy_bus(0.0, 0.0, 33.0);
        drive.periodic(CycleContext { dt: DT, t: 0.0 }, &mut bus);

        let pose = Pose2d::new(1.5, -2.25, 0.75);
        drive.reset_pose(pose);
        assert_eq!(drive.pose(), pose);
        drive.reset_pose(pose);
        assert_eq!(drive.pose(), pose);

        // Same sensors next cycle: no motion
        drive.periodic(CycleContext { dt: DT, t: DT }, &mut bus);
        assert_abs_diff_eq!(drive.pose().x, 1.5, epsilon = 1e-12);
        assert_abs_diff_eq!(drive.pose().heading, 0.75, epsilon = 1e-12);
    }

    #[test]
    fn test_reset_heading_keeps_translation() {
        let mut drive = drivetrain();
        drive.reset_pose(Pose2d::new(2.0, 1.0, 0.3));
        drive.reset_heading(3.0 * FRAC_PI_2);
        let pose = drive.pose();
        assert_eq!((pose.x, pose.y), (2.0, 1.0));
        assert_abs_diff_eq!(pose.heading, 3.0 * FRAC_PI_2);
    }

    #[test]
    fn test_heading_fault_holds_last_value() {
        let mut drive = drivetrain();
        let mut bus = healthy_bus(0.0, 0.0, 90.0);
        drive.periodic(CycleContext { dt: DT, t: 0.0 }, &mut bus);
        drive.reset_heading(0.0);

        bus.sensors.heading = Err(SensorFault::Unreachable);
        drive.periodic(CycleContext { dt: DT, t: DT }, &mut bus);
        assert!(!drive.heading_healthy());
        assert_abs_diff_eq!(drive.pose().heading, 0.0, epsilon = 1e-12);

        bus.sensors.heading = Ok(f64::NAN);
        drive.periodic(CycleContext { dt: DT, t: 2.0 * DT }, &mut bus);
        assert_abs_diff_eq!(drive.pose().heading, 0.0, epsilon = 1e-12);

        bus.sensors.heading = Ok(100.0);
        drive.periodic(CycleContext { dt: DT, t: 3.0 * DT }, &mut bus);
        assert!(drive.heading_healthy());
        assert_abs_diff_eq!(drive.pose().heading, 10_f64.to_radians(), epsilon = 1e-9);
    }

    #[test]
    fn test_odometry_waits_for_first_readings() {
        let mut drive = drivetrain();
        let mut bus = DriveBus::default();
        drive.periodic(CycleContext { dt: DT, t: 0.0 }, &mut bus);
        assert!(!drive.odometry_started());

        // Heading alone is not enough
        bus.sensors.heading = Ok(90.0);
        drive.periodic(CycleContext { dt: DT, t: DT }, &mut bus);
        assert!(!drive.odometry_started());

        // Stationary robot whose encoders already read 5 m
        bus.sensors.modules =
            PerModule::splat(Ok(ModuleReading { raw_angle: 0.0, drive_velocity: 0.0, drive_distance: 5.0 }));
        for i in 2..6 {
            drive.periodic(CycleContext { dt: DT, t: i as f64 * DT }, &mut bus);
        }
        assert!(drive.odometry_started());
        assert_eq!(drive.pose(), Pose2d::origin());

        // Later faults do not re-seed
        bus.sensors.modules[ModuleId::BackLeft] = Err(SensorFault::Stale);
        drive.periodic(CycleContext { dt: DT, t: 6.0 * DT }, &mut bus);
        assert_eq!(drive.pose(), Pose2d::origin());
    }

    #[test]
    fn test_period_mismatch_flagged() {
        let mut drive = drivetrain();
        let mut bus = healthy_bus(0.0, 0.0, 0.0);
        drive.periodic(CycleContext { dt: DT, t: 0.0 }, &mut bus);
        assert!(!drive.period_mismatch());

        drive.periodic(CycleContext { dt: 0.05, t: DT }, &mut bus);
        assert!(drive.period_mismatch());

        drive.periodic(CycleContext { dt: DT, t: 0.07 }, &mut bus);
        assert!(!drive.period_mismatch());
    }

    #[test]
    fn test_gains_apply_at_start_of_cycle_only() {
        let mut drive = SwerveDrive::new(DrivetrainConfig::default().with_tuning(true)).unwrap();
        let handle = drive.tuning_handle();
        let gains = ModuleGains { drive: GainSet::pdf(0.2, 0.0, 0.25), steer: GainSet::pd(3.0, 0.02) };
        handle.submit(gains).unwrap();

        assert_eq!(drive.gains().steer.kp, 2.0);
        let mut bus = healthy_bus(0.0, 0.0, 0.0);
        drive.periodic(CycleContext { dt: DT, t: 0.0 }, &mut bus);
        for id in ModuleId::ALL {
            assert_eq!(drive.module(id).gains(), gains);
        }
        assert!(!handle.has_pending());
        assert_eq!(drive.telemetry().steer_gains.kp, 3.0);
    }

    #[test]
    fn test_gains_ignored_when_tuning_disabled() {
        let mut drive = drivetrain();
        let handle = drive.tuning_handle();
        handle.submit(ModuleGains { drive: GainSet::pd(1.0, 0.0), steer: GainSet::pd(1.0, 0.0) }).unwrap();

        let mut bus = healthy_bus(0.0, 0.0, 0.0);
        drive.periodic(CycleContext { dt: DT, t: 0.0 }, &mut bus);
        assert_eq!(drive.gains().steer.kp, 2.0);
        assert!(handle.has_pending());
    }

    #[test]
    fn test_stop_zeroes_drive_effort() {
        let mut drive = drivetrain();
        let mut bus = healthy_bus(0.0, 0.0, 0.0);
        drive.drive(2.0, 0.0, 0.0, false);
        drive.periodic(CycleContext { dt: DT, t: 0.0 }, &mut bus);
        assert!(bus.actuators.modules.values().all(|e| e.drive > 0.0));

        drive.stop();
        for id in ModuleId::ALL {
            assert_eq!(drive.module(id).effort().drive, 0.0);
        }
        drive.periodic(CycleContext { dt: DT, t: DT }, &mut bus);
        assert!(bus.actuators.modules.values().all(|e| e.drive == 0.0));
        assert!(drive.desired_states().values().all(|s| s.speed == 0.0));
    }

    #[test]
    fn test_telemetry_reads_each_module() {
        let offsets = PerModule::new([0.1, 0.2, 0.3, 0.4]);
        let mut drive = SwerveDrive::new(DrivetrainConfig::default().with_angle_offsets(offsets)).unwrap();
        let mut bus = DriveBus::default();
        for id in ModuleId::ALL {
            let i = id.index() as f64;
            bus.sensors.modules[id] =
                Ok(ModuleReading { raw_angle: offsets[id], drive_velocity: i, drive_distance: 10.0 * i });
        }
        bus.sensors.heading = Ok(0.0);
        drive.periodic(CycleContext { dt: DT, t: 0.0 }, &mut bus);

        let telemetry = drive.telemetry();
        for id in ModuleId::ALL {
            let module = telemetry.modules[id];
            let i = id.index() as f64;
            assert_eq!(module.name, id.name());
            assert_abs_diff_eq!(module.angle, 0.0, epsilon = 1e-12);
            assert_eq!(module.raw_angle, offsets[id]);
            assert_eq!(module.angle_offset, offsets[id]);
            assert_eq!(module.velocity, i);
            assert_eq!(module.distance, 10.0 * i);
        }
    }

    #[test]
    fn test_chassis_velocity_from_measured_states() {
        let mut drive = drivetrain();
        let mut bus = healthy_bus(FRAC_PI_2, 1.5, 0.0);
        drive.periodic(CycleContext { dt: DT, t: 0.0 }, &mut bus);

        let chassis = drive.chassis_velocity();
        assert_abs_diff_eq!(chassis.vx, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(chassis.vy, 1.5, epsilon = 1e-9);
        assert_abs_diff_eq!(chassis.omega, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(drive.drive_base_radius(), 0.3 * 2.0_f64.sqrt(), epsilon = 1e-12);
    }

    #[test]
    fn test_closed_loop_forward() {
        let (mut drive, mut plant, mut bus) = closed_loop(DrivetrainConfig::default(), PlantConfig::default());
        drive.drive(1.0, 0.0, 0.0, false);
        run(&mut drive, &mut plant, &mut bus, 2.0);

        let truth = plant.true_pose();
        assert!(truth.x > 1.8 && truth.x < 2.0);
        assert_abs_diff_eq!(truth.y, 0.0, epsilon = 1e-6);
        assert!(drive.pose().distance_to(&truth) < 0.03);
        assert_abs_diff_eq!(drive.chassis_velocity().vx, 1.0, epsilon = 0.01);
    }

    #[test]
    fn test_closed_loop_field_relative_with_offsets() {
        let offsets = PerModule::new([1.0, -2.0, 0.5, 3.0]);
        let (mut drive, plant, mut bus) = closed_loop(
            DrivetrainConfig::default().with_angle_offsets(offsets),
            PlantConfig::default().with_angle_offsets(offsets),
        );
        let mut plant = plant.with_pose(Pose2d::new(0.0, 0.0, FRAC_PI_2));
        plant.sense(&mut bus.sensors);
        drive.reset_pose(Pose2d::new(0.0, 0.0, FRAC_PI_2));

        drive.drive(1.0, 0.0, 0.0, true);
        run(&mut drive, &mut plant, &mut bus, 2.0);

        let truth = plant.true_pose();
        assert!(truth.x > 1.6, "x = {}", truth.x);
        assert!(truth.y.abs() < 0.15, "y = {}", truth.y);
        assert!(drive.pose().distance_to(&truth) < 0.05);
        for id in ModuleId::ALL {
            let wheel = plant.wheel(id).angle;
            assert!(wrap_angle(wheel + FRAC_PI_2).abs() < 0.05 || wrap_angle(wheel - FRAC_PI_2).abs() < 0.05);
        }
    }

    #[test]
    fn test_closed_loop_spin_tracks_unwrapped_heading() {
        let (mut drive, mut plant, mut bus) = closed_loop(DrivetrainConfig::default(), PlantConfig::default());
        drive.drive(0.0, 0.0, 0.5, false);
        run(&mut drive, &mut plant, &mut bus, 3.0);

        let truth = plant.true_pose();
        // Several crossings of ±180 degrees
        assert!(truth.heading > 2.0 * PI);
        assert_abs_diff_eq!(drive.pose().heading, truth.heading, epsilon = 1e-6);
        assert!(drive.pose().distance_to(&truth) < 0.05);
        assert!(truth.x.hypot(truth.y) < 0.1);
    }

    #[test]
    fn test_closed_loop_survives_module_fault() {
        let (mut drive, mut plant, mut bus) = closed_loop(DrivetrainConfig::default(), PlantConfig::default());
        drive.drive(1.0, 0.0, 0.0, false);
        run(&mut drive, &mut plant, &mut bus, 0.5);

        plant.set_module_fault(ModuleId::BackRight, true);
        run(&mut drive, &mut plant, &mut bus, 0.5);
        let telemetry = drive.telemetry();
        assert!(!telemetry.modules[ModuleId::BackRight].sensor_healthy);
        assert!(telemetry.modules[ModuleId::FrontLeft].sensor_healthy);
        assert!(bus.actuators.modules.values().all(|e| e.drive.is_finite() && e.steer.is_finite()));
        assert!(drive.pose().x.is_finite());

        plant.set_module_fault(ModuleId::BackRight, false);
        run(&mut drive, &mut plant, &mut bus, 0.1);
        assert!(drive.telemetry().modules[ModuleId::BackRight].sensor_healthy);
    }

    #[test]
    fn test_closed_loop_with_noise_and_dropout() {
        let plant_config = PlantConfig::default().with_noise(0.005, 0.02, 0.002).with_dropout(0.05, 11);
        let (mut drive, mut plant, mut bus) = closed_loop(DrivetrainConfig::default(), plant_config);
        drive.drive(1.0, 0.5, 0.0, false);
        run(&mut drive, &mut plant, &mut bus, 2.0);

        let truth = plant.true_pose();
        assert!(truth.x > 1.5);
        assert!(truth.y > 0.7);
        assert!(drive.pose().distance_to(&truth) < 0.2);
    }

    #[test]
    fn test_open_loop_drive() {
        let config = DrivetrainConfig::default().with_drive_mode(control::DriveMode::OpenLoop);
        let (mut drive, mut plant, mut bus) = closed_loop(config, PlantConfig::default());
        drive.drive(2.0, 0.0, 0.0, false);
        run(&mut drive, &mut plant, &mut bus, 1.0);

        assert!(bus.actuators.modules.values().all(|e| (e.drive - 0.5).abs() < 1e-9));
        assert_abs_diff_eq!(plant.wheel(ModuleId::FrontLeft).speed, 2.0, epsilon = 1e-3);
    }

    #[test]
    fn test_movement_check_finds_dead_module() {
        use crate::diagnostics::MovementCheck;

        let (mut drive, mut plant, mut bus) = closed_loop(DrivetrainConfig::default(), PlantConfig::default());
        plant.set_module_fault(ModuleId::BackRight, true);
        let mut check = MovementCheck::default();
        drive.drive(1.0, 0.0, 0.0, false);
        for i in 0..25 {
            let ctx = CycleContext { dt: DT, t: i as f64 * DT };
            drive.periodic(ctx, &mut bus);
            plant.step_plant(ctx, &mut bus);
            check.record(&drive);
        }
        assert_eq!(check.failures(), vec![ModuleId::BackRight]);

        plant.set_module_fault(ModuleId::BackRight, false);
        run(&mut drive, &mut plant, &mut bus, 0.1);
        check.record(&drive);
        assert!(check.passed());
    }

    #[test]
    fn test_reset_clears_efforts() {
        let mut drive = drivetrain();
        let mut bus = healthy_bus(0.0, 0.0, 0.0);
        drive.drive(1.0, 0.0, 0.5, false);
        drive.periodic(CycleContext { dt: DT, t: 0.0 }, &mut bus);
        drive.reset();
        for id in ModuleId::ALL {
            assert_eq!(drive.module(id).effort(), ModuleEffort::default());
        }
    }
}
