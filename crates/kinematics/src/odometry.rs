//! Swerve odometry
//!
//! Dead-reckons the field pose from module drive distances and the heading
//! sensor. Module travel since the previous update goes through the inverse
//! kinematics to get a robot-frame twist; the heading sensor supplies the
//! rotation, unrolled so that crossing ±180° is a small step.

use log::{info, warn};

use drivecore::{
    ContinuousHeading, IntegrationMethod, Integrator, ModulePosition, PerModule, Pose2d,
};

use crate::swerve::SwerveKinematics;

#[derive(Debug, Clone)]
pub struct SwerveOdometry {
    kinematics: SwerveKinematics,
    integration: IntegrationMethod,
    pose: Pose2d,
    heading: ContinuousHeading,
    previous_positions: PerModule<ModulePosition>,
    discarding: bool,
}

impl SwerveOdometry {
    /// Start tracking at `initial_pose`.
    ///
    /// `heading_sample` is the current canonical sensor heading (rad); it is
    /// mapped onto `initial_pose.heading`.
    pub fn new(
        kinematics: SwerveKinematics,
        heading_sample: f64,
        positions: PerModule<ModulePosition>,
        initial_pose: Pose2d,
    ) -> Self {
        SwerveOdometry {
            kinematics,
            integration: IntegrationMethod::default(),
            pose: initial_pose,
            heading: ContinuousHeading::new(heading_sample, initial_pose.heading),
            previous_positions: positions,
            discarding: false,
        }
    }

    pub fn with_integration(mut self, integration: IntegrationMethod) -> Self {
        self.integration = integration;
        self
    }

    pub fn pose(&self) -> Pose2d {
        self.pose
    }

    pub fn integration(&self) -> IntegrationMethod {
        self.integration
    }

    /// Integrate one cycle of module travel and return the new pose.
    ///
    /// A step that would leave the pose non-finite is dropped whole: pose,
    /// heading and baseline all stay put, so the travel is picked up by the
    /// next good update.
    pub fn update(&mut self, heading_sample: f64, positions: &PerModule<ModulePosition>) -> Pose2d {
        if !heading_sample.is_finite() {
            self.discard(format_args!("non-finite heading sample {}", heading_sample));
            return self.pose;
        }

        let mut heading = self.heading;
        heading.advance(heading_sample);

        let deltas = positions.map(|id, p| ModulePosition {
            angle: p.angle,
            distance: p.distance - self.previous_positions[id].distance,
        });
        let mut twist = self.kinematics.to_twist(&deltas);
        // The gyro is a better rotation source than wheel slip allows
        twist.dtheta = heading.value() - self.heading.value();

        let next = self.integration.integrate(&self.pose, &twist, heading.value());
        if next.x.is_finite() && next.y.is_finite() && next.heading.is_finite() {
            self.pose = next;
            self.heading = heading;
            self.previous_positions = *positions;
            if self.discarding {
                info!("Odometry resumed");
                self.discarding = false;
            }
        } else {
            self.discard(format_args!("non-finite step {:?}", twist));
        }
        self.pose
    }

    fn discard(&mut self, reason: std::fmt::Arguments<'_>) {
        if !self.discarding {
            warn!("Discarding odometry updates: {}", reason);
            self.discarding = true;
        }
    }

    /// True while updates are being dropped.
    pub fn is_discarding(&self) -> bool {
        self.discarding
    }

    /// Replace the pose and the module baseline in one step.
    pub fn reset_pose(
        &mut self,
        pose: Pose2d,
        heading_sample: f64,
        positions: PerModule<ModulePosition>,
    ) {
        self.pose = pose;
        self.heading = ContinuousHeading::new(heading_sample, pose.heading);
        self.previous_positions = positions;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swerve::ModuleGeometry;
    use approx::assert_abs_diff_eq;
    use drivecore::{ChassisVelocity, ModuleId};
    use std::f64::consts::PI;

    const DT: f64 = 0.02;

    fn kinematics() -> SwerveKinematics {
        SwerveKinematics::new(&ModuleGeometry::default()).unwrap()
    }

    fn zero_positions() -> PerModule<ModulePosition> {
        PerModule::splat(ModulePosition::default())
    }

    /// Advance noiseless module positions by one cycle of `chassis` motion.
    fn step_positions(
        kinematics: &SwerveKinematics,
        positions: &mut PerModule<ModulePosition>,
        chassis: &ChassisVelocity,
    ) {
        let states = kinematics.to_module_states(chassis);
        for id in ModuleId::ALL {
            positions[id] = ModulePosition {
                angle: states[id].angle,
                distance: positions[id].distance + states[id].speed * DT,
            };
        }
    }

    #[test]
    fn test_constant_velocity_converges() {
        let kinematics = kinematics();
        let mut odometry = SwerveOdometry::new(kinematics.clone(), 0.0, zero_positions(), Pose2d::origin());
        let chassis = ChassisVelocity::new(1.5, -0.5, 0.0);
        let mut positions = zero_positions();

        let n = 250;
        for _ in 0..n {
            step_positions(&kinematics, &mut positions, &chassis);
            odometry.update(0.0, &positions);
        }

        let pose = odometry.pose();
        assert_abs_diff_eq!(pose.x, 1.5 * n as f64 * DT, epsilon = 1e-9);
        assert_abs_diff_eq!(pose.y, -0.5 * n as f64 * DT, epsilon = 1e-9);
        assert_abs_diff_eq!(pose.heading, 0.0);
    }

    #[test]
    fn test_robot_frame_motion_follows_heading() {
        let kinematics = kinematics();
        let heading = PI / 2.0;
        let mut odometry = SwerveOdometry::new(
            kinematics.clone(),
            heading,
            zero_positions(),
            Pose2d::new(1.0, 1.0, heading),
        );
        let mut positions = zero_positions();
        for _ in 0..50 {
            step_positions(&kinematics, &mut positions, &ChassisVelocity::new(1.0, 0.0, 0.0));
            odometry.update(heading, &positions);
        }

        // Driving "forward" while facing +y moves the robot along +y
        let pose = odometry.pose();
        assert_abs_diff_eq!(pose.x, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(pose.y, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_constant_twist_traces_arc() {
        let kinematics = kinematics();
        let mut odometry = SwerveOdometry::new(kinematics.clone(), 0.0, zero_positions(), Pose2d::origin());
        let chassis = ChassisVelocity::new(1.0, 0.0, 1.0);
        let mut positions = zero_positions();

        // A quarter turn on a unit-radius circle
        let n = (PI / 2.0 / DT).round() as usize;
        let mut heading = 0.0;
        for _ in 0..n {
            step_positions(&kinematics, &mut positions, &chassis);
            heading += chassis.omega * DT;
            odometry.update(heading, &positions);
        }

        let pose = odometry.pose();
        assert_abs_diff_eq!(pose.x, heading.sin(), epsilon = 1e-6);
        assert_abs_diff_eq!(pose.y, 1.0 - heading.cos(), epsilon = 1e-6);
    }

    #[test]
    fn test_heading_wrap_does_not_jump() {
        let start = 179_f64.to_radians();
        let mut odometry =
            SwerveOdometry::new(kinematics(), start, zero_positions(), Pose2d::new(0.0, 0.0, start));
        let pose = odometry.update(-179_f64.to_radians(), &zero_positions());

        assert_abs_diff_eq!(pose.heading - start, 2_f64.to_radians(), epsilon = 1e-12);
        assert_abs_diff_eq!(pose.x, 0.0);
        assert_abs_diff_eq!(pose.y, 0.0);
    }

    #[test]
    fn test_reset_pose_is_exact_and_idempotent() {
        let kinematics = kinematics();
        let mut odometry = SwerveOdometry::new(kinematics.clone(), 0.3, zero_positions(), Pose2d::origin());
        let mut positions = zero_positions();
        for _ in 0..10 {
            step_positions(&kinematics, &mut positions, &ChassisVelocity::new(1.0, 1.0, 0.0));
            odometry.update(0.3, &positions);
        }

        let target = Pose2d::new(4.2, -1.3, 2.0);
        odometry.reset_pose(target, 0.3, positions);
        assert_eq!(odometry.pose(), target);
        odometry.reset_pose(target, 0.3, positions);
        assert_eq!(odometry.pose(), target);

        // No motion after reset: pose stays put
        assert_eq!(odometry.update(0.3, &positions), target);
    }

    #[test]
    fn test_euler_option_uses_current_heading() {
        let kinematics = kinematics();
        let mut odometry = SwerveOdometry::new(kinematics.clone(), 0.0, zero_positions(), Pose2d::origin())
            .with_integration(IntegrationMethod::Euler);
        let mut positions = zero_positions();
        step_positions(&kinematics, &mut positions, &ChassisVelocity::new(1.0, 0.0, 0.0));
        let pose = odometry.update(PI / 2.0, &positions);

        assert_abs_diff_eq!(pose.x, 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(pose.y, DT, epsilon = 1e-12);
    }

    #[test]
    fn test_non_finite_heading_does_not_freeze_pose() {
        let kinematics = kinematics();
        let mut odometry = SwerveOdometry::new(kinematics.clone(), 0.0, zero_positions(), Pose2d::origin());
        let chassis = ChassisVelocity::new(5.0, 0.0, 0.0);
        let mut positions = zero_positions();

        step_positions(&kinematics, &mut positions, &chassis);
        let pose = odometry.update(f64::NAN, &positions);
        assert_eq!(pose, Pose2d::origin());
        assert!(odometry.is_discarding());

        for _ in 0..9 {
            step_positions(&kinematics, &mut positions, &chassis);
            odometry.update(0.0, &positions);
        }

        // Travel from the dropped cycle is picked up, not lost
        let pose = odometry.pose();
        assert_abs_diff_eq!(pose.x, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(pose.y, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(pose.heading, 0.0);
        assert!(!odometry.is_discarding());
    }
}
