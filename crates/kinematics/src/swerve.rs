use nalgebra::{Matrix3, SMatrix, SVector, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use drivecore::{
    ChassisVelocity, ConfigError, MODULE_COUNT, ModuleId, ModulePosition, ModuleState, PerModule,
    Twist2d, wrap_angle,
};

/// Below this wheel speed a module's angle is considered undefined.
pub const DEFAULT_ZERO_SPEED_EPSILON: f64 = 1e-6;

const STACKED: usize = 2 * MODULE_COUNT;

type ForwardMatrix = SMatrix<f64, STACKED, 3>;
type InverseMatrix = SMatrix<f64, 3, STACKED>;
type ModuleVector = SVector<f64, STACKED>;

/// Positions of the modules relative to the robot's rotation center.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleGeometry {
    /// `[x, y]` per module in meters, in [`ModuleId::ALL`] order.
    /// x is forward, y is to the left.
    pub module_positions: Vec<[f64; 2]>,
}

impl Default for ModuleGeometry {
    fn default() -> Self {
        // Default to a square robot with modules at the corners
        ModuleGeometry::rectangle(0.3, 0.3)
    }
}

impl ModuleGeometry {
    /// Modules at the corners of a rectangle with the given half extents.
    pub fn rectangle(half_length: f64, half_width: f64) -> Self {
        ModuleGeometry {
            module_positions: vec![
                [half_length, half_width],   // Front Left
                [half_length, -half_width],  // Front Right
                [-half_length, half_width],  // Back Left
                [-half_length, -half_width], // Back Right
            ],
        }
    }
}

/// Swerve drive kinematics for a four-module chassis.
///
/// Forward direction: every module's velocity is the chassis translation plus
/// `omega × r` at the module offset `r`. Stacking the four 2D equations gives
/// an 8x3 linear map; the inverse direction solves it in the least-squares
/// sense with the pseudo-inverse `(MᵀM)⁻¹Mᵀ`.
#[derive(Debug, Clone)]
pub struct SwerveKinematics {
    offsets: PerModule<Vector2<f64>>,
    forward: ForwardMatrix,
    inverse: InverseMatrix,
}

impl SwerveKinematics {
    /// Build the kinematics from module offsets.
    ///
    /// Fails if there are not exactly four offsets, any is non-finite, or all
    /// modules sit on the same point (rotation would be unobservable).
    pub fn new(geometry: &ModuleGeometry) -> Result<Self, ConfigError> {
        let positions = &geometry.module_positions;
        if positions.len() != MODULE_COUNT {
            return Err(ConfigError::ModuleCount { expected: MODULE_COUNT, found: positions.len() });
        }

        let mut offsets = PerModule::splat(Vector2::zeros());
        for (id, offset) in offsets.iter_mut() {
            let [x, y] = positions[id.index()];
            ConfigError::require_finite(&format!("{id} module x offset"), x)?;
            ConfigError::require_finite(&format!("{id} module y offset"), y)?;
            *offset = Vector2::new(x, y);
        }

        let mut forward = ForwardMatrix::zeros();
        for (id, offset) in offsets.iter() {
            let row = 2 * id.index();
            forward[(row, 0)] = 1.0;
            forward[(row, 2)] = -offset.y;
            forward[(row + 1, 1)] = 1.0;
            forward[(row + 1, 2)] = offset.x;
        }

        let normal: Matrix3<f64> = forward.transpose() * forward;
        let normal_inverse = normal.try_inverse().ok_or_else(|| ConfigError::DegenerateGeometry {
            reason: "all modules share one position".to_string(),
        })?;
        let inverse = normal_inverse * forward.transpose();

        Ok(SwerveKinematics { offsets, forward, inverse })
    }

    pub fn offsets(&self) -> &PerModule<Vector2<f64>> {
        &self.offsets
    }

    pub fn offset(&self, id: ModuleId) -> Vector2<f64> {
        self.offsets[id]
    }

    /// Distance from the rotation center to the farthest module.
    pub fn drive_base_radius(&self) -> f64 {
        self.offsets.values().map(|o| o.norm()).fold(0.0, f64::max)
    }

    /// Velocity vector of each module contact point in the robot frame.
    pub fn module_velocities(&self, chassis: &ChassisVelocity) -> PerModule<Vector2<f64>> {
        let stacked = self.forward * Vector3::new(chassis.vx, chassis.vy, chassis.omega);
        PerModule::from_fn(|id| {
            let row = 2 * id.index();
            Vector2::new(stacked[row], stacked[row + 1])
        })
    }

    /// Convert a robot-frame chassis velocity into module setpoints.
    ///
    /// Modules whose speed is below [`DEFAULT_ZERO_SPEED_EPSILON`] get angle 0.
    pub fn to_module_states(&self, chassis: &ChassisVelocity) -> PerModule<ModuleState> {
        self.module_velocities(chassis).map(|_, v| polar_state(v, DEFAULT_ZERO_SPEED_EPSILON, 0.0))
    }

    /// Like [`to_module_states`](Self::to_module_states), but a module whose
    /// speed is below `epsilon` keeps the angle from `previous` instead of
    /// snapping to 0, so the wheels do not re-steer when the robot stops.
    pub fn to_module_states_holding(
        &self,
        chassis: &ChassisVelocity,
        previous: &PerModule<ModuleState>,
        epsilon: f64,
    ) -> PerModule<ModuleState> {
        self.module_velocities(chassis)
            .map(|id, v| polar_state(v, epsilon, previous[id].angle))
    }

    /// Reconstruct the chassis velocity from four module states.
    pub fn to_chassis_velocity(&self, states: &PerModule<ModuleState>) -> ChassisVelocity {
        let solved = self.inverse * stack(states.map(|_, s| s.velocity()));
        ChassisVelocity::new(solved[0], solved[1], solved[2])
    }

    /// Robot-frame twist from per-module travel since the last sample.
    ///
    /// `deltas[id].distance` is the distance driven since the previous
    /// reading, `deltas[id].angle` the module's current angle.
    pub fn to_twist(&self, deltas: &PerModule<ModulePosition>) -> Twist2d {
        let displacements =
            deltas.map(|_, d| Vector2::new(d.distance * d.angle.cos(), d.distance * d.angle.sin()));
        let solved = self.inverse * stack(displacements);
        Twist2d::new(solved[0], solved[1], solved[2])
    }
}

fn stack(vectors: PerModule<Vector2<f64>>) -> ModuleVector {
    let mut stacked = ModuleVector::zeros();
    for (id, v) in vectors.iter() {
        stacked[2 * id.index()] = v.x;
        stacked[2 * id.index() + 1] = v.y;
    }
    stacked
}

fn polar_state(velocity: Vector2<f64>, epsilon: f64, hold_angle: f64) -> ModuleState {
    let speed = velocity.norm();
    if speed < epsilon {
        ModuleState { angle: wrap_angle(hold_angle), speed: 0.0 }
    } else {
        ModuleState { angle: wrap_angle(velocity.y.atan2(velocity.x)), speed }
    }
}
