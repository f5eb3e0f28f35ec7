//! Wheel speed desaturation
//!
//! Scales all four module speeds by the same factor when any of them exceeds
//! the physical maximum. A common factor keeps the ratio between modules, and
//! with it the direction of the commanded chassis motion.

use drivecore::{ModuleState, PerModule};

/// Scale `states` so that no speed magnitude exceeds `max_speed`.
///
/// Returns the factor that was applied (`1.0` when nothing needed scaling).
/// Angles are never touched.
pub fn desaturate_wheel_speeds(states: &mut PerModule<ModuleState>, max_speed: f64) -> f64 {
    let factor = desaturation_factor(states, max_speed);
    if factor < 1.0 {
        for (_, state) in states.iter_mut() {
            state.speed *= factor;
        }
    }
    factor
}

/// `max_speed / max(|speed|)`, capped at 1. All-zero speeds give 1.
pub fn desaturation_factor(states: &PerModule<ModuleState>, max_speed: f64) -> f64 {
    let fastest = states.values().map(|s| s.speed.abs()).fold(0.0, f64::max);
    if fastest <= 0.0 || fastest <= max_speed {
        return 1.0;
    }
    (max_speed.max(0.0) / fastest).min(1.0)
}
