//! Pure 3D helpers used by capture resampling and trail rendering.

use nalgebra::Vector3;
use waytrail_env::Location;

/// Straight-line distance between two points.
pub fn distance(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    (b - a).norm()
}

/// Unit vector pointing from `from` to `to`.
///
/// Returns `None` for coincident points, where no direction exists.
pub fn direction(from: &Vector3<f64>, to: &Vector3<f64>) -> Option<Vector3<f64>> {
    let delta = to - from;
    let length = delta.norm();
    if length > 0.0 && length.is_finite() {
        Some(delta / length)
    } else {
        None
    }
}

/// Moves `origin` by `dist` along the unit vector `dir`.
pub fn offset(origin: &Vector3<f64>, dir: &Vector3<f64>, dist: f64) -> Vector3<f64> {
    origin + dir * dist
}

/// Distance between two locations, `None` when they are in different worlds.
pub fn location_distance(a: &Location, b: &Location) -> Option<f64> {
    a.same_world(b).then(|| distance(&a.position, &b.position))
}
