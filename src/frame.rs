//! Aimpoint-relative tangent-plane transform.
//!
//! Flattens 3-D Cartesian miss vectors into (downrange, crossrange) offsets
//! in the plane tangent to the reference sphere at the aimpoint. Pure and
//! stateless; the same aimpoint is applied to every record of a batch.

use nalgebra::Vector3;
use serde::Serialize;

/// Impact offset in the aimpoint's local tangent plane [m].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LocalImpactPoint {
    pub downrange: f64,
    pub crossrange: f64,
}

impl LocalImpactPoint {
    pub fn radial_miss(&self) -> f64 {
        self.downrange.hypot(self.crossrange)
    }
}

/// Aimpoint longitude and latitude on the reference sphere [rad].
pub fn aim_longitude_latitude(aim: &Vector3<f64>) -> (f64, f64) {
    let longitude = aim.y.atan2(aim.x);
    let latitude = aim.z.atan2(aim.x.hypot(aim.y));
    (longitude, latitude)
}

/// Unit east and north vectors of the tangent plane at `aim`.
///
/// Undefined for a zero aimpoint; config validation rejects that before any
/// batch runs.
pub fn tangent_basis(aim: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
    let (lon, lat) = aim_longitude_latitude(aim);
    let east = Vector3::new(-lon.sin(), lon.cos(), 0.0);
    let north = Vector3::new(
        -lat.sin() * lon.cos(),
        -lat.sin() * lon.sin(),
        lat.cos(),
    );
    (east, north)
}

/// Project an impact point onto the aimpoint's tangent plane.
///
/// The east component is treated as downrange and the north component as
/// crossrange.
pub fn local_impact(aim: &Vector3<f64>, impact: &Vector3<f64>) -> LocalImpactPoint {
    let (east, north) = tangent_basis(aim);
    let delta = impact - aim;
    LocalImpactPoint {
        downrange: east.dot(&delta),
        crossrange: north.dot(&delta),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EARTH_RADIUS_M: f64 = 6_371_000.0;

    #[test]
    fn aimpoint_maps_to_exact_zero() {
        let aim = Vector3::new(EARTH_RADIUS_M, 0.0, 0.0);
        let local = local_impact(&aim, &aim);
        assert_eq!(local.downrange, 0.0);
        assert_eq!(local.crossrange, 0.0);
        assert_eq!(local.radial_miss(), 0.0);
    }

    #[test]
    fn equatorial_aim_east_offset_is_downrange() {
        // Aim on the +x axis: east is +y, north is +z.
        let aim = Vector3::new(EARTH_RADIUS_M, 0.0, 0.0);
        let impact = Vector3::new(EARTH_RADIUS_M, 120.0, -35.0);
        let local = local_impact(&aim, &impact);
        assert!((local.downrange - 120.0).abs() < 1e-9);
        assert!((local.crossrange + 35.0).abs() < 1e-9);
    }

    #[test]
    fn longitude_latitude_match_spherical_conversion() {
        let aim = Vector3::new(1.0, 1.0, 2.0_f64.sqrt());
        let (lon, lat) = aim_longitude_latitude(&aim);
        assert!((lon - std::f64::consts::FRAC_PI_4).abs() < 1e-12);
        assert!((lat - std::f64::consts::FRAC_PI_4).abs() < 1e-12);
    }

    #[test]
    fn basis_is_orthonormal_off_equator() {
        let aim = Vector3::new(3_000_000.0, -2_500_000.0, 4_800_000.0);
        let (east, north) = tangent_basis(&aim);
        assert!((east.norm() - 1.0).abs() < 1e-12);
        assert!((north.norm() - 1.0).abs() < 1e-12);
        assert!(east.dot(&north).abs() < 1e-12);
        // Both lie in the tangent plane: orthogonal to the radial direction.
        let radial = aim.normalize();
        assert!(east.dot(&radial).abs() < 1e-12);
        assert!(north.dot(&radial).abs() < 1e-12);
    }

    #[test]
    fn transform_is_deterministic() {
        let aim = Vector3::new(5_000_000.0, 1_000_000.0, -3_000_000.0);
        let impact = Vector3::new(5_000_100.0, 999_800.0, -3_000_050.0);
        let a = local_impact(&aim, &impact);
        let b = local_impact(&aim, &impact);
        assert_eq!(a, b);
    }
}
