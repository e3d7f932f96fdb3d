//! Geodetic conversions and angle normalization
//!
//! Everything here is pure: identical input gives identical output.
//! The local frame uses the equirectangular small-distance approximation,
//! valid within a few kilometers of the reference point.

use geo::{HaversineDistance, Point};
use nalgebra::Vector3;

use crate::types::LocalPoint;

/// WGS84 equatorial radius (meters)
pub const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Convert a geodetic point to local tangent-plane meters around a reference.
///
/// Returns `(x, z)`: x east, z north. The model is planar, so the vertical
/// component is always 0 (see [`to_local_point`]).
pub fn to_local_meters(ref_lat: f64, ref_lon: f64, lat: f64, lon: f64) -> (f64, f64) {
    let d_lat = (lat - ref_lat).to_radians();
    let d_lon = (lon - ref_lon).to_radians();
    let x = EARTH_RADIUS_M * d_lon * ref_lat.to_radians().cos();
    let z = EARTH_RADIUS_M * d_lat;
    (x, z)
}

/// Same as [`to_local_meters`] packed as a 3D point with y = 0
pub fn to_local_point(ref_lat: f64, ref_lon: f64, lat: f64, lon: f64) -> LocalPoint {
    let (x, z) = to_local_meters(ref_lat, ref_lon, lat, lon);
    LocalPoint::new(x, 0.0, z)
}

/// Inverse of [`to_local_meters`] under the same approximation
pub fn to_geodetic(ref_lat: f64, ref_lon: f64, x: f64, z: f64) -> (f64, f64) {
    let d_lat = z / EARTH_RADIUS_M;
    let d_lon = x / (EARTH_RADIUS_M * ref_lat.to_radians().cos());
    (ref_lat + d_lat.to_degrees(), ref_lon + d_lon.to_degrees())
}

/// Degree deltas `(d_lat, d_lon)` that place a point `north_m`/`east_m` away
/// from a reference at `ref_lat`.
pub fn offset_for_meters(ref_lat: f64, north_m: f64, east_m: f64) -> (f64, f64) {
    let (lat, lon) = to_geodetic(ref_lat, 0.0, east_m, north_m);
    (lat - ref_lat, lon)
}

/// Wrap a raw compass angle into `[0, 360)`
pub fn normalize_heading(degrees: f64) -> f64 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round tiny negatives up to exactly 360
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Great-circle distance in meters
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    Point::new(lon1, lat1).haversine_distance(&Point::new(lon2, lat2))
}

/// Place a geodetic point on a sphere of `radius` (y axis through the poles,
/// longitude increasing toward -z).
pub fn to_globe(lat: f64, lon: f64, radius: f64) -> Vector3<f64> {
    let phi = (90.0 - lat).to_radians();
    let theta = (-lon).to_radians();
    Vector3::new(
        radius * phi.sin() * theta.cos(),
        radius * phi.cos(),
        radius * phi.sin() * theta.sin(),
    )
}

/// Inverse of [`to_globe`]; returns `None` for the sphere center
pub fn from_globe(point: &Vector3<f64>) -> Option<(f64, f64)> {
    let radius = point.norm();
    if radius == 0.0 {
        return None;
    }
    let lat = 90.0 - (point.y / radius).clamp(-1.0, 1.0).acos().to_degrees();
    let lon = -point.z.atan2(point.x).to_degrees();
    Some((lat, lon))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    const NORTH_5M_DLAT: f64 = 0.000045;

    #[test]
    fn test_northward_offset_paris() {
        let (x, z) = to_local_meters(48.8566, 2.3522, 48.8566 + NORTH_5M_DLAT, 2.3522);
        assert_abs_diff_eq!(x, 0.0, epsilon = 0.01);
        assert_abs_diff_eq!(z, 5.01, epsilon = 0.01);
    }

    #[test]
    fn test_northward_offset_any_reference() {
        let references = [
            (0.0, 0.0),
            (-33.8688, 151.2093),
            (64.1466, -21.9426),
            (-54.8019, -68.3030),
            (35.6762, 139.6503),
        ];
        for (lat, lon) in references {
            let (x, z) = to_local_meters(lat, lon, lat + NORTH_5M_DLAT, lon);
            assert_abs_diff_eq!(x, 0.0, epsilon = 0.01);
            assert_abs_diff_eq!(z, 5.0, epsilon = 0.1);
        }
    }

    #[test]
    fn test_east_offset_scales_with_latitude() {
        let (x_equator, _) = to_local_meters(0.0, 0.0, 0.0, 0.0001);
        let (x_sixty, _) = to_local_meters(60.0, 0.0, 60.0, 0.0001);
        assert_relative_eq!(x_sixty, x_equator * 0.5, epsilon = 1e-9);
    }

    #[test]
    fn test_local_point_is_planar() {
        let p = to_local_point(48.8566, 2.3522, 48.857, 2.353);
        assert_eq!(p.y, 0.0);
    }

    #[test]
    fn test_conversion_is_deterministic() {
        let a = to_local_meters(48.8566, 2.3522, 48.8571, 2.3519);
        let b = to_local_meters(48.8566, 2.3522, 48.8571, 2.3519);
        assert_eq!(a, b);
        assert_eq!(normalize_heading(-723.25), normalize_heading(-723.25));
    }

    #[test]
    fn test_to_geodetic_inverts_local() {
        let (x, z) = to_local_meters(48.8566, 2.3522, 48.8581, 2.3547);
        let (lat, lon) = to_geodetic(48.8566, 2.3522, x, z);
        assert_relative_eq!(lat, 48.8581, epsilon = 1e-9);
        assert_relative_eq!(lon, 2.3547, epsilon = 1e-9);
    }

    #[test]
    fn test_offset_for_meters() {
        let (d_lat, d_lon) = offset_for_meters(48.8566, 5.0, 0.0);
        assert_abs_diff_eq!(d_lon, 0.0);
        assert_abs_diff_eq!(d_lat, NORTH_5M_DLAT, epsilon = 1e-6);

        let (_, d_lon) = offset_for_meters(48.8566, 0.0, 10.0);
        let (x, _) = to_local_meters(48.8566, 2.3522, 48.8566, 2.3522 + d_lon);
        assert_relative_eq!(x, 10.0, epsilon = 1e-9);
    }

    #[test]
    fn test_normalize_heading() {
        assert_eq!(normalize_heading(-10.0), 350.0);
        assert_eq!(normalize_heading(370.0), 10.0);
        assert_eq!(normalize_heading(0.0), 0.0);
        assert_eq!(normalize_heading(360.0), 0.0);
        assert_eq!(normalize_heading(-360.0), 0.0);
        assert_eq!(normalize_heading(725.0), 5.0);
        assert!(normalize_heading(-1e-18) < 360.0);
    }

    #[test]
    fn test_haversine_matches_planar_at_short_range() {
        let planar = to_local_meters(48.8566, 2.3522, 48.8566 + NORTH_5M_DLAT, 2.3522).1;
        let great_circle = haversine_distance(48.8566, 2.3522, 48.8566 + NORTH_5M_DLAT, 2.3522);
        // The two models use slightly different earth radii
        assert_abs_diff_eq!(planar, great_circle, epsilon = 0.02);
    }

    #[test]
    fn test_globe_round_trip() {
        let p = to_globe(48.8566, 2.3522, 1.0);
        assert_relative_eq!(p.norm(), 1.0, epsilon = 1e-12);
        let (lat, lon) = from_globe(&p).unwrap();
        assert_relative_eq!(lat, 48.8566, epsilon = 1e-9);
        assert_relative_eq!(lon, 2.3522, epsilon = 1e-9);

        let north_pole = to_globe(90.0, 0.0, 2.0);
        assert_abs_diff_eq!(north_pole.y, 2.0, epsilon = 1e-12);
        assert!(from_globe(&Vector3::zeros()).is_none());
    }
}
