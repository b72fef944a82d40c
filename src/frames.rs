//! Sidereal time and ECI → ECEF → geodetic conversion.

use std::f64::consts::PI;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConversionError;
use crate::propagator::InertialPosition;

const TWO_PI: f64 = 2.0 * PI;

/// Julian date of 1970-01-01T00:00:00Z.
const JD_UNIX_EPOCH: f64 = 2_440_587.5;
/// Julian date of J2000.0 (2000-01-01T12:00:00 TT, used here on the UT1 scale).
pub const JD_J2000: f64 = 2_451_545.0;

/// Horizontal distances below this (km) leave longitude undefined.
const DEGENERATE_HORIZONTAL_KM: f64 = 1.0e-9;
const LATITUDE_TOLERANCE_RAD: f64 = 1.0e-12;
const LATITUDE_MAX_ITERATIONS: usize = 20;

// ---------- Earth figure ----------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    /// Equatorial radius (km).
    pub radius_km: f64,
    pub flattening: f64,
}

impl Ellipsoid {
    pub const WGS84: Ellipsoid = Ellipsoid { radius_km: 6378.137, flattening: 1.0 / 298.257_223_563 };
    pub const WGS72: Ellipsoid = Ellipsoid { radius_km: 6378.135, flattening: 1.0 / 298.26 };

    /// First eccentricity squared.
    pub fn e2(&self) -> f64 {
        self.flattening * (2.0 - self.flattening)
    }
}

#[cfg(feature = "wgs72")]
pub const EARTH: Ellipsoid = Ellipsoid::WGS72;
#[cfg(not(feature = "wgs72"))]
pub const EARTH: Ellipsoid = Ellipsoid::WGS84;

// ---------- Output model ----------

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeodeticPosition {
    /// Degrees, [-90, 90].
    pub latitude: f64,
    /// Degrees, [-180, 180].
    pub longitude: f64,
    /// Height above the ellipsoid (km).
    pub altitude_km: Option<f64>,
}

// ---------- Time ----------

pub fn julian_date(at: DateTime<Utc>) -> f64 {
    let seconds = at.timestamp() as f64 + at.timestamp_subsec_nanos() as f64 * 1.0e-9;
    JD_UNIX_EPOCH + seconds / 86_400.0
}

/// Greenwich Mean Sidereal Time in radians, [0, 2π).
///
/// IAU-1982 polynomial in Julian centuries of UT1 since J2000.0; UTC is
/// taken as UT1 (|UT1 − UTC| < 0.9 s).
pub fn gmst(at: DateTime<Utc>) -> f64 {
    let tut1 = (julian_date(at) - JD_J2000) / 36_525.0;
    let seconds = -6.2e-6 * tut1 * tut1 * tut1
        + 0.093_104 * tut1 * tut1
        + (876_600.0 * 3600.0 + 8_640_184.812_866) * tut1
        + 67_310.548_41;
    // 240 s of sidereal time per degree
    (seconds / 240.0).to_radians().rem_euclid(TWO_PI)
}

// ---------- Frame rotations ----------

/// Rotate by −θ about the polar axis.
pub fn eci_to_ecef(r: [f64; 3], gmst: f64) -> [f64; 3] {
    let (s, c) = gmst.sin_cos();
    [c * r[0] + s * r[1], -s * r[0] + c * r[1], r[2]]
}

pub fn ecef_to_eci(r: [f64; 3], gmst: f64) -> [f64; 3] {
    let (s, c) = gmst.sin_cos();
    [c * r[0] - s * r[1], s * r[0] + c * r[1], r[2]]
}

/// Earth-fixed Cartesian (km) to geodetic on `ellipsoid`.
pub fn ecef_to_geodetic(r: [f64; 3], ellipsoid: &Ellipsoid) -> Result<GeodeticPosition, ConversionError> {
    let [x, y, z] = r;
    let p = x.hypot(y);
    if p < DEGENERATE_HORIZONTAL_KM {
        return Err(ConversionError::DegenerateVector(p));
    }

    let a = ellipsoid.radius_km;
    let e2 = ellipsoid.e2();
    let longitude = y.atan2(x);

    let mut lat = z.atan2(p * (1.0 - e2));
    for _ in 0..LATITUDE_MAX_ITERATIONS {
        let n = a / (1.0 - e2 * lat.sin().powi(2)).sqrt();
        let h = height(p, z, lat, n, e2);
        let next = z.atan2(p * (1.0 - e2 * n / (n + h)));
        let delta = (next - lat).abs();
        lat = next;
        if delta < LATITUDE_TOLERANCE_RAD {
            break;
        }
    }
    let n = a / (1.0 - e2 * lat.sin().powi(2)).sqrt();

    Ok(GeodeticPosition {
        latitude: lat.to_degrees(),
        longitude: longitude.to_degrees(),
        altitude_km: Some(height(p, z, lat, n, e2)),
    })
}

// Away from the equator the z-based form avoids dividing by a small cos(lat)
fn height(p: f64, z: f64, lat: f64, n: f64, e2: f64) -> f64 {
    if lat.abs() < PI / 4.0 {
        p / lat.cos() - n
    } else {
        z / lat.sin() - n * (1.0 - e2)
    }
}

/// Geodetic to Earth-fixed Cartesian (km). Missing altitude means the surface.
pub fn geodetic_to_ecef(g: &GeodeticPosition, ellipsoid: &Ellipsoid) -> [f64; 3] {
    let lat = g.latitude.to_radians();
    let lon = g.longitude.to_radians();
    let h = g.altitude_km.unwrap_or(0.0);
    let e2 = ellipsoid.e2();
    let (sin_lat, cos_lat) = lat.sin_cos();
    let n = ellipsoid.radius_km / (1.0 - e2 * sin_lat * sin_lat).sqrt();
    [
        (n + h) * cos_lat * lon.cos(),
        (n + h) * cos_lat * lon.sin(),
        (n * (1.0 - e2) + h) * sin_lat,
    ]
}

// ---------- Pipeline stage ----------

/// Geodetic coordinates of an inertial position.
///
/// There is no separate instant argument: the Earth rotation angle comes from
/// `pos.at`, the instant the propagator tagged the vector with. To evaluate a
/// vector at another instant, build an [`InertialPosition`] with that `at`.
pub fn to_geodetic(pos: &InertialPosition) -> Result<GeodeticPosition, ConversionError> {
    let ecef = eci_to_ecef([pos.x, pos.y, pos.z], gmst(pos.at));
    ecef_to_geodetic(ecef, &EARTH)
}

/// Inverse of [`to_geodetic`].
pub fn from_geodetic(g: &GeodeticPosition, at: DateTime<Utc>) -> InertialPosition {
    let [x, y, z] = ecef_to_eci(geodetic_to_ecef(g, &EARTH), gmst(at));
    InertialPosition { x, y, z, at }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn julian_date_of_j2000() {
        let t = Utc.with_ymd_and_hms(2000, 1, 1, 12, 0, 0).unwrap();
        assert_eq!(julian_date(t), JD_J2000);
    }

    #[test]
    fn gmst_at_j2000() {
        let t = Utc.with_ymd_and_hms(2000, 1, 1, 12, 0, 0).unwrap();
        assert!((gmst(t).to_degrees() - 280.460_618_375).abs() < 1e-6);
    }

    #[test]
    fn gmst_matches_vallado_3_5() {
        // Vallado, Fundamentals of Astrodynamics, ex. 3-5
        let t = Utc.with_ymd_and_hms(1992, 8, 20, 12, 14, 0).unwrap();
        assert!((gmst(t).to_degrees() - 152.578_787_8).abs() < 1e-5);
    }

    #[test]
    fn rotations_are_inverse() {
        let r = [-3433.589, 5866.008, 1200.5];
        let back = ecef_to_eci(eci_to_ecef(r, 1.234), 1.234);
        for k in 0..3 {
            assert!((back[k] - r[k]).abs() < 1e-9);
        }
    }

    #[test]
    fn equatorial_points() {
        let a = Ellipsoid::WGS84.radius_km;
        let g = ecef_to_geodetic([a + 400.0, 0.0, 0.0], &Ellipsoid::WGS84).unwrap();
        assert!(g.latitude.abs() < 1e-12);
        assert!(g.longitude.abs() < 1e-12);
        assert!((g.altitude_km.unwrap() - 400.0).abs() < 1e-9);

        let g = ecef_to_geodetic([0.0, -a, 0.0], &Ellipsoid::WGS84).unwrap();
        assert!((g.longitude + 90.0).abs() < 1e-12);
        assert!(g.altitude_km.unwrap().abs() < 1e-9);
    }

    #[test]
    fn geodetic_round_trip_on_ellipsoid() {
        for &(lat, lon, alt) in &[(51.5, -0.12, 0.0), (-33.9, 151.2, 420.0), (78.2, 15.6, 35_786.0), (-89.0, 179.9, 1.0)] {
            let g = GeodeticPosition { latitude: lat, longitude: lon, altitude_km: Some(alt) };
            let back = ecef_to_geodetic(geodetic_to_ecef(&g, &Ellipsoid::WGS84), &Ellipsoid::WGS84).unwrap();
            assert!((back.latitude - lat).abs() < 1e-9, "lat {} -> {}", lat, back.latitude);
            assert!((back.longitude - lon).abs() < 1e-9, "lon {} -> {}", lon, back.longitude);
            assert!((back.altitude_km.unwrap() - alt).abs() < 1e-6, "alt {} -> {:?}", alt, back.altitude_km);
        }
    }

    #[test]
    fn polar_axis_is_degenerate() {
        let err = ecef_to_geodetic([0.0, 0.0, 7000.0], &EARTH).unwrap_err();
        assert_eq!(err, ConversionError::DegenerateVector(0.0));
    }

    #[test]
    fn tagged_instant_drives_earth_rotation() {
        let at = Utc.with_ymd_and_hms(2025, 10, 5, 11, 57, 9).unwrap();
        let later = at + chrono::Duration::hours(1);
        let pos = InertialPosition { x: 6800.0, y: 0.0, z: 0.0, at };
        let a = to_geodetic(&pos).unwrap();
        let b = to_geodetic(&InertialPosition { at: later, ..pos }).unwrap();
        let expected = (gmst(at) - gmst(later)).to_degrees();
        let diff = (b.longitude - a.longitude - expected + 540.0).rem_euclid(360.0) - 180.0;
        assert!(diff.abs() < 1e-9, "longitude shift off by {}", diff);
        assert_eq!(a.latitude, b.latitude);
    }

    #[test]
    fn inverse_recovers_inertial_vector() {
        let at = Utc.with_ymd_and_hms(2025, 10, 5, 11, 57, 9).unwrap();
        let pos = InertialPosition { x: -3433.589, y: 5866.008, z: 2.5, at };
        let g = to_geodetic(&pos).unwrap();
        let back = from_geodetic(&g, at);
        assert!((back.x - pos.x).abs() < 1e-6);
        assert!((back.y - pos.y).abs() < 1e-6);
        assert!((back.z - pos.z).abs() < 1e-6);
    }
}
