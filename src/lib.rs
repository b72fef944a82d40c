//! Satellite ground-position core: TLE parsing, SGP4 propagation, ECI →
//! geodetic conversion and validation, with a JSON C ABI for host apps.
//!
//! Every operation takes the instant explicitly; nothing here reads the clock.

use std::ffi::{c_char, CStr, CString};
use std::sync::Once;

use chrono::{DateTime, Duration, Utc};
use log::{debug, error, info};

pub mod error;
pub mod frames;
pub mod propagator;
pub mod tle;
pub mod track;
pub mod validate;

pub use error::{ConversionError, ParseError, PropagationError, TleLine, TrackError, ValidationError};
pub use frames::{from_geodetic, gmst, to_geodetic, GeodeticPosition};
pub use propagator::{propagate, InertialPosition, Propagator, StateVector};
pub use tle::{checksum, parse, parse_catalog, parse_text, OrbitalElementSet};
pub use track::{display_record, ground_track, track, track_catalog, DisplayRecord, GroundTrackPoint};
pub use validate::validate;

/// Upper bound on points returned by [`ground_track_json`].
pub const MAX_TRACK_POINTS: u32 = 10_000;
/// Largest step accepted by [`ground_track_json`], about 31 years.
pub const MAX_STEP_SECONDS: f64 = 1.0e9;

const EMPTY_JSON: &str = "[]";

// ---------- Logging ----------

static INIT_LOGGER: Once = Once::new();

#[cfg(target_os = "android")]
fn init_logger() {
    use android_logger::Config;
    use log::LevelFilter;
    INIT_LOGGER.call_once(|| {
        android_logger::init_once(
            Config::default()
                .with_max_level(LevelFilter::Info)
                .with_tag("satcore"),
        );
    });
}

#[cfg(not(target_os = "android"))]
fn init_logger() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
    });
}

// ---------- C ABI ----------

#[no_mangle]
pub extern "C" fn free_json(ptr: *mut c_char) {
    if ptr.is_null() {
        return;
    }
    unsafe {
        let _ = CString::from_raw(ptr);
    }
}

/// Current positions of every satellite in a catalog blob, as a JSON array of
/// `{"name", "lat", "lon", "alt_km"}`. `unix_ms` is the instant to evaluate.
#[no_mangle]
pub extern "C" fn track_catalog_json(tle_text: *const c_char, unix_ms: i64) -> *mut c_char {
    init_logger();
    let Some(text) = read_c_str(tle_text) else {
        error!("[track_catalog_json] null TLE text");
        return into_c_json(EMPTY_JSON.to_string());
    };
    let Some(at) = from_unix_ms(unix_ms) else {
        error!("[track_catalog_json] timestamp {} ms out of range", unix_ms);
        return into_c_json(EMPTY_JSON.to_string());
    };
    debug!("[track_catalog_json] {} bytes at {}", text.len(), at);

    let records = track_catalog(&text, at);
    info!("[track_catalog_json] {} satellites positioned", records.len());
    to_json(&records)
}

/// Ground track of one satellite: `count` points from `start_unix_ms`,
/// `step_s` seconds apart, as a JSON array of `{"time", "lat", "lon", "alt_km"}`.
#[no_mangle]
pub extern "C" fn ground_track_json(
    name: *const c_char,
    tle1: *const c_char,
    tle2: *const c_char,
    start_unix_ms: i64,
    step_s: f64,
    count: u32,
) -> *mut c_char {
    init_logger();
    let (Some(name), Some(tle1), Some(tle2)) = (read_c_str(name), read_c_str(tle1), read_c_str(tle2)) else {
        error!("[ground_track_json] null TLE line");
        return into_c_json(EMPTY_JSON.to_string());
    };
    let Some(start) = from_unix_ms(start_unix_ms) else {
        error!("[ground_track_json] timestamp {} ms out of range", start_unix_ms);
        return into_c_json(EMPTY_JSON.to_string());
    };
    let Some(step) = step_from_seconds(step_s) else {
        error!("[ground_track_json] step {} s must be in [0.001, {}]", step_s, MAX_STEP_SECONDS);
        return into_c_json(EMPTY_JSON.to_string());
    };
    let count = count.min(MAX_TRACK_POINTS) as usize;

    let elements = match parse(&name, &tle1, &tle2) {
        Ok(e) => {
            info!("[ground_track_json] TLE parsed for {} ({})", e.name(), e.catalog_number());
            e
        }
        Err(e) => {
            error!("[ground_track_json] failed to parse TLE: {}", e);
            return into_c_json(EMPTY_JSON.to_string());
        }
    };
    match ground_track(&elements, start, step, count) {
        Ok(points) => to_json(&points),
        Err(e) => {
            error!("[ground_track_json] {}: {}", elements.name(), e);
            into_c_json(EMPTY_JSON.to_string())
        }
    }
}

// ---------- FFI helpers ----------

fn read_c_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}

/// Whole milliseconds; `None` unless the step rounds to at least 1 ms and
/// stays within [`MAX_STEP_SECONDS`].
fn step_from_seconds(step_s: f64) -> Option<Duration> {
    if !step_s.is_finite() || step_s > MAX_STEP_SECONDS {
        return None;
    }
    let ms = (step_s * 1000.0).round();
    if ms < 1.0 {
        return None;
    }
    Duration::try_milliseconds(ms as i64)
}

fn from_unix_ms(ms: i64) -> Option<DateTime<Utc>> {
    let nanos = (ms.rem_euclid(1000) * 1_000_000) as u32;
    DateTime::<Utc>::from_timestamp(ms.div_euclid(1000), nanos)
}

fn to_json<T: serde::Serialize>(value: &T) -> *mut c_char {
    let json = serde_json::to_string(value).unwrap_or_else(|e| {
        error!("[to_json] serialization failed: {}", e);
        EMPTY_JSON.to_string()
    });
    into_c_json(json)
}

fn into_c_json(json: String) -> *mut c_char {
    // serde_json escapes control characters, so no interior NUL can appear
    CString::new(json).unwrap_or_default().into_raw()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn unix_ms_handles_negative_values() {
        let t = from_unix_ms(-1).unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(1969, 12, 31, 23, 59, 59).unwrap() + Duration::milliseconds(999));
    }

    #[test]
    fn step_must_round_to_a_positive_millisecond() {
        assert_eq!(step_from_seconds(30.0), Some(Duration::seconds(30)));
        assert_eq!(step_from_seconds(0.0006), Some(Duration::milliseconds(1)));
        assert_eq!(step_from_seconds(0.0004), None);
        assert_eq!(step_from_seconds(0.0), None);
        assert_eq!(step_from_seconds(-1.0), None);
        assert_eq!(step_from_seconds(f64::NAN), None);
        assert_eq!(step_from_seconds(f64::INFINITY), None);
        assert_eq!(step_from_seconds(MAX_STEP_SECONDS), Some(Duration::seconds(1_000_000_000)));
        assert_eq!(step_from_seconds(1.0e13), None);
    }

    #[test]
    fn null_pointers_yield_empty_array() {
        let ptr = track_catalog_json(std::ptr::null(), 0);
        let json = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
        assert_eq!(json, "[]");
        free_json(ptr);
        free_json(std::ptr::null_mut());
    }
}
