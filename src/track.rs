//! parse → propagate → convert → validate, plus the catalog and trajectory
//! helpers built on it.

use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};
use serde::Serialize;

use crate::error::TrackError;
use crate::frames::{self, GeodeticPosition};
use crate::propagator::Propagator;
use crate::tle::{self, OrbitalElementSet};
use crate::validate::validate;

/// What the map/list view needs for one marker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayRecord {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    pub alt_km: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GroundTrackPoint {
    pub time: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    pub alt_km: Option<f64>,
}

impl Propagator {
    /// Validated geodetic position at `at`.
    pub fn track(&self, at: DateTime<Utc>) -> Result<GeodeticPosition, TrackError> {
        let state = self.propagate(at)?;
        let geodetic = frames::to_geodetic(&state.position)?;
        Ok(validate(geodetic)?)
    }
}

pub fn track(elements: &OrbitalElementSet, at: DateTime<Utc>) -> Result<GeodeticPosition, TrackError> {
    Propagator::new(elements)?.track(at)
}

pub fn display_record(elements: &OrbitalElementSet, at: DateTime<Utc>) -> Result<DisplayRecord, TrackError> {
    let g = track(elements, at)?;
    Ok(DisplayRecord {
        name: elements.name().to_string(),
        lat: g.latitude,
        lon: g.longitude,
        alt_km: g.altitude_km,
    })
}

/// Display records for every satellite in a catalog text blob. Entries that
/// fail to parse or propagate are logged and left out.
pub fn track_catalog(text: &str, at: DateTime<Utc>) -> Vec<DisplayRecord> {
    let mut records = Vec::new();
    for (index, entry) in tle::parse_catalog(text).into_iter().enumerate() {
        let result = entry
            .map_err(TrackError::from)
            .and_then(|elements| display_record(&elements, at));
        match result {
            Ok(record) => records.push(record),
            Err(e) => warn!("[track_catalog] skipping entry {}: {}", index, e),
        }
    }
    debug!("[track_catalog] {} positions at {}", records.len(), at);
    records
}

/// Sample `count` positions starting at `start`, `step` apart, sharing one
/// propagation state. Stops at the first failure, including a sample time
/// chrono cannot represent.
pub fn ground_track(
    elements: &OrbitalElementSet,
    start: DateTime<Utc>,
    step: Duration,
    count: usize,
) -> Result<Vec<GroundTrackPoint>, TrackError> {
    let propagator = Propagator::new(elements)?;
    let mut points = Vec::new();
    let mut time = start;
    for i in 0..count {
        if i > 0 {
            time = time.checked_add_signed(step).ok_or(TrackError::TimeOutOfRange {
                last: time,
                step_ms: step.num_milliseconds(),
            })?;
        }
        let g = propagator.track(time)?;
        points.push(GroundTrackPoint {
            time,
            lat: g.latitude,
            lon: g.longitude,
            alt_km: g.altitude_km,
        });
    }
    Ok(points)
}
