//! Last gate before a position leaves the crate.

use crate::error::ValidationError;
use crate::frames::GeodeticPosition;

/// Pass `g` through unchanged if it is finite and in range.
///
/// Latitude must lie in [-90, 90] and longitude in [-180, 180]; the converter
/// always produces such values, so a range failure points at a bug upstream
/// rather than at bad input data.
pub fn validate(g: GeodeticPosition) -> Result<GeodeticPosition, ValidationError> {
    finite("latitude", g.latitude)?;
    finite("longitude", g.longitude)?;
    if let Some(alt) = g.altitude_km {
        finite("altitude", alt)?;
    }
    in_range("latitude", g.latitude, 90.0)?;
    in_range("longitude", g.longitude, 180.0)?;
    Ok(g)
}

fn finite(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ValidationError::NonFinite { field, value })
    }
}

fn in_range(field: &'static str, value: f64, limit: f64) -> Result<(), ValidationError> {
    if (-limit..=limit).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange { field, value, min: -limit, max: limit })
    }
}
