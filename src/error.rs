use chrono::{DateTime, Utc};
use thiserror::Error;

/// Which of the two element lines a parse failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TleLine {
    Name,
    One,
    Two,
}

impl std::fmt::Display for TleLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TleLine::Name => write!(f, "name line"),
            TleLine::One => write!(f, "line 1"),
            TleLine::Two => write!(f, "line 2"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("malformed TLE {line}: {reason}")]
    Malformed { line: TleLine, reason: String },
    #[error("checksum mismatch on TLE {line}: expected {expected}, found {found}")]
    ChecksumMismatch { line: TleLine, expected: u8, found: u8 },
    #[error("incomplete TLE: expected 3 non-empty lines, got {found}")]
    Incomplete { found: usize },
}

impl ParseError {
    pub(crate) fn malformed(line: TleLine, reason: impl Into<String>) -> Self {
        ParseError::Malformed { line, reason: reason.into() }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PropagationError {
    #[error("satellite has decayed: {0}")]
    Decayed(String),
    #[error("Kepler solver did not converge after {iterations} iterations (last step {residual:e} rad)")]
    KeplerNonConvergence { iterations: u32, residual: f64 },
    #[error("invalid orbital elements: {0}")]
    InvalidElements(String),
    #[error("orbital period {period_min:.1} min requires the deep-space model")]
    DeepSpace { period_min: f64 },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    #[error("degenerate vector: horizontal magnitude {0:e} km leaves longitude undefined")]
    DegenerateVector(f64),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("non-finite {field}: {value}")]
    NonFinite { field: &'static str, value: f64 },
    #[error("{field} {value} outside [{min}, {max}]")]
    OutOfRange { field: &'static str, value: f64, min: f64, max: f64 },
}

/// Any failure along parse → propagate → convert → validate.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Propagation(#[from] PropagationError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("stepping {step_ms} ms past {last} leaves the supported date range")]
    TimeOutOfRange { last: DateTime<Utc>, step_ms: i64 },
}
