//! Two-line element set parsing.
//!
//! Column layout follows the NORAD/CelesTrak fixed-width format: both element
//! lines are 69 characters, the last one being a mod-10 checksum.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use log::debug;
use serde::Serialize;

use crate::error::{ParseError, TleLine};

pub const TLE_LINE_LEN: usize = 69;

/// Mean orbital elements of one satellite at the TLE epoch.
///
/// Angles are stored in degrees and mean motion in revolutions per day, as
/// they appear in the TLE. The set is validated on construction and cannot be
/// modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrbitalElementSet {
    name: String,
    catalog_number: u32,
    classification: char,
    international_designator: String,
    epoch: DateTime<Utc>,
    mean_motion_dot: f64,
    mean_motion_ddot: f64,
    bstar: f64,
    ephemeris_type: u8,
    element_set_number: u32,
    inclination_deg: f64,
    raan_deg: f64,
    eccentricity: f64,
    arg_perigee_deg: f64,
    mean_anomaly_deg: f64,
    mean_motion: f64,
    revolution_number: u32,
}

impl OrbitalElementSet {
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn catalog_number(&self) -> u32 {
        self.catalog_number
    }
    pub fn classification(&self) -> char {
        self.classification
    }
    pub fn international_designator(&self) -> &str {
        &self.international_designator
    }
    pub fn epoch(&self) -> DateTime<Utc> {
        self.epoch
    }
    /// First derivative of mean motion divided by two (rev/day²).
    pub fn mean_motion_dot(&self) -> f64 {
        self.mean_motion_dot
    }
    /// Second derivative of mean motion divided by six (rev/day³).
    pub fn mean_motion_ddot(&self) -> f64 {
        self.mean_motion_ddot
    }
    /// B* drag term in inverse Earth radii.
    pub fn bstar(&self) -> f64 {
        self.bstar
    }
    pub fn ephemeris_type(&self) -> u8 {
        self.ephemeris_type
    }
    pub fn element_set_number(&self) -> u32 {
        self.element_set_number
    }
    pub fn inclination_deg(&self) -> f64 {
        self.inclination_deg
    }
    pub fn raan_deg(&self) -> f64 {
        self.raan_deg
    }
    pub fn eccentricity(&self) -> f64 {
        self.eccentricity
    }
    pub fn arg_perigee_deg(&self) -> f64 {
        self.arg_perigee_deg
    }
    pub fn mean_anomaly_deg(&self) -> f64 {
        self.mean_anomaly_deg
    }
    /// Mean motion in revolutions per day.
    pub fn mean_motion(&self) -> f64 {
        self.mean_motion
    }
    pub fn revolution_number(&self) -> u32 {
        self.revolution_number
    }

    /// Orbital period in minutes implied by the mean motion.
    pub fn period_minutes(&self) -> f64 {
        1440.0 / self.mean_motion
    }
}

/// Mod-10 checksum over the first 68 columns: digits count their value,
/// `-` counts as 1, everything else as 0.
pub fn checksum(line: &str) -> u8 {
    let sum: u32 = line
        .bytes()
        .take(TLE_LINE_LEN - 1)
        .map(|b| match b {
            b'0'..=b'9' => (b - b'0') as u32,
            b'-' => 1,
            _ => 0,
        })
        .sum();
    (sum % 10) as u8
}

/// Parse a name line and the two element lines.
pub fn parse(name_line: &str, line1: &str, line2: &str) -> Result<OrbitalElementSet, ParseError> {
    let lines = [name_line.trim(), line1.trim_end(), line2.trim_end()];
    let found = lines.iter().filter(|l| !l.trim().is_empty()).count();
    if found < 3 {
        return Err(ParseError::Incomplete { found });
    }
    let [name_line, line1, line2] = lines;

    let name = name_line.strip_prefix("0 ").unwrap_or(name_line).trim().to_string();

    check_line(line1, TleLine::One, b'1')?;
    check_line(line2, TleLine::Two, b'2')?;

    let catalog_number = catalog(field(line1, TleLine::One, 2..7, "catalog number")?, TleLine::One)?;
    let catalog_2 = catalog(field(line2, TleLine::Two, 2..7, "catalog number")?, TleLine::Two)?;
    if catalog_number != catalog_2 {
        return Err(ParseError::malformed(
            TleLine::Two,
            format!("catalog number {} does not match line 1 ({})", catalog_2, catalog_number),
        ));
    }

    let classification = line1[7..8].chars().next().unwrap_or('U');
    let international_designator = line1[9..17].trim().to_string();
    let epoch = epoch(
        field(line1, TleLine::One, 18..20, "epoch year")?,
        field(line1, TleLine::One, 20..32, "epoch day")?,
    )?;
    let mean_motion_dot = decimal(line1, TleLine::One, 33..43, "mean motion derivative")?;
    let mean_motion_ddot = implied_decimal(line1, TleLine::One, 44..52, "mean motion second derivative")?;
    let bstar = implied_decimal(line1, TleLine::One, 53..61, "B* drag term")?;
    let ephemeris_type = match line1.as_bytes()[62] {
        b' ' => 0,
        b @ b'0'..=b'9' => b - b'0',
        _ => return Err(ParseError::malformed(TleLine::One, "ephemeris type is not a digit")),
    };
    let element_set_number = integer(line1, TleLine::One, 64..68, "element set number")?;

    let inclination_deg = decimal(line2, TleLine::Two, 8..16, "inclination")?;
    let raan_deg = decimal(line2, TleLine::Two, 17..25, "right ascension of ascending node")?;
    let ecc_digits = field(line2, TleLine::Two, 26..33, "eccentricity")?.trim();
    if ecc_digits.is_empty() || !ecc_digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::malformed(TleLine::Two, "eccentricity must be 7 implied-decimal digits"));
    }
    let eccentricity = parse_f64(&format!("0.{}", ecc_digits), TleLine::Two, "eccentricity")?;
    let arg_perigee_deg = decimal(line2, TleLine::Two, 34..42, "argument of perigee")?;
    let mean_anomaly_deg = decimal(line2, TleLine::Two, 43..51, "mean anomaly")?;
    let mean_motion = decimal(line2, TleLine::Two, 52..63, "mean motion")?;
    let revolution_number = integer(line2, TleLine::Two, 63..68, "revolution number")?;

    if !(0.0..1.0).contains(&eccentricity) {
        return Err(ParseError::malformed(TleLine::Two, format!("eccentricity {} outside [0, 1)", eccentricity)));
    }
    if !(0.0..=180.0).contains(&inclination_deg) {
        return Err(ParseError::malformed(
            TleLine::Two,
            format!("inclination {} outside [0, 180] degrees", inclination_deg),
        ));
    }
    if mean_motion <= 0.0 {
        return Err(ParseError::malformed(TleLine::Two, format!("mean motion {} must be positive", mean_motion)));
    }

    debug!("[parse] {} ({}) epoch {}", name, catalog_number, epoch);

    Ok(OrbitalElementSet {
        name,
        catalog_number,
        classification,
        international_designator,
        epoch,
        mean_motion_dot,
        mean_motion_ddot,
        bstar,
        ephemeris_type,
        element_set_number,
        inclination_deg,
        raan_deg,
        eccentricity,
        arg_perigee_deg,
        mean_anomaly_deg,
        mean_motion,
        revolution_number,
    })
}

/// Parse the first entry of a text blob: the first three non-empty lines are
/// taken as name, line 1 and line 2.
pub fn parse_text(text: &str) -> Result<OrbitalElementSet, ParseError> {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).take(3).collect();
    match lines.as_slice() {
        [name, line1, line2] => parse(name, line1, line2),
        _ => Err(ParseError::Incomplete { found: lines.len() }),
    }
}

/// Parse every name/line 1/line 2 triple of a catalog file such as
/// CelesTrak's `stations.txt`. One result per entry; a trailing partial entry
/// is reported as `Incomplete`.
pub fn parse_catalog(text: &str) -> Vec<Result<OrbitalElementSet, ParseError>> {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    lines
        .chunks(3)
        .map(|entry| match entry {
            [name, line1, line2] => parse(name, line1, line2),
            _ => Err(ParseError::Incomplete { found: entry.len() }),
        })
        .collect()
}

// ---------- Field helpers ----------

fn check_line(line: &str, which: TleLine, marker: u8) -> Result<(), ParseError> {
    if !line.is_ascii() {
        return Err(ParseError::malformed(which, "line contains non-ASCII characters"));
    }
    if line.len() != TLE_LINE_LEN {
        return Err(ParseError::malformed(
            which,
            format!("expected {} characters, got {}", TLE_LINE_LEN, line.len()),
        ));
    }
    let bytes = line.as_bytes();
    if bytes[0] != marker {
        return Err(ParseError::malformed(
            which,
            format!("line number marker '{}' should be '{}'", bytes[0] as char, marker as char),
        ));
    }
    let found = match bytes[TLE_LINE_LEN - 1] {
        b @ b'0'..=b'9' => b - b'0',
        _ => return Err(ParseError::malformed(which, "checksum column is not a digit")),
    };
    let expected = checksum(line);
    if expected != found {
        return Err(ParseError::ChecksumMismatch { line: which, expected, found });
    }
    Ok(())
}

fn field<'a>(
    line: &'a str,
    which: TleLine,
    range: std::ops::Range<usize>,
    name: &str,
) -> Result<&'a str, ParseError> {
    line.get(range)
        .ok_or_else(|| ParseError::malformed(which, format!("{} column out of bounds", name)))
}

fn parse_f64(s: &str, which: TleLine, name: &str) -> Result<f64, ParseError> {
    s.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ParseError::malformed(which, format!("{} '{}' is not a number", name, s)))
}

fn decimal(line: &str, which: TleLine, range: std::ops::Range<usize>, name: &str) -> Result<f64, ParseError> {
    let raw = field(line, which, range, name)?.trim();
    // Leading-dot forms such as ".00011384" and "-.0000218"
    let normalized = if let Some(rest) = raw.strip_prefix("-.") {
        format!("-0.{}", rest)
    } else if let Some(rest) = raw.strip_prefix("+.") {
        format!("0.{}", rest)
    } else if let Some(rest) = raw.strip_prefix('.') {
        format!("0.{}", rest)
    } else {
        raw.to_string()
    };
    parse_f64(&normalized, which, name)
}

/// Decode the `±NNNNN±E` notation, e.g. ` 20935-3` = 0.20935e-3.
fn implied_decimal(
    line: &str,
    which: TleLine,
    range: std::ops::Range<usize>,
    name: &str,
) -> Result<f64, ParseError> {
    let raw = field(line, which, range, name)?.trim();
    if raw.is_empty() {
        return Ok(0.0);
    }
    let (sign, body) = match raw.as_bytes()[0] {
        b'-' => (-1.0, &raw[1..]),
        b'+' => (1.0, &raw[1..]),
        _ => (1.0, raw),
    };
    let split = body
        .rfind(|c| c == '-' || c == '+')
        .ok_or_else(|| ParseError::malformed(which, format!("{} '{}' has no exponent", name, raw)))?;
    let (mantissa, exponent) = body.split_at(split);
    if mantissa.is_empty() || !mantissa.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::malformed(which, format!("{} '{}' has a bad mantissa", name, raw)));
    }
    let mantissa = parse_f64(&format!("0.{}", mantissa), which, name)?;
    let exponent: i32 = exponent
        .parse()
        .map_err(|_| ParseError::malformed(which, format!("{} '{}' has a bad exponent", name, raw)))?;
    Ok(sign * mantissa * 10f64.powi(exponent))
}

fn integer(line: &str, which: TleLine, range: std::ops::Range<usize>, name: &str) -> Result<u32, ParseError> {
    let raw = field(line, which, range, name)?.trim();
    if raw.is_empty() {
        return Ok(0);
    }
    raw.parse()
        .map_err(|_| ParseError::malformed(which, format!("{} '{}' is not an integer", name, raw)))
}

/// Catalog numbers are five digits, or Alpha-5: a leading letter (I and O
/// excluded) standing for 10..33 ten-thousands.
fn catalog(raw: &str, which: TleLine) -> Result<u32, ParseError> {
    let raw = raw.trim();
    let bad = || ParseError::malformed(which, format!("catalog number '{}' is invalid", raw));
    let first = raw.chars().next().ok_or_else(bad)?;
    if first.is_ascii_uppercase() {
        let rest: u32 = raw[1..].parse().map_err(|_| bad())?;
        let prefix = match first {
            'I' | 'O' => return Err(bad()),
            'A'..='H' => first as u32 - 'A' as u32 + 10,
            'J'..='N' => first as u32 - 'A' as u32 + 9,
            _ => first as u32 - 'A' as u32 + 8,
        };
        Ok(prefix * 10_000 + rest)
    } else {
        raw.parse().map_err(|_| bad())
    }
}

fn epoch(year: &str, day: &str) -> Result<DateTime<Utc>, ParseError> {
    let yy: i32 = year
        .trim()
        .parse()
        .map_err(|_| ParseError::malformed(TleLine::One, format!("epoch year '{}' is not a number", year)))?;
    let year = if yy < 57 { 2000 + yy } else { 1900 + yy };
    let day = parse_f64(day.trim(), TleLine::One, "epoch day")?;
    if !(1.0..367.0).contains(&day) {
        return Err(ParseError::malformed(TleLine::One, format!("epoch day {} outside [1, 367)", day)));
    }
    let jan1 = NaiveDate::from_ymd_opt(year, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or_else(|| ParseError::malformed(TleLine::One, format!("epoch year {} out of range", year)))?;
    let offset = Duration::microseconds(((day - 1.0) * 86_400_000_000.0).round() as i64);
    Ok(DateTime::<Utc>::from_naive_utc_and_offset(jan1 + offset, Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    const ISS_1: &str = "1 25544U 98067A   25278.49802050  .00011384  00000+0  20935-3 0  9990";
    const ISS_2: &str = "2 25544  51.6327 120.3420 0000884 206.2421 153.8523 15.49697304532279";

    #[test]
    fn parses_iss_fields() {
        let e = parse("ISS (ZARYA)", ISS_1, ISS_2).unwrap();
        assert_eq!(e.name(), "ISS (ZARYA)");
        assert_eq!(e.catalog_number(), 25544);
        assert_eq!(e.classification(), 'U');
        assert_eq!(e.international_designator(), "98067A");
        assert_eq!(e.element_set_number(), 999);
        assert_eq!(e.revolution_number(), 53227);
        assert!((e.inclination_deg() - 51.6327).abs() < 1e-12);
        assert!((e.raan_deg() - 120.3420).abs() < 1e-12);
        assert!((e.eccentricity() - 0.0000884).abs() < 1e-15);
        assert!((e.mean_motion() - 15.49697304).abs() < 1e-12);
        assert!((e.mean_motion_dot() - 0.00011384).abs() < 1e-15);
        assert_eq!(e.mean_motion_ddot(), 0.0);
        assert!((e.bstar() - 0.20935e-3).abs() < 1e-15);
    }

    #[test]
    fn epoch_is_reconstructed_from_day_of_year() {
        let e = parse("ISS (ZARYA)", ISS_1, ISS_2).unwrap();
        let t = e.epoch();
        assert_eq!((t.year(), t.month(), t.day()), (2025, 10, 5));
        // 0.49802050 day = 11:57:08.971
        assert_eq!((t.hour(), t.minute(), t.second()), (11, 57, 8));
    }

    #[test]
    fn two_digit_years_split_at_57() {
        let before = epoch("57", "1.0").unwrap();
        let after = epoch("56", "1.0").unwrap();
        assert_eq!(before.year(), 1957);
        assert_eq!(after.year(), 2056);
        assert_eq!(epoch("00", "179.5").unwrap().year(), 2000);
    }

    #[test]
    fn checksum_matches_final_column() {
        for line in [ISS_1, ISS_2] {
            let digit = line.as_bytes()[68] - b'0';
            assert_eq!(checksum(line), digit);
        }
    }

    #[test]
    fn implied_decimal_handles_signs() {
        let line = format!("{:44}{:8}", "", "-11606-4");
        let v = implied_decimal(&line, TleLine::One, 44..52, "x").unwrap();
        assert!((v + 0.11606e-4).abs() < 1e-18);
        let line = format!("{:44}{:8}", "", " 00000+0");
        assert_eq!(implied_decimal(&line, TleLine::One, 44..52, "x").unwrap(), 0.0);
    }

    #[test]
    fn alpha5_catalog_numbers() {
        assert_eq!(catalog("A0000", TleLine::One).unwrap(), 100_000);
        assert_eq!(catalog("E8493", TleLine::One).unwrap(), 148_493);
        assert_eq!(catalog("J2931", TleLine::One).unwrap(), 182_931);
        assert_eq!(catalog("P0001", TleLine::One).unwrap(), 230_001);
        assert_eq!(catalog("Z9999", TleLine::One).unwrap(), 339_999);
        assert!(catalog("I0000", TleLine::One).is_err());
    }

    #[test]
    fn name_line_prefix_is_stripped() {
        let e = parse("0 ISS (ZARYA)", ISS_1, ISS_2).unwrap();
        assert_eq!(e.name(), "ISS (ZARYA)");
    }

    #[test]
    fn carriage_returns_are_ignored() {
        let l1 = format!("{}\r", ISS_1);
        let l2 = format!("{}  ", ISS_2);
        assert!(parse("ISS", &l1, &l2).is_ok());
    }

    #[test]
    fn wrong_length_is_malformed() {
        let err = parse("ISS", &ISS_1[..60], ISS_2).unwrap_err();
        assert!(matches!(err, ParseError::Malformed { line: TleLine::One, .. }));
    }

    #[test]
    fn swapped_lines_are_malformed() {
        let err = parse("ISS", ISS_2, ISS_1).unwrap_err();
        assert!(matches!(err, ParseError::Malformed { line: TleLine::One, .. }));
    }

    #[test]
    fn empty_name_is_incomplete() {
        assert_eq!(parse("  ", ISS_1, ISS_2).unwrap_err(), ParseError::Incomplete { found: 2 });
    }
}
