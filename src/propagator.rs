//! SGP4 near-Earth propagation.
//!
//! Secular gravity (J2, J4) and atmospheric drag (B*) rates, long-period J3
//! terms and first-order short-period J2 corrections, in the formulation of
//! Hoots & Roehrich (Spacetrack Report #3) as revised by Vallado et al. (2006).
//! All gravity constants come from WGS-72, the model TLEs are fitted against.

use std::f64::consts::PI;

use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;

use crate::error::PropagationError;
use crate::tle::OrbitalElementSet;

const TWO_PI: f64 = 2.0 * PI;
const X2O3: f64 = 2.0 / 3.0;
const TEMP4: f64 = 1.5e-12;

/// Kepler solver bounds.
pub const KEPLER_TOLERANCE: f64 = 1.0e-12;
pub const KEPLER_MAX_ITERATIONS: u32 = 10;

/// Orbits with a period at or above this need the deep-space (SDP4) terms.
pub const DEEP_SPACE_PERIOD_MIN: f64 = 225.0;

// ---------- WGS-72 ----------

pub mod wgs72 {
    /// Gravitational parameter (km³/s²).
    pub const MU: f64 = 398_600.8;
    /// Equatorial radius (km).
    pub const RADIUS_KM: f64 = 6378.135;
    pub const J2: f64 = 0.001_082_616;
    pub const J3: f64 = -0.000_002_538_81;
    pub const J4: f64 = -0.000_001_655_97;
    pub const J3OJ2: f64 = J3 / J2;

    /// sqrt(μ) in Earth radii^1.5 per minute.
    pub fn xke() -> f64 {
        60.0 / (RADIUS_KM * RADIUS_KM * RADIUS_KM / MU).sqrt()
    }
}

// ---------- Output model ----------

/// Position in the Earth-centered inertial (TEME) frame, km.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct InertialPosition {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub at: DateTime<Utc>,
}

impl InertialPosition {
    pub fn radius_km(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StateVector {
    pub position: InertialPosition,
    /// Velocity in the same frame, km/s.
    pub velocity: [f64; 3],
}

// ---------- Propagation state ----------

/// Coefficients derived once from an element set.
///
/// Building one is cheap; holding on to it lets a caller sample many instants
/// of the same orbit without redoing the initialisation. It carries no
/// interior mutability and can be shared across threads.
#[derive(Debug, Clone)]
pub struct Propagator {
    epoch: DateTime<Utc>,
    xke: f64,

    // Mean elements at epoch (radians, rad/min)
    ecco: f64,
    inclo: f64,
    argpo: f64,
    nodeo: f64,
    mo: f64,
    bstar: f64,
    no_unkozai: f64,
    ao: f64,

    // True when perigee is below 220 km and the drag series is truncated
    isimp: bool,

    aycof: f64,
    con41: f64,
    cc1: f64,
    cc4: f64,
    cc5: f64,
    d2: f64,
    d3: f64,
    d4: f64,
    delmo: f64,
    eta: f64,
    argpdot: f64,
    omgcof: f64,
    sinmao: f64,
    t2cof: f64,
    t3cof: f64,
    t4cof: f64,
    t5cof: f64,
    x1mth2: f64,
    x7thm1: f64,
    mdot: f64,
    nodedot: f64,
    xlcof: f64,
    xmcof: f64,
    nodecf: f64,
}

impl Propagator {
    pub fn new(elements: &OrbitalElementSet) -> Result<Self, PropagationError> {
        check_elements(elements)?;

        let xke = wgs72::xke();
        let ecco = elements.eccentricity();
        let inclo = elements.inclination_deg().to_radians();
        let argpo = elements.arg_perigee_deg().to_radians();
        let nodeo = elements.raan_deg().to_radians();
        let mo = elements.mean_anomaly_deg().to_radians();
        let bstar = elements.bstar();
        let no_kozai = elements.mean_motion() * TWO_PI / 1440.0;

        // Recover the Brouwer mean motion from the Kozai value in the TLE
        let eccsq = ecco * ecco;
        let omeosq = 1.0 - eccsq;
        let rteosq = omeosq.sqrt();
        let cosio = inclo.cos();
        let cosio2 = cosio * cosio;
        let ak = (xke / no_kozai).powf(X2O3);
        let d1 = 0.75 * wgs72::J2 * (3.0 * cosio2 - 1.0) / (rteosq * omeosq);
        let del = d1 / (ak * ak);
        let adel = ak * (1.0 - del * del - del * (1.0 / 3.0 + 134.0 * del * del / 81.0));
        let del = d1 / (adel * adel);
        let no_unkozai = no_kozai / (1.0 + del);

        let period_min = TWO_PI / no_unkozai;
        if period_min >= DEEP_SPACE_PERIOD_MIN {
            return Err(PropagationError::DeepSpace { period_min });
        }

        let ao = (xke / no_unkozai).powf(X2O3);
        let sinio = inclo.sin();
        let po = ao * omeosq;
        let con42 = 1.0 - 5.0 * cosio2;
        let con41 = -con42 - cosio2 - cosio2;
        let posq = po * po;
        let rp = ao * (1.0 - ecco);

        // Atmospheric density parameters, lowered for perigees under 156 km
        let mut sfour = 78.0 / wgs72::RADIUS_KM + 1.0;
        let mut qzms24 = ((120.0 - 78.0) / wgs72::RADIUS_KM).powi(4);
        let perigee_km = (rp - 1.0) * wgs72::RADIUS_KM;
        if perigee_km < 156.0 {
            sfour = if perigee_km < 98.0 { 20.0 } else { perigee_km - 78.0 };
            qzms24 = ((120.0 - sfour) / wgs72::RADIUS_KM).powi(4);
            sfour = sfour / wgs72::RADIUS_KM + 1.0;
        }
        let isimp = rp < 220.0 / wgs72::RADIUS_KM + 1.0;

        let pinvsq = 1.0 / posq;
        let tsi = 1.0 / (ao - sfour);
        let eta = ao * ecco * tsi;
        let etasq = eta * eta;
        let eeta = ecco * eta;
        let psisq = (1.0 - etasq).abs();
        let coef = qzms24 * tsi.powi(4);
        let coef1 = coef / psisq.powf(3.5);
        let cc2 = coef1
            * no_unkozai
            * (ao * (1.0 + 1.5 * etasq + eeta * (4.0 + etasq))
                + 0.375 * wgs72::J2 * tsi / psisq * con41 * (8.0 + 3.0 * etasq * (8.0 + etasq)));
        let cc1 = bstar * cc2;
        let cc3 = if ecco > 1.0e-4 {
            -2.0 * coef * tsi * wgs72::J3OJ2 * no_unkozai * sinio / ecco
        } else {
            0.0
        };
        let x1mth2 = 1.0 - cosio2;
        let cc4 = 2.0
            * no_unkozai
            * coef1
            * ao
            * omeosq
            * (eta * (2.0 + 0.5 * etasq) + ecco * (0.5 + 2.0 * etasq)
                - wgs72::J2 * tsi / (ao * psisq)
                    * (-3.0 * con41 * (1.0 - 2.0 * eeta + etasq * (1.5 - 0.5 * eeta))
                        + 0.75 * x1mth2 * (2.0 * etasq - eeta * (1.0 + etasq)) * (2.0 * argpo).cos()));
        let cc5 = 2.0 * coef1 * ao * omeosq * (1.0 + 2.75 * (etasq + eeta) + eeta * etasq);

        // Secular rates from J2 and J4
        let cosio4 = cosio2 * cosio2;
        let temp1 = 1.5 * wgs72::J2 * pinvsq * no_unkozai;
        let temp2 = 0.5 * temp1 * wgs72::J2 * pinvsq;
        let temp3 = -0.46875 * wgs72::J4 * pinvsq * pinvsq * no_unkozai;
        let mdot = no_unkozai
            + 0.5 * temp1 * rteosq * con41
            + 0.0625 * temp2 * rteosq * (13.0 - 78.0 * cosio2 + 137.0 * cosio4);
        let argpdot = -0.5 * temp1 * con42
            + 0.0625 * temp2 * (7.0 - 114.0 * cosio2 + 395.0 * cosio4)
            + temp3 * (3.0 - 36.0 * cosio2 + 49.0 * cosio4);
        let xhdot1 = -temp1 * cosio;
        let nodedot = xhdot1 + (0.5 * temp2 * (4.0 - 19.0 * cosio2) + 2.0 * temp3 * (3.0 - 7.0 * cosio2)) * cosio;

        let omgcof = bstar * cc3 * argpo.cos();
        let xmcof = if ecco > 1.0e-4 { -X2O3 * coef * bstar / eeta } else { 0.0 };
        let nodecf = 3.5 * omeosq * xhdot1 * cc1;
        let t2cof = 1.5 * cc1;
        // Guard the division for inclinations at 180°
        let xlcof_den = if (cosio + 1.0).abs() > TEMP4 { 1.0 + cosio } else { TEMP4 };
        let xlcof = -0.25 * wgs72::J3OJ2 * sinio * (3.0 + 5.0 * cosio) / xlcof_den;
        let aycof = -0.5 * wgs72::J3OJ2 * sinio;
        let delmo = (1.0 + eta * mo.cos()).powi(3);
        let sinmao = mo.sin();
        let x7thm1 = 7.0 * cosio2 - 1.0;

        let (mut d2, mut d3, mut d4, mut t3cof, mut t4cof, mut t5cof) = (0.0, 0.0, 0.0, 0.0, 0.0, 0.0);
        if !isimp {
            let cc1sq = cc1 * cc1;
            d2 = 4.0 * ao * tsi * cc1sq;
            let temp = d2 * tsi * cc1 / 3.0;
            d3 = (17.0 * ao + sfour) * temp;
            d4 = 0.5 * temp * ao * tsi * (221.0 * ao + 31.0 * sfour) * cc1;
            t3cof = d2 + 2.0 * cc1sq;
            t4cof = 0.25 * (3.0 * d3 + cc1 * (12.0 * d2 + 10.0 * cc1sq));
            t5cof = 0.2 * (3.0 * d4 + 12.0 * cc1 * d3 + 6.0 * d2 * d2 + 15.0 * cc1sq * (2.0 * d2 + cc1sq));
        }

        debug!(
            "[Propagator::new] catalog {}: a={:.3} km, perigee={:.1} km, simplified drag={}",
            elements.catalog_number(),
            ao * wgs72::RADIUS_KM,
            perigee_km,
            isimp
        );

        Ok(Propagator {
            epoch: elements.epoch(),
            xke,
            ecco,
            inclo,
            argpo,
            nodeo,
            mo,
            bstar,
            no_unkozai,
            ao,
            isimp,
            aycof,
            con41,
            cc1,
            cc4,
            cc5,
            d2,
            d3,
            d4,
            delmo,
            eta,
            argpdot,
            omgcof,
            sinmao,
            t2cof,
            t3cof,
            t4cof,
            t5cof,
            x1mth2,
            x7thm1,
            mdot,
            nodedot,
            xlcof,
            xmcof,
            nodecf,
        })
    }

    pub fn epoch(&self) -> DateTime<Utc> {
        self.epoch
    }

    /// Mean semi-major axis at epoch recovered from the TLE mean motion (km).
    pub fn semi_major_axis_km(&self) -> f64 {
        self.ao * wgs72::RADIUS_KM
    }

    /// Minutes elapsed from the element epoch to `at` (negative before epoch).
    pub fn minutes_since_epoch(&self, at: DateTime<Utc>) -> f64 {
        let dt = at.signed_duration_since(self.epoch);
        match dt.num_microseconds() {
            Some(us) => us as f64 / 60.0e6,
            None => dt.num_milliseconds() as f64 / 60.0e3,
        }
    }

    pub fn propagate(&self, at: DateTime<Utc>) -> Result<StateVector, PropagationError> {
        let (r, v) = self.propagate_minutes(self.minutes_since_epoch(at))?;
        Ok(StateVector {
            position: InertialPosition { x: r[0], y: r[1], z: r[2], at },
            velocity: v,
        })
    }

    /// Position (km) and velocity (km/s) `tsince` minutes after epoch.
    pub fn propagate_minutes(&self, tsince: f64) -> Result<([f64; 3], [f64; 3]), PropagationError> {
        let t = tsince;
        let vkmpersec = wgs72::RADIUS_KM * self.xke / 60.0;

        // Secular gravity and drag
        let xmdf = self.mo + self.mdot * t;
        let argpdf = self.argpo + self.argpdot * t;
        let nodedf = self.nodeo + self.nodedot * t;
        let mut argpm = argpdf;
        let mut mm = xmdf;
        let t2 = t * t;
        let mut nodem = nodedf + self.nodecf * t2;
        let mut tempa = 1.0 - self.cc1 * t;
        let mut tempe = self.bstar * self.cc4 * t;
        let mut templ = self.t2cof * t2;

        if !self.isimp {
            let delomg = self.omgcof * t;
            let delm = self.xmcof * ((1.0 + self.eta * xmdf.cos()).powi(3) - self.delmo);
            let temp = delomg + delm;
            mm = xmdf + temp;
            argpm = argpdf - temp;
            let t3 = t2 * t;
            let t4 = t3 * t;
            tempa -= self.d2 * t2 + self.d3 * t3 + self.d4 * t4;
            tempe += self.bstar * self.cc5 * (mm.sin() - self.sinmao);
            templ += self.t3cof * t3 + t4 * (self.t4cof + t * self.t5cof);
        }

        let nm = self.no_unkozai;
        let am = (self.xke / nm).powf(X2O3) * tempa * tempa;
        if am.is_nan() || am <= 0.0 {
            return Err(PropagationError::Decayed(format!(
                "drag reduced the semi-major axis to {:.4} Earth radii after {:.1} min",
                am, t
            )));
        }
        let nm = self.xke / am.powf(1.5);
        let mut em = self.ecco - tempe;

        if !(-0.001..1.0).contains(&em) {
            return Err(PropagationError::InvalidElements(format!(
                "mean eccentricity {} outside [0, 1) after {:.1} min",
                em, t
            )));
        }
        if em < 1.0e-6 {
            em = 1.0e-6;
        }
        mm += self.no_unkozai * templ;
        let xlm = (mm + argpm + nodem) % TWO_PI;
        nodem %= TWO_PI;
        argpm %= TWO_PI;
        mm = (xlm - argpm - nodem) % TWO_PI;

        let sinip = self.inclo.sin();
        let cosip = self.inclo.cos();

        // Long-period periodics
        let axnl = em * argpm.cos();
        let temp = 1.0 / (am * (1.0 - em * em));
        let aynl = em * argpm.sin() + temp * self.aycof;
        let xl = mm + argpm + nodem + temp * self.xlcof * axnl;

        let (sineo1, coseo1) = solve_kepler((xl - nodem) % TWO_PI, axnl, aynl)?;

        // Short-period preliminary quantities
        let ecose = axnl * coseo1 + aynl * sineo1;
        let esine = axnl * sineo1 - aynl * coseo1;
        let el2 = axnl * axnl + aynl * aynl;
        let pl = am * (1.0 - el2);
        if pl < 0.0 {
            return Err(PropagationError::InvalidElements(format!(
                "semi-latus rectum {} is negative after {:.1} min",
                pl, t
            )));
        }

        let rl = am * (1.0 - ecose);
        let rdotl = am.sqrt() * esine / rl;
        let rvdotl = pl.sqrt() / rl;
        let betal = (1.0 - el2).sqrt();
        let temp = esine / (1.0 + betal);
        let sinu = am / rl * (sineo1 - aynl - axnl * temp);
        let cosu = am / rl * (coseo1 - axnl + aynl * temp);
        let su = sinu.atan2(cosu);
        let sin2u = (cosu + cosu) * sinu;
        let cos2u = 1.0 - 2.0 * sinu * sinu;
        let temp = 1.0 / pl;
        let temp1 = 0.5 * wgs72::J2 * temp;
        let temp2 = temp1 * temp;

        // Short-period periodics
        let mrt = rl * (1.0 - 1.5 * temp2 * betal * self.con41) + 0.5 * temp1 * self.x1mth2 * cos2u;
        let su = su - 0.25 * temp2 * self.x7thm1 * sin2u;
        let xnode = nodem + 1.5 * temp2 * cosip * sin2u;
        let xinc = self.inclo + 1.5 * temp2 * cosip * sinip * cos2u;
        let mvt = rdotl - nm * temp1 * self.x1mth2 * sin2u / self.xke;
        let rvdot = rvdotl + nm * temp1 * (self.x1mth2 * cos2u + 1.5 * self.con41) / self.xke;

        if !(mrt >= 1.0) {
            return Err(PropagationError::Decayed(format!(
                "radius {:.3} km is below the Earth's surface after {:.1} min",
                mrt * wgs72::RADIUS_KM,
                t
            )));
        }

        // Orientation vectors
        let (sinsu, cossu) = su.sin_cos();
        let (snod, cnod) = xnode.sin_cos();
        let (sini, cosi) = xinc.sin_cos();
        let xmx = -snod * cosi;
        let xmy = cnod * cosi;
        let ux = xmx * sinsu + cnod * cossu;
        let uy = xmy * sinsu + snod * cossu;
        let uz = sini * sinsu;
        let vx = xmx * cossu - cnod * sinsu;
        let vy = xmy * cossu - snod * sinsu;
        let vz = sini * cossu;

        let mr = mrt * wgs72::RADIUS_KM;
        let r = [mr * ux, mr * uy, mr * uz];
        let v = [
            (mvt * ux + rvdot * vx) * vkmpersec,
            (mvt * uy + rvdot * vy) * vkmpersec,
            (mvt * uz + rvdot * vz) * vkmpersec,
        ];
        Ok((r, v))
    }
}

/// Propagate `elements` to `at`.
pub fn propagate(elements: &OrbitalElementSet, at: DateTime<Utc>) -> Result<StateVector, PropagationError> {
    Propagator::new(elements)?.propagate(at)
}

fn check_elements(elements: &OrbitalElementSet) -> Result<(), PropagationError> {
    let e = elements.eccentricity();
    if !(0.0..1.0).contains(&e) {
        return Err(PropagationError::InvalidElements(format!("eccentricity {} outside [0, 1)", e)));
    }
    let i = elements.inclination_deg();
    if !(0.0..=180.0).contains(&i) {
        return Err(PropagationError::InvalidElements(format!("inclination {} outside [0, 180] degrees", i)));
    }
    if elements.mean_motion().is_nan() || elements.mean_motion() <= 0.0 {
        return Err(PropagationError::InvalidElements(format!(
            "mean motion {} is not positive",
            elements.mean_motion()
        )));
    }
    Ok(())
}

/// Kepler's equation in equinoctial form, `U = E + aynl·cos E − axnl·sin E`,
/// solved for E by Newton steps clamped to ±0.95 rad. Returns (sin E, cos E).
fn solve_kepler(u: f64, axnl: f64, aynl: f64) -> Result<(f64, f64), PropagationError> {
    let mut eo1 = u;
    let mut step = f64::INFINITY;
    let mut iterations = 0;
    // NaN keeps iterating until the cap
    while !(step.abs() < KEPLER_TOLERANCE) {
        if iterations == KEPLER_MAX_ITERATIONS {
            return Err(PropagationError::KeplerNonConvergence { iterations, residual: step.abs() });
        }
        let (sineo1, coseo1) = eo1.sin_cos();
        step = (u - aynl * coseo1 + axnl * sineo1 - eo1) / (1.0 - coseo1 * axnl - sineo1 * aynl);
        step = step.clamp(-0.95, 0.95);
        eo1 += step;
        iterations += 1;
    }
    Ok(eo1.sin_cos())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tle;

    // Vallado et al. (2006) verification case, catalog 00005.
    const SAT5_1: &str = "1 00005U 58002B   00179.78495062  .00000023  00000-0  28098-4 0  4753";
    const SAT5_2: &str = "2 00005  34.2682 348.7242 1859667 331.7664  19.3264 10.82419157413667";

    fn assert_vec(actual: [f64; 3], expected: [f64; 3], tol: f64) {
        for k in 0..3 {
            assert!(
                (actual[k] - expected[k]).abs() < tol,
                "component {}: expected {}, got {}",
                k,
                expected[k],
                actual[k]
            );
        }
    }

    fn sat5() -> Propagator {
        Propagator::new(&tle::parse("VANGUARD 1", SAT5_1, SAT5_2).unwrap()).unwrap()
    }

    #[test]
    fn matches_verification_vector_at_epoch() {
        let (r, v) = sat5().propagate_minutes(0.0).unwrap();
        assert_vec(r, [7022.46529266, -1400.08296755, 0.03995155], 1e-3);
        assert_vec(v, [1.893841015, 6.405893759, 4.534807250], 1e-6);
    }

    #[test]
    fn matches_verification_vector_after_six_hours() {
        let (r, v) = sat5().propagate_minutes(360.0).unwrap();
        assert_vec(r, [-7154.03120202, -3783.17682504, -3536.19412294], 1e-3);
        assert_vec(v, [4.741887409, -4.151817765, -2.093935425], 1e-6);
    }

    #[test]
    fn kepler_solution_satisfies_equation() {
        let (axnl, aynl) = (0.15, -0.08);
        let u = 2.0;
        let (s, c) = solve_kepler(u, axnl, aynl).unwrap();
        let e = s.atan2(c);
        let residual = (e + aynl * c - axnl * s - u + PI).rem_euclid(TWO_PI) - PI;
        assert!(residual.abs() < 1e-11, "residual {}", residual);
    }

    #[test]
    fn kepler_circular_orbit_is_identity() {
        let (s, c) = solve_kepler(1.234, 0.0, 0.0).unwrap();
        assert!((s.atan2(c) - 1.234).abs() < 1e-15);
    }

    #[test]
    fn kepler_reports_non_convergence_near_parabolic() {
        match solve_kepler(1.0e-4, 0.999_99, 0.0) {
            Err(PropagationError::KeplerNonConvergence { iterations, residual }) => {
                assert_eq!(iterations, KEPLER_MAX_ITERATIONS);
                assert!(residual > KEPLER_TOLERANCE);
            }
            other => panic!("expected non-convergence, got {:?}", other),
        }
    }

    #[test]
    fn kepler_rejects_nan_anomaly() {
        assert!(matches!(
            solve_kepler(f64::NAN, 0.1, 0.1),
            Err(PropagationError::KeplerNonConvergence { .. })
        ));
    }

    #[test]
    fn nan_offset_is_an_error() {
        assert!(sat5().propagate_minutes(f64::NAN).is_err());
    }

    #[test]
    fn drag_drives_eccentricity_out_of_range() {
        // e = 0.1, B* = 0.2, perigee near 167 km: simplified drag model
        let e = tle::parse(
            "HIGH DRAG",
            "1 99998U 24001B   24001.00000000  .00000000  00000+0  20000-0 0  9999",
            "2 99998  51.6000   0.0000 1000000   0.0000   0.0000 14.00000000    15",
        )
        .unwrap();
        let p = Propagator::new(&e).unwrap();
        assert!(p.propagate_minutes(0.0).is_ok());
        match p.propagate_minutes(1440.0) {
            Err(PropagationError::InvalidElements(msg)) => assert!(msg.contains("eccentricity"), "{}", msg),
            other => panic!("expected InvalidElements, got {:?}", other),
        }
    }

    #[test]
    fn minutes_since_epoch_handles_negative_offsets() {
        let p = sat5();
        let before = p.epoch() - chrono::Duration::seconds(90);
        assert!((p.minutes_since_epoch(before) + 1.5).abs() < 1e-12);
    }

    #[test]
    fn xke_matches_wgs72_value() {
        assert!((wgs72::xke() - 0.074_366_916_133_17).abs() < 1e-12);
    }
}
