//! Recursive (IIR) equalizer in Direct Form II.
//!
//! Coefficients are fixed at configuration. Before the filter is accepted
//! its poles are located; any pole on or outside the unit circle (within
//! the root finder's accuracy for repeated roots) is pulled
//! radially to `max_pole_radius` and the denominator is rebuilt from the
//! clamped roots, so every accepted filter is BIBO stable.

use crate::error::{ConfigWarning, DspError, DspResult};
use lib_types::units::{Hertz, Seconds};
use num_complex::Complex64;
use tracing::{debug, warn};

/// Default radius unstable poles are pulled back to.
pub const DEFAULT_MAX_POLE_RADIUS: f64 = 0.999;

const ROOT_MAX_ITER: usize = 500;
const ROOT_TOLERANCE: f64 = 1e-14;

/// A repeated root is only located to about `eps^(1/m)`, so poles this
/// close to the unit circle are treated as on it.
const UNIT_CIRCLE_TOLERANCE: f64 = 1e-4;

/// Direct Form II IIR filter.
#[derive(Clone, Debug)]
pub struct Iir {
    numerator: Vec<f64>,
    denominator: Vec<f64>,
    state: Vec<f64>,
    poles: Vec<Complex64>,
    warnings: Vec<ConfigWarning>,
}

impl Iir {
    /// Configure with the default pole radius.
    pub fn new(numerator: &[f64], denominator: &[f64]) -> DspResult<Self> {
        Self::with_max_pole_radius(numerator, denominator, DEFAULT_MAX_POLE_RADIUS)
    }

    /// Configure a filter. The denominator is normalized so `a[0] == 1`
    /// and both vectors are zero-padded to the same order.
    pub fn with_max_pole_radius(
        numerator: &[f64],
        denominator: &[f64],
        max_pole_radius: f64,
    ) -> DspResult<Self> {
        if numerator.is_empty() {
            return Err(DspError::EmptyCoefficients("IIR numerator"));
        }
        if denominator.is_empty() {
            return Err(DspError::EmptyCoefficients("IIR denominator"));
        }
        if numerator.iter().chain(denominator).any(|c| !c.is_finite()) {
            return Err(DspError::NonFiniteCoefficient("IIR"));
        }
        if !(max_pole_radius > 0.0 && max_pole_radius < 1.0) {
            return Err(DspError::invalid(
                "max_pole_radius",
                format!("{max_pole_radius} must lie in (0, 1)"),
            ));
        }

        let a0 = denominator[0];
        if a0 == 0.0 {
            return Err(DspError::ZeroLeadingCoefficient);
        }

        let order = numerator.len().max(denominator.len());
        let mut b: Vec<f64> = numerator.iter().map(|c| c / a0).collect();
        let mut a: Vec<f64> = denominator.iter().map(|c| c / a0).collect();
        b.resize(order, 0.0);
        a.resize(order, 0.0);

        let mut poles = find_roots(&a)?;
        let mut warnings = Vec::new();

        for (index, pole) in poles.iter_mut().enumerate() {
            let magnitude = pole.norm();
            if magnitude > max_pole_radius && magnitude >= 1.0 - UNIT_CIRCLE_TOLERANCE {
                *pole *= max_pole_radius / magnitude;
                warn!(index, magnitude, radius = max_pole_radius, "Clamping unstable IIR pole");
                warnings.push(ConfigWarning::PoleClamped {
                    index,
                    magnitude,
                    radius: max_pole_radius,
                });
            }
        }

        if !warnings.is_empty() {
            let rebuilt = poly_from_roots(&poles);
            a[1..].copy_from_slice(&rebuilt[1..]);
        }

        debug!(order = order - 1, clamped = warnings.len(), "Configured IIR stage");

        Ok(Self {
            numerator: b,
            denominator: a,
            state: vec![0.0; order],
            poles,
            warnings,
        })
    }

    /// One-zero/one-pole high-frequency boost (CTLE).
    ///
    /// DC gain is 1 and gain at Nyquist is `boost_db`. The analog prototype
    /// `g (s + wz) / (s + wp)` with `wp = 2π·peak_freq`, `wz = wp / g` is
    /// mapped with the bilinear transform.
    pub fn ctle(peak_freq: Hertz, boost_db: f64, sample_interval: Seconds) -> DspResult<Self> {
        if !(peak_freq.0 > 0.0) || !peak_freq.0.is_finite() {
            return Err(DspError::invalid("ctle.peak_freq", format!("{} must be positive", peak_freq.0)));
        }
        if !boost_db.is_finite() {
            return Err(DspError::invalid("ctle.boost_db", "must be finite"));
        }
        if !sample_interval.is_positive() {
            return Err(DspError::invalid("sample_interval", "must be positive"));
        }

        let wp = peak_freq.angular();
        let g = 10f64.powf(boost_db / 20.0);
        let wz = wp / g;
        let k = 2.0 / sample_interval.0;

        let norm = k + wp;
        let b = [g * (k + wz) / norm, g * (wz - k) / norm];
        let a = [1.0, (wp - k) / norm];
        Self::new(&b, &a)
    }

    pub fn numerator(&self) -> &[f64] {
        &self.numerator
    }

    pub fn denominator(&self) -> &[f64] {
        &self.denominator
    }

    /// Poles after clamping.
    pub fn poles(&self) -> &[Complex64] {
        &self.poles
    }

    pub fn order(&self) -> usize {
        self.state.len() - 1
    }

    /// Process one sample.
    #[inline]
    pub fn step(&mut self, x: f64) -> f64 {
        let n = self.state.len();
        let mut w = x;
        for j in 1..n {
            w -= self.state[j] * self.denominator[j];
        }
        self.state[0] = w;

        let y: f64 = self
            .state
            .iter()
            .zip(&self.numerator)
            .map(|(s, b)| s * b)
            .sum();

        for j in (1..n).rev() {
            self.state[j] = self.state[j - 1];
        }
        y
    }

    /// Filter a buffer in place, carrying state across calls.
    pub fn apply(&mut self, buffer: &mut [f64]) {
        for x in buffer.iter_mut() {
            *x = self.step(*x);
        }
    }

    pub fn reset(&mut self) {
        self.state.fill(0.0);
    }

    /// Complex response at normalized angular frequency `omega` (rad/sample).
    pub fn response_at(&self, omega: f64) -> Complex64 {
        let z_inv = Complex64::from_polar(1.0, -omega);
        let eval = |coeffs: &[f64]| {
            coeffs
                .iter()
                .rev()
                .fold(Complex64::new(0.0, 0.0), |acc, &c| acc * z_inv + c)
        };
        eval(&self.numerator) / eval(&self.denominator)
    }

    pub fn warnings(&self) -> &[ConfigWarning] {
        &self.warnings
    }
}

/// Roots of the monic polynomial `z^n + a[1] z^(n-1) + ... + a[n]`.
fn find_roots(a: &[f64]) -> DspResult<Vec<Complex64>> {
    let n = a.len() - 1;
    match n {
        0 => Ok(Vec::new()),
        1 => Ok(vec![Complex64::new(-a[1], 0.0)]),
        2 => {
            let disc = Complex64::new(a[1] * a[1] - 4.0 * a[2], 0.0).sqrt();
            Ok(vec![(-a[1] + disc) / 2.0, (-a[1] - disc) / 2.0])
        }
        _ => durand_kerner(a),
    }
}

fn durand_kerner(a: &[f64]) -> DspResult<Vec<Complex64>> {
    let n = a.len() - 1;
    let eval = |z: Complex64| {
        a.iter()
            .fold(Complex64::new(0.0, 0.0), |acc, &c| acc * z + c)
    };

    let seed = Complex64::new(0.4, 0.9);
    let mut roots: Vec<Complex64> = (0..n).map(|k| seed.powu(k as u32)).collect();

    for _ in 0..ROOT_MAX_ITER {
        let mut max_delta: f64 = 0.0;
        for k in 0..n {
            let mut denom = Complex64::new(1.0, 0.0);
            for j in 0..n {
                if j != k {
                    denom *= roots[k] - roots[j];
                }
            }
            if denom.norm() == 0.0 {
                roots[k] += Complex64::new(1e-9, 1e-9);
                max_delta = f64::INFINITY;
                continue;
            }
            let delta = eval(roots[k]) / denom;
            roots[k] -= delta;
            max_delta = max_delta.max(delta.norm());
        }
        if max_delta < ROOT_TOLERANCE {
            return Ok(roots);
        }
    }

    if roots.iter().all(|r| r.is_finite() && eval(*r).norm() < 1e-8) {
        return Ok(roots);
    }
    Err(DspError::NumericalInstability(format!(
        "pole search did not converge for order {n}"
    )))
}

/// Monic polynomial coefficients (highest power first) from its roots.
fn poly_from_roots(roots: &[Complex64]) -> Vec<f64> {
    let mut coeffs = vec![Complex64::new(1.0, 0.0)];
    for root in roots {
        let mut next = vec![Complex64::new(0.0, 0.0); coeffs.len() + 1];
        for (i, c) in coeffs.iter().enumerate() {
            next[i] += c;
            next[i + 1] -= c * root;
        }
        coeffs = next;
    }
    coeffs.into_iter().map(|c| c.re).collect()
}
