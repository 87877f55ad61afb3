//! Oversampled feed-forward FIR filter.
//!
//! Weight `i` multiplies the input `oversample * i` samples behind the
//! current one, so a symbol-spaced tap vector can run on a waveform with
//! several samples per UI. The same filter is the Tx FFE and the feedback
//! path of the DFE (where it runs at one step per decision).

use crate::error::{ConfigWarning, DspError, DspResult};
use tracing::warn;

/// FIR filter with a circular delay line.
#[derive(Clone, Debug)]
pub struct Fir {
    weights: Vec<f64>,
    oversample: usize,
    /// `taps * oversample` past inputs, newest at `head`.
    delay: Vec<f64>,
    head: usize,
    warnings: Vec<ConfigWarning>,
}

impl Fir {
    /// Configure a filter. Empty weights or an oversample factor of 0 are rejected.
    pub fn new(weights: Vec<f64>, oversample: usize) -> DspResult<Self> {
        if weights.is_empty() {
            return Err(DspError::EmptyCoefficients("FIR"));
        }
        if oversample == 0 {
            return Err(DspError::ZeroOversample);
        }
        if weights.iter().any(|w| !w.is_finite()) {
            return Err(DspError::NonFiniteCoefficient("FIR"));
        }

        let delay_len = weights.len() * oversample;
        Ok(Self {
            weights,
            oversample,
            delay: vec![0.0; delay_len],
            head: 0,
            warnings: Vec::new(),
        })
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Live weights, for in-place adaptation.
    pub fn weights_mut(&mut self) -> &mut [f64] {
        &mut self.weights
    }

    /// Replace the weights; the tap count is fixed for the filter's lifetime.
    pub fn set_weights(&mut self, weights: &[f64]) -> DspResult<()> {
        if weights.len() != self.weights.len() {
            return Err(DspError::LengthMismatch {
                expected: self.weights.len(),
                actual: weights.len(),
            });
        }
        if weights.iter().any(|w| !w.is_finite()) {
            return Err(DspError::NonFiniteCoefficient("FIR"));
        }
        self.weights.copy_from_slice(weights);
        Ok(())
    }

    pub fn oversample(&self) -> usize {
        self.oversample
    }

    pub fn num_taps(&self) -> usize {
        self.weights.len()
    }

    pub fn delay_len(&self) -> usize {
        self.delay.len()
    }

    /// Input seen `oversample * tap` samples ago (the sample multiplied by weight `tap`).
    #[inline]
    pub fn delay_value(&self, tap: usize) -> f64 {
        let len = self.delay.len();
        let back = tap * self.oversample;
        if back >= len {
            return 0.0;
        }
        self.delay[(self.head + len - back) % len]
    }

    /// Push one input sample and return the filter output.
    #[inline]
    pub fn step(&mut self, x: f64) -> f64 {
        let len = self.delay.len();
        self.head = (self.head + 1) % len;
        self.delay[self.head] = x;
        self.output()
    }

    /// Output for the current delay-line contents, without pushing anything.
    #[inline]
    pub fn output(&self) -> f64 {
        let len = self.delay.len();
        self.weights
            .iter()
            .enumerate()
            .map(|(i, w)| w * self.delay[(self.head + len - i * self.oversample) % len])
            .sum()
    }

    /// Filter a buffer in place, carrying state across calls.
    pub fn apply(&mut self, buffer: &mut [f64]) {
        for x in buffer.iter_mut() {
            *x = self.step(*x);
        }
    }

    /// Clear the delay line.
    pub fn reset(&mut self) {
        self.delay.fill(0.0);
        self.head = 0;
    }

    pub fn sum_abs(&self) -> f64 {
        self.weights.iter().map(|w| w.abs()).sum()
    }

    /// Check `Σ|w|` against `budget`. With `normalize` the weights are scaled
    /// down to the budget; otherwise they are kept and only the warning is
    /// recorded.
    pub fn enforce_budget(&mut self, budget: f64, tolerance: f64, normalize: bool) -> DspResult<()> {
        if !(budget > 0.0) {
            return Err(DspError::invalid("tap budget", format!("{budget} must be positive")));
        }

        let sum = self.sum_abs();
        if sum <= budget + tolerance {
            return Ok(());
        }

        if normalize {
            let scale = budget / sum;
            for w in &mut self.weights {
                *w *= scale;
            }
        }

        let warning = ConfigWarning::TapBudget {
            sum,
            budget,
            normalized: normalize,
        };
        warn!(sum, budget, normalize, "FIR tap budget exceeded");
        self.warnings.push(warning);
        Ok(())
    }

    pub fn warnings(&self) -> &[ConfigWarning] {
        &self.warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_impulse_reproduces_weights() {
        let weights = vec![0.25, 1.0, -0.25, -0.10];
        let mut fir = Fir::new(weights, 1).unwrap();

        let mut buffer = vec![0.0; 8];
        buffer[0] = 1.0;
        fir.apply(&mut buffer);

        let expected = [0.25, 1.0, -0.25, -0.10, 0.0, 0.0, 0.0, 0.0];
        for (got, want) in buffer.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-15);
        }
    }

    #[test]
    fn test_oversampled_taps_are_symbol_spaced() {
        let mut fir = Fir::new(vec![1.0, -0.5], 4).unwrap();
        assert_eq!(fir.delay_len(), 8);

        let mut buffer = vec![0.0; 10];
        buffer[0] = 1.0;
        fir.apply(&mut buffer);

        assert!((buffer[0] - 1.0).abs() < 1e-15);
        assert!((buffer[4] + 0.5).abs() < 1e-15);
        let others: f64 = buffer
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != 0 && *i != 4)
            .map(|(_, v)| v.abs())
            .sum();
        assert!(others < 1e-15);
    }

    #[test]
    fn test_state_carries_across_calls() {
        let mut whole = Fir::new(vec![0.5, 0.3, 0.2], 2).unwrap();
        let mut split = whole.clone();

        let input: Vec<f64> = (0..20).map(|i| ((i * 7) % 5) as f64 - 2.0).collect();
        let mut a = input.clone();
        whole.apply(&mut a);

        let mut b = input;
        let (first, second) = b.split_at_mut(7);
        split.apply(first);
        split.apply(second);

        assert_eq!(a, b);
    }

    #[test]
    fn test_delay_value_tracks_history() {
        let mut fir = Fir::new(vec![0.0; 3], 1).unwrap();
        fir.step(1.0);
        fir.step(2.0);
        fir.step(3.0);
        assert_eq!(fir.delay_value(0), 3.0);
        assert_eq!(fir.delay_value(1), 2.0);
        assert_eq!(fir.delay_value(2), 1.0);
        assert_eq!(fir.delay_value(3), 0.0);
    }

    #[test]
    fn test_rejects_bad_configuration() {
        assert_eq!(Fir::new(vec![], 1).unwrap_err(), DspError::EmptyCoefficients("FIR"));
        assert_eq!(Fir::new(vec![1.0], 0).unwrap_err(), DspError::ZeroOversample);
        assert!(Fir::new(vec![f64::NAN], 1).is_err());

        let mut fir = Fir::new(vec![1.0, 0.0], 1).unwrap();
        assert!(fir.set_weights(&[1.0]).is_err());
    }

    #[test]
    fn test_budget_normalize_and_warn() {
        let mut fir = Fir::new(vec![-0.2, 1.0, -0.3], 1).unwrap();
        fir.enforce_budget(1.0, 1e-9, true).unwrap();
        assert!((fir.sum_abs() - 1.0).abs() < 1e-12);
        assert_eq!(fir.warnings().len(), 1);

        let mut kept = Fir::new(vec![-0.2, 1.0, -0.3], 1).unwrap();
        kept.enforce_budget(1.0, 1e-9, false).unwrap();
        assert!((kept.sum_abs() - 1.5).abs() < 1e-12);
        assert!(matches!(
            kept.warnings()[0],
            ConfigWarning::TapBudget { normalized: false, .. }
        ));

        let mut within = Fir::new(vec![0.1, 0.9], 1).unwrap();
        within.enforce_budget(1.0, 1e-9, true).unwrap();
        assert!(within.warnings().is_empty());
    }
}
