//! Frequency-domain view of an equalized impulse response.
//!
//! Used to report how much high-frequency boost a configured pipeline
//! provides: the gain at the data Nyquist frequency relative to DC.

use crate::error::{DspError, DspResult};
use lib_types::units::{Hertz, Seconds};
use num_complex::Complex64;
use realfft::RealFftPlanner;

/// Smallest transform used, so short impulses still get fine bins.
const MIN_FFT_LEN: usize = 1024;

/// FFT engine with a cached real-input planner.
pub struct FftEngine {
    planner: RealFftPlanner<f64>,
}

impl FftEngine {
    pub fn new() -> Self {
        Self {
            planner: RealFftPlanner::new(),
        }
    }

    /// Forward real-to-complex FFT.
    ///
    /// Input: N real samples (power of two)
    /// Output: N/2 + 1 complex samples
    pub fn rfft(&mut self, data: &[f64]) -> DspResult<Vec<Complex64>> {
        let len = data.len();
        if len == 0 || !len.is_power_of_two() {
            return Err(DspError::invalid("fft length", format!("{len} is not a power of two")));
        }

        let r2c = self.planner.plan_fft_forward(len);
        let mut input = data.to_vec();
        let mut output = r2c.make_output_vec();
        r2c.process(&mut input, &mut output)
            .map_err(|e| DspError::NumericalInstability(e.to_string()))?;
        Ok(output)
    }
}

impl Default for FftEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Magnitude response of an impulse response sampled at `sample_interval`.
#[derive(Clone, Debug)]
pub struct MagnitudeResponse {
    pub magnitudes: Vec<f64>,
    /// Bin spacing.
    pub df: Hertz,
}

impl MagnitudeResponse {
    /// Zero-pad the impulse and transform it.
    pub fn from_impulse(impulse: &[f64], sample_interval: Seconds) -> DspResult<Self> {
        if impulse.is_empty() {
            return Err(DspError::InsufficientData { needed: 1, got: 0 });
        }
        if !sample_interval.is_positive() {
            return Err(DspError::invalid("sample_interval", "must be positive"));
        }

        let n = (impulse.len() * 2).next_power_of_two().max(MIN_FFT_LEN);
        let mut padded = impulse.to_vec();
        padded.resize(n, 0.0);

        let spectrum = FftEngine::new().rfft(&padded)?;
        Ok(Self {
            magnitudes: spectrum.iter().map(|c| c.norm()).collect(),
            df: Hertz(1.0 / (n as f64 * sample_interval.0)),
        })
    }

    /// Magnitude at the bin nearest `freq` (clamped to the last bin).
    pub fn at(&self, freq: Hertz) -> f64 {
        let bin = (freq.0 / self.df.0).round().max(0.0) as usize;
        let last = self.magnitudes.len() - 1;
        self.magnitudes[bin.min(last)]
    }

    pub fn dc(&self) -> f64 {
        self.magnitudes[0]
    }
}

/// Gain at the data Nyquist frequency over DC gain, in dB.
pub fn boost_db(impulse: &[f64], sample_interval: Seconds, bit_time: Seconds) -> DspResult<f64> {
    if !bit_time.is_positive() {
        return Err(DspError::invalid("bit_time", "must be positive"));
    }
    let response = MagnitudeResponse::from_impulse(impulse, sample_interval)?;

    let dc = response.dc();
    let peak = response.magnitudes.iter().cloned().fold(0.0, f64::max);
    if dc <= peak * 1e-12 {
        return Err(DspError::NumericalInstability(
            "impulse has no DC content".to_string(),
        ));
    }

    let nyquist = Hertz(0.5 / bit_time.0);
    Ok(20.0 * (response.at(nyquist) / dc).log10())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_impulse_has_no_boost() {
        let mut impulse = vec![0.0; 64];
        impulse[0] = 1.0;
        let boost = boost_db(&impulse, Seconds::from_ps(10.0), Seconds::from_ps(40.0)).unwrap();
        assert!(boost.abs() < 1e-9);
    }

    #[test]
    fn test_de_emphasis_boost() {
        // Symbol-spaced taps [-0.1, 0.8, -0.1] at 4 samples per UI.
        let mut impulse = vec![0.0; 64];
        impulse[0] = -0.1;
        impulse[4] = 0.8;
        impulse[8] = -0.1;

        let boost = boost_db(&impulse, Seconds::from_ps(10.0), Seconds::from_ps(40.0)).unwrap();
        let expected = 20.0 * (1.0f64 / 0.6).log10();
        assert!((boost - expected).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_zero_dc() {
        let impulse = vec![1.0, -1.0, 0.0, 0.0];
        assert!(boost_db(&impulse, Seconds::from_ps(10.0), Seconds::from_ps(20.0)).is_err());
    }

    #[test]
    fn test_rfft_rejects_odd_length() {
        let mut engine = FftEngine::new();
        assert!(engine.rfft(&[1.0, 2.0, 3.0]).is_err());
        assert_eq!(engine.rfft(&[1.0, 0.0, 0.0, 0.0]).unwrap().len(), 3);
    }
}
