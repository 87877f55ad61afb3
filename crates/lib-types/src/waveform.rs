//! Time-domain waveform representation.
//!
//! Samples are point measurements: `samples[i]` is taken at
//! `t_start + i * dt`. The AMI boundary itself only ever sees bare sample
//! slices; `Waveform` is what host-side code (the CLI, tests) builds
//! before handing `samples` across.

use crate::units::Seconds;
use serde::{Deserialize, Serialize};

/// A uniformly-sampled time-domain waveform.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Waveform {
    /// Sample values (voltage or normalized units).
    pub samples: Vec<f64>,

    /// Time step between consecutive samples.
    pub dt: Seconds,

    /// Time of the first sample.
    pub t_start: Seconds,
}

impl Waveform {
    /// Create a new waveform from samples.
    pub fn new(samples: Vec<f64>, dt: Seconds, t_start: Seconds) -> Self {
        Self { samples, dt, t_start }
    }

    /// Create a zero-valued waveform of specified length.
    pub fn zeros(len: usize, dt: Seconds) -> Self {
        Self {
            samples: vec![0.0; len],
            dt,
            t_start: Seconds::ZERO,
        }
    }

    /// Ideal impulse: 1 at index 0, 0 elsewhere.
    pub fn unit_impulse(len: usize, dt: Seconds) -> Self {
        let mut wf = Self::zeros(len, dt);
        if let Some(first) = wf.samples.first_mut() {
            *first = 1.0;
        }
        wf
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Total duration of the waveform (`len * dt`).
    #[inline]
    pub fn duration(&self) -> Seconds {
        Seconds(self.samples.len() as f64 * self.dt.0)
    }

    /// Get the time value for a given sample index.
    #[inline]
    pub fn time_at(&self, index: usize) -> Seconds {
        Seconds(self.t_start.0 + index as f64 * self.dt.0)
    }

    /// Peak-to-peak amplitude.
    pub fn peak_to_peak(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let (min, max) = self.samples.iter().fold((f64::MAX, f64::MIN), |(min, max), &v| {
            (min.min(v), max.max(v))
        });
        max - min
    }

    /// Index of the largest-magnitude sample (first one on ties).
    pub fn peak_index(&self) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (i, v) in self.samples.iter().enumerate() {
            let mag = v.abs();
            if best.map_or(true, |(_, b)| mag > b) {
                best = Some((i, mag));
            }
        }
        best.map(|(i, _)| i)
    }

    /// Sample the waveform once per UI around `center`: `pre` cursors
    /// before it, `post` after. Indices outside the waveform read as 0.
    ///
    /// Used to read pre/main/post cursors off an equalized impulse.
    pub fn cursors(&self, center: usize, samples_per_ui: usize, pre: usize, post: usize) -> Vec<f64> {
        let mut out = Vec::with_capacity(pre + post + 1);
        for k in 0..(pre + post + 1) {
            let offset = k as isize - pre as isize;
            let idx = center as isize + offset * samples_per_ui as isize;
            let value = if idx >= 0 {
                self.samples.get(idx as usize).copied().unwrap_or(0.0)
            } else {
                0.0
            };
            out.push(value);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_waveform_basics() {
        let samples = vec![0.0, 0.5, 1.0, 0.5, 0.0];
        let wf = Waveform::new(samples, Seconds::from_ps(10.0), Seconds::ZERO);

        assert_eq!(wf.len(), 5);
        assert!((wf.duration().as_ps() - 50.0).abs() < 0.01);
        assert!((wf.peak_to_peak() - 1.0).abs() < 0.001);
        assert_eq!(wf.peak_index(), Some(2));
    }

    #[test]
    fn test_cursors_pad_outside_range() {
        let mut wf = Waveform::zeros(12, Seconds::from_ps(1.0));
        wf.samples[0] = -0.1;
        wf.samples[4] = 0.8;
        wf.samples[8] = -0.2;

        let c = wf.cursors(4, 4, 2, 2);
        assert_eq!(c, vec![0.0, -0.1, 0.8, -0.2, 0.0]);
    }

    #[test]
    fn test_unit_impulse() {
        let wf = Waveform::unit_impulse(4, Seconds::from_ps(1.0));
        assert_eq!(wf.samples, vec![1.0, 0.0, 0.0, 0.0]);
        assert!(Waveform::unit_impulse(0, Seconds::from_ps(1.0)).is_empty());
    }
}
