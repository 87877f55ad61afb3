//! Decision feedback equalizer with LMS tap adaptation.
//!
//! Per sample the held feedback term is subtracted from the input. On a
//! clock edge the equalized sample is sliced to `±vout`; in adaptive mode,
//! once the clock tracker is locked, every tap moves by
//! `step_size * error * delayed_decision` and is clamped into its bounds.
//! The decision is then pushed into the feedback filter, so the feedback
//! used on a sample only ever depends on edges strictly before it.

use crate::clock::ClockBlock;
use crate::error::{ConfigWarning, DspError, DspResult};
use crate::fir::Fir;
use tracing::{debug, warn};

/// Adaptation mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DfeMode {
    /// Pass-through.
    Off,
    /// Fixed taps: decisions and cancellation, no adaptation.
    Init,
    /// Closed loop LMS.
    Adaptive,
}

impl DfeMode {
    /// Accepts the names (case-insensitive) or the numeric codes 0, 1, 2.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "0" => Some(Self::Off),
            "init" | "fixed" | "1" => Some(Self::Init),
            "adaptive" | "adapt" | "2" => Some(Self::Adaptive),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "Off",
            Self::Init => "Init",
            Self::Adaptive => "Adaptive",
        }
    }
}

/// Configuration for [`Dfe::new`].
#[derive(Clone, Debug)]
pub struct DfeSettings {
    pub mode: DfeMode,
    pub taps: Vec<f64>,
    pub tap_min: Vec<f64>,
    pub tap_max: Vec<f64>,
    /// Slicer output magnitude.
    pub vout: f64,
    pub step_size: f64,
    pub samples_per_ui: usize,
}

/// Adaptive DFE stage.
#[derive(Clone, Debug)]
pub struct Dfe {
    mode: DfeMode,
    feedback: Fir,
    tap_min: Vec<f64>,
    tap_max: Vec<f64>,
    vout: f64,
    step_size: f64,
    samples_per_ui: usize,
    /// Feedback output held between edges.
    cancellation: f64,
    decisions: u64,
    scored: u64,
    error_energy: f64,
    warnings: Vec<ConfigWarning>,
}

impl Dfe {
    pub fn new(settings: DfeSettings) -> DspResult<Self> {
        let DfeSettings {
            mode,
            mut taps,
            tap_min,
            tap_max,
            vout,
            step_size,
            samples_per_ui,
        } = settings;

        if taps.is_empty() {
            return Err(DspError::EmptyCoefficients("DFE"));
        }
        for (name, bounds) in [("dfe.tap_min", &tap_min), ("dfe.tap_max", &tap_max)] {
            if bounds.len() != taps.len() {
                return Err(DspError::invalid(
                    name,
                    format!("{} bounds for {} taps", bounds.len(), taps.len()),
                ));
            }
        }
        if !(vout > 0.0) || !vout.is_finite() {
            return Err(DspError::invalid("dfe.vout", format!("{vout} must be positive")));
        }
        if !(step_size >= 0.0) || !step_size.is_finite() {
            return Err(DspError::invalid("dfe.step_size", format!("{step_size} must be non-negative")));
        }
        if samples_per_ui == 0 {
            return Err(DspError::ZeroOversample);
        }

        let mut warnings = Vec::new();
        for (tap, value) in taps.iter_mut().enumerate() {
            let (min, max) = (tap_min[tap], tap_max[tap]);
            if min > max {
                return Err(DspError::InvertedBounds { tap, min, max });
            }
            if *value < min || *value > max {
                warn!(tap, value = *value, min, max, "Clamping DFE initial tap");
                warnings.push(ConfigWarning::TapClamped {
                    tap,
                    value: *value,
                    min,
                    max,
                });
                *value = value.clamp(min, max);
            }
        }

        debug!(mode = mode.as_str(), taps = taps.len(), step_size, vout, "Configured DFE stage");

        Ok(Self {
            mode,
            feedback: Fir::new(taps, 1)?,
            tap_min,
            tap_max,
            vout,
            step_size,
            samples_per_ui,
            cancellation: 0.0,
            decisions: 0,
            scored: 0,
            error_energy: 0.0,
            warnings,
        })
    }

    pub fn mode(&self) -> DfeMode {
        self.mode
    }

    pub fn taps(&self) -> &[f64] {
        self.feedback.weights()
    }

    pub fn bounds(&self) -> (&[f64], &[f64]) {
        (&self.tap_min, &self.tap_max)
    }

    /// Hard decision for one sampled value (zero slices high).
    #[inline]
    pub fn slice(&self, y: f64) -> f64 {
        if y >= 0.0 {
            self.vout
        } else {
            -self.vout
        }
    }

    /// Equalize a block in place using the edge marks of the same block.
    pub fn process(&mut self, wave: &mut [f64], clock: &ClockBlock<'_>) {
        if self.mode == DfeMode::Off {
            return;
        }

        for (n, x) in wave.iter_mut().enumerate() {
            let y = *x - self.cancellation;
            *x = y;

            if !clock.edge_at(n) {
                continue;
            }

            let decision = self.slice(y);
            if clock.locked_at(n) {
                let error = y - decision;
                self.error_energy += error * error;
                self.scored += 1;
                if self.mode == DfeMode::Adaptive {
                    self.adapt(error);
                }
            }
            self.cancellation = self.feedback.step(decision);
            self.decisions += 1;
        }
    }

    fn adapt(&mut self, error: f64) {
        let step = self.step_size * error;
        for tap in 0..self.feedback.num_taps() {
            let delayed = self.feedback.delay_value(tap);
            let weights = self.feedback.weights_mut();
            weights[tap] = (weights[tap] + step * delayed).clamp(self.tap_min[tap], self.tap_max[tap]);
        }
    }

    /// Linear equivalent of the fixed feedback on an impulse response.
    ///
    /// Tap `i` removes `w_i * h[main] / vout` over the one-UI window centred
    /// `i + 1` UIs after the main cursor. No adaptation happens here.
    pub fn apply_to_impulse(&self, impulse: &mut [f64]) {
        if self.mode == DfeMode::Off || impulse.is_empty() {
            return;
        }

        let Some(main) = peak_index(impulse) else { return };
        let main_value = impulse[main];
        let ui = self.samples_per_ui;

        for (i, w) in self.feedback.weights().iter().enumerate() {
            let center = main + (i + 1) * ui;
            let start = center.saturating_sub(ui / 2);
            let end = (start + ui).min(impulse.len());
            if start >= end {
                break;
            }
            let amount = w * main_value / self.vout;
            for sample in &mut impulse[start..end] {
                *sample -= amount;
            }
        }
    }

    /// Clear the feedback history and error statistics; taps are kept.
    pub fn reset(&mut self) {
        self.feedback.reset();
        self.cancellation = 0.0;
        self.decisions = 0;
        self.scored = 0;
        self.error_energy = 0.0;
    }

    /// Mean squared slicer error over the locked edges seen so far.
    pub fn mse(&self) -> f64 {
        if self.scored == 0 {
            0.0
        } else {
            self.error_energy / self.scored as f64
        }
    }

    pub fn decisions(&self) -> u64 {
        self.decisions
    }

    pub fn warnings(&self) -> &[ConfigWarning] {
        &self.warnings
    }
}

fn peak_index(samples: &[f64]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, v) in samples.iter().enumerate() {
        let mag = v.abs();
        if best.map_or(true, |(_, b)| mag > b) {
            best = Some((i, mag));
        }
    }
    best.map(|(i, _)| i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ClockTracker;
    use crate::prbs::PrbsGenerator;
    use lib_types::units::Seconds;

    const SPUI: usize = 4;

    fn settings(mode: DfeMode, taps: Vec<f64>, bound: f64) -> DfeSettings {
        let n = taps.len();
        DfeSettings {
            mode,
            taps,
            tap_min: vec![-bound; n],
            tap_max: vec![bound; n],
            vout: 1.0,
            step_size: 0.01,
            samples_per_ui: SPUI,
        }
    }

    fn clock(lock_after: u64) -> ClockTracker {
        ClockTracker::new(Seconds(SPUI as f64), Seconds(1.0), 0.5, lock_after).unwrap()
    }

    /// NRZ symbols through a UI-spaced ISI channel, held for a whole UI.
    fn channel_wave(symbols: &[f64], cursors: &[f64]) -> Vec<f64> {
        let mut wave = Vec::with_capacity(symbols.len() * SPUI);
        for k in 0..symbols.len() {
            let mut v = 0.0;
            for (j, c) in cursors.iter().enumerate() {
                if k >= j {
                    v += c * symbols[k - j];
                }
            }
            wave.extend(std::iter::repeat(v).take(SPUI));
        }
        wave
    }

    fn prbs_symbols(n: u64) -> Vec<f64> {
        let mut prbs = PrbsGenerator::new(7).unwrap();
        prbs.generate_bits(n)
            .into_iter()
            .map(|b| if b == 1 { 1.0 } else { -1.0 })
            .collect()
    }

    fn run(dfe: &mut Dfe, tracker: &mut ClockTracker, wave: &mut [f64]) -> Vec<f64> {
        let mut marks = vec![0.0; wave.len()];
        let locked_from = tracker.mark(&mut marks);
        dfe.process(
            wave,
            &ClockBlock {
                edges: &marks,
                locked_from,
            },
        );
        marks
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(DfeMode::parse("Adaptive"), Some(DfeMode::Adaptive));
        assert_eq!(DfeMode::parse("1"), Some(DfeMode::Init));
        assert_eq!(DfeMode::parse("off"), Some(DfeMode::Off));
        assert_eq!(DfeMode::parse("on"), None);
    }

    #[test]
    fn test_off_is_pass_through() {
        let mut dfe = Dfe::new(settings(DfeMode::Off, vec![0.3], 1.0)).unwrap();
        let mut tracker = clock(0);
        let mut wave = vec![0.5, -0.5, 1.0, -1.0, 0.25, 0.0, 0.0, 0.0];
        let original = wave.clone();
        run(&mut dfe, &mut tracker, &mut wave);
        assert_eq!(wave, original);
    }

    #[test]
    fn test_fixed_taps_cancel_post_cursor() {
        let symbols = prbs_symbols(400);
        let mut wave = channel_wave(&symbols, &[1.0, 0.5, 0.2]);

        let mut dfe = Dfe::new(settings(DfeMode::Init, vec![0.5, 0.2], 1.0)).unwrap();
        let mut tracker = clock(0);
        let marks = run(&mut dfe, &mut tracker, &mut wave);

        // From the third edge on, the sampled value is exactly the main cursor.
        let edges: Vec<usize> = (0..wave.len()).filter(|&n| marks[n] != 0.0).collect();
        for (k, &n) in edges.iter().enumerate().skip(2) {
            assert!((wave[n] - symbols[k]).abs() < 1e-12, "edge {k}");
        }
        assert!(dfe.mse() < 1e-12 * 10.0);
        assert_eq!(dfe.taps(), &[0.5, 0.2]);
    }

    #[test]
    fn test_causality() {
        let symbols = prbs_symbols(64);
        let base = channel_wave(&symbols, &[1.0, 0.6, -0.3]);

        let mut reference = base.clone();
        let mut dfe = Dfe::new(settings(DfeMode::Adaptive, vec![0.0, 0.0, 0.0], 1.0)).unwrap();
        run(&mut dfe, &mut clock(0), &mut reference);

        for t in [0usize, 17, 100, 200] {
            let mut perturbed = base.clone();
            for v in perturbed.iter_mut().skip(t + 1) {
                *v = -*v * 3.0 + 0.7;
            }
            let mut dfe = Dfe::new(settings(DfeMode::Adaptive, vec![0.0, 0.0, 0.0], 1.0)).unwrap();
            run(&mut dfe, &mut clock(0), &mut perturbed);

            assert_eq!(&perturbed[..=t], &reference[..=t], "output up to {t} changed");
        }
    }

    #[test]
    fn test_unlocked_clock_skips_adaptation() {
        let symbols = prbs_symbols(100);
        let mut wave = channel_wave(&symbols, &[1.0, 0.5, 0.2]);

        let mut cfg = settings(DfeMode::Adaptive, vec![0.5, 0.2], 1.0);
        cfg.step_size = 0.1;
        let mut dfe = Dfe::new(cfg).unwrap();
        let mut tracker = clock(1_000);
        let marks = run(&mut dfe, &mut tracker, &mut wave);

        assert!(!tracker.is_locked());
        assert_eq!(dfe.taps(), &[0.5, 0.2]);
        assert_eq!(dfe.decisions(), 100);

        // Slicing and cancellation still run while unlocked.
        let edges: Vec<usize> = (0..wave.len()).filter(|&n| marks[n] != 0.0).collect();
        assert_eq!(edges.len(), 100);
        for (k, &n) in edges.iter().enumerate().skip(2) {
            assert!((wave[n] - symbols[k]).abs() < 1e-12, "edge {k}");
        }
    }

    #[test]
    fn test_taps_stay_in_bounds() {
        let symbols = prbs_symbols(2000);
        let mut wave = channel_wave(&symbols, &[1.0, 0.8, 0.6, -0.5]);

        let mut dfe = Dfe::new(DfeSettings {
            step_size: 0.2,
            ..settings(DfeMode::Adaptive, vec![0.0, 0.0, 0.0], 0.25)
        })
        .unwrap();
        let mut tracker = clock(0);

        for chunk in wave.chunks_mut(SPUI * 7) {
            run(&mut dfe, &mut tracker, chunk);
            assert!(dfe.taps().iter().all(|w| (-0.25..=0.25).contains(w)));
        }
    }

    #[test]
    fn test_initial_taps_clamped_with_warning() {
        let dfe = Dfe::new(settings(DfeMode::Init, vec![0.9, -0.1], 0.5)).unwrap();
        assert_eq!(dfe.taps(), &[0.5, -0.1]);
        assert_eq!(dfe.warnings().len(), 1);

        let inverted = DfeSettings {
            tap_min: vec![0.5, -1.0],
            ..settings(DfeMode::Init, vec![0.0, 0.0], 0.1)
        };
        assert!(matches!(Dfe::new(inverted), Err(DspError::InvertedBounds { tap: 0, .. })));
    }

    #[test]
    fn test_lms_converges_to_channel_post_cursors() {
        let symbols = prbs_symbols(10_000);
        let mut wave = channel_wave(&symbols, &[1.0, 0.5, 0.2]);

        let mut dfe = Dfe::new(settings(DfeMode::Adaptive, vec![0.0, 0.0, 0.0], 1.0)).unwrap();
        let mut tracker = clock(8);
        let marks = run(&mut dfe, &mut tracker, &mut wave);

        let taps = dfe.taps();
        assert!((taps[0] - 0.5).abs() < 0.025);
        assert!((taps[1] - 0.2).abs() < 0.01);
        assert!(taps[2].abs() < 0.01);

        let errors: Vec<f64> = (0..wave.len())
            .filter(|&n| marks[n] != 0.0)
            .map(|n| {
                let d = if wave[n] >= 0.0 { 1.0 } else { -1.0 };
                (wave[n] - d).powi(2)
            })
            .collect();
        let early: f64 = errors[8..1008].iter().sum::<f64>() / 1000.0;
        let late: f64 = errors[errors.len() - 1000..].iter().sum::<f64>() / 1000.0;
        assert!(late < early);
        assert!(late < 1e-6);
    }

    #[test]
    fn test_impulse_equivalent() {
        let mut impulse = vec![0.0; 24];
        impulse[4] = 1.0;
        for v in &mut impulse[6..10] {
            *v = 0.5;
        }

        let dfe = Dfe::new(settings(DfeMode::Init, vec![0.5], 1.0)).unwrap();
        dfe.apply_to_impulse(&mut impulse);

        assert!((impulse[4] - 1.0).abs() < 1e-15);
        assert!(impulse[6..10].iter().all(|v| v.abs() < 1e-15));
        assert!(impulse[10..].iter().all(|v| v.abs() < 1e-15));
    }
}
