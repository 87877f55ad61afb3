//! In-process lane runs against the model.

use crate::config::RunConfig;
use anyhow::{Context, Result};
use lib_ami_model::{InitRequest, SessionRegistry};
use lib_dsp::PrbsGenerator;
use lib_params::ParameterView;
use lib_types::units::Seconds;
use lib_types::waveform::Waveform;
use rayon::prelude::*;
use serde::Serialize;

/// UIs of trailing zeros after the last channel cursor in the impulse.
const IMPULSE_TAIL_UI: usize = 32;

/// Results of one lane.
#[derive(Clone, Debug, Serialize)]
pub struct LaneResult {
    pub lane: usize,
    pub message: String,
    /// Equalized impulse sampled once per UI: one pre-cursor, main, posts.
    pub cursors: Vec<f64>,
    pub boost_db: Option<f64>,
    pub dfe_taps: Vec<f64>,
    pub dfe_mse: Option<f64>,
    pub cdr_locked: bool,
    pub edges: usize,
    /// Slicer errors against the transmitted symbols.
    pub bit_errors: usize,
    /// Smallest sampled magnitude over the second half of the run.
    pub eye_opening: f64,
}

/// Results of a full run.
#[derive(Clone, Debug, Serialize)]
pub struct RunResults {
    pub name: String,
    pub data_rate_gbps: f64,
    pub samples_per_ui: usize,
    pub lanes: Vec<LaneResult>,
}

/// Drives one model session per lane.
pub struct Runner {
    config: RunConfig,
    registry: SessionRegistry,
}

impl Runner {
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            registry: SessionRegistry::new(),
        }
    }

    /// Run all lanes concurrently.
    pub fn run(&self) -> Result<RunResults> {
        tracing::info!(
            name = %self.config.name,
            lanes = self.config.lanes,
            bits = self.config.stimulus.num_bits,
            "Starting run"
        );

        let lanes = (0..self.config.lanes)
            .into_par_iter()
            .map(|lane| self.run_lane(lane))
            .collect::<Result<Vec<_>>>()?;

        let live = self.registry.live_sessions();
        if live != 0 {
            tracing::warn!(live, "Sessions left open after run");
        }

        Ok(RunResults {
            name: self.config.name.clone(),
            data_rate_gbps: self.config.data_rate_gbps,
            samples_per_ui: self.config.samples_per_ui,
            lanes,
        })
    }

    fn run_lane(&self, lane: usize) -> Result<LaneResult> {
        let spui = self.config.samples_per_ui;
        let cursors = &self.config.channel.cursors;

        let mut impulse = channel_impulse(cursors, spui);
        let row_count = impulse.len();
        let id = self
            .registry
            .initialize(InitRequest {
                impulse: &mut impulse,
                row_count,
                aggressors: 0,
                sample_interval: self.config.sample_interval(),
                bit_time: self.config.bit_time(),
                parameters: self.config.parameter_text(),
            })
            .with_context(|| format!("Lane {lane}: model initialization failed"))?;

        let message = self.registry.with_slot(id, |slot| slot.session.message().to_string())?;
        let equalized = Waveform::new(impulse, self.config.sample_interval(), Seconds::ZERO);
        let main = equalized.peak_index().unwrap_or(0);
        let impulse_cursors = equalized.cursors(main, spui, 1, cursors.len());

        let symbols = lane_symbols(self.config.stimulus.prbs_order, lane, self.config.stimulus.num_bits)?;
        let mut wave = channel_wave(&symbols, cursors, spui);
        let mut clock = vec![0.0; wave.len()];

        let block = self.config.stimulus.block_ui * spui;
        let processed = wave
            .chunks_mut(block)
            .zip(clock.chunks_mut(block))
            .try_for_each(|(w, c)| self.registry.process_waveform(id, w, Some(c)))
            .and_then(|()| self.registry.with_slot(id, |slot| slot.session.params_out()));
        self.registry.close(id)?;
        let echo = processed.with_context(|| format!("Lane {lane}: waveform processing failed"))?;

        let view = ParameterView::parse(&echo).context("Model echo did not parse")?;
        let (bit_errors, eye_opening, edges) = score(&wave, &clock, &symbols, spui);

        tracing::debug!(lane, edges, bit_errors, "Lane complete");

        Ok(LaneResult {
            lane,
            message,
            cursors: impulse_cursors,
            boost_db: view.f64_opt("boost_db")?,
            dfe_taps: view.f64_list("dfe_taps")?.unwrap_or_default(),
            dfe_mse: view.f64_opt("dfe_mse")?,
            cdr_locked: view.bool_or("cdr_locked", false)?,
            edges,
            bit_errors,
            eye_opening,
        })
    }
}

/// Delta train with cursor `j` at sample `j * spui`, then a zero tail.
pub fn channel_impulse(cursors: &[f64], spui: usize) -> Vec<f64> {
    let mut impulse = vec![0.0; (cursors.len() + IMPULSE_TAIL_UI) * spui];
    for (j, c) in cursors.iter().enumerate() {
        impulse[j * spui] = *c;
    }
    impulse
}

/// Symbols through the cursor channel, each UI held for `spui` samples.
pub fn channel_wave(symbols: &[f64], cursors: &[f64], spui: usize) -> Vec<f64> {
    let mut wave = Vec::with_capacity(symbols.len() * spui);
    for k in 0..symbols.len() {
        let v: f64 = cursors
            .iter()
            .enumerate()
            .filter(|(j, _)| k >= *j)
            .map(|(j, c)| c * symbols[k - j])
            .sum();
        wave.extend(std::iter::repeat(v).take(spui));
    }
    wave
}

/// PRBS symbols for one lane; lanes start at different offsets.
fn lane_symbols(order: u8, lane: usize, num_bits: usize) -> Result<Vec<f64>> {
    let mut prbs = PrbsGenerator::new(order)?;
    prbs.generate_bits(lane as u64 * 37);
    Ok(prbs.symbols(num_bits))
}

/// Bit errors, eye opening over the second half, and edge count.
fn score(wave: &[f64], clock: &[f64], symbols: &[f64], spui: usize) -> (usize, f64, usize) {
    let half = symbols.len() / 2;
    let mut errors = 0;
    let mut opening = f64::INFINITY;
    let mut edges = 0;

    for (n, _) in clock.iter().enumerate().filter(|(_, t)| **t != 0.0) {
        edges += 1;
        let ui = n / spui;
        let Some(symbol) = symbols.get(ui) else { continue };
        let y = wave[n];
        if (y >= 0.0) != (*symbol > 0.0) {
            errors += 1;
        }
        if ui >= half {
            opening = opening.min(y * symbol.signum());
        }
    }

    if !opening.is_finite() {
        opening = 0.0;
    }
    (errors, opening, edges)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(parameters: &str) -> RunConfig {
        let mut config: RunConfig = toml::from_str("").unwrap();
        config.samples_per_ui = 4;
        config.stimulus.num_bits = 4_000;
        config.stimulus.block_ui = 300;
        config.channel.cursors = vec![1.0, 0.5, 0.2];
        config.parameters = Some(parameters.to_string());
        config
    }

    #[test]
    fn test_channel_wave_holds_each_ui() {
        let wave = channel_wave(&[1.0, -1.0, 1.0], &[1.0, 0.5], 2);
        assert_eq!(wave, vec![1.0, 1.0, -0.5, -0.5, 0.5, 0.5]);
    }

    #[test]
    fn test_adaptive_lanes_open_the_eye() {
        let mut cfg = config("(rx (dfe (mode Adaptive) (ntaps 2)) (cdr (lock_after 8)))");
        cfg.lanes = 3;
        let results = Runner::new(cfg).run().unwrap();

        assert_eq!(results.lanes.len(), 3);
        for lane in &results.lanes {
            assert!(lane.cdr_locked);
            assert_eq!(lane.edges, 4_000);
            assert!((lane.dfe_taps[0] - 0.5).abs() < 0.05);
            assert!((lane.dfe_taps[1] - 0.2).abs() < 0.05);
            assert!(lane.eye_opening > 0.8);
        }
    }

    #[test]
    fn test_impulse_cursors_reflect_tx_taps() {
        let results = Runner::new(config("(tx (tx_taps 0.0 0.75 -0.25))")).run().unwrap();
        let lane = &results.lanes[0];
        // Main cursor is 0.75; the first post-cursor is 0.5*0.75 - 0.25.
        assert!((lane.cursors[1] - 0.75).abs() < 1e-12);
        assert!((lane.cursors[2] - 0.125).abs() < 1e-12);
        assert!(lane.dfe_taps.is_empty());
    }

    #[test]
    fn test_bad_parameters_fail_the_run() {
        let result = Runner::new(config("(rx (dfe (mode Sideways)))")).run();
        assert!(result.is_err());
    }
}
