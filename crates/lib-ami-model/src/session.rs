//! Model session lifecycle.
//!
//! A session moves `Uninitialized -> Initialized -> Active -> Closed`.
//! It owns the configured pipeline and everything reported back to the
//! host; the caller's sample buffers are only borrowed for one call.

use crate::config::ModelConfig;
use crate::error::{AmiError, AmiResult};
use lib_dsp::{spectrum, Pipeline};
use lib_params::{ParameterTree, ParameterView};
use lib_types::ami::{AmiValue, SessionState};
use lib_types::units::Seconds;
use rayon::prelude::*;
use tracing::{debug, warn};

/// Root name used in the echo when the input string has none.
pub const DEFAULT_ROOT: &str = "ami_model";

/// Inputs of an initialize call.
pub struct InitRequest<'a> {
    /// `row_count * (aggressors + 1)` samples, column after column.
    pub impulse: &'a mut [f64],
    pub row_count: usize,
    pub aggressors: usize,
    pub sample_interval: Seconds,
    pub bit_time: Seconds,
    pub parameters: &'a str,
}

/// One model instance.
pub struct Session {
    id: u64,
    state: SessionState,
    config: Option<ModelConfig>,
    pipeline: Option<Pipeline>,
    root_name: String,
    message: String,
    boost_db: Option<f64>,
    waveform_calls: u64,
    samples_processed: u64,
}

impl Session {
    /// Create an uninitialized session.
    pub fn new(id: u64) -> Self {
        Self {
            id,
            state: SessionState::Uninitialized,
            config: None,
            pipeline: None,
            root_name: DEFAULT_ROOT.to_string(),
            message: String::new(),
            boost_db: None,
            waveform_calls: 0,
            samples_processed: 0,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Configure from the parameters and equalize the impulse in place.
    pub fn initialize(&mut self, request: InitRequest<'_>) -> AmiResult<()> {
        if self.state != SessionState::Uninitialized {
            return Err(AmiError::invalid_state(SessionState::Uninitialized, self.state));
        }

        let InitRequest {
            impulse,
            row_count,
            aggressors,
            sample_interval,
            bit_time,
            parameters,
        } = request;

        let columns = aggressors
            .checked_add(1)
            .and_then(|c| c.checked_mul(row_count))
            .ok_or_else(|| AmiError::configuration("impulse matrix size overflows"))?;
        if impulse.len() < columns {
            return Err(AmiError::configuration(format!(
                "impulse matrix holds {} samples, expected {row_count} x {}",
                impulse.len(),
                aggressors + 1
            )));
        }

        let view = ParameterView::parse(parameters)?;
        let config = ModelConfig::from_view(&view, sample_interval, bit_time)?;
        let mut pipeline = config.build_pipeline()?;

        let (victim, rest) = impulse[..columns].split_at_mut(row_count);
        pipeline.apply_to_impulse(victim);

        if aggressors > 0 && row_count > 0 {
            rest.par_chunks_mut(row_count).try_for_each(|column| -> AmiResult<()> {
                let mut fresh = config.build_pipeline()?;
                fresh.apply_to_impulse(column);
                Ok(())
            })?;
        }

        self.boost_db = if victim.is_empty() {
            None
        } else {
            match spectrum::boost_db(victim, sample_interval, bit_time) {
                Ok(boost) => Some(boost),
                Err(e) => {
                    debug!(error = %e, "Skipping boost report");
                    None
                }
            }
        };

        if !view.root_name().is_empty() {
            self.root_name = view.root_name().to_string();
        }

        let mut notes: Vec<String> = config.notes.clone();
        notes.extend(pipeline.warnings().iter().map(|w| w.to_string()));
        for note in &notes {
            warn!(handle = self.id, "{note}");
        }

        let stages = pipeline.stage_names();
        let mut message = if stages.is_empty() {
            format!("{}: initialized with no equalization stages", self.root_name)
        } else {
            format!("{}: initialized {}", self.root_name, stages.join(" -> "))
        };
        if !notes.is_empty() {
            message.push_str("; ");
            message.push_str(&notes.join("; "));
        }

        debug!(
            handle = self.id,
            samples_per_ui = config.samples_per_ui,
            row_count,
            aggressors,
            stages = ?stages,
            "Session initialized"
        );

        self.message = message;
        self.config = Some(config);
        self.pipeline = Some(pipeline);
        self.state = SessionState::Initialized;
        Ok(())
    }

    /// Equalize a waveform block in place. Edge times go to `clock_times`
    /// when given; it must be as long as `wave`.
    pub fn process_waveform(&mut self, wave: &mut [f64], clock_times: Option<&mut [f64]>) -> AmiResult<()> {
        if !self.state.accepts_waveforms() {
            return Err(AmiError::invalid_state(SessionState::Initialized, self.state));
        }
        if let Some(times) = &clock_times {
            if times.len() < wave.len() {
                return Err(AmiError::configuration(format!(
                    "clock_times holds {} entries for {} samples",
                    times.len(),
                    wave.len()
                )));
            }
        }

        let pipeline = self
            .pipeline
            .as_mut()
            .ok_or_else(|| AmiError::invalid_state(SessionState::Initialized, self.state))?;

        let len = wave.len();
        pipeline.process(wave, clock_times.map(|t| &mut t[..len]));

        self.state = SessionState::Active;
        self.waveform_calls += 1;
        self.samples_processed += len as u64;

        debug!(
            handle = self.id,
            call = self.waveform_calls,
            samples = len,
            "Waveform processed"
        );
        Ok(())
    }

    /// Output parameter string: stage reports plus the impulse boost.
    pub fn params_out(&self) -> String {
        let mut tree = ParameterTree::new(self.root_name.clone());
        if let Some(pipeline) = &self.pipeline {
            for (key, value) in pipeline.report() {
                tree.set(key, value);
            }
        }
        if let Some(boost) = self.boost_db {
            tree.set("boost_db", AmiValue::Float(boost));
        }
        tree.to_ami_string()
    }

    /// Initialization message (stages and any warnings).
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn config(&self) -> Option<&ModelConfig> {
        self.config.as_ref()
    }

    pub fn boost_db(&self) -> Option<f64> {
        self.boost_db
    }

    pub fn samples_processed(&self) -> u64 {
        self.samples_processed
    }

    /// Release the pipeline. Closing twice is an error.
    pub fn close(&mut self) -> AmiResult<()> {
        if self.state == SessionState::Closed {
            return Err(AmiError::invalid_state(SessionState::Active, self.state));
        }
        self.pipeline = None;
        self.state = SessionState::Closed;
        debug!(
            handle = self.id,
            calls = self.waveform_calls,
            samples = self.samples_processed,
            "Session closed"
        );
        Ok(())
    }
}
