//! Equalizer stages composed into an ordered pipeline.
//!
//! Each stage sees the impulse once at initialization and then every
//! waveform block in order. The pipeline owns the clock tracker so all
//! stages of one session share a single notion of where the edges are.

use crate::clock::{ClockBlock, ClockTracker};
use crate::dfe::Dfe;
use crate::error::ConfigWarning;
use crate::fir::Fir;
use crate::iir::Iir;
use lib_types::ami::AmiValue;
use tracing::debug;

/// One equalizer stage.
pub trait Stage: Send {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Equalize the impulse response in place.
    fn apply_to_impulse(&mut self, impulse: &mut [f64]);

    /// Equalize one waveform block in place.
    fn process(&mut self, wave: &mut [f64], clock: &ClockBlock<'_>);

    /// Clear filter history before waveform processing starts.
    fn reset(&mut self);

    /// Values reported back to the host, keyed by output parameter name.
    fn report(&self) -> Vec<(&'static str, AmiValue)>;

    /// Adjustments made while configuring this stage.
    fn warnings(&self) -> &[ConfigWarning];
}

fn float_list(values: &[f64]) -> AmiValue {
    AmiValue::List(values.iter().copied().map(AmiValue::Float).collect())
}

impl Stage for Fir {
    fn name(&self) -> &'static str {
        "ffe"
    }

    fn apply_to_impulse(&mut self, impulse: &mut [f64]) {
        self.apply(impulse);
    }

    fn process(&mut self, wave: &mut [f64], _clock: &ClockBlock<'_>) {
        self.apply(wave);
    }

    fn reset(&mut self) {
        Fir::reset(self);
    }

    fn report(&self) -> Vec<(&'static str, AmiValue)> {
        vec![("tx_taps", float_list(self.weights()))]
    }

    fn warnings(&self) -> &[ConfigWarning] {
        Fir::warnings(self)
    }
}

impl Stage for Iir {
    fn name(&self) -> &'static str {
        "ctle"
    }

    fn apply_to_impulse(&mut self, impulse: &mut [f64]) {
        self.apply(impulse);
    }

    fn process(&mut self, wave: &mut [f64], _clock: &ClockBlock<'_>) {
        self.apply(wave);
    }

    fn reset(&mut self) {
        Iir::reset(self);
    }

    fn report(&self) -> Vec<(&'static str, AmiValue)> {
        vec![
            ("ctle_numerator", float_list(self.numerator())),
            ("ctle_denominator", float_list(self.denominator())),
        ]
    }

    fn warnings(&self) -> &[ConfigWarning] {
        Iir::warnings(self)
    }
}

impl Stage for Dfe {
    fn name(&self) -> &'static str {
        "dfe"
    }

    fn apply_to_impulse(&mut self, impulse: &mut [f64]) {
        Dfe::apply_to_impulse(self, impulse);
    }

    fn process(&mut self, wave: &mut [f64], clock: &ClockBlock<'_>) {
        Dfe::process(self, wave, clock);
    }

    fn reset(&mut self) {
        Dfe::reset(self);
    }

    fn report(&self) -> Vec<(&'static str, AmiValue)> {
        vec![
            ("dfe_taps", float_list(self.taps())),
            ("dfe_mse", AmiValue::Float(self.mse())),
        ]
    }

    fn warnings(&self) -> &[ConfigWarning] {
        Dfe::warnings(self)
    }
}

/// Ordered stages plus the shared clock tracker.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    clock: ClockTracker,
    /// Scratch edge marks when the host passes no clock buffer.
    marks: Vec<f64>,
}

impl Pipeline {
    pub fn new(clock: ClockTracker) -> Self {
        Self {
            stages: Vec::new(),
            clock,
            marks: Vec::new(),
        }
    }

    /// Append a stage; stages run in insertion order.
    pub fn push(&mut self, stage: Box<dyn Stage>) {
        self.stages.push(stage);
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run the impulse through every stage, then clear filter history.
    pub fn apply_to_impulse(&mut self, impulse: &mut [f64]) {
        for stage in &mut self.stages {
            stage.apply_to_impulse(impulse);
        }
        self.reset();
    }

    /// Equalize a waveform block. Edge times are written into `clock_times`
    /// when given (same length as `wave`).
    pub fn process(&mut self, wave: &mut [f64], clock_times: Option<&mut [f64]>) {
        let marks: &mut [f64] = match clock_times {
            Some(times) => times,
            None => {
                self.marks.clear();
                self.marks.resize(wave.len(), 0.0);
                &mut self.marks
            }
        };

        let locked_from = self.clock.mark(marks);
        let block = ClockBlock {
            edges: marks,
            locked_from,
        };
        for stage in &mut self.stages {
            stage.process(wave, &block);
        }

        debug!(
            samples = wave.len(),
            edges = self.clock.edge_count(),
            locked = self.clock.is_locked(),
            "Processed waveform block"
        );
    }

    pub fn reset(&mut self) {
        for stage in &mut self.stages {
            stage.reset();
        }
        self.clock.reset();
    }

    pub fn clock(&self) -> &ClockTracker {
        &self.clock
    }

    /// Stage reports followed by the clock state.
    pub fn report(&self) -> Vec<(&'static str, AmiValue)> {
        let mut out: Vec<_> = self.stages.iter().flat_map(|s| s.report()).collect();
        out.push(("cdr_locked", AmiValue::Boolean(self.clock.is_locked())));
        out.push(("cdr_edges", AmiValue::Integer(self.clock.edge_count() as i64)));
        out
    }

    pub fn warnings(&self) -> Vec<ConfigWarning> {
        self.stages
            .iter()
            .flat_map(|s| s.warnings().iter().cloned())
            .collect()
    }
}
