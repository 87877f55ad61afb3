//! Model configuration resolved from the input parameter view.
//!
//! All parameter names and defaults live here. Stages are only built from
//! a validated [`ModelConfig`], so every session (and every aggressor
//! column) gets an identical, freshly constructed pipeline.
//!
//! | path | default |
//! |---|---|
//! | `tx_taps` | none (explicit weights, symbol spaced) |
//! | `tx_tap_units` / `tx_tap_np1` / `tx_tap_nm1` / `tx_tap_nm2` | 27 / 0 / 0 / 0 |
//! | `tap_budget` / `tap_budget_tolerance` / `tap_budget_policy` | 1.0 / 1e-9 / Normalize |
//! | `ctle.mode` | On when `ctle.peak_freq` or `ctle.numerator` is given |
//! | `ctle.peak_freq` / `ctle.boost_db` / `ctle.max_pole_radius` | required / 6.0 / 0.999 |
//! | `ctle.numerator` / `ctle.denominator` | none |
//! | `dfe.mode` | Off |
//! | `dfe.ntaps` / `dfe.taps` | 4 / zeros |
//! | `dfe.tap_min` / `dfe.tap_max` | -1.0 / 1.0 |
//! | `dfe.vout` / `dfe.step_size` | 1.0 / 0.01 |
//! | `cdr.phase` / `cdr.lock_after` | 0.5 / 16 |

use crate::error::{AmiError, AmiResult};
use lib_dsp::iir::DEFAULT_MAX_POLE_RADIUS;
use lib_dsp::{ClockTracker, Dfe, DfeMode, DfeSettings, Fir, Iir, Pipeline};
use lib_params::ParameterView;
use lib_types::ami::AmiValue;
use lib_types::units::{samples_per_ui, Hertz, Seconds};
use tracing::{debug, warn};

/// Allowed mismatch between `bit_time` and a whole number of samples, in UI.
pub const BIT_TIME_TOLERANCE: f64 = 1e-6;

/// Largest accepted `bit_time / sample_interval`.
pub const MAX_SAMPLES_PER_UI: usize = 4096;

const DEFAULT_TAP_UNITS: f64 = 27.0;
const DEFAULT_TAP_BUDGET: f64 = 1.0;
const DEFAULT_TAP_BUDGET_TOLERANCE: f64 = 1e-9;
const DEFAULT_CTLE_BOOST_DB: f64 = 6.0;
const DEFAULT_DFE_TAPS: usize = 4;
const DEFAULT_TAP_LIMIT: f64 = 1.0;
const DEFAULT_VOUT: f64 = 1.0;
const DEFAULT_STEP_SIZE: f64 = 0.01;
const DEFAULT_CDR_PHASE: f64 = 0.5;
const DEFAULT_LOCK_AFTER: i64 = 16;

/// What to do when Tx tap magnitudes exceed the budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TapBudgetPolicy {
    /// Scale the taps down to the budget.
    Normalize,
    /// Keep the taps as given.
    Warn,
}

impl TapBudgetPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normalize" => Some(Self::Normalize),
            "warn" => Some(Self::Warn),
            _ => None,
        }
    }
}

/// Tx feed-forward equalizer.
#[derive(Clone, Debug, PartialEq)]
pub struct TxConfig {
    pub weights: Vec<f64>,
    pub budget: f64,
    pub tolerance: f64,
    pub policy: TapBudgetPolicy,
}

/// CTLE coefficients source.
#[derive(Clone, Debug, PartialEq)]
pub enum CtleDesign {
    Peaking { peak_freq: Hertz, boost_db: f64 },
    Coefficients { numerator: Vec<f64>, denominator: Vec<f64> },
}

#[derive(Clone, Debug, PartialEq)]
pub struct CtleConfig {
    pub design: CtleDesign,
    pub max_pole_radius: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DfeConfig {
    pub mode: DfeMode,
    pub taps: Vec<f64>,
    pub tap_min: Vec<f64>,
    pub tap_max: Vec<f64>,
    pub vout: f64,
    pub step_size: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ClockConfig {
    pub phase: f64,
    pub lock_after: u64,
}

/// Everything needed to build a session's pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelConfig {
    pub sample_interval: Seconds,
    pub bit_time: Seconds,
    pub samples_per_ui: usize,
    pub tx: Option<TxConfig>,
    pub ctle: Option<CtleConfig>,
    pub dfe: Option<DfeConfig>,
    pub clock: ClockConfig,
    /// Non-fatal adjustments made while reading parameters.
    pub notes: Vec<String>,
}

impl ModelConfig {
    /// Resolve and validate the configuration.
    pub fn from_view(view: &ParameterView, sample_interval: Seconds, bit_time: Seconds) -> AmiResult<Self> {
        if !sample_interval.is_positive() || !sample_interval.0.is_finite() {
            return Err(AmiError::configuration(format!(
                "sample_interval must be positive, got {}",
                sample_interval.0
            )));
        }
        if !bit_time.is_positive() || !bit_time.0.is_finite() {
            return Err(AmiError::configuration(format!(
                "bit_time must be positive, got {}",
                bit_time.0
            )));
        }

        let ratio = bit_time / sample_interval;
        if ratio > MAX_SAMPLES_PER_UI as f64 + 0.5 {
            return Err(AmiError::configuration(format!(
                "{ratio:.0} samples per UI exceeds the limit of {MAX_SAMPLES_PER_UI}"
            )));
        }
        let samples_per_ui = samples_per_ui(bit_time, sample_interval, BIT_TIME_TOLERANCE * ratio)
            .ok_or_else(|| {
                AmiError::configuration(format!(
                    "bit_time {} is not an integer multiple of sample_interval {} ({ratio:.6} samples)",
                    bit_time.0, sample_interval.0
                ))
            })?;

        let mut notes = Vec::new();
        let tx = read_tx(view, &mut notes)?;
        let ctle = read_ctle(view)?;
        let dfe = read_dfe(view, &mut notes)?;
        let clock = read_clock(view)?;

        for note in &notes {
            warn!(note = %note, "Parameter adjusted");
        }
        debug!(
            samples_per_ui,
            tx = tx.is_some(),
            ctle = ctle.is_some(),
            dfe = dfe.as_ref().map(|d| d.mode.as_str()),
            "Resolved model configuration"
        );

        Ok(Self {
            sample_interval,
            bit_time,
            samples_per_ui,
            tx,
            ctle,
            dfe,
            clock,
            notes,
        })
    }

    /// Build a fresh pipeline: FFE, then CTLE, then DFE.
    pub fn build_pipeline(&self) -> AmiResult<Pipeline> {
        let clock = ClockTracker::new(
            self.bit_time,
            self.sample_interval,
            self.clock.phase,
            self.clock.lock_after,
        )?;
        let mut pipeline = Pipeline::new(clock);

        if let Some(tx) = &self.tx {
            let mut fir = Fir::new(tx.weights.clone(), self.samples_per_ui)?;
            fir.enforce_budget(tx.budget, tx.tolerance, tx.policy == TapBudgetPolicy::Normalize)?;
            pipeline.push(Box::new(fir));
        }

        if let Some(ctle) = &self.ctle {
            let iir = match &ctle.design {
                CtleDesign::Peaking { peak_freq, boost_db } => {
                    Iir::ctle(*peak_freq, *boost_db, self.sample_interval)?
                }
                CtleDesign::Coefficients {
                    numerator,
                    denominator,
                } => Iir::with_max_pole_radius(numerator, denominator, ctle.max_pole_radius)?,
            };
            pipeline.push(Box::new(iir));
        }

        if let Some(dfe) = &self.dfe {
            pipeline.push(Box::new(Dfe::new(DfeSettings {
                mode: dfe.mode,
                taps: dfe.taps.clone(),
                tap_min: dfe.tap_min.clone(),
                tap_max: dfe.tap_max.clone(),
                vout: dfe.vout,
                step_size: dfe.step_size,
                samples_per_ui: self.samples_per_ui,
            })?));
        }

        Ok(pipeline)
    }
}

/// Map Tx current units to symbol-spaced weights `[pre, main, post1, post2]`.
pub fn weights_from_units(
    units: f64,
    np1: f64,
    nm1: f64,
    nm2: f64,
    notes: &mut Vec<String>,
) -> AmiResult<Vec<f64>> {
    if !(units > 0.0) {
        return Err(AmiError::configuration(format!("tx_tap_units must be positive, got {units}")));
    }
    if np1 < 0.0 || nm1 < 0.0 || nm2 < 0.0 {
        return Err(AmiError::configuration("Tx de-emphasis units must be non-negative"));
    }

    let (mut np1, mut nm1, mut nm2) = (np1, nm1, nm2);
    let emphasis = np1 + nm1 + nm2;
    if emphasis > units {
        let scale = units / emphasis;
        np1 *= scale;
        nm1 *= scale;
        nm2 *= scale;
        notes.push(format!(
            "Tx de-emphasis of {emphasis} units exceeds {units} available; scaled by {scale:.4}"
        ));
    }

    let main = units - np1 - nm1 - nm2;
    Ok(vec![-np1 / units, main / units, -nm1 / units, -nm2 / units])
}

fn read_tx(view: &ParameterView, notes: &mut Vec<String>) -> AmiResult<Option<TxConfig>> {
    let unit_keys = ["tx_tap_units", "tx_tap_np1", "tx_tap_nm1", "tx_tap_nm2"];
    let explicit = view.f64_list("tx_taps")?;
    let uses_units = unit_keys.iter().any(|k| view.contains(k));

    let weights = match explicit {
        Some(weights) => {
            if uses_units {
                notes.push("tx_taps given; Tx unit parameters ignored".to_string());
            }
            weights
        }
        None if uses_units => weights_from_units(
            view.f64_or("tx_tap_units", DEFAULT_TAP_UNITS)?,
            view.f64_or("tx_tap_np1", 0.0)?,
            view.f64_or("tx_tap_nm1", 0.0)?,
            view.f64_or("tx_tap_nm2", 0.0)?,
            notes,
        )?,
        None => return Ok(None),
    };

    if weights.is_empty() {
        return Err(AmiError::configuration("tx_taps is empty"));
    }

    let policy_text = view.str_or("tap_budget_policy", "Normalize")?;
    let policy = TapBudgetPolicy::parse(&policy_text).ok_or_else(|| {
        AmiError::configuration(format!("tap_budget_policy '{policy_text}' is not Normalize or Warn"))
    })?;

    Ok(Some(TxConfig {
        weights,
        budget: view.f64_or("tap_budget", DEFAULT_TAP_BUDGET)?,
        tolerance: view.f64_or("tap_budget_tolerance", DEFAULT_TAP_BUDGET_TOLERANCE)?,
        policy,
    }))
}

/// On/off switch written as a boolean, a word or 0/1.
fn read_switch(view: &ParameterView, path: &str) -> AmiResult<Option<bool>> {
    let Some(value) = view.get(path) else {
        return Ok(None);
    };
    let parsed = match value {
        AmiValue::Boolean(b) => Some(*b),
        AmiValue::Integer(i) => Some(*i != 0),
        other => other.as_str().and_then(|s| match s.to_ascii_lowercase().as_str() {
            "on" | "true" | "enabled" => Some(true),
            "off" | "false" | "disabled" => Some(false),
            _ => None,
        }),
    };
    parsed
        .map(Some)
        .ok_or_else(|| AmiError::configuration(format!("{path} must be On or Off, got {value}")))
}

fn read_ctle(view: &ParameterView) -> AmiResult<Option<CtleConfig>> {
    let has_design = view.contains("ctle.peak_freq") || view.contains("ctle.numerator");
    let enabled = read_switch(view, "ctle.mode")?.unwrap_or(has_design);
    if !enabled {
        return Ok(None);
    }

    let design = match (view.f64_list("ctle.numerator")?, view.f64_list("ctle.denominator")?) {
        (Some(numerator), Some(denominator)) => CtleDesign::Coefficients {
            numerator,
            denominator,
        },
        (Some(numerator), None) => CtleDesign::Coefficients {
            numerator,
            denominator: vec![1.0],
        },
        (None, Some(_)) => {
            return Err(AmiError::configuration("ctle.denominator given without ctle.numerator"));
        }
        (None, None) => CtleDesign::Peaking {
            peak_freq: Hertz(view.require_f64("ctle.peak_freq")?),
            boost_db: view.f64_or("ctle.boost_db", DEFAULT_CTLE_BOOST_DB)?,
        },
    };

    Ok(Some(CtleConfig {
        design,
        max_pole_radius: view.f64_or("ctle.max_pole_radius", DEFAULT_MAX_POLE_RADIUS)?,
    }))
}

fn read_dfe_mode(view: &ParameterView) -> AmiResult<DfeMode> {
    match view.get("dfe.mode") {
        None => Ok(DfeMode::Off),
        Some(AmiValue::Integer(code)) => DfeMode::parse(&code.to_string())
            .ok_or_else(|| AmiError::configuration(format!("dfe.mode {code} is not 0, 1 or 2"))),
        Some(value) => value
            .as_str()
            .and_then(DfeMode::parse)
            .ok_or_else(|| AmiError::configuration(format!("dfe.mode {value} is not Off, Init or Adaptive"))),
    }
}

/// Per-tap bound: absent uses the default, a scalar is broadcast.
fn read_bounds(view: &ParameterView, path: &str, default: f64, ntaps: usize) -> AmiResult<Vec<f64>> {
    match view.f64_list(path)? {
        None => Ok(vec![default; ntaps]),
        Some(list) if list.len() == 1 => Ok(vec![list[0]; ntaps]),
        Some(list) if list.len() == ntaps => Ok(list),
        Some(list) => Err(AmiError::configuration(format!(
            "{path} has {} entries for {ntaps} taps",
            list.len()
        ))),
    }
}

fn read_dfe(view: &ParameterView, notes: &mut Vec<String>) -> AmiResult<Option<DfeConfig>> {
    let mode = read_dfe_mode(view)?;
    if mode == DfeMode::Off {
        return Ok(None);
    }

    let initial = view.f64_list("dfe.taps")?;
    let ntaps = match view.get("dfe.ntaps") {
        Some(_) => {
            let n = view.i64_or("dfe.ntaps", 0)?;
            if n < 1 {
                return Err(AmiError::configuration(format!("dfe.ntaps must be at least 1, got {n}")));
            }
            n as usize
        }
        None => initial.as_ref().map_or(DEFAULT_DFE_TAPS, Vec::len),
    };
    if ntaps == 0 {
        return Err(AmiError::configuration("dfe.taps is empty"));
    }

    let mut taps = initial.unwrap_or_else(|| vec![0.0; ntaps]);
    if taps.len() != ntaps {
        notes.push(format!("dfe.taps has {} entries; resized to dfe.ntaps = {ntaps}", taps.len()));
        taps.resize(ntaps, 0.0);
    }

    Ok(Some(DfeConfig {
        mode,
        tap_min: read_bounds(view, "dfe.tap_min", -DEFAULT_TAP_LIMIT, ntaps)?,
        tap_max: read_bounds(view, "dfe.tap_max", DEFAULT_TAP_LIMIT, ntaps)?,
        taps,
        vout: view.f64_or("dfe.vout", DEFAULT_VOUT)?,
        step_size: view.f64_or("dfe.step_size", DEFAULT_STEP_SIZE)?,
    }))
}

fn read_clock(view: &ParameterView) -> AmiResult<ClockConfig> {
    let lock_after = view.i64_or("cdr.lock_after", DEFAULT_LOCK_AFTER)?;
    if lock_after < 0 {
        return Err(AmiError::configuration(format!(
            "cdr.lock_after must be non-negative, got {lock_after}"
        )));
    }
    Ok(ClockConfig {
        phase: view.f64_or("cdr.phase", DEFAULT_CDR_PHASE)?,
        lock_after: lock_after as u64,
    })
}
