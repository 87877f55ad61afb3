//! Error and warning types for DSP stages.

use thiserror::Error;

/// Errors that reject a stage configuration or an analysis request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DspError {
    /// A filter needs at least one coefficient.
    #[error("{0} needs at least one coefficient")]
    EmptyCoefficients(&'static str),

    /// Oversample factor must be at least 1.
    #[error("Oversample factor must be at least 1")]
    ZeroOversample,

    /// Leading denominator coefficient cannot be normalized.
    #[error("Leading denominator coefficient is zero")]
    ZeroLeadingCoefficient,

    /// NaN or infinite coefficient.
    #[error("Non-finite coefficient in {0}")]
    NonFiniteCoefficient(&'static str),

    /// Tap bound pair with min above max.
    #[error("Tap {tap} bounds are inverted: min {min} > max {max}")]
    InvertedBounds { tap: usize, min: f64, max: f64 },

    /// A scalar parameter is outside its legal range.
    #[error("Invalid {name}: {message}")]
    InvalidParameter { name: &'static str, message: String },

    /// Input length mismatch.
    #[error("Input length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// Insufficient data for operation.
    #[error("Insufficient data: need at least {needed}, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// Unsupported PRBS polynomial order.
    #[error("Unsupported PRBS order {0}; use 7, 9, 11, 15, 23 or 31")]
    UnsupportedPrbsOrder(u8),

    /// Numerical failure inside a transform or root finder.
    #[error("Numerical instability: {0}")]
    NumericalInstability(String),
}

impl DspError {
    pub fn invalid(name: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            message: message.into(),
        }
    }
}

/// Non-fatal adjustment made while configuring a stage.
///
/// The stage is still built; the warning text ends up in the model message.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigWarning {
    /// Unstable pole pulled inside the unit circle.
    #[error("IIR pole {index} with |p| = {magnitude:.4} clamped to radius {radius}")]
    PoleClamped {
        index: usize,
        magnitude: f64,
        radius: f64,
    },

    /// Initial tap weight outside its bounds.
    #[error("DFE tap {tap} initial value {value} clamped into [{min}, {max}]")]
    TapClamped {
        tap: usize,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Sum of |weights| exceeds the configured budget.
    #[error("Tap magnitudes sum to {sum:.6}, above budget {budget}{}", budget_action(.normalized))]
    TapBudget {
        sum: f64,
        budget: f64,
        normalized: bool,
    },

    /// Anything else worth telling the host.
    #[error("{0}")]
    Note(String),
}

fn budget_action(normalized: &bool) -> &'static str {
    if *normalized {
        "; taps normalized"
    } else {
        ""
    }
}

/// Result type for DSP operations.
pub type DspResult<T> = Result<T, DspError>;
