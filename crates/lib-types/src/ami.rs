//! AMI (Algorithmic Modeling Interface) types.
//!
//! These types describe the values that travel through the AMI parameter
//! strings, the lifecycle state of a model session, and the status codes
//! returned across the C boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// AMI parameter value types.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AmiValue {
    /// Floating-point value.
    Float(f64),

    /// Integer value.
    Integer(i64),

    /// String value.
    String(String),

    /// Boolean value.
    Boolean(bool),

    /// Enumerated list of values; the first entry is the selected one.
    List(Vec<AmiValue>),

    /// Numeric range with its typical (default) value.
    Range {
        default: f64,
        min: f64,
        max: f64,
    },
}

impl AmiValue {
    /// Try to extract as f64. Ranges and lists resolve to their selected value.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            Self::Range { default, .. } => Some(*default),
            Self::List(items) => items.first().and_then(|v| v.as_f64()),
            _ => None,
        }
    }

    /// Try to extract as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            Self::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            Self::Range { default, .. } if default.fract() == 0.0 => Some(*default as i64),
            Self::List(items) => items.first().and_then(|v| v.as_i64()),
            _ => None,
        }
    }

    /// Try to extract as string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            Self::List(items) => items.first().and_then(|v| v.as_str()),
            _ => None,
        }
    }

    /// Try to extract as bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            Self::Integer(i) => Some(*i != 0),
            Self::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
            Self::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }

    /// Try to extract every element as f64 (a scalar becomes a one-element list).
    pub fn as_f64_list(&self) -> Option<Vec<f64>> {
        match self {
            Self::List(items) => items.iter().map(|v| v.as_f64()).collect(),
            other => other.as_f64().map(|v| vec![v]),
        }
    }

    /// Bounds of a range value.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        match self {
            Self::Range { min, max, .. } => Some((*min, *max)),
            _ => None,
        }
    }
}

impl fmt::Display for AmiValue {
    /// Formats the value the way it appears inside an AMI parameter string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::String(s) => write!(f, "\"{s}\""),
            Self::Boolean(b) => f.write_str(if *b { "True" } else { "False" }),
            Self::List(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
            Self::Range { default, min, max } => write!(f, "{default:?} {min:?} {max:?}"),
        }
    }
}

/// Declared usage of an AMI parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Usage {
    In,
    Out,
    InOut,
    Info,
}

impl Usage {
    /// Parse the usage keyword (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "in" => Some(Self::In),
            "out" => Some(Self::Out),
            "inout" => Some(Self::InOut),
            "info" => Some(Self::Info),
            _ => None,
        }
    }
}

/// Declared type of an AMI parameter.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    Integer,
    Float,
    Boolean,
    String,
}

impl ValueType {
    /// Parse the type keyword (case-insensitive). `UI` and `Tap` are float-valued.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "integer" => Some(Self::Integer),
            "float" | "ui" | "tap" => Some(Self::Float),
            "boolean" => Some(Self::Boolean),
            "string" => Some(Self::String),
            _ => None,
        }
    }
}

/// AMI session state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum SessionState {
    /// Session created but not yet initialized.
    Uninitialized,
    /// Initialize completed and the impulse was processed.
    Initialized,
    /// Process-waveform has been called at least once.
    Active,
    /// Close has been called. Terminal.
    Closed,
}

impl SessionState {
    /// Whether waveform processing is allowed in this state.
    pub fn accepts_waveforms(&self) -> bool {
        matches!(self, Self::Initialized | Self::Active)
    }
}

/// Status code returned across the AMI C boundary.
///
/// IBIS-AMI models return 1 for success and 0 for failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AmiStatus {
    Failure = 0,
    Success = 1,
}

impl AmiStatus {
    /// Raw value for the `long` return of the exported functions.
    pub fn code(self) -> i64 {
        self as i64
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_coercions() {
        assert_eq!(AmiValue::Integer(3).as_f64(), Some(3.0));
        assert_eq!(AmiValue::Float(2.0).as_i64(), Some(2));
        assert_eq!(AmiValue::Float(2.5).as_i64(), None);
        assert_eq!(
            AmiValue::Range { default: 0.5, min: 0.0, max: 1.0 }.as_f64(),
            Some(0.5)
        );
        assert_eq!(AmiValue::String("TRUE".into()).as_bool(), Some(true));
        assert_eq!(
            AmiValue::List(vec![AmiValue::Integer(1), AmiValue::Float(-0.25)]).as_f64_list(),
            Some(vec![1.0, -0.25])
        );
    }

    #[test]
    fn test_value_display() {
        assert_eq!(AmiValue::Float(1.0).to_string(), "1.0");
        assert_eq!(AmiValue::Boolean(false).to_string(), "False");
        assert_eq!(AmiValue::String("Adaptive".into()).to_string(), "\"Adaptive\"");
        assert_eq!(
            AmiValue::List(vec![AmiValue::Float(0.25), AmiValue::Float(-0.1)]).to_string(),
            "0.25 -0.1"
        );
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(AmiStatus::Success.code(), 1);
        assert_eq!(AmiStatus::Failure.code(), 0);
        assert!(SessionState::Active.accepts_waveforms());
        assert!(!SessionState::Closed.accepts_waveforms());
    }
}
