//! Error types for the model lifecycle.

use lib_dsp::DspError;
use lib_params::ParseError;
use lib_types::ami::SessionState;
use thiserror::Error;

/// Errors that can occur while initializing or driving a model session.
#[derive(Debug, Error)]
pub enum AmiError {
    /// Parameters or timing the model cannot be configured from.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Null, closed or unknown session handle.
    #[error("Invalid handle: {0}")]
    Handle(String),

    /// Call not allowed in the session's current state.
    #[error("Invalid session state: expected {expected:?}, got {actual:?}")]
    InvalidState {
        expected: SessionState,
        actual: SessionState,
    },

    /// Parameter string could not be read.
    #[error("Invalid parameter string: {0}")]
    Parse(#[from] ParseError),

    /// A stage rejected its configuration.
    #[error("Stage configuration rejected: {0}")]
    Dsp(#[from] DspError),

    /// A call panicked and was stopped at the boundary.
    #[error("Model panicked: {0}")]
    Panicked(String),
}

impl AmiError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a handle error.
    pub fn handle(message: impl Into<String>) -> Self {
        Self::Handle(message.into())
    }

    /// Create an invalid state error.
    pub fn invalid_state(expected: SessionState, actual: SessionState) -> Self {
        Self::InvalidState { expected, actual }
    }

    /// Errors that prevent a session from being created.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::Parse(_) | Self::Dsp(_) | Self::Panicked(_)
        )
    }

    pub fn is_handle_error(&self) -> bool {
        matches!(self, Self::Handle(_))
    }
}

/// Result type for model operations.
pub type AmiResult<T> = Result<T, AmiError>;
