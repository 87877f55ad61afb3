//! Error types for parameter reading and lookup.

use thiserror::Error;

/// Errors that can occur while reading a parameter string or resolving a path.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// Syntax error in the parameter text.
    #[error("Syntax error near '{context}': {message}")]
    Syntax { context: String, message: String },

    /// Text left over after the root expression.
    #[error("Unexpected trailing input: '{0}'")]
    Trailing(String),

    /// A node does not have a shape the reader understands.
    #[error("Invalid parameter node '{name}': {message}")]
    InvalidNode { name: String, message: String },

    /// Required parameter absent and no default was supplied.
    #[error("Missing required parameter '{0}'")]
    Missing(String),

    /// Parameter present but its value has the wrong type.
    #[error("Invalid value for '{path}': expected {expected}, got {actual}")]
    WrongType {
        path: String,
        expected: &'static str,
        actual: String,
    },
}

impl ParseError {
    /// Create a syntax error with a short preview of the offending input.
    pub fn syntax(input: &str, message: impl Into<String>) -> Self {
        Self::Syntax {
            context: input.chars().take(20).collect(),
            message: message.into(),
        }
    }

    /// Create an invalid node error.
    pub fn invalid_node(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidNode {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Convert nom errors to our error type.
impl<'a> From<nom::Err<nom::error::Error<&'a str>>> for ParseError {
    fn from(err: nom::Err<nom::error::Error<&'a str>>) -> Self {
        match err {
            nom::Err::Incomplete(_) => ParseError::syntax("", "incomplete input"),
            nom::Err::Error(e) | nom::Err::Failure(e) => {
                ParseError::syntax(e.input, format!("{:?}", e.code))
            }
        }
    }
}

/// Result type for parameter operations.
pub type ParamResult<T> = Result<T, ParseError>;
