//! Error types for the autograd engine

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AutogradError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Shape mismatch: expected {expected} values, got {got}")]
    ShapeMismatch { expected: usize, got: usize },

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl AutogradError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        AutogradError::InvalidArgument(message.into())
    }

    pub fn shape_mismatch(expected: usize, got: usize) -> Self {
        AutogradError::ShapeMismatch { expected, got }
    }
}

pub type Result<T> = std::result::Result<T, AutogradError>;
