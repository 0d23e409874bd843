//! Error types shared across the workspace
//!
//! Comprehensive error taxonomy using thiserror

use thiserror::Error;

/// Identifier validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("product id must not be empty")]
    EmptyProductId,

    #[error("invalid product id: {0:?}")]
    InvalidProductId(String),
}

/// Numeric parsing and range errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NumericError {
    #[error("invalid decimal {input:?}: {reason}")]
    Parse { input: String, reason: String },

    #[error("value must not be negative: {0}")]
    Negative(String),
}
