//! Domain error types
//!
//! Validation failures raised when constructing domain values.

use thiserror::Error;

/// Errors that can occur while building domain values
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The access token was empty or contained whitespace
    #[error("Invalid access token: {0}")]
    InvalidToken(String),

    /// A Graph object id was empty or contained characters Graph never emits
    #[error("Invalid Graph id: {0}")]
    InvalidGraphId(String),

    /// Two parallel inputs had different lengths
    #[error("Length mismatch: {left} ids but {right} tokens")]
    LengthMismatch {
        /// Number of ids supplied
        left: usize,
        /// Number of tokens supplied
        right: usize,
    },
}
