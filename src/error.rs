use thiserror::Error;

/// Errors produced by the throttler and its job surface.
///
/// Failures raised by a throttled operation are never wrapped in this type; they
/// reach the caller of [`crate::Throttler::throttle`] unchanged.
#[derive(Debug, Error)]
pub enum ThrottlerError {
    /// A slot count or cooldown was not a finite number.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The requested operation cannot be invoked. No slot was consumed.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<validator::ValidationErrors> for ThrottlerError {
    fn from(err: validator::ValidationErrors) -> Self {
        ThrottlerError::Validation(err.to_string())
    }
}

pub type ThrottlerResult<T> = Result<T, ThrottlerError>;
