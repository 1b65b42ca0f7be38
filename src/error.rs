//! Error types for the Floodgate limiter.

use thiserror::Error;

/// Errors raised when a caller-supplied identifier is malformed.
///
/// These are caller-input defects: the limiter's state is never touched
/// before validation succeeds, so a validation failure is always recoverable
/// by fixing the input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The identifier was empty or whitespace-only after trimming.
    #[error("identifier cannot be empty")]
    EmptyIdentifier,

    /// The identifier exceeded the configured maximum length.
    #[error("identifier is {length} bytes, maximum is {max}")]
    IdentifierTooLong { length: usize, max: usize },
}

/// Errors raised by invalid limiter configuration or per-call misuse.
///
/// These are surfaced immediately and never silently clamped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Capacity must be a positive number of permits.
    #[error("capacity must be greater than 0")]
    InvalidCapacity,

    /// Window (or idle TTL) must be a positive duration.
    #[error("window duration must be greater than 0")]
    InvalidWindow,

    /// A request cost larger than capacity can never be satisfied.
    #[error("cost {cost} exceeds capacity {capacity}")]
    CostExceedsCapacity { cost: u64, capacity: u64 },
}

/// Main error type for Floodgate operations.
#[derive(Error, Debug)]
pub enum FloodgateError {
    /// Identifier validation errors
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Configuration and per-call usage errors
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Configuration file parse errors
    #[error("failed to parse configuration: {0}")]
    ConfigParse(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Floodgate operations.
pub type Result<T> = std::result::Result<T, FloodgateError>;
