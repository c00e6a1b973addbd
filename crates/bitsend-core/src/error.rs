//! Error types for bitsend.

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur talking to a wallet backend.
#[derive(Debug, Error)]
pub enum Error {
    /// Account not found.
    #[error("account not found: {0}")]
    AccountNotFound(String),

    /// Device not found.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// Amount could not be parsed or converted.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Unknown fiat currency.
    #[error("no exchange rate for {0}")]
    UnknownCurrency(String),

    /// Backend returned something we could not interpret.
    #[error("backend error: {0}")]
    Backend(String),

    /// Docker error.
    #[error("docker error: {0}")]
    Docker(String),

    /// Command inside a container exited non-zero.
    #[error("command failed with exit code {code}: {output}")]
    CommandFailed {
        /// Exit code reported by Docker.
        code: i64,
        /// Combined stderr/stdout of the command.
        output: String,
    },

    /// Time series requested over an empty or inverted range.
    #[error("invalid time range: {0}")]
    InvalidRange(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
