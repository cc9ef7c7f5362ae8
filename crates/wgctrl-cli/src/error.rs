//! CLI error types.

use thiserror::Error;
use wgctrl::WgError;

/// Errors reported by `wgctrl` commands.
#[derive(Debug, Error)]
pub enum CliError {
    /// A backend call failed.
    #[error(transparent)]
    Wg(#[from] WgError),

    /// The named device is not known to any backend.
    #[error("no such device: {0}")]
    DeviceNotFound(String),

    /// Input could not be used.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Output could not be produced.
    #[error("format error: {0}")]
    Format(String),

    /// Reading stdin or writing stdout failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
