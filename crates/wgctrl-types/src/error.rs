//! Error types for WireGuard device control.

use std::io;

use thiserror::Error;

/// Result alias used throughout the wgctrl crates.
pub type Result<T> = std::result::Result<T, WgError>;

/// Errors returned by every wgctrl backend.
#[derive(Debug, Error)]
pub enum WgError {
    /// The device does not exist, or is not a WireGuard device on this backend.
    #[error("device does not exist")]
    NotExist,

    /// Invalid key length.
    #[error("invalid key length: expected 32, got {0}")]
    InvalidKeyLength(usize),

    /// Invalid key encoding (base64 or hex).
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Invalid CIDR notation or prefix length.
    #[error("invalid CIDR: {0}")]
    InvalidCidr(String),

    /// Invalid endpoint address.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Any other malformed argument.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A response from the OS could not be decoded.
    #[error("protocol decode error: {0}")]
    Decode(String),

    /// The OS reported an error code inside a protocol reply.
    #[error("{op}: errno={errno}")]
    Errno {
        /// Operation that failed.
        op: &'static str,
        /// Raw error number.
        errno: i32,
    },

    /// The underlying OS call failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The backend is not available on this platform.
    #[error("{backend}: not implemented on {os}/{arch}: {info}", os = std::env::consts::OS, arch = std::env::consts::ARCH)]
    Unimplemented {
        /// Backend name.
        backend: &'static str,
        /// Human readable detail.
        info: String,
    },
}

/// Coarse classification of a [`WgError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Device absent on the backend; the chained client moves on.
    NotExist,
    /// Caller supplied malformed input.
    InvalidArgument,
    /// Malformed attribute, line stream or ioctl structure.
    Decode,
    /// The OS call itself failed.
    Transport,
    /// Backend not available for this OS.
    Unimplemented,
}

impl WgError {
    /// Returns the coarse kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotExist => ErrorKind::NotExist,
            Self::InvalidKeyLength(_)
            | Self::InvalidKey(_)
            | Self::InvalidCidr(_)
            | Self::InvalidEndpoint(_)
            | Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Decode(_) => ErrorKind::Decode,
            Self::Errno { .. } | Self::Io(_) => ErrorKind::Transport,
            Self::Unimplemented { .. } => ErrorKind::Unimplemented,
        }
    }

    /// Reports whether the device was not found on this backend.
    #[must_use]
    pub fn is_not_exist(&self) -> bool {
        matches!(self.kind(), ErrorKind::NotExist)
    }

    /// Shorthand for a [`WgError::Decode`] error.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Builds an unimplemented error for `backend`.
    pub fn unimplemented(backend: &'static str, info: impl Into<String>) -> Self {
        Self::Unimplemented {
            backend,
            info: info.into(),
        }
    }
}
