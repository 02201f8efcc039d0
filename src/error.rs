//! Error types and exit codes for replserver

use std::net::SocketAddr;
use std::process::ExitCode;
use thiserror::Error;

/// Main error type for server control operations
#[derive(Error, Debug)]
pub enum ReplError {
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Config error: {message}")]
    Config { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ReplError {
    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Convert error to a process exit code:
    /// - 1: IO error
    /// - 2: Invalid configuration / config file
    /// - 3: Invalid state
    /// - 4: Bind failure
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Io(_) => ExitCode::from(1),
            Self::InvalidConfig { .. } | Self::Config { .. } => ExitCode::from(2),
            Self::InvalidState { .. } => ExitCode::from(3),
            Self::Bind { .. } => ExitCode::from(4),
        }
    }
}

/// Result type alias for server control operations
pub type Result<T> = std::result::Result<T, ReplError>;
