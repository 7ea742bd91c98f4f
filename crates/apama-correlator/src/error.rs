//! Error types for correlator communication and process control.

use std::io;

use thiserror::Error;

use crate::toolchain::ApamaTool;

/// Failure of a single HTTP exchange with the correlator.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The response did not arrive within the client-side timeout window.
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("correlator answered with HTTP status {code}")]
    Status { code: u16 },
    #[error("transport error: {0}")]
    Io(String),
}

impl TransportError {
    /// Whether the failure is a response-phase timeout (long-poll expiry).
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    #[must_use]
    pub fn is_connect(&self) -> bool {
        matches!(self, Self::Connect(_))
    }
}

/// Failure of a correlator client operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("malformed correlator response: {0}")]
    Xml(String),
    #[error("correlator response is missing '{0}'")]
    MissingField(&'static str),
    #[error("operation cancelled")]
    Cancelled,
}

impl EngineError {
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(err) if err.is_timeout())
    }

    #[must_use]
    pub fn is_connect(&self) -> bool {
        matches!(self, Self::Transport(err) if err.is_connect())
    }
}

impl From<roxmltree::Error> for EngineError {
    fn from(err: roxmltree::Error) -> Self {
        Self::Xml(err.to_string())
    }
}

/// Failure to resolve an Apama command-line tool.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolchainError {
    #[error("{tool} is not available: {reason}")]
    Unavailable { tool: ApamaTool, reason: String },
}

/// Failure while starting, driving or stopping the correlator process.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Toolchain(#[from] ToolchainError),
    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: ApamaTool,
        #[source]
        source: io::Error,
    },
    #[error("{tool} exited with status {status}: {stderr}")]
    ToolFailed {
        tool: ApamaTool,
        status: String,
        stderr: String,
    },
    #[error("correlator is already running (pid {0})")]
    AlreadyRunning(u32),
    #[error("process i/o error: {0}")]
    Io(#[from] io::Error),
}
