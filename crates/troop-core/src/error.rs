//! Error types for troop-core

use crate::backend::process::ReplState;
use thiserror::Error;

/// Result type alias for troop-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building or driving a backend
#[derive(Debug, Error)]
pub enum Error {
    /// The configured backend identifier is not one we know how to build
    #[error("Unknown backend '{0}' (expected one of: embedded, network, process)")]
    UnknownBackend(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// The network backend was selected without a credential
    #[error("The network backend requires a credential")]
    MissingCredential,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// OSC encoding error
    #[error("OSC error: {0}")]
    Osc(#[from] rosc::OscError),

    /// The transport to the engine failed (refused, broken pipe, exited)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The engine reported a failure while running a block
    #[error("{0}")]
    Execution(String),

    /// The process backend has not finished bootstrapping
    #[error("Backend is not ready (state: {0})")]
    NotReady(ReplState),

    /// The backend has been terminated
    #[error("Backend has been terminated")]
    Terminated,

    /// Keyword pattern compilation error
    #[error("Keyword pattern error: {0}")]
    Pattern(#[from] regex::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl Error {
    /// Whether this error can only happen while building a backend.
    ///
    /// These are the only errors allowed to abort startup.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::UnknownBackend(_)
                | Error::Config(_)
                | Error::MissingCredential
                | Error::ConfigParse(_)
        )
    }
}
