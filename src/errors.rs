//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Engine could not be acquired or the payload could not be loaded.
    ///
    /// Fatal for the session: nothing runs after it.
    Acquisition(String),
    /// State file could not be read, written, or removed.
    Storage(String),
    /// A batch (or a state transfer) failed inside the engine, or timed out.
    Execution(String),
    /// Wire-level failure talking to an out-of-process engine.
    Protocol(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl AppError {
    /// Whether the error ends a session before any output is produced.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Acquisition(_) | Self::Config(_))
    }

    /// Message without the kind prefix.
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Config(msg)
            | Self::Acquisition(msg)
            | Self::Storage(msg)
            | Self::Execution(msg)
            | Self::Protocol(msg)
            | Self::Io(msg) => msg,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Acquisition(msg) => write!(f, "acquisition: {msg}"),
            Self::Storage(msg) => write!(f, "storage: {msg}"),
            Self::Execution(msg) => write!(f, "execution: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(format!("malformed json: {err}"))
    }
}
