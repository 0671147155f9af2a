//! Global configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::engine::codec::DEFAULT_MAX_MESSAGE_BYTES;
use crate::{AppError, Result};

/// Which engine backend a session acquires.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// Deterministic in-process engine driven directly by the orchestrator.
    Simulated,
    /// Out-of-process engine spoken to over stdio NDJSON.
    Process,
}

/// Engine backend settings.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct EngineConfig {
    /// Backend selection.
    pub kind: EngineKind,
    /// Engine executable for the process backend.
    pub command: String,
    /// Arguments passed to `command`.
    pub args: Vec<String>,
    /// Maximum wait for the process engine's ready line.
    pub startup_timeout_seconds: u64,
    /// Cap on one wire message from the process engine. One batch's output
    /// travels in one message, so this also caps a batch's output.
    pub max_message_bytes: usize,
    /// Units of work the simulated engine spends per payload line.
    pub units_per_line: u32,
    /// Artificial delay before the simulated engine's first batch.
    pub warmup_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kind: EngineKind::Simulated,
            command: "batch-conductor-sim".into(),
            args: Vec::new(),
            startup_timeout_seconds: 30,
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            units_per_line: 1,
            warmup_ms: 0,
        }
    }
}

impl EngineConfig {
    /// Startup window for the process backend.
    #[must_use]
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_seconds)
    }
}

/// Marker strings recognized by the output frame parser.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct FrameConfig {
    /// A line containing any of these opens the content region.
    pub start_markers: Vec<String>,
    /// A line containing any of these closes the content region.
    pub end_markers: Vec<String>,
    /// Section headers treated as framing wherever they appear.
    pub header_markers: Vec<String>,
    /// Characters that make up decorative borders.
    pub border_chars: String,
    /// Substring signalling that the engine has finished.
    pub terminal_sentinel: String,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            start_markers: vec!["ZORK OUTPUT".into(), "interpret(".into()],
            end_markers: vec!["END OUTPUT".into()],
            header_markers: vec![
                "ACCUMULATED OUTPUT".into(),
                "ACCUMULATED GAME OUTPUT".into(),
            ],
            border_chars: "╔╗╚╝║═─│=".into(),
            terminal_sentinel: "Game complete".into(),
        }
    }
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case", default)]
pub struct GlobalConfig {
    /// Input payload loaded by the engine at acquisition.
    pub payload_path: PathBuf,
    /// File holding the persisted engine state between sessions.
    pub state_path: PathBuf,
    /// Units of work requested per `execute_batch` call.
    pub batch_size: u32,
    /// Hard upper bound on batches per session.
    pub max_batches: u32,
    /// Per-batch timeout; 0 means no timeout.
    pub batch_timeout_seconds: u64,
    /// Discard any persisted state before the session starts.
    pub fresh: bool,
    /// Engine backend settings.
    pub engine: EngineConfig,
    /// Frame parser markers.
    pub frame: FrameConfig,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            payload_path: PathBuf::from("game/zork1.z3"),
            state_path: PathBuf::from("/tmp/zork_state.bin"),
            batch_size: 100,
            max_batches: 50,
            batch_timeout_seconds: 0,
            fresh: false,
            engine: EngineConfig::default(),
            frame: FrameConfig::default(),
        }
    }
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Per-batch timeout, if one is configured.
    #[must_use]
    pub fn batch_timeout(&self) -> Option<Duration> {
        (self.batch_timeout_seconds > 0).then(|| Duration::from_secs(self.batch_timeout_seconds))
    }

    /// Check cross-field constraints.
    ///
    /// Called after parsing and again after CLI overrides are applied.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(AppError::Config(
                "batch_size must be greater than zero".into(),
            ));
        }

        if self.max_batches == 0 {
            return Err(AppError::Config(
                "max_batches must be greater than zero".into(),
            ));
        }

        if self.frame.start_markers.iter().all(|m| m.trim().is_empty()) {
            return Err(AppError::Config(
                "frame.start_markers must contain at least one marker".into(),
            ));
        }

        if self.frame.terminal_sentinel.is_empty() {
            return Err(AppError::Config(
                "frame.terminal_sentinel must not be empty".into(),
            ));
        }

        if self.engine.units_per_line == 0 {
            return Err(AppError::Config(
                "engine.units_per_line must be greater than zero".into(),
            ));
        }

        if self.engine.max_message_bytes == 0 {
            return Err(AppError::Config(
                "engine.max_message_bytes must be greater than zero".into(),
            ));
        }

        if self.engine.kind == EngineKind::Process && self.engine.command.trim().is_empty() {
            return Err(AppError::Config(
                "engine.command is required for the process backend".into(),
            ));
        }

        Ok(())
    }
}
