//! Out-of-process engine backend.
//!
//! Spawns the engine executable with:
//! - `kill_on_drop(true)` so a child is never orphaned, even if the session
//!   future is dropped before release.
//! - `env_clear()` plus an allowlist, so the engine only sees what it needs.
//! - a startup timeout covering the ready line; on expiry the child is
//!   killed and acquisition fails.
//!
//! The stdio stream then carries the [`wire`](super::wire) protocol.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{info, warn};

use super::codec::EngineCodec;
use super::wire::RemoteEngine;
use super::{Engine, EngineBackend, EngineFuture};
use crate::config::EngineConfig;
use crate::models::batch::BatchResult;
use crate::models::state::StateBlob;
use crate::{AppError, Result};

/// Environment variables inherited by the engine process.
pub const ALLOWED_ENV_VARS: &[&str] = &[
    "PATH",
    "HOME",
    "RUST_LOG",
    // Windows-specific variables.
    "USERPROFILE",
    "SystemRoot",
    "TEMP",
    "TMP",
    "USERNAME",
    "APPDATA",
    "LOCALAPPDATA",
    "COMSPEC",
];

/// How long `release` waits for the child to exit after `shutdown` before
/// killing it.
const EXIT_GRACE: Duration = Duration::from_secs(5);

/// Configuration for spawning an engine process.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Engine executable.
    pub command: String,
    /// Arguments passed to the executable.
    pub args: Vec<String>,
    /// Maximum wait for the ready line.
    pub startup_timeout: Duration,
    /// Cap on one inbound wire message, and so on one batch's output.
    pub max_message_bytes: usize,
}

/// Backend that acquires engines by spawning a child process.
#[derive(Debug, Clone)]
pub struct ProcessBackend {
    spawn: SpawnConfig,
}

impl ProcessBackend {
    /// Backend with an explicit spawn configuration.
    #[must_use]
    pub fn new(spawn: SpawnConfig) -> Self {
        Self { spawn }
    }

    /// Backend configured from the `[engine]` section.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(SpawnConfig {
            command: config.command.clone(),
            args: config.args.clone(),
            startup_timeout: config.startup_timeout(),
            max_message_bytes: config.max_message_bytes,
        })
    }
}

impl EngineBackend for ProcessBackend {
    fn acquire<'a>(
        &'a self,
        payload: &'a Path,
        session_id: &'a str,
    ) -> EngineFuture<'a, Box<dyn Engine>> {
        Box::pin(async move {
            let engine = ProcessEngine::spawn(&self.spawn, payload, session_id).await?;
            Ok(Box::new(engine) as Box<dyn Engine>)
        })
    }

    fn name(&self) -> &'static str {
        "process"
    }
}

/// Engine running in a child process.
pub struct ProcessEngine {
    session_id: String,
    child: Child,
    remote: RemoteEngine<ChildStdout, ChildStdin>,
    released: bool,
}

impl ProcessEngine {
    /// Spawn the engine, wait for its ready line, and load `payload`.
    ///
    /// # Errors
    ///
    /// - `AppError::Acquisition("failed to spawn engine: …")` on OS spawn
    ///   failure.
    /// - `AppError::Acquisition` on startup timeout, early exit, or a
    ///   rejected payload. The child is killed in each case.
    pub async fn spawn(config: &SpawnConfig, payload: &Path, session_id: &str) -> Result<Self> {
        // The child does not share our working directory assumptions.
        let payload = tokio::fs::canonicalize(payload).await.map_err(|err| {
            AppError::Acquisition(format!("cannot resolve payload {}: {err}", payload.display()))
        })?;

        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args);

        cmd.env_clear();
        for &key in ALLOWED_ENV_VARS {
            if let Ok(val) = std::env::var(key) {
                cmd.env(key, val);
            }
        }
        cmd.env("BATCH_CONDUCTOR_SESSION_ID", session_id);

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|err| AppError::Acquisition(format!("failed to spawn engine: {err}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AppError::Acquisition("failed to capture engine stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::Acquisition("failed to capture engine stdout".into()))?;

        let codec = EngineCodec::with_limit(config.max_message_bytes);
        let connected =
            RemoteEngine::connect_with(stdout, stdin, codec, &payload, config.startup_timeout)
                .await;
        let remote = match connected {
            Ok(remote) => remote,
            Err(err) => {
                child.kill().await.ok();
                return Err(err);
            }
        };

        info!(
            session_id,
            pid = child.id(),
            command = %config.command,
            "engine process started"
        );

        Ok(Self {
            session_id: session_id.to_owned(),
            child,
            remote,
            released: false,
        })
    }

    async fn shutdown(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        if let Some(request) = self.remote.abandoned_request() {
            // Still running the abandoned request; it will not read `shutdown`.
            warn!(session_id = %self.session_id, request, "killing busy engine process");
            self.remote.shutdown().await.ok();
            return self
                .child
                .kill()
                .await
                .map_err(|err| AppError::Io(format!("failed to kill engine: {err}")));
        }

        let requested = self.remote.shutdown().await;

        match tokio::time::timeout(EXIT_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => {
                info!(session_id = %self.session_id, %status, "engine process exited");
            }
            Ok(Err(err)) => {
                warn!(session_id = %self.session_id, %err, "error waiting for engine process");
                self.child.kill().await.ok();
            }
            Err(_elapsed) => {
                warn!(session_id = %self.session_id, "engine process did not exit, killing");
                self.child
                    .kill()
                    .await
                    .map_err(|err| AppError::Io(format!("failed to kill engine: {err}")))?;
            }
        }

        requested
    }
}

impl Engine for ProcessEngine {
    fn import_state(&mut self, blob: StateBlob) -> EngineFuture<'_, ()> {
        self.remote.import_state(blob)
    }

    fn execute_batch(&mut self, batch_size: u32) -> EngineFuture<'_, BatchResult> {
        self.remote.execute_batch(batch_size)
    }

    fn export_state(&mut self) -> EngineFuture<'_, StateBlob> {
        self.remote.export_state()
    }

    fn release(&mut self) -> EngineFuture<'_, ()> {
        Box::pin(self.shutdown())
    }
}
