//! Deterministic in-process engine.
//!
//! Plays back a text payload one line at a time. Each line costs
//! `units_per_line` units of work, so a batch may finish several lines or
//! none at all. Once the last line is out, every batch reports the
//! completion sentinel.
//!
//! State blob layout (25 bytes):
//!
//! | Offset | Size | Field                                  |
//! |--------|------|----------------------------------------|
//! | 0      | 4    | magic `SIM1`                           |
//! | 4      | 8    | SHA-256 prefix of the payload          |
//! | 12     | 8    | next line index (u64 LE)               |
//! | 20     | 4    | units spent on the current line (u32 LE)|
//! | 24     | 1    | finished flag                          |

use std::path::Path;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::{Engine, EngineBackend, EngineFuture};
use crate::config::EngineConfig;
use crate::models::batch::BatchResult;
use crate::models::state::StateBlob;
use crate::{AppError, Result};

const STATE_MAGIC: &[u8; 4] = b"SIM1";
const STATE_LEN: usize = 25;

/// Completion line written after the payload is exhausted.
pub const COMPLETION_LINE: &str = "Game complete";

const HEADER: &str = "\
╔══════════════════════════════════════╗
║  ZORK OUTPUT                         ║
╚══════════════════════════════════════╝";
const FOOTER: &str = "════════════ END OUTPUT ════════════";

/// Backend producing [`SimulatedEngine`]s.
#[derive(Debug, Clone)]
pub struct SimulatedBackend {
    units_per_line: u32,
    warmup: Duration,
}

impl SimulatedBackend {
    /// Backend with an explicit cost model and first-batch delay.
    #[must_use]
    pub fn new(units_per_line: u32, warmup: Duration) -> Self {
        Self {
            units_per_line: units_per_line.max(1),
            warmup,
        }
    }

    /// Backend configured from the `[engine]` section.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.units_per_line, Duration::from_millis(config.warmup_ms))
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

impl EngineBackend for SimulatedBackend {
    fn acquire<'a>(
        &'a self,
        payload: &'a Path,
        session_id: &'a str,
    ) -> EngineFuture<'a, Box<dyn Engine>> {
        Box::pin(async move {
            let bytes = tokio::fs::read(payload).await.map_err(|err| {
                AppError::Acquisition(format!(
                    "cannot load payload {}: {err}",
                    payload.display()
                ))
            })?;
            let engine = SimulatedEngine::from_payload(&bytes, self.units_per_line, self.warmup)?;
            info!(
                session_id,
                lines = engine.lines.len(),
                "simulated engine initialized"
            );
            Ok(Box::new(engine) as Box<dyn Engine>)
        })
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

/// Payload playback engine with a byte-serializable cursor.
#[derive(Debug, Clone)]
pub struct SimulatedEngine {
    lines: Vec<String>,
    digest: [u8; 8],
    units_per_line: u32,
    warmup: Option<Duration>,
    cursor: u64,
    partial: u32,
    finished: bool,
    released: bool,
}

impl SimulatedEngine {
    /// Build an engine over raw payload bytes (decoded lossily as UTF-8).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Acquisition` if the payload has no lines.
    pub fn from_payload(payload: &[u8], units_per_line: u32, warmup: Duration) -> Result<Self> {
        let text = String::from_utf8_lossy(payload);
        let lines: Vec<String> = text.lines().map(ToOwned::to_owned).collect();
        if lines.is_empty() {
            return Err(AppError::Acquisition("payload is empty".into()));
        }

        let mut hasher = Sha256::new();
        hasher.update(payload);
        let mut digest = [0u8; 8];
        digest.copy_from_slice(&hasher.finalize()[..8]);

        Ok(Self {
            lines,
            digest,
            units_per_line: units_per_line.max(1),
            warmup: (!warmup.is_zero()).then_some(warmup),
            cursor: 0,
            partial: 0,
            finished: false,
            released: false,
        })
    }

    /// Whether the payload has been fully played back.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Serialize the playback position.
    #[must_use]
    pub fn snapshot(&self) -> StateBlob {
        let mut bytes = Vec::with_capacity(STATE_LEN);
        bytes.extend_from_slice(STATE_MAGIC);
        bytes.extend_from_slice(&self.digest);
        bytes.extend_from_slice(&self.cursor.to_le_bytes());
        bytes.extend_from_slice(&self.partial.to_le_bytes());
        bytes.push(u8::from(self.finished));
        StateBlob::new(bytes)
    }

    /// Restore a playback position produced by [`snapshot`](Self::snapshot).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Execution` if the blob is malformed, belongs to a
    /// different payload, or points past the end of it. The current state is
    /// left untouched on error.
    pub fn restore(&mut self, blob: &StateBlob) -> Result<()> {
        let bytes = blob.as_bytes();
        if bytes.len() != STATE_LEN || &bytes[..4] != STATE_MAGIC {
            return Err(AppError::Execution(format!(
                "unrecognized state blob ({} bytes)",
                bytes.len()
            )));
        }
        if bytes[4..12] != self.digest {
            return Err(AppError::Execution(
                "state blob was exported for a different payload".into(),
            ));
        }

        let mut cursor = [0u8; 8];
        cursor.copy_from_slice(&bytes[12..20]);
        let mut partial = [0u8; 4];
        partial.copy_from_slice(&bytes[20..24]);
        let cursor = u64::from_le_bytes(cursor);
        let partial = u32::from_le_bytes(partial);

        if cursor > self.lines.len() as u64 || partial >= self.units_per_line {
            return Err(AppError::Execution(
                "state blob position is out of range".into(),
            ));
        }

        self.cursor = cursor;
        self.partial = partial;
        self.finished = bytes[24] != 0;
        Ok(())
    }

    /// Spend `budget` units and render the framed output for them.
    #[must_use]
    pub fn step(&mut self, budget: u32) -> String {
        let mut remaining = budget;
        let mut emitted: Vec<&str> = Vec::new();

        while remaining > 0 && !self.finished {
            let Some(line) = usize::try_from(self.cursor)
                .ok()
                .and_then(|idx| self.lines.get(idx))
            else {
                self.finished = true;
                break;
            };

            let needed = self.units_per_line - self.partial;
            if remaining >= needed {
                remaining -= needed;
                self.partial = 0;
                self.cursor += 1;
                emitted.push(line);
            } else {
                self.partial += remaining;
                remaining = 0;
            }
        }

        if self.cursor >= self.lines.len() as u64 {
            self.finished = true;
        }

        let mut output = String::from(HEADER);
        output.push('\n');
        for line in &emitted {
            output.push_str(line);
            output.push('\n');
        }
        output.push_str(FOOTER);
        output.push('\n');
        if self.finished {
            output.push_str(COMPLETION_LINE);
            output.push('\n');
        }

        debug!(
            budget,
            lines = emitted.len(),
            cursor = self.cursor,
            finished = self.finished,
            "simulated batch stepped"
        );
        output
    }

    fn ensure_live(&self) -> Result<()> {
        if self.released {
            return Err(AppError::Execution("engine already released".into()));
        }
        Ok(())
    }
}

impl Engine for SimulatedEngine {
    fn import_state(&mut self, blob: StateBlob) -> EngineFuture<'_, ()> {
        Box::pin(async move {
            self.ensure_live()?;
            self.restore(&blob)
        })
    }

    fn execute_batch(&mut self, batch_size: u32) -> EngineFuture<'_, BatchResult> {
        Box::pin(async move {
            self.ensure_live()?;
            let started = Instant::now();
            if let Some(warmup) = self.warmup.take() {
                tokio::time::sleep(warmup).await;
            }
            let output = self.step(batch_size);
            Ok(BatchResult::new(output, started.elapsed()))
        })
    }

    fn export_state(&mut self) -> EngineFuture<'_, StateBlob> {
        Box::pin(async move {
            self.ensure_live()?;
            Ok(self.snapshot())
        })
    }

    fn release(&mut self) -> EngineFuture<'_, ()> {
        Box::pin(async move {
            if !self.released {
                self.released = true;
                debug!("simulated engine released");
            }
            Ok(())
        })
    }
}
