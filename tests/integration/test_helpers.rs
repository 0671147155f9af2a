//! Shared test helpers for orchestration integration tests.
//!
//! Provides a scripted in-memory engine whose every call is appended to a
//! shared event log, a backend serving the simulated engine over an
//! in-memory wire, plus session configuration rooted in a temp directory.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use batch_conductor::engine::simulated::SimulatedBackend;
use batch_conductor::engine::wire::{self, RemoteEngine};
use batch_conductor::engine::{Engine, EngineBackend, EngineFuture};
use batch_conductor::frame::FrameParser;
use batch_conductor::models::batch::BatchResult;
use batch_conductor::models::state::StateBlob;
use batch_conductor::orchestrator::SessionConfig;
use batch_conductor::AppError;

pub const START: &str = "<START>";
pub const END: &str = "<END>";
pub const SENTINEL: &str = "Game complete";

/// Parser matching the markers produced by [`framed`] and [`terminal`].
pub fn parser() -> FrameParser {
    FrameParser::with_markers(START, END, SENTINEL)
}

/// Raw output carrying `text` as its payload.
pub fn framed(text: &str) -> String {
    format!("noise\n{START}\n{text}\n{END}\ntrailer")
}

/// Raw output carrying `text` and the completion sentinel.
pub fn terminal(text: &str) -> String {
    format!("{START}\n{text}\n{END}\n{SENTINEL}")
}

/// What the scripted engine does on one `execute_batch` call.
#[derive(Debug, Clone)]
pub enum Step {
    /// Return this raw output.
    Output(String),
    /// Fail with `AppError::Execution`.
    Fail(&'static str),
    /// Never complete.
    Hang,
}

/// Calls observed across every engine the backend hands out.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<&'static str>>,
    imported: Mutex<Vec<StateBlob>>,
}

impl EventLog {
    fn push(&self, event: &'static str) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| **e == event)
            .count()
    }

    pub fn imported(&self) -> Vec<StateBlob> {
        self.imported.lock().unwrap().clone()
    }
}

/// Backend handing out [`ScriptedEngine`]s that replay a fixed script.
#[derive(Debug, Clone)]
pub struct ScriptedBackend {
    steps: Vec<Step>,
    fail_acquire: Option<&'static str>,
    fail_import: Option<&'static str>,
    fail_export: Option<&'static str>,
    fail_release: Option<&'static str>,
    hang_export: bool,
    hang_release: bool,
    exported: StateBlob,
    log: Arc<EventLog>,
}

impl ScriptedBackend {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            fail_acquire: None,
            fail_import: None,
            fail_export: None,
            fail_release: None,
            hang_export: false,
            hang_release: false,
            exported: StateBlob::new(b"scripted-state".to_vec()),
            log: Arc::new(EventLog::default()),
        }
    }

    /// Backend whose every batch returns non-terminal framed output.
    pub fn endless(batches: usize) -> Self {
        Self::new(
            (1..=batches)
                .map(|n| Step::Output(framed(&format!("out {n}"))))
                .collect(),
        )
    }

    pub fn failing_acquire(mut self, message: &'static str) -> Self {
        self.fail_acquire = Some(message);
        self
    }

    pub fn failing_import(mut self, message: &'static str) -> Self {
        self.fail_import = Some(message);
        self
    }

    pub fn failing_export(mut self, message: &'static str) -> Self {
        self.fail_export = Some(message);
        self
    }

    pub fn failing_release(mut self, message: &'static str) -> Self {
        self.fail_release = Some(message);
        self
    }

    /// Export never completes, as with an engine stuck on an abandoned batch.
    pub fn hanging_export(mut self) -> Self {
        self.hang_export = true;
        self
    }

    pub fn hanging_release(mut self) -> Self {
        self.hang_release = true;
        self
    }

    pub fn exporting(mut self, blob: StateBlob) -> Self {
        self.exported = blob;
        self
    }

    /// Shared log; clone it before boxing the backend into an orchestrator.
    pub fn log(&self) -> Arc<EventLog> {
        Arc::clone(&self.log)
    }
}

impl EngineBackend for ScriptedBackend {
    fn acquire<'a>(
        &'a self,
        _payload: &'a Path,
        _session_id: &'a str,
    ) -> EngineFuture<'a, Box<dyn Engine>> {
        Box::pin(async move {
            self.log.push("acquire");
            if let Some(message) = self.fail_acquire {
                return Err(AppError::Acquisition(message.into()));
            }
            Ok(Box::new(ScriptedEngine {
                steps: self.steps.iter().cloned().collect(),
                config: self.clone(),
            }) as Box<dyn Engine>)
        })
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Engine replaying the steps of its backend in order.
pub struct ScriptedEngine {
    steps: VecDeque<Step>,
    config: ScriptedBackend,
}

impl Engine for ScriptedEngine {
    fn import_state(&mut self, blob: StateBlob) -> EngineFuture<'_, ()> {
        Box::pin(async move {
            self.config.log.push("import");
            if let Some(message) = self.config.fail_import {
                return Err(AppError::Execution(message.into()));
            }
            self.config.log.imported.lock().unwrap().push(blob);
            Ok(())
        })
    }

    fn execute_batch(&mut self, _batch_size: u32) -> EngineFuture<'_, BatchResult> {
        Box::pin(async move {
            self.config.log.push("execute");
            match self.steps.pop_front() {
                Some(Step::Output(raw)) => Ok(BatchResult::new(raw, Duration::from_millis(1))),
                Some(Step::Fail(message)) => Err(AppError::Execution(message.into())),
                Some(Step::Hang) => std::future::pending().await,
                None => Ok(BatchResult::new(String::new(), Duration::ZERO)),
            }
        })
    }

    fn export_state(&mut self) -> EngineFuture<'_, StateBlob> {
        Box::pin(async move {
            self.config.log.push("export");
            if self.config.hang_export {
                std::future::pending::<()>().await;
            }
            match self.config.fail_export {
                Some(message) => Err(AppError::Execution(message.into())),
                None => Ok(self.config.exported.clone()),
            }
        })
    }

    fn release(&mut self) -> EngineFuture<'_, ()> {
        Box::pin(async move {
            self.config.log.push("release");
            if self.config.hang_release {
                std::future::pending::<()>().await;
            }
            match self.config.fail_release {
                Some(message) => Err(AppError::Execution(message.into())),
                None => Ok(()),
            }
        })
    }
}

/// Backend serving a [`SimulatedBackend`] through `wire::serve` on an
/// in-memory duplex, one server task per acquisition.
#[derive(Debug)]
pub struct DuplexBackend {
    warmup: Duration,
    log: Arc<EventLog>,
}

impl DuplexBackend {
    pub fn new(warmup: Duration) -> Self {
        Self {
            warmup,
            log: Arc::new(EventLog::default()),
        }
    }

    pub fn log(&self) -> Arc<EventLog> {
        Arc::clone(&self.log)
    }
}

impl EngineBackend for DuplexBackend {
    fn acquire<'a>(
        &'a self,
        payload: &'a Path,
        _session_id: &'a str,
    ) -> EngineFuture<'a, Box<dyn Engine>> {
        Box::pin(async move {
            self.log.push("acquire");
            let (client, server) = tokio::io::duplex(64 * 1024);
            let warmup = self.warmup;
            tokio::spawn(async move {
                let backend = SimulatedBackend::new(1, warmup);
                let (reader, writer) = tokio::io::split(server);
                // The client may hang up mid-batch; the write error is expected.
                let _ = wire::serve(reader, writer, &backend).await;
            });

            let (reader, writer) = tokio::io::split(client);
            let remote =
                RemoteEngine::connect(reader, writer, payload, Duration::from_secs(5)).await?;
            Ok(Box::new(LoggedEngine {
                inner: Box::new(remote),
                log: Arc::clone(&self.log),
            }) as Box<dyn Engine>)
        })
    }

    fn name(&self) -> &'static str {
        "duplex"
    }
}

/// Engine wrapper recording each call in an [`EventLog`].
pub struct LoggedEngine {
    inner: Box<dyn Engine>,
    log: Arc<EventLog>,
}

impl Engine for LoggedEngine {
    fn import_state(&mut self, blob: StateBlob) -> EngineFuture<'_, ()> {
        self.log.push("import");
        self.inner.import_state(blob)
    }

    fn execute_batch(&mut self, batch_size: u32) -> EngineFuture<'_, BatchResult> {
        self.log.push("execute");
        self.inner.execute_batch(batch_size)
    }

    fn export_state(&mut self) -> EngineFuture<'_, StateBlob> {
        self.log.push("export");
        self.inner.export_state()
    }

    fn release(&mut self) -> EngineFuture<'_, ()> {
        self.log.push("release");
        self.inner.release()
    }
}

/// Session rooted in `dir`, with an existing payload file and state at
/// `dir/state.bin`.
pub fn session_in(dir: &Path, max_batches: u32) -> SessionConfig {
    let payload_path = dir.join("payload.bin");
    std::fs::write(&payload_path, b"payload").expect("write payload");
    SessionConfig {
        payload_path,
        state_path: dir.join("state.bin"),
        batch_size: 100,
        max_batches,
        batch_timeout: None,
        fresh: false,
    }
}
