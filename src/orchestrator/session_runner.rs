//! Bounded batch loop for one orchestration session.
//!
//! [`Orchestrator::run`] walks a session through its phases:
//!
//! 1. **Init**: check the payload exists, clear state if `fresh`, acquire
//!    the engine. Any failure here aborts before an engine exists.
//! 2. **Running**: restore persisted state (best-effort), then execute
//!    batches until the engine signals completion, the batch budget runs out,
//!    a batch fails or times out, or the cancellation token fires. Export and
//!    save the engine state (best-effort).
//! 3. **Releasing**: release the engine, whatever happened before.
//!
//! After a batch is abandoned (failure, timeout, interrupt) the engine may
//! still be busy, so export and release are each bounded by the batch
//! timeout, or [`ABANDON_GRACE`] when none is set.
//!
//! Only Init failures abort. Everything else is captured as a
//! [`SessionIssue`] and the session still produces its accumulated payload.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::accumulator::SessionAccumulator;
use super::lease::EngineLease;
use crate::config::GlobalConfig;
use crate::engine::{backend_for, Engine, EngineBackend};
use crate::frame::FrameParser;
use crate::models::batch::BatchResult;
use crate::models::session::{
    BatchTiming, IssueStage, SessionIssue, SessionOutcome, SessionPhase, SessionReport,
};
use crate::persistence::StateStore;
use crate::{AppError, Result};

/// Bound on export and release after an abandoned batch when no batch
/// timeout is configured.
pub const ABANDON_GRACE: Duration = Duration::from_secs(10);

/// Per-session settings, derived from [`GlobalConfig`] or built directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Payload handed to the engine at acquisition.
    pub payload_path: PathBuf,
    /// State file read at start and written at end.
    pub state_path: PathBuf,
    /// Units of work per batch.
    pub batch_size: u32,
    /// Maximum batches in this session.
    pub max_batches: u32,
    /// Optional limit on a single batch.
    pub batch_timeout: Option<Duration>,
    /// Clear persisted state before starting.
    pub fresh: bool,
}

impl From<&GlobalConfig> for SessionConfig {
    fn from(config: &GlobalConfig) -> Self {
        Self {
            payload_path: config.payload_path.clone(),
            state_path: config.state_path.clone(),
            batch_size: config.batch_size,
            max_batches: config.max_batches,
            batch_timeout: config.batch_timeout(),
            fresh: config.fresh,
        }
    }
}

/// Drives one engine through a bounded sequence of batches.
pub struct Orchestrator {
    config: SessionConfig,
    backend: Box<dyn EngineBackend>,
    parser: FrameParser,
    store: StateStore,
}

impl Orchestrator {
    /// Orchestrator over an explicit backend and parser.
    #[must_use]
    pub fn new(config: SessionConfig, backend: Box<dyn EngineBackend>, parser: FrameParser) -> Self {
        let store = StateStore::new(config.state_path.clone());
        Self {
            config,
            backend,
            parser,
            store,
        }
    }

    /// Orchestrator wired from the global configuration.
    #[must_use]
    pub fn from_global(config: &GlobalConfig) -> Self {
        Self::new(
            SessionConfig::from(config),
            backend_for(&config.engine),
            FrameParser::new(&config.frame),
        )
    }

    /// Run one session to its end and report what happened.
    ///
    /// Never returns an error: failures are recorded in the report, and the
    /// engine, once acquired, is released exactly once on every path.
    pub async fn run(&self, cancel: &CancellationToken) -> SessionReport {
        let mut report = SessionReport::new(self.config.batch_size);
        let span = info_span!("session", session_id = %report.session_id);

        async {
            let outcome = self.drive(&mut report, cancel).await;
            report.outcome = outcome;
            report.finished_at = Utc::now();

            info!(
                outcome = outcome.label(),
                batches = report.batches_run,
                units = report.units_executed(),
                fragments = report.fragments,
                issues = report.issues.len(),
                "session ended"
            );
        }
        .instrument(span)
        .await;

        report
    }

    async fn drive(&self, report: &mut SessionReport, cancel: &CancellationToken) -> SessionOutcome {
        let mut phase = SessionPhase::Init;
        info!(
            backend = self.backend.name(),
            payload = %self.config.payload_path.display(),
            state = %self.store.path().display(),
            batch_size = self.config.batch_size,
            max_batches = self.config.max_batches,
            "session starting"
        );

        if let Err(err) = self.check_preconditions().await {
            record(report, IssueStage::Precondition, None, &err);
            advance(&mut phase, SessionPhase::Aborted);
            return SessionOutcome::Aborted;
        }

        if self.config.fresh {
            if let Err(err) = self.store.clear().await {
                record(report, IssueStage::Clear, None, &err);
            }
        }

        let session_id = report.session_id.clone();
        let acquired =
            EngineLease::acquire(self.backend.as_ref(), &self.config.payload_path, &session_id)
                .await;
        let mut lease = match acquired {
            Ok(lease) => lease,
            Err(err) => {
                record(report, IssueStage::Acquire, None, &err);
                advance(&mut phase, SessionPhase::Aborted);
                return SessionOutcome::Aborted;
            }
        };
        advance(&mut phase, SessionPhase::Running);

        let resumed = self
            .restore_state(lease.engine(), report)
            .instrument(info_span!("restore"))
            .await;
        report.resumed = resumed;
        let outcome = self
            .run_batches(lease.engine(), report, cancel)
            .instrument(info_span!("batches"))
            .await;
        let grace = match outcome {
            SessionOutcome::Stopped | SessionOutcome::Interrupted => {
                Some(self.config.batch_timeout.unwrap_or(ABANDON_GRACE))
            }
            _ => None,
        };
        self.persist_state(lease.engine(), report, grace)
            .instrument(info_span!("persist"))
            .await;

        advance(&mut phase, SessionPhase::Releasing);
        if let Err(err) = within(grace, "release", lease.release()).await {
            record(report, IssueStage::Release, None, &err);
        }
        advance(&mut phase, outcome.final_phase());

        outcome
    }

    async fn check_preconditions(&self) -> Result<()> {
        let path = &self.config.payload_path;
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Ok(()),
            Ok(_) => Err(AppError::Acquisition(format!(
                "payload {} is not a file",
                path.display()
            ))),
            Err(err) => Err(AppError::Acquisition(format!(
                "payload {} not found: {err}",
                path.display()
            ))),
        }
    }

    /// Load persisted state into the engine. Returns whether it was imported.
    async fn restore_state(&self, engine: &mut dyn Engine, report: &mut SessionReport) -> bool {
        let blob = match self.store.load().await {
            Ok(Some(blob)) => blob,
            Ok(None) => {
                info!("no previous state, starting fresh");
                return false;
            }
            Err(err) => {
                record(report, IssueStage::Load, None, &err);
                return false;
            }
        };

        let fingerprint = blob.fingerprint();
        match engine.import_state(blob).await {
            Ok(()) => {
                info!(state = %fingerprint, "resumed from previous session");
                true
            }
            Err(err) => {
                record(report, IssueStage::Import, None, &err);
                warn!("continuing with default engine state");
                false
            }
        }
    }

    async fn run_batches(
        &self,
        engine: &mut dyn Engine,
        report: &mut SessionReport,
        cancel: &CancellationToken,
    ) -> SessionOutcome {
        let mut accumulator = SessionAccumulator::new();
        let mut batch: u32 = 1;

        let outcome = loop {
            if batch > self.config.max_batches {
                break SessionOutcome::BudgetExhausted;
            }

            let step = tokio::select! {
                biased;
                () = cancel.cancelled() => None,
                result = self.execute(engine, batch) => Some(result),
            };

            let result = match step {
                None => {
                    info!(batch, "interrupt received, stopping batch loop");
                    break SessionOutcome::Interrupted;
                }
                Some(Err(err)) => {
                    record(report, IssueStage::Execute, Some(batch), &err);
                    break SessionOutcome::Stopped;
                }
                Some(Ok(result)) => result,
            };

            let frame = self.parser.parse(&result.raw_output);
            let elapsed_ms = u64::try_from(result.elapsed.as_millis()).unwrap_or(u64::MAX);
            report.timings.push(BatchTiming {
                batch,
                elapsed_ms,
                payload_bytes: frame.payload.len(),
            });
            info!(
                batch,
                max_batches = self.config.max_batches,
                elapsed_ms,
                cold_start = batch == 1,
                payload_bytes = frame.payload.len(),
                terminal = frame.is_terminal,
                "batch complete"
            );
            if !accumulator.push(frame.payload) {
                debug!(batch, "batch produced no payload");
            }

            batch += 1;

            if frame.is_terminal {
                break SessionOutcome::Completed;
            }
        };

        report.batches_run = batch - 1;
        report.fragments = accumulator.len();
        report.payload = accumulator.joined();
        outcome
    }

    async fn execute(&self, engine: &mut dyn Engine, batch: u32) -> Result<BatchResult> {
        let run = engine.execute_batch(self.config.batch_size);
        match self.config.batch_timeout {
            Some(limit) => tokio::time::timeout(limit, run).await.map_err(|_elapsed| {
                AppError::Execution(format!("batch {batch} timed out after {limit:?}"))
            })?,
            None => run.await,
        }
    }

    async fn persist_state(
        &self,
        engine: &mut dyn Engine,
        report: &mut SessionReport,
        grace: Option<Duration>,
    ) {
        let blob = match within(grace, "export", engine.export_state()).await {
            Ok(blob) => blob,
            Err(err) => {
                record(report, IssueStage::Export, None, &err);
                return;
            }
        };

        match self.store.save(&blob).await {
            Ok(()) => report.state_fingerprint = Some(blob.fingerprint()),
            Err(err) => record(report, IssueStage::Save, None, &err),
        }
    }
}

async fn within<T>(
    limit: Option<Duration>,
    what: &str,
    work: impl Future<Output = Result<T>>,
) -> Result<T> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, work)
            .await
            .map_err(|_elapsed| AppError::Execution(format!("{what} timed out after {limit:?}")))?,
        None => work.await,
    }
}

fn record(report: &mut SessionReport, stage: IssueStage, batch: Option<u32>, err: &AppError) {
    warn!(?stage, batch, %err, fatal = err.is_fatal(), "session issue");
    report.issues.push(SessionIssue {
        stage,
        batch,
        message: err.to_string(),
    });
}

fn advance(phase: &mut SessionPhase, next: SessionPhase) {
    debug_assert!(
        phase.can_transition_to(next),
        "invalid session transition {phase:?} -> {next:?}"
    );
    debug!(from = ?*phase, to = ?next, "session phase");
    *phase = next;
}
