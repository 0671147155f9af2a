//! Session model: lifecycle phases, outcomes, and the final report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle phase of an orchestration session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Preconditions checked, engine not yet acquired.
    Init,
    /// Engine acquired; batches executing.
    Running,
    /// Engine being released.
    Releasing,
    /// Session ended after the engine was released.
    Finished,
    /// Session ended before an engine was acquired.
    Aborted,
}

impl SessionPhase {
    /// Determine whether a phase transition is permitted.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Init, Self::Running | Self::Aborted)
                | (Self::Running, Self::Releasing)
                | (Self::Releasing, Self::Finished)
        )
    }

    /// Whether the phase ends the session.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finished | Self::Aborted)
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionOutcome {
    /// The engine emitted its completion sentinel.
    Completed,
    /// `max_batches` ran out before any completion sentinel (bounded-completion).
    BudgetExhausted,
    /// A batch failed or timed out; output up to that batch is kept.
    Stopped,
    /// An external interrupt ended the batch loop.
    Interrupted,
    /// Preconditions or acquisition failed; no batch ran.
    Aborted,
}

impl SessionOutcome {
    /// Only an engine-signalled completion counts as confirmed.
    #[must_use]
    pub fn is_confirmed_complete(self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Phase the session ends in for this outcome.
    #[must_use]
    pub fn final_phase(self) -> SessionPhase {
        match self {
            Self::Aborted => SessionPhase::Aborted,
            _ => SessionPhase::Finished,
        }
    }

    /// Process exit code for this outcome.
    #[must_use]
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Completed | Self::BudgetExhausted | Self::Stopped => 0,
            Self::Aborted => 1,
            Self::Interrupted => 130,
        }
    }

    /// Short label used in text reports and logs.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::BudgetExhausted => "budget exhausted (not confirmed complete)",
            Self::Stopped => "stopped early (not confirmed complete)",
            Self::Interrupted => "interrupted",
            Self::Aborted => "aborted",
        }
    }
}

/// Session step at which a non-fatal or fatal issue occurred.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IssueStage {
    /// Pre-acquisition checks.
    Precondition,
    /// Clearing persisted state for a fresh session.
    Clear,
    /// Engine acquisition.
    Acquire,
    /// Reading the state file.
    Load,
    /// Handing persisted state to the engine.
    Import,
    /// Running a batch.
    Execute,
    /// Capturing state from the engine.
    Export,
    /// Writing the state file.
    Save,
    /// Releasing the engine.
    Release,
}

/// An error captured during a session instead of being propagated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionIssue {
    /// Step that failed.
    pub stage: IssueStage,
    /// Batch number, for execute failures.
    pub batch: Option<u32>,
    /// Rendered error message.
    pub message: String,
}

/// Timing diagnostics for one completed batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct BatchTiming {
    /// 1-based batch number.
    pub batch: u32,
    /// Milliseconds spent inside the engine.
    pub elapsed_ms: u64,
    /// Bytes of payload extracted from the batch.
    pub payload_bytes: usize,
}

/// Final account of a session, always produced, even on abort.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct SessionReport {
    /// Unique session identifier.
    pub session_id: String,
    /// How the session ended.
    pub outcome: SessionOutcome,
    /// Batches that completed successfully.
    pub batches_run: u32,
    /// Units of work requested per batch.
    pub batch_size: u32,
    /// Accumulated payload, fragments joined with `\n`.
    pub payload: String,
    /// Number of non-empty payload fragments.
    pub fragments: usize,
    /// Persisted state was imported into the engine.
    pub resumed: bool,
    /// SHA-256 of the state saved at session end, if a save succeeded.
    pub state_fingerprint: Option<String>,
    /// Errors encountered along the way.
    pub issues: Vec<SessionIssue>,
    /// Per-batch timing diagnostics.
    pub timings: Vec<BatchTiming>,
    /// Session start.
    pub started_at: DateTime<Utc>,
    /// Session end.
    pub finished_at: DateTime<Utc>,
}

impl SessionReport {
    /// Start an empty report with a generated identifier.
    #[must_use]
    pub fn new(batch_size: u32) -> Self {
        let now = Utc::now();
        Self {
            session_id: Uuid::new_v4().to_string(),
            outcome: SessionOutcome::Aborted,
            batches_run: 0,
            batch_size,
            payload: String::new(),
            fragments: 0,
            resumed: false,
            state_fingerprint: None,
            issues: Vec::new(),
            timings: Vec::new(),
            started_at: now,
            finished_at: now,
        }
    }

    /// Approximate units of work executed across the session.
    #[must_use]
    pub fn units_executed(&self) -> u64 {
        u64::from(self.batches_run) * u64::from(self.batch_size)
    }

    /// Process exit code for the session.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        self.outcome.exit_code()
    }

    /// Issues recorded at `stage`.
    pub fn issues_at(&self, stage: IssueStage) -> impl Iterator<Item = &SessionIssue> {
        self.issues.iter().filter(move |issue| issue.stage == stage)
    }
}
