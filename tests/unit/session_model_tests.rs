//! Unit tests for session phases, outcomes, and the report model.

use batch_conductor::models::session::{
    IssueStage, SessionIssue, SessionOutcome, SessionPhase, SessionReport,
};

// ── Phase transitions ────────────────────────────────────────

#[test]
fn init_can_start_running_or_abort() {
    assert!(SessionPhase::Init.can_transition_to(SessionPhase::Running));
    assert!(SessionPhase::Init.can_transition_to(SessionPhase::Aborted));
    assert!(!SessionPhase::Init.can_transition_to(SessionPhase::Finished));
    assert!(!SessionPhase::Init.can_transition_to(SessionPhase::Releasing));
}

#[test]
fn running_must_release_before_finishing() {
    assert!(SessionPhase::Running.can_transition_to(SessionPhase::Releasing));
    assert!(!SessionPhase::Running.can_transition_to(SessionPhase::Finished));
    assert!(!SessionPhase::Running.can_transition_to(SessionPhase::Aborted));
    assert!(SessionPhase::Releasing.can_transition_to(SessionPhase::Finished));
}

#[test]
fn terminal_phases_have_no_exits() {
    let all = [
        SessionPhase::Init,
        SessionPhase::Running,
        SessionPhase::Releasing,
        SessionPhase::Finished,
        SessionPhase::Aborted,
    ];
    for from in [SessionPhase::Finished, SessionPhase::Aborted] {
        assert!(from.is_terminal());
        for to in all {
            assert!(!from.can_transition_to(to), "{from:?} -> {to:?}");
        }
    }
    assert!(!SessionPhase::Running.is_terminal());
}

// ── Outcomes ─────────────────────────────────────────────────

#[test]
fn only_completed_is_confirmed() {
    assert!(SessionOutcome::Completed.is_confirmed_complete());
    for outcome in [
        SessionOutcome::BudgetExhausted,
        SessionOutcome::Stopped,
        SessionOutcome::Interrupted,
        SessionOutcome::Aborted,
    ] {
        assert!(!outcome.is_confirmed_complete());
    }
}

#[test]
fn exit_codes_follow_outcome() {
    assert_eq!(SessionOutcome::Completed.exit_code(), 0);
    assert_eq!(SessionOutcome::BudgetExhausted.exit_code(), 0);
    assert_eq!(SessionOutcome::Stopped.exit_code(), 0);
    assert_eq!(SessionOutcome::Aborted.exit_code(), 1);
    assert_eq!(SessionOutcome::Interrupted.exit_code(), 130);
}

#[test]
fn only_aborted_ends_in_aborted_phase() {
    assert_eq!(SessionOutcome::Aborted.final_phase(), SessionPhase::Aborted);
    assert_eq!(SessionOutcome::Stopped.final_phase(), SessionPhase::Finished);
    assert_eq!(SessionOutcome::Completed.final_phase(), SessionPhase::Finished);
}

#[test]
fn unconfirmed_labels_say_so() {
    assert!(SessionOutcome::BudgetExhausted
        .label()
        .contains("not confirmed complete"));
    assert!(SessionOutcome::Stopped
        .label()
        .contains("not confirmed complete"));
    assert_eq!(SessionOutcome::Completed.label(), "completed");
}

#[test]
fn outcome_serializes_snake_case() {
    let json = serde_json::to_string(&SessionOutcome::BudgetExhausted).expect("serialize");
    assert_eq!(json, "\"budget_exhausted\"");
}

// ── Report ───────────────────────────────────────────────────

#[test]
fn new_report_is_empty_and_aborted() {
    let report = SessionReport::new(100);
    assert_eq!(report.outcome, SessionOutcome::Aborted);
    assert_eq!(report.batches_run, 0);
    assert!(report.payload.is_empty());
    assert!(report.issues.is_empty());
    assert!(uuid::Uuid::parse_str(&report.session_id).is_ok());
}

#[test]
fn units_executed_multiplies_batches_by_size() {
    let mut report = SessionReport::new(1_000_000);
    report.batches_run = 5_000;
    assert_eq!(report.units_executed(), 5_000_000_000);
}

#[test]
fn issues_at_filters_by_stage() {
    let mut report = SessionReport::new(1);
    report.issues.push(SessionIssue {
        stage: IssueStage::Import,
        batch: None,
        message: "bad blob".into(),
    });
    report.issues.push(SessionIssue {
        stage: IssueStage::Execute,
        batch: Some(3),
        message: "boom".into(),
    });

    let execute: Vec<_> = report.issues_at(IssueStage::Execute).collect();
    assert_eq!(execute.len(), 1);
    assert_eq!(execute[0].batch, Some(3));
    assert_eq!(report.issues_at(IssueStage::Save).count(), 0);
}

#[test]
fn report_round_trips_through_json() {
    let mut report = SessionReport::new(10);
    report.outcome = SessionOutcome::Completed;
    report.payload = "a\nb".into();

    let json = serde_json::to_string(&report).expect("serialize");
    let back: SessionReport = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back, report);
}
