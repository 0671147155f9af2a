//! Final session report rendering.

use std::fmt;

use crate::models::session::SessionReport;
use crate::Result;

const RULE_WIDTH: usize = 60;

/// Plain-text view of a [`SessionReport`]: accumulated payload, then a
/// summary.
#[derive(Debug, Clone, Copy)]
pub struct TextReport<'a>(pub &'a SessionReport);

impl fmt::Display for TextReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let report = self.0;
        let rule = "=".repeat(RULE_WIDTH);

        writeln!(f, "{rule}")?;
        writeln!(f, "ACCUMULATED OUTPUT:")?;
        writeln!(f, "{rule}")?;
        if !report.payload.is_empty() {
            writeln!(f, "{}", report.payload)?;
        }
        writeln!(f, "{rule}")?;

        writeln!(f, "session:   {}", report.session_id)?;
        writeln!(f, "outcome:   {}", report.outcome.label())?;
        writeln!(
            f,
            "batches:   {} (~{} units)",
            report.batches_run,
            report.units_executed()
        )?;
        writeln!(f, "resumed:   {}", if report.resumed { "yes" } else { "no" })?;
        if let Some(fingerprint) = &report.state_fingerprint {
            writeln!(f, "state:     {fingerprint}")?;
        }

        if !report.issues.is_empty() {
            writeln!(f, "issues:")?;
        }
        for issue in &report.issues {
            match issue.batch {
                Some(batch) => {
                    writeln!(f, "  - {:?} (batch {batch}): {}", issue.stage, issue.message)?;
                }
                None => writeln!(f, "  - {:?}: {}", issue.stage, issue.message)?,
            }
        }

        Ok(())
    }
}

/// Render the report as plain text.
#[must_use]
pub fn render_text(report: &SessionReport) -> String {
    TextReport(report).to_string()
}

/// Render the report as pretty-printed JSON.
///
/// # Errors
///
/// Returns `AppError::Protocol` if serialization fails.
pub fn render_json(report: &SessionReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}
