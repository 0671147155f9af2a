//! Per-batch execution result.

use std::time::Duration;

/// Output of a single `execute_batch` call.
///
/// `raw_output` covers this call only, never earlier batches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    /// Framed textual output exactly as the engine produced it.
    pub raw_output: String,
    /// Wall-clock time spent inside the engine.
    pub elapsed: Duration,
}

impl BatchResult {
    /// Construct a result from output text and elapsed time.
    #[must_use]
    pub fn new(raw_output: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            raw_output: raw_output.into(),
            elapsed,
        }
    }
}
