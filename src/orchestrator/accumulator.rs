//! Append-only collection of payload fragments for one session.

/// Ordered payload fragments gathered across batches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionAccumulator {
    fragments: Vec<String>,
}

impl SessionAccumulator {
    /// Empty accumulator for a new session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment. Empty fragments are skipped; returns whether it was kept.
    pub fn push(&mut self, fragment: impl Into<String>) -> bool {
        let fragment = fragment.into();
        if fragment.is_empty() {
            return false;
        }
        self.fragments.push(fragment);
        true
    }

    /// Fragments in arrival order.
    #[must_use]
    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    /// Number of fragments kept.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    /// Whether nothing has been kept yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// All fragments joined with `\n`.
    #[must_use]
    pub fn joined(&self) -> String {
        self.fragments.join("\n")
    }
}
