//! Opaque engine state snapshot.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Complete engine state at a point in time, as raw bytes.
///
/// The orchestrator only moves a blob between the engine and storage; the
/// bytes are produced and interpreted solely by the engine that exported
/// them.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct StateBlob(Vec<u8>);

impl StateBlob {
    /// Wrap raw bytes.
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Borrow the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Byte length.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the blob holds no bytes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// SHA-256 hex digest of the bytes, for logs and reports.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.0);
        format!("{:x}", hasher.finalize())
    }
}

impl From<Vec<u8>> for StateBlob {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

// Bytes are opaque; printing them would only flood logs.
impl std::fmt::Debug for StateBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateBlob")
            .field("len", &self.0.len())
            .finish()
    }
}
