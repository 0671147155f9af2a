//! Scoped ownership of an acquired engine.
//!
//! An [`EngineLease`] is created by a successful acquisition and consumed by
//! [`EngineLease::release`], so each acquisition pairs with exactly one
//! release call. Dropping a lease without releasing it is a bug in the
//! caller; `Drop` logs it and drops the engine, and the process backend's
//! `kill_on_drop` reaps the child.

use std::path::Path;

use tracing::{error, info, warn};

use crate::engine::{Engine, EngineBackend};
use crate::Result;

/// Exclusive, non-cloneable handle to an acquired engine.
pub struct EngineLease {
    engine: Box<dyn Engine>,
    session_id: String,
    backend: &'static str,
    released: bool,
}

impl EngineLease {
    /// Acquire an engine from `backend` for one session.
    ///
    /// # Errors
    ///
    /// Propagates the backend's acquisition error.
    pub async fn acquire(
        backend: &dyn EngineBackend,
        payload: &Path,
        session_id: &str,
    ) -> Result<Self> {
        let engine = backend.acquire(payload, session_id).await?;
        info!(session_id, backend = backend.name(), "engine acquired");
        Ok(Self {
            engine,
            session_id: session_id.to_owned(),
            backend: backend.name(),
            released: false,
        })
    }

    /// Borrow the engine for batch execution and state transfer.
    pub fn engine(&mut self) -> &mut dyn Engine {
        &mut *self.engine
    }

    /// Release the engine, consuming the lease.
    ///
    /// # Errors
    ///
    /// Returns the engine's release error; the lease is gone either way.
    pub async fn release(mut self) -> Result<()> {
        self.released = true;
        match self.engine.release().await {
            Ok(()) => {
                info!(session_id = %self.session_id, backend = self.backend, "engine released");
                Ok(())
            }
            Err(err) => {
                warn!(session_id = %self.session_id, %err, "engine release failed");
                Err(err)
            }
        }
    }
}

impl Drop for EngineLease {
    fn drop(&mut self) {
        if !self.released {
            error!(
                session_id = %self.session_id,
                backend = self.backend,
                "engine lease dropped without release"
            );
        }
    }
}
