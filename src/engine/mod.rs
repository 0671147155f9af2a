//! Engine binding abstraction.
//!
//! The [`Engine`] trait is the only seam between the orchestration core and
//! the computation that actually runs a batch. Backends acquire engines
//! through [`EngineBackend`]; the orchestrator never sees how an engine is
//! bound (in-process simulation, or a child process speaking the stdio wire
//! protocol).

pub mod codec;
pub mod process;
pub mod simulated;
pub mod wire;

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use crate::config::{EngineConfig, EngineKind};
use crate::models::batch::BatchResult;
use crate::models::state::StateBlob;
use crate::Result;

/// Boxed future returned by engine and backend operations.
pub type EngineFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// An initialized, stateful execution engine.
///
/// One value is exclusively owned by one session. Calls are strictly
/// sequential; each batch continues from the state left by the previous one.
pub trait Engine: Send {
    /// Replace the engine's state with a previously exported blob.
    ///
    /// # Errors
    ///
    /// Returns an error if the blob is rejected; the engine keeps its
    /// current (default) state in that case.
    fn import_state(&mut self, blob: StateBlob) -> EngineFuture<'_, ()>;

    /// Run up to `batch_size` units of work.
    ///
    /// The returned output covers this call only. N calls are equivalent to
    /// one continuous run of N × `batch_size` units.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Execution`](crate::AppError::Execution) or
    /// [`AppError::Protocol`](crate::AppError::Protocol) if the batch fails.
    fn execute_batch(&mut self, batch_size: u32) -> EngineFuture<'_, BatchResult>;

    /// Capture the engine's current state.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cannot be read back from the engine.
    fn export_state(&mut self) -> EngineFuture<'_, StateBlob>;

    /// Release underlying resources. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if cleanup failed; the engine is unusable either way.
    fn release(&mut self) -> EngineFuture<'_, ()>;
}

/// Performs the one-time expensive setup that yields an [`Engine`].
pub trait EngineBackend: Send + Sync {
    /// Initialize an engine and load `payload` into it.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Acquisition`](crate::AppError::Acquisition) if the
    /// backing resource is unavailable or the payload cannot be loaded.
    fn acquire<'a>(
        &'a self,
        payload: &'a Path,
        session_id: &'a str,
    ) -> EngineFuture<'a, Box<dyn Engine>>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}

/// Build the backend selected by `config.kind`.
#[must_use]
pub fn backend_for(config: &EngineConfig) -> Box<dyn EngineBackend> {
    match config.kind {
        EngineKind::Simulated => Box::new(simulated::SimulatedBackend::from_config(config)),
        EngineKind::Process => Box::new(process::ProcessBackend::from_config(config)),
    }
}
