//! Session orchestration modules.
//!
//! Covers engine lease ownership, payload accumulation, and the bounded
//! batch loop that ties the engine, frame parser, and state store together.

pub mod accumulator;
pub mod lease;
pub mod session_runner;

pub use session_runner::{Orchestrator, SessionConfig};
