#![forbid(unsafe_code)]

//! Bounded-batch orchestration of long-running, stateful execution engines.

pub mod config;
pub mod engine;
pub mod errors;
pub mod frame;
pub mod models;
pub mod orchestrator;
pub mod persistence;
pub mod report;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
