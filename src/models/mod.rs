//! Domain model module declarations.

pub mod batch;
pub mod session;
pub mod state;
