//! Domain model for autoprof
//!
//! This module contains core domain types and errors that provide:
//! - A closed set of profile kinds with stable names
//! - Newtypes for thread identifiers read from `/proc`
//! - Structured error handling for each stage of a capture cycle

pub mod errors;
pub mod types;

// Re-export common types for convenience
pub use types::{ContentionKind, ProfileKind, SnapshotKind, Tid};

pub use errors::{CaptureError, ProfileWriteError, StartError, ViewerError};
