//! Structured error types for autoprof
//!
//! Using thiserror for automatic Display implementation and error chaining.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use thiserror::Error;

use super::types::ProfileKind;

/// Failure of the profiling primitive while producing profile bytes
#[derive(Error, Debug)]
pub enum ProfileWriteError {
    #[error("CPU sampler failed: {0}")]
    Sampler(String),

    #[error("Failed to encode {profile} profile: {reason}")]
    Encode { profile: &'static str, reason: String },

    #[error("{0} profile is not supported on this platform")]
    Unsupported(&'static str),

    #[error("Failed to read {path}: {error}")]
    Proc { path: String, error: std::io::Error },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure of a single `capture()` call
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Cannot create new temp profile file in {dir}: {error}")]
    ArtifactCreation { dir: PathBuf, error: std::io::Error },

    #[error("Cannot write {kind} profile: {source}")]
    ProfileWrite {
        kind: ProfileKind,
        #[source]
        source: ProfileWriteError,
    },
}

impl CaptureError {
    /// Whether the process can keep capturing after this error.
    ///
    /// Artifact creation failing means the temp directory is unusable, and
    /// nothing later in the cycle can work without it.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, CaptureError::ArtifactCreation { .. })
    }
}

/// Failure of the viewer step of a cycle
#[derive(Error, Debug)]
pub enum ViewerError {
    #[error("Failed to start {program}: {error}")]
    Spawn { program: String, error: std::io::Error },

    #[error("{program} exited with {status}")]
    ExitStatus { program: String, status: ExitStatus },

    #[error("{program} did not exit within {timeout:?}")]
    TimedOut { program: String, timeout: Duration },

    #[error("Failed waiting for {program}: {error}")]
    Wait { program: String, error: std::io::Error },
}

/// Failure to start the capture loop
#[derive(Error, Debug)]
pub enum StartError {
    #[error("{0} is already used by another capture loop")]
    TriggerInUse(String),

    #[error("Failed to subscribe to {signal}: {error}")]
    Signal { signal: String, error: std::io::Error },

    #[error("Failed to build capture runtime: {0}")]
    Runtime(std::io::Error),

    #[error("Failed to spawn capture thread: {0}")]
    Thread(std::io::Error),

    #[error("Signal triggers are not supported on this platform")]
    Unsupported,
}
