//! Profile capabilities
//!
//! A [`Profile`] is a configuration value naming what to capture. Calling
//! [`Profile::capture`] writes one fresh artifact and returns its path.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::info;

use crate::artifact::ArtifactStore;
use crate::domain::{CaptureError, ProfileKind, ProfileWriteError};
use crate::runtime::{ProcessRuntime, ProfileRuntime, DEFAULT_CPU_FREQUENCY};

/// CPU profile window used when none is configured
pub const DEFAULT_CPU_DURATION: Duration = Duration::from_secs(30);

/// Sampled CPU profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuProfile {
    /// Sampling window; zero means [`DEFAULT_CPU_DURATION`]
    pub duration: Duration,
    /// Samples per second; zero means [`DEFAULT_CPU_FREQUENCY`]
    pub frequency: i32,
}

impl CpuProfile {
    #[must_use]
    pub fn new(duration: Duration) -> Self {
        Self { duration, frequency: 0 }
    }

    #[must_use]
    pub fn with_frequency(mut self, frequency: i32) -> Self {
        self.frequency = frequency;
        self
    }

    /// The window actually slept through
    #[must_use]
    pub fn effective_duration(&self) -> Duration {
        if self.duration.is_zero() {
            DEFAULT_CPU_DURATION
        } else {
            self.duration
        }
    }

    #[must_use]
    pub fn effective_frequency(&self) -> i32 {
        if self.frequency <= 0 {
            DEFAULT_CPU_FREQUENCY
        } else {
            self.frequency
        }
    }
}

/// What to capture when the trigger fires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Cpu(CpuProfile),
    Heap,
    Goroutine,
    ThreadCreate,
    Allocs,
    Block,
    Mutex,
}

impl Profile {
    /// The profile for `kind` with default configuration
    #[must_use]
    pub fn from_kind(kind: ProfileKind) -> Self {
        match kind {
            ProfileKind::Cpu => Profile::Cpu(CpuProfile::default()),
            ProfileKind::Heap => Profile::Heap,
            ProfileKind::Goroutine => Profile::Goroutine,
            ProfileKind::ThreadCreate => Profile::ThreadCreate,
            ProfileKind::Allocs => Profile::Allocs,
            ProfileKind::Block => Profile::Block,
            ProfileKind::Mutex => Profile::Mutex,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ProfileKind {
        match self {
            Profile::Cpu(_) => ProfileKind::Cpu,
            Profile::Heap => ProfileKind::Heap,
            Profile::Goroutine => ProfileKind::Goroutine,
            Profile::ThreadCreate => ProfileKind::ThreadCreate,
            Profile::Allocs => ProfileKind::Allocs,
            Profile::Block => ProfileKind::Block,
            Profile::Mutex => ProfileKind::Mutex,
        }
    }

    /// Capture into the OS temp directory from this process.
    ///
    /// # Errors
    /// See [`Profile::capture_with`].
    pub fn capture(&self) -> Result<PathBuf, CaptureError> {
        self.capture_with(&CaptureContext::default())
    }

    /// Capture one artifact using the runtime and store in `ctx`.
    ///
    /// The CPU profile blocks the calling thread for its whole window.
    ///
    /// # Errors
    /// - [`CaptureError::ArtifactCreation`] if no artifact file can be created
    /// - [`CaptureError::ProfileWrite`] if the runtime fails to produce or
    ///   write the profile, or the artifact cannot be flushed
    pub fn capture_with(&self, ctx: &CaptureContext) -> Result<PathBuf, CaptureError> {
        let kind = self.kind();
        let write_err = |source: ProfileWriteError| CaptureError::ProfileWrite { kind, source };

        let mut artifact = ctx.artifacts.create()?;

        if let Profile::Cpu(cpu) = self {
            let session = ctx.runtime.start_cpu(cpu.effective_frequency()).map_err(write_err)?;
            let window = cpu.effective_duration();
            info!("Sampling CPU for {window:?}");
            std::thread::sleep(window);
            session.finish(artifact.writer()).map_err(write_err)?;
        } else if let Some(snapshot) = kind.snapshot() {
            ctx.runtime.write_snapshot(snapshot, artifact.writer()).map_err(write_err)?;
        }

        artifact.close().map_err(|e| write_err(ProfileWriteError::Io(e)))
    }
}

impl Default for Profile {
    fn default() -> Self {
        Profile::Cpu(CpuProfile::default())
    }
}

impl From<CpuProfile> for Profile {
    fn from(cpu: CpuProfile) -> Self {
        Profile::Cpu(cpu)
    }
}

impl From<ProfileKind> for Profile {
    fn from(kind: ProfileKind) -> Self {
        Profile::from_kind(kind)
    }
}

/// Where a capture reads its data from and writes its artifact to
#[derive(Clone)]
pub struct CaptureContext {
    pub runtime: Arc<dyn ProfileRuntime>,
    pub artifacts: ArtifactStore,
}

impl CaptureContext {
    #[must_use]
    pub fn new(runtime: Arc<dyn ProfileRuntime>, artifacts: ArtifactStore) -> Self {
        Self { runtime, artifacts }
    }
}

impl Default for CaptureContext {
    fn default() -> Self {
        Self { runtime: Arc::new(ProcessRuntime), artifacts: ArtifactStore::temp() }
    }
}

impl std::fmt::Debug for CaptureContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureContext").field("artifacts", &self.artifacts).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_duration_means_default() {
        let zero = CpuProfile::new(Duration::ZERO);
        let explicit = CpuProfile::new(Duration::from_secs(30));
        assert_eq!(zero.effective_duration(), DEFAULT_CPU_DURATION);
        assert_eq!(zero.effective_duration(), explicit.effective_duration());
        assert_eq!(CpuProfile::default().effective_duration(), Duration::from_secs(30));
    }

    #[test]
    fn test_explicit_duration_kept() {
        let cpu = CpuProfile::new(Duration::from_millis(250));
        assert_eq!(cpu.effective_duration(), Duration::from_millis(250));
    }

    #[test]
    fn test_frequency_default() {
        assert_eq!(CpuProfile::default().effective_frequency(), DEFAULT_CPU_FREQUENCY);
        assert_eq!(CpuProfile::default().with_frequency(-5).effective_frequency(), DEFAULT_CPU_FREQUENCY);
        assert_eq!(CpuProfile::default().with_frequency(250).effective_frequency(), 250);
    }

    #[test]
    fn test_kind_round_trips() {
        for kind in ProfileKind::ALL {
            assert_eq!(Profile::from_kind(kind).kind(), kind);
        }
    }
}
