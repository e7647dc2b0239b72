//! Runtime profiling primitives
//!
//! The capture loop treats these as a black box that writes profile bytes
//! into a destination. [`ProcessRuntime`] is the implementation backed by
//! this process; tests and hosts with their own profilers plug in another
//! [`ProfileRuntime`].

pub mod contention;
#[cfg(unix)]
pub mod cpu;
pub mod encode;
pub mod heap;
pub mod threads;

use std::io::Write;

use crate::domain::{ProfileWriteError, SnapshotKind};

// Re-export common types
pub use contention::{block_tracked, lock_tracked, SiteStats};
pub use heap::{HeapStats, TrackingAllocator};
pub use threads::ThreadInfo;

/// Default CPU sampling frequency in Hz
pub const DEFAULT_CPU_FREQUENCY: i32 = 100;

/// A running CPU sampler
pub trait CpuSession {
    /// Stop sampling and write the collected profile into `out`
    ///
    /// # Errors
    /// Returns an error if the report cannot be built, encoded or written.
    fn finish(self: Box<Self>, out: &mut dyn Write) -> Result<(), ProfileWriteError>;
}

/// Source of profile data
pub trait ProfileRuntime: Send + Sync {
    /// Begin continuous CPU sampling
    ///
    /// # Errors
    /// Returns an error if sampling cannot be started.
    fn start_cpu(&self, frequency: i32) -> Result<Box<dyn CpuSession>, ProfileWriteError>;

    /// Write a point-in-time profile into `out`
    ///
    /// # Errors
    /// Returns an error if the data cannot be collected or written.
    fn write_snapshot(&self, kind: SnapshotKind, out: &mut dyn Write) -> Result<(), ProfileWriteError>;
}

/// Profiles of the current process
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRuntime;

impl ProfileRuntime for ProcessRuntime {
    #[cfg(unix)]
    fn start_cpu(&self, frequency: i32) -> Result<Box<dyn CpuSession>, ProfileWriteError> {
        Ok(Box::new(cpu::PprofSession::start(frequency)?))
    }

    #[cfg(not(unix))]
    fn start_cpu(&self, _frequency: i32) -> Result<Box<dyn CpuSession>, ProfileWriteError> {
        Err(ProfileWriteError::Unsupported("cpu"))
    }

    fn write_snapshot(&self, kind: SnapshotKind, out: &mut dyn Write) -> Result<(), ProfileWriteError> {
        match kind {
            SnapshotKind::Heap => heap::write_heap(out),
            SnapshotKind::Allocs => heap::write_allocs(out),
            SnapshotKind::Goroutine => threads::write_goroutine(out),
            SnapshotKind::ThreadCreate => threads::write_threadcreate(out),
            SnapshotKind::Contention(kind) => contention::write_contention(kind, out),
        }
    }
}
