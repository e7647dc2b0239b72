//! CPU sampling via the `pprof` crate
//!
//! Sampling is driven by `SIGPROF`; only one sampler can run per process, so a
//! second concurrent CPU capture fails with [`ProfileWriteError::Sampler`].

use std::io::Write;

use pprof::protos::Message;
use pprof::{ProfilerGuard, ProfilerGuardBuilder};

use crate::domain::ProfileWriteError;

use super::encode::write_gzip;
use super::CpuSession;

/// Frames from these libraries are dropped from samples
const BLOCKLIST: [&str; 4] = ["libc", "libgcc", "pthread", "vdso"];

pub struct PprofSession {
    guard: ProfilerGuard<'static>,
}

impl PprofSession {
    /// Start sampling all threads at `frequency` Hz
    ///
    /// # Errors
    /// Returns [`ProfileWriteError::Sampler`] if a sampler is already running
    /// or the profiling timer cannot be installed.
    pub fn start(frequency: i32) -> Result<Self, ProfileWriteError> {
        let guard = ProfilerGuardBuilder::default()
            .frequency(frequency)
            .blocklist(&BLOCKLIST)
            .build()
            .map_err(|e| ProfileWriteError::Sampler(e.to_string()))?;
        log::info!("CPU sampling started at {frequency} Hz");
        Ok(Self { guard })
    }
}

impl CpuSession for PprofSession {
    fn finish(self: Box<Self>, out: &mut dyn Write) -> Result<(), ProfileWriteError> {
        let PprofSession { guard } = *self;
        let report =
            guard.report().build().map_err(|e| ProfileWriteError::Sampler(e.to_string()))?;
        // Sampling stops when the guard drops
        drop(guard);

        let profile = report
            .pprof()
            .map_err(|e| ProfileWriteError::Encode { profile: "cpu", reason: e.to_string() })?;
        log::info!("CPU sampling stopped, {} samples", profile.sample.len());
        write_gzip(&profile.encode_to_vec(), out)
    }
}
