//! # autoprof - Capture runtime profiles on demand
//!
//! autoprof is a development-time aid. A program starts a capture loop once;
//! from then on every `SIGQUIT` (CTRL+\ in a terminal) captures a profile of
//! the running process into a fresh `profile-*` temp file and opens it with
//! `go tool pprof -http=:`.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────┐      ┌──────────────────────────────┐
//! │         Host program         │      │   autoprof-capture thread    │
//! │                              │      │                              │
//! │  autoprof::capture(profile) ─┼─────▶│  wait for trigger (SIGQUIT)  │
//! │  ... keeps running ...       │      │            │                 │
//! └──────────────────────────────┘      │            ▼                 │
//!                                       │  Profile::capture_with()     │
//!                                       │   ├─ ArtifactStore::create   │
//!                                       │   └─ ProfileRuntime writes   │
//!                                       │            │                 │
//!                                       │            ▼                 │
//!                                       │  Viewer::open(artifact)      │
//!                                       │            │                 │
//!                                       │            └──▶ wait again   │
//!                                       └──────────────────────────────┘
//! ```
//!
//! ## Module Structure
//!
//! - [`profile`]: the profile kinds and the capture contract
//! - [`artifact`]: creation of the `profile-*` files
//! - [`runtime`]: where profile data comes from
//!   - `cpu`: `SIGPROF` sampling through the `pprof` crate
//!   - `heap`: [`TrackingAllocator`] counters for heap and allocs profiles
//!   - `threads`: `/proc/self/task` snapshots for goroutine and threadcreate
//!   - `contention`: opt-in block and mutex wait recording
//!   - `encode`: gzip-compressed pprof protobuf output
//! - [`orchestrator`]: the trigger loop, trigger subscriptions and the viewer
//! - [`config`]: `AUTOPROF_*` environment overrides
//! - [`domain`]: errors and small shared types
//! - [`cli`]: arguments of the `autoprof` demo binary
//!
//! ## Typical Usage
//!
//! ```no_run
//! use std::time::Duration;
//!
//! autoprof::capture(autoprof::CpuProfile::new(Duration::from_secs(10)));
//! // ... the rest of the program; send SIGQUIT to capture ...
//! ```
//!
//! Profiles other than CPU are snapshots. Heap and allocs need
//! [`TrackingAllocator`] installed as the global allocator; block and mutex
//! profiles only see waits that go through [`block_tracked`] and
//! [`lock_tracked`].

pub mod artifact;
pub mod cli;
pub mod config;
pub mod domain;
pub mod orchestrator;
pub mod profile;
pub mod runtime;

pub use artifact::{ArtifactStore, ARTIFACT_PREFIX};
pub use config::CaptureConfig;
pub use domain::{CaptureError, ProfileKind, ProfileWriteError, StartError, ViewerError};
pub use orchestrator::{CaptureHandle, CycleStats, Orchestrator, Trigger, TriggerHandle, Viewer};
pub use profile::{CaptureContext, CpuProfile, Profile, DEFAULT_CPU_DURATION};
pub use runtime::{
    block_tracked, lock_tracked, ProcessRuntime, ProfileRuntime, TrackingAllocator,
};

/// Start capturing `profile` on every `SIGQUIT`, opening each artifact in the viewer.
///
/// Returns immediately. The viewer and artifact directory come from
/// [`CaptureConfig::from_env`]. Failures are logged, never returned: a
/// program keeps running normally even if capturing cannot start.
///
/// Meant for development builds.
pub fn capture(profile: impl Into<Profile>) {
    let config = CaptureConfig::from_env();
    if let Err(err) = Orchestrator::builder(profile).config(&config).spawn() {
        log::error!("Cannot start profile capture: {err}");
    }
}
