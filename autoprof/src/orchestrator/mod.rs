//! Capture loop
//!
//! The loop lives on its own thread with a current-thread tokio runtime:
//!
//! ```text
//!   Idle ──trigger──▶ Capturing ──capture ok──▶ viewer ──▶ Idle
//!                         │                                  ▲
//!                         └──────capture failed──────────────┘
//! ```
//!
//! Cycles never overlap. Occurrences arriving while Capturing stay pending
//! in the trigger and are handled in order afterwards.

pub mod trigger;
pub mod viewer;

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{debug, error, info, warn};

use crate::artifact::ArtifactStore;
use crate::config::CaptureConfig;
use crate::domain::StartError;
use crate::profile::{CaptureContext, Profile};
use crate::runtime::ProfileRuntime;

pub use trigger::{Trigger, TriggerHandle};
pub use viewer::Viewer;

use trigger::Subscription;

/// Exit code when no artifact file can be created
pub const EXIT_ARTIFACT_FAILURE: i32 = 1;

const THREAD_NAME: &str = "autoprof-capture";

/// Configures and starts a capture loop
#[derive(Debug)]
pub struct Orchestrator {
    profile: Profile,
    trigger: Option<Trigger>,
    viewer: Viewer,
    ctx: CaptureContext,
}

impl Orchestrator {
    /// Capture `profile` on `SIGQUIT` and open it with `go tool pprof`
    #[must_use]
    pub fn builder(profile: impl Into<Profile>) -> Self {
        Self {
            profile: profile.into(),
            trigger: None,
            viewer: Viewer::default(),
            ctx: CaptureContext::default(),
        }
    }

    #[must_use]
    pub fn trigger(mut self, trigger: Trigger) -> Self {
        self.trigger = Some(trigger);
        self
    }

    #[must_use]
    pub fn viewer(mut self, viewer: Viewer) -> Self {
        self.viewer = viewer;
        self
    }

    #[must_use]
    pub fn runtime(mut self, runtime: Arc<dyn ProfileRuntime>) -> Self {
        self.ctx.runtime = runtime;
        self
    }

    #[must_use]
    pub fn artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.ctx.artifacts = ArtifactStore::in_dir(dir);
        self
    }

    /// Apply viewer and artifact directory from `config`
    #[must_use]
    pub fn config(mut self, config: &CaptureConfig) -> Self {
        self.viewer = config.viewer();
        self.ctx.artifacts = config.artifacts();
        self
    }

    /// Subscribe to the trigger and start the loop on a detached thread.
    ///
    /// Returns as soon as the subscription is in place; the returned handle
    /// can be dropped without stopping the loop.
    ///
    /// # Errors
    /// Returns an error if the trigger cannot be subscribed or the capture
    /// thread cannot be started.
    pub fn spawn(self) -> Result<CaptureHandle, StartError> {
        let Orchestrator { profile, trigger, viewer, ctx } = self;
        let trigger = match trigger {
            Some(trigger) => trigger,
            None => default_trigger()?,
        };
        let instruction = trigger.instruction();
        let is_signal = !trigger.is_manual();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .thread_name("autoprof-blocking")
            .build()
            .map_err(StartError::Runtime)?;
        let subscription = {
            let _guard = runtime.enter();
            trigger.subscribe()?
        };
        let trigger_name = subscription.name().to_string();

        let counters = Arc::new(Counters::default());
        let cycle = CaptureLoop { profile, viewer, ctx, counters: Arc::clone(&counters) };

        let thread = std::thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || runtime.block_on(cycle.run(subscription)))
            .map_err(StartError::Thread)?;

        if is_signal {
            println!("{instruction}");
        } else {
            info!("{instruction}");
        }

        Ok(CaptureHandle { trigger: trigger_name, counters, thread })
    }
}

#[cfg(unix)]
fn default_trigger() -> Result<Trigger, StartError> {
    Ok(Trigger::quit())
}

#[cfg(not(unix))]
fn default_trigger() -> Result<Trigger, StartError> {
    Err(StartError::Unsupported)
}

/// Counters shared between the loop and its handle
#[derive(Debug, Default)]
struct Counters {
    triggers: AtomicU64,
    captured: AtomicU64,
    capture_failures: AtomicU64,
    viewer_invocations: AtomicU64,
    viewer_failures: AtomicU64,
    completed: AtomicU64,
}

/// Progress of a capture loop, read through [`CaptureHandle::stats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleStats {
    /// Trigger occurrences taken off the queue
    pub triggers: u64,
    /// Artifacts written successfully
    pub captured: u64,
    pub capture_failures: u64,
    /// Viewer launches attempted
    pub viewer_invocations: u64,
    /// Viewers that failed to start, exited non-zero or timed out
    pub viewer_failures: u64,
    /// Cycles that returned to Idle
    pub completed: u64,
}

/// Handle to a running capture loop
///
/// Dropping it detaches the loop, which keeps running until the process exits.
#[derive(Debug)]
pub struct CaptureHandle {
    trigger: String,
    counters: Arc<Counters>,
    thread: JoinHandle<()>,
}

impl CaptureHandle {
    #[must_use]
    pub fn trigger(&self) -> &str {
        &self.trigger
    }

    #[must_use]
    pub fn stats(&self) -> CycleStats {
        let c = &self.counters;
        CycleStats {
            triggers: c.triggers.load(Ordering::SeqCst),
            captured: c.captured.load(Ordering::SeqCst),
            capture_failures: c.capture_failures.load(Ordering::SeqCst),
            viewer_invocations: c.viewer_invocations.load(Ordering::SeqCst),
            viewer_failures: c.viewer_failures.load(Ordering::SeqCst),
            completed: c.completed.load(Ordering::SeqCst),
        }
    }

    /// Whether the loop has ended; only a manual trigger with no handles left ends it
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }
}

struct CaptureLoop {
    profile: Profile,
    viewer: Viewer,
    ctx: CaptureContext,
    counters: Arc<Counters>,
}

impl CaptureLoop {
    async fn run(self, mut subscription: Subscription) {
        while subscription.recv().await.is_some() {
            self.counters.triggers.fetch_add(1, Ordering::SeqCst);
            self.cycle().await;
            self.counters.completed.fetch_add(1, Ordering::SeqCst);
        }
        debug!("{} closed, capture loop finished", subscription.name());
    }

    async fn cycle(&self) {
        info!("Starting to capture {} profile", self.profile.kind());

        let profile = self.profile;
        let ctx = self.ctx.clone();
        let captured = tokio::task::spawn_blocking(move || profile.capture_with(&ctx)).await;

        let artifact = match captured {
            Ok(Ok(path)) => {
                self.counters.captured.fetch_add(1, Ordering::SeqCst);
                path
            }
            Ok(Err(err)) if err.is_fatal() => {
                error!("{err}");
                std::process::exit(EXIT_ARTIFACT_FAILURE);
            }
            Ok(Err(err)) => {
                self.counters.capture_failures.fetch_add(1, Ordering::SeqCst);
                warn!("Cannot capture profile: {err}");
                return;
            }
            Err(join_err) => {
                self.counters.capture_failures.fetch_add(1, Ordering::SeqCst);
                error!("Capture task failed: {join_err}");
                return;
            }
        };

        if !self.viewer.is_enabled() {
            info!("Profile written to {}", artifact.display());
            return;
        }

        info!("Starting {} {}", self.viewer, artifact.display());
        self.counters.viewer_invocations.fetch_add(1, Ordering::SeqCst);
        if let Err(err) = self.viewer.open(&artifact).await {
            self.counters.viewer_failures.fetch_add(1, Ordering::SeqCst);
            warn!("Cannot start profile viewer: {err}");
        }
    }
}
