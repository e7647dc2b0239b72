//! Capture triggers
//!
//! A trigger is subscribed once, by the capture loop that owns it. Signal
//! triggers are claimed in a process-wide registry so two loops can never
//! share one signal; manual triggers are channels and are unique by
//! construction.

use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};

use log::debug;
use tokio::sync::mpsc;

use crate::domain::StartError;

/// Pending occurrences a manual trigger buffers while a cycle runs
pub const MANUAL_TRIGGER_BUFFER: usize = 16;

/// Signals currently owned by a capture loop
static CLAIMED_SIGNALS: Mutex<BTreeSet<i32>> = Mutex::new(BTreeSet::new());

/// What starts a capture cycle
#[derive(Debug)]
pub struct Trigger {
    source: Source,
}

#[derive(Debug)]
enum Source {
    #[cfg(unix)]
    Signal(i32),
    Manual(mpsc::Receiver<()>),
}

impl Trigger {
    /// `SIGQUIT`, sent from a terminal with CTRL+\
    #[cfg(unix)]
    #[must_use]
    pub fn quit() -> Self {
        Self::signal(libc::SIGQUIT)
    }

    /// Any catchable signal, by number
    #[cfg(unix)]
    #[must_use]
    pub fn signal(raw: i32) -> Self {
        Self { source: Source::Signal(raw) }
    }

    /// A trigger fired from code through the returned handle
    #[must_use]
    pub fn manual() -> (Self, TriggerHandle) {
        let (tx, rx) = mpsc::channel(MANUAL_TRIGGER_BUFFER);
        (Self { source: Source::Manual(rx) }, TriggerHandle { tx })
    }

    /// Short name for logs and the startup instruction
    #[must_use]
    pub fn name(&self) -> String {
        match &self.source {
            #[cfg(unix)]
            Source::Signal(raw) => signal_name(*raw),
            Source::Manual(_) => "manual trigger".to_string(),
        }
    }

    #[must_use]
    pub fn is_manual(&self) -> bool {
        matches!(self.source, Source::Manual(_))
    }

    /// One-line instruction printed when the loop starts
    #[must_use]
    pub fn instruction(&self) -> String {
        match &self.source {
            #[cfg(unix)]
            Source::Signal(raw) if *raw == libc::SIGQUIT => {
                "Send SIGQUIT (CTRL+\\) to the process to capture...".to_string()
            }
            #[cfg(unix)]
            Source::Signal(raw) => {
                let name = signal_name(*raw);
                let short = name.trim_start_matches("SIG");
                format!(
                    "Send {name} (kill -{short} {}) to the process to capture...",
                    std::process::id()
                )
            }
            Source::Manual(_) => "Fire the trigger handle to capture...".to_string(),
        }
    }

    /// Register interest in the trigger. Must run inside a tokio runtime.
    pub(crate) fn subscribe(self) -> Result<Subscription, StartError> {
        let name = self.name();
        match self.source {
            #[cfg(unix)]
            Source::Signal(raw) => {
                use tokio::signal::unix::{signal, SignalKind};

                let claim = Claim::acquire(raw, &name)?;
                let stream = signal(SignalKind::from_raw(raw))
                    .map_err(|error| StartError::Signal { signal: name.clone(), error })?;
                debug!("Subscribed to {name}");
                Ok(Subscription { name, stream: Stream::Signal(stream), _claim: Some(claim) })
            }
            Source::Manual(rx) => Ok(Subscription { name, stream: Stream::Manual(rx), _claim: None }),
        }
    }
}

/// Fires a manual trigger
#[derive(Debug, Clone)]
pub struct TriggerHandle {
    tx: mpsc::Sender<()>,
}

impl TriggerHandle {
    /// Request a capture.
    ///
    /// When the buffer is full the occurrence is folded into the ones already
    /// pending. Returns `false` once the capture loop is gone.
    pub fn fire(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(())) => {
                debug!("Capture already pending, trigger coalesced");
                true
            }
            Err(mpsc::error::TrySendError::Closed(())) => false,
        }
    }
}

/// A subscribed trigger, owned by exactly one capture loop
#[derive(Debug)]
pub(crate) struct Subscription {
    name: String,
    stream: Stream,
    _claim: Option<Claim>,
}

#[derive(Debug)]
enum Stream {
    #[cfg(unix)]
    Signal(tokio::signal::unix::Signal),
    Manual(mpsc::Receiver<()>),
}

impl Subscription {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Wait for the next occurrence; `None` when no more can arrive
    pub(crate) async fn recv(&mut self) -> Option<()> {
        match &mut self.stream {
            #[cfg(unix)]
            Stream::Signal(signal) => signal.recv().await,
            Stream::Manual(rx) => rx.recv().await,
        }
    }
}

/// Ownership of one signal number, released on drop
#[derive(Debug)]
struct Claim {
    raw: i32,
}

impl Claim {
    fn acquire(raw: i32, name: &str) -> Result<Self, StartError> {
        let mut claimed = CLAIMED_SIGNALS.lock().unwrap_or_else(PoisonError::into_inner);
        if !claimed.insert(raw) {
            return Err(StartError::TriggerInUse(name.to_string()));
        }
        Ok(Self { raw })
    }
}

impl Drop for Claim {
    fn drop(&mut self) {
        CLAIMED_SIGNALS.lock().unwrap_or_else(PoisonError::into_inner).remove(&self.raw);
    }
}

#[cfg(unix)]
fn signal_name(raw: i32) -> String {
    let name = match raw {
        libc::SIGQUIT => "SIGQUIT",
        libc::SIGUSR1 => "SIGUSR1",
        libc::SIGUSR2 => "SIGUSR2",
        libc::SIGHUP => "SIGHUP",
        libc::SIGINT => "SIGINT",
        libc::SIGTERM => "SIGTERM",
        libc::SIGWINCH => "SIGWINCH",
        _ => return format!("signal {raw}"),
    };
    name.to_string()
}
