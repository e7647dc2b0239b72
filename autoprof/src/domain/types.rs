//! Core domain types
//!
//! Newtypes and tags shared by the capture, runtime and orchestrator modules.

use std::fmt;
use std::str::FromStr;

/// Thread ID as read from `/proc/<pid>/task`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tid(pub u32);

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TID:{}", self.0)
    }
}

/// The kind of profile a capture produces.
///
/// This is the bare tag of [`crate::Profile`]; it carries no configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum ProfileKind {
    Cpu,
    Heap,
    Goroutine,
    #[value(name = "threadcreate")]
    ThreadCreate,
    Allocs,
    Block,
    Mutex,
}

impl ProfileKind {
    pub const ALL: [ProfileKind; 7] = [
        ProfileKind::Cpu,
        ProfileKind::Heap,
        ProfileKind::Goroutine,
        ProfileKind::ThreadCreate,
        ProfileKind::Allocs,
        ProfileKind::Block,
        ProfileKind::Mutex,
    ];

    /// Stable lowercase name, matching the pprof profile names
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ProfileKind::Cpu => "cpu",
            ProfileKind::Heap => "heap",
            ProfileKind::Goroutine => "goroutine",
            ProfileKind::ThreadCreate => "threadcreate",
            ProfileKind::Allocs => "allocs",
            ProfileKind::Block => "block",
            ProfileKind::Mutex => "mutex",
        }
    }

    /// The snapshot written for this kind, or `None` for the sampled CPU profile
    #[must_use]
    pub fn snapshot(self) -> Option<SnapshotKind> {
        match self {
            ProfileKind::Cpu => None,
            ProfileKind::Heap => Some(SnapshotKind::Heap),
            ProfileKind::Goroutine => Some(SnapshotKind::Goroutine),
            ProfileKind::ThreadCreate => Some(SnapshotKind::ThreadCreate),
            ProfileKind::Allocs => Some(SnapshotKind::Allocs),
            ProfileKind::Block => Some(SnapshotKind::Contention(ContentionKind::Block)),
            ProfileKind::Mutex => Some(SnapshotKind::Contention(ContentionKind::Mutex)),
        }
    }
}

impl fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProfileKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ProfileKind::ALL
            .into_iter()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| format!("unknown profile kind: {s}"))
    }
}

/// Point-in-time profiles written without a sampling window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotKind {
    Heap,
    Allocs,
    Goroutine,
    ThreadCreate,
    Contention(ContentionKind),
}

impl SnapshotKind {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            SnapshotKind::Heap => "heap",
            SnapshotKind::Allocs => "allocs",
            SnapshotKind::Goroutine => "goroutine",
            SnapshotKind::ThreadCreate => "threadcreate",
            SnapshotKind::Contention(kind) => kind.name(),
        }
    }
}

/// Which contention table a wait is recorded in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentionKind {
    /// Time spent blocked in an explicitly tracked section
    Block,
    /// Time spent waiting to acquire a tracked lock
    Mutex,
}

impl ContentionKind {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ContentionKind::Block => "block",
            ContentionKind::Mutex => "mutex",
        }
    }
}
