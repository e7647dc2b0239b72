//! Thread snapshots
//!
//! Rust has no green threads to enumerate, so the goroutine profile lists the
//! process's OS threads by reading `/proc/self/task`, and the threadcreate
//! profile counts them per thread name.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;

use crate::domain::{ProfileWriteError, Tid};

use super::encode::{write_profile, LabelValue, ProfileBuilder};

/// One live thread of this process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub tid: Tid,
    pub comm: String,
    pub state: char,
}

impl ThreadInfo {
    /// Human readable scheduler state
    #[must_use]
    pub fn state_name(&self) -> &'static str {
        match self.state {
            'R' => "running",
            'S' => "sleeping",
            'D' => "disk-sleep",
            'T' | 't' => "stopped",
            'Z' => "zombie",
            _ => "unknown",
        }
    }
}

/// List the threads of the current process from `/proc/self/task`
///
/// Threads that exit while the directory is being read are skipped.
///
/// # Errors
/// Returns an error if `/proc/self/task` cannot be read.
pub fn list_threads() -> Result<Vec<ThreadInfo>, ProfileWriteError> {
    let task_dir = "/proc/self/task";
    if !cfg!(target_os = "linux") {
        return Err(ProfileWriteError::Unsupported("goroutine"));
    }

    let entries = fs::read_dir(task_dir)
        .map_err(|error| ProfileWriteError::Proc { path: task_dir.to_string(), error })?;

    let mut threads: Vec<ThreadInfo> = entries
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let tid = entry.file_name().to_string_lossy().parse::<u32>().ok()?;
            let stat = fs::read_to_string(format!("{task_dir}/{tid}/stat")).ok()?;
            let (comm, state) = parse_stat(&stat)?;
            Some(ThreadInfo { tid: Tid(tid), comm, state })
        })
        .collect();

    threads.sort_by_key(|t| t.tid);
    log::debug!("Found {} threads", threads.len());
    Ok(threads)
}

/// Extract `(comm, state)` from a `/proc/<pid>/task/<tid>/stat` line.
/// Format: "tid (comm) state ..."
fn parse_stat(stat: &str) -> Option<(String, char)> {
    let open = stat.find('(')?;
    let close = stat.rfind(')')?;
    if open >= close {
        return None;
    }
    let comm = stat[open + 1..close].to_string();
    let state = stat[close + 1..].trim_start().chars().next()?;
    Some((comm, state))
}

/// One sample per thread, labelled with its TID and scheduler state
///
/// # Errors
/// Returns an error if the threads cannot be listed or the profile cannot be written.
pub fn write_goroutine(out: &mut dyn Write) -> Result<(), ProfileWriteError> {
    let threads = list_threads()?;

    let mut builder = ProfileBuilder::new(&[("goroutine", "count")]).period("goroutine", "count", 1);
    for thread in &threads {
        builder.sample(
            &[thread.comm.as_str()],
            vec![1],
            &[
                ("tid", LabelValue::Num(i64::from(thread.tid.0))),
                ("state", LabelValue::Str(thread.state_name())),
            ],
        );
    }
    write_profile(&builder.build(), out)
}

/// One sample per distinct thread name, valued with the number of threads
///
/// # Errors
/// Returns an error if the threads cannot be listed or the profile cannot be written.
pub fn write_threadcreate(out: &mut dyn Write) -> Result<(), ProfileWriteError> {
    let threads = list_threads().map_err(|e| match e {
        ProfileWriteError::Unsupported(_) => ProfileWriteError::Unsupported("threadcreate"),
        other => other,
    })?;

    let mut by_name: BTreeMap<&str, i64> = BTreeMap::new();
    for thread in &threads {
        *by_name.entry(thread.comm.as_str()).or_default() += 1;
    }

    let mut builder =
        ProfileBuilder::new(&[("threadcreate", "count")]).period("threadcreate", "count", 1);
    for (name, count) in by_name {
        builder.sample(&[name], vec![count], &[]);
    }
    write_profile(&builder.build(), out)
}
