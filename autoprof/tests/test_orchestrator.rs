#![cfg(unix)]

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use autoprof::domain::SnapshotKind;
use autoprof::runtime::CpuSession;
use autoprof::{
    CaptureHandle, CycleStats, Orchestrator, Profile, ProfileRuntime, ProfileWriteError, StartError,
    Trigger, Viewer,
};

/// Appends a line to the shared event log, then writes a tiny profile
struct RecordingRuntime {
    log: PathBuf,
}

impl ProfileRuntime for RecordingRuntime {
    fn start_cpu(&self, _frequency: i32) -> Result<Box<dyn CpuSession>, ProfileWriteError> {
        Err(ProfileWriteError::Unsupported("cpu"))
    }

    fn write_snapshot(&self, kind: SnapshotKind, out: &mut dyn Write) -> Result<(), ProfileWriteError> {
        append(&self.log, "capture");
        out.write_all(kind.name().as_bytes())?;
        Ok(())
    }
}

struct FailingRuntime;

impl ProfileRuntime for FailingRuntime {
    fn start_cpu(&self, _frequency: i32) -> Result<Box<dyn CpuSession>, ProfileWriteError> {
        Err(ProfileWriteError::Sampler("sampler unavailable".to_string()))
    }

    fn write_snapshot(&self, kind: SnapshotKind, _out: &mut dyn Write) -> Result<(), ProfileWriteError> {
        Err(ProfileWriteError::Unsupported(kind.name()))
    }
}

fn append(log: &Path, line: &str) {
    let mut file = OpenOptions::new().create(true).append(true).open(log).unwrap();
    writeln!(file, "{line}").unwrap();
}

fn read_lines(log: &Path) -> Vec<String> {
    std::fs::read_to_string(log)
        .map(|s| s.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

/// A viewer that logs the artifact it was given
fn logging_viewer(log: &Path) -> Viewer {
    let script = format!("echo \"view $1\" >> '{}'", log.display());
    Viewer::new("sh").args(["-c".to_string(), script, "viewer".to_string()])
}

fn wait_for(handle: &CaptureHandle, done: impl Fn(&CycleStats) -> bool) -> CycleStats {
    let deadline = Instant::now() + Duration::from_secs(15);
    loop {
        let stats = handle.stats();
        if done(&stats) {
            return stats;
        }
        assert!(Instant::now() < deadline, "capture loop stalled: {stats:?}");
        std::thread::sleep(Duration::from_millis(20));
    }
}

fn artifacts_in(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.file_name().unwrap().to_string_lossy().starts_with("profile-"))
        .collect()
}

#[test]
fn test_goroutine_single_trigger() {
    let dir = tempfile::tempdir().unwrap();
    let artifacts = dir.path().join("artifacts");
    std::fs::create_dir(&artifacts).unwrap();
    let log = dir.path().join("viewer.log");

    let (trigger, fire) = Trigger::manual();
    let handle = Orchestrator::builder(Profile::Goroutine)
        .trigger(trigger)
        .viewer(logging_viewer(&log))
        .artifact_dir(&artifacts)
        .spawn()
        .unwrap();

    assert!(fire.fire());
    let stats = wait_for(&handle, |s| s.completed == 1);

    let created = artifacts_in(&artifacts);
    assert_eq!(created.len(), 1);
    assert_eq!(read_lines(&log), vec![format!("view {}", created[0].display())]);
    assert_eq!(stats.triggers, 1);
    assert_eq!(stats.captured, 1);
    assert_eq!(stats.viewer_invocations, 1);
    assert_eq!(stats.viewer_failures, 0);
}

#[test]
fn test_cycles_are_sequential_with_distinct_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("events.log");
    let script = format!(
        "echo view-begin >> '{0}'; sleep 0.2; echo \"view-end $1\" >> '{0}'",
        log.display()
    );

    let (trigger, fire) = Trigger::manual();
    let handle = Orchestrator::builder(Profile::Heap)
        .trigger(trigger)
        .runtime(Arc::new(RecordingRuntime { log: log.clone() }))
        .viewer(Viewer::new("sh").args(["-c".to_string(), script, "viewer".to_string()]))
        .artifact_dir(dir.path())
        .spawn()
        .unwrap();

    // Both occurrences land while the first cycle is still running
    assert!(fire.fire());
    assert!(fire.fire());
    wait_for(&handle, |s| s.completed == 2);

    let lines = read_lines(&log);
    assert_eq!(lines.len(), 6, "unexpected events: {lines:?}");
    assert_eq!(lines[0], "capture");
    assert_eq!(lines[1], "view-begin");
    assert!(lines[2].starts_with("view-end "));
    assert_eq!(lines[3], "capture");
    assert_eq!(lines[4], "view-begin");
    assert!(lines[5].starts_with("view-end "));
    assert_ne!(lines[2], lines[5], "artifact path was reused");
}

#[test]
fn test_capture_failure_skips_viewer_and_keeps_looping() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("viewer.log");

    let (trigger, fire) = Trigger::manual();
    let handle = Orchestrator::builder(Profile::Block)
        .trigger(trigger)
        .runtime(Arc::new(FailingRuntime))
        .viewer(logging_viewer(&log))
        .artifact_dir(dir.path())
        .spawn()
        .unwrap();

    fire.fire();
    wait_for(&handle, |s| s.completed == 1);
    fire.fire();
    let stats = wait_for(&handle, |s| s.completed == 2);

    assert_eq!(stats.capture_failures, 2);
    assert_eq!(stats.captured, 0);
    assert_eq!(stats.viewer_invocations, 0);
    assert!(read_lines(&log).is_empty());
    assert!(!handle.is_finished());
}

#[test]
fn test_viewer_failures_do_not_stop_the_loop() {
    let dir = tempfile::tempdir().unwrap();

    for viewer in [Viewer::new("false"), Viewer::new("/nonexistent/autoprof-viewer")] {
        let (trigger, fire) = Trigger::manual();
        let handle = Orchestrator::builder(Profile::Allocs)
            .trigger(trigger)
            .viewer(viewer)
            .artifact_dir(dir.path())
            .spawn()
            .unwrap();

        fire.fire();
        wait_for(&handle, |s| s.completed == 1);
        fire.fire();
        let stats = wait_for(&handle, |s| s.completed == 2);

        assert_eq!(stats.captured, 2);
        assert_eq!(stats.viewer_invocations, 2);
        assert_eq!(stats.viewer_failures, 2);
        assert!(!handle.is_finished());
    }
}

#[test]
fn test_disabled_viewer_only_writes_artifacts() {
    let dir = tempfile::tempdir().unwrap();

    let (trigger, fire) = Trigger::manual();
    let handle = Orchestrator::builder(Profile::Mutex)
        .trigger(trigger)
        .viewer(Viewer::disabled())
        .artifact_dir(dir.path())
        .spawn()
        .unwrap();

    fire.fire();
    let stats = wait_for(&handle, |s| s.completed == 1);
    assert_eq!(stats.captured, 1);
    assert_eq!(stats.viewer_invocations, 0);
    assert_eq!(artifacts_in(dir.path()).len(), 1);
}

#[test]
fn test_manual_loop_ends_when_handles_dropped() {
    let (trigger, fire) = Trigger::manual();
    let handle = Orchestrator::builder(Profile::Heap)
        .trigger(trigger)
        .viewer(Viewer::disabled())
        .spawn()
        .unwrap();

    drop(fire);
    let deadline = Instant::now() + Duration::from_secs(5);
    while !handle.is_finished() {
        assert!(Instant::now() < deadline, "loop did not end");
        std::thread::sleep(Duration::from_millis(20));
    }
    assert_eq!(handle.stats(), CycleStats::default());
}

#[test]
fn test_signal_trigger() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("viewer.log");

    let handle = Orchestrator::builder(Profile::ThreadCreate)
        .trigger(Trigger::signal(libc::SIGUSR2))
        .viewer(logging_viewer(&log))
        .artifact_dir(dir.path())
        .spawn()
        .unwrap();
    assert_eq!(handle.trigger(), "SIGUSR2");

    // One signal, one loop
    let second = Orchestrator::builder(Profile::Heap).trigger(Trigger::signal(libc::SIGUSR2)).spawn();
    assert!(matches!(second, Err(StartError::TriggerInUse(_))));

    // SAFETY: SIGUSR2 has a handler installed by the capture loop above
    #[allow(unsafe_code)]
    let rc = unsafe { libc::raise(libc::SIGUSR2) };
    assert_eq!(rc, 0);

    let stats = wait_for(&handle, |s| s.completed >= 1);
    assert!(stats.captured >= 1);
    let lines = read_lines(&log);
    assert!(!lines.is_empty());
    assert!(lines[0].starts_with("view "));
}

#[test]
fn test_artifact_failure_exits_process() {
    let mut child = Command::new(env!("CARGO_BIN_EXE_autoprof"))
        .args(["--profile", "heap", "--no-viewer", "--quiet"])
        .args(["--dir", "/nonexistent/autoprof-artifacts", "--run-for", "20"])
        .env_remove("AUTOPROF_DIR")
        .env_remove("AUTOPROF_VIEWER")
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to start autoprof");

    // The instruction is printed once the SIGQUIT handler is in place
    let stdout = child.stdout.take().unwrap();
    let mut lines = BufReader::new(stdout).lines();
    let ready = lines.any(|line| line.is_ok_and(|l| l.contains("SIGQUIT")));
    assert!(ready, "autoprof exited before subscribing to SIGQUIT");

    let pid = libc::pid_t::try_from(child.id()).unwrap();
    // SAFETY: plain kill(2) on our own child
    #[allow(unsafe_code)]
    let rc = unsafe { libc::kill(pid, libc::SIGQUIT) };
    assert_eq!(rc, 0);

    let deadline = Instant::now() + Duration::from_secs(15);
    let status = loop {
        if let Some(status) = child.try_wait().unwrap() {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            panic!("autoprof kept running after the artifact could not be created");
        }
        std::thread::sleep(Duration::from_millis(20));
    };
    assert_eq!(status.code(), Some(autoprof::orchestrator::EXIT_ARTIFACT_FAILURE));
}
