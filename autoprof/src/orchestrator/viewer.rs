//! External profile viewer
//!
//! The viewer is an opaque subprocess that receives the artifact path as its
//! last argument and inherits our stdio.

use std::ffi::OsString;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use log::warn;
use tokio::process::Command;

use crate::domain::ViewerError;

/// `go tool pprof -http=:` serves the profile on a random local port
pub const DEFAULT_VIEWER: [&str; 4] = ["go", "tool", "pprof", "-http=:"];

#[derive(Debug, Clone, PartialEq, Eq)]
struct ViewerCommand {
    program: OsString,
    args: Vec<OsString>,
}

/// How each artifact is opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewer {
    command: Option<ViewerCommand>,
    timeout: Option<Duration>,
}

impl Viewer {
    /// Open artifacts with `go tool pprof -http=:`
    #[must_use]
    pub fn pprof_http() -> Self {
        let [program, args @ ..] = DEFAULT_VIEWER;
        Self::new(program).args(args)
    }

    #[must_use]
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            command: Some(ViewerCommand { program: program.into(), args: Vec::new() }),
            timeout: None,
        }
    }

    /// Parse a whitespace-separated command line; `none` or `off` disables the viewer
    #[must_use]
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let program = words.next()?;
        if program.eq_ignore_ascii_case("none") || program.eq_ignore_ascii_case("off") {
            return Some(Self::disabled());
        }
        Some(Self::new(program).args(words))
    }

    /// Only write artifacts, never launch anything
    #[must_use]
    pub fn disabled() -> Self {
        Self { command: None, timeout: None }
    }

    /// Arguments placed before the artifact path
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        if let Some(command) = self.command.as_mut() {
            command.args.extend(args.into_iter().map(Into::into));
        }
        self
    }

    /// Kill the viewer if it has not exited after `timeout`.
    ///
    /// Without this the capture loop waits for the viewer indefinitely, and a
    /// viewer that never exits stalls every later capture.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.command.is_some()
    }

    /// Run the viewer on `artifact` and wait for it to exit.
    ///
    /// A disabled viewer returns immediately.
    ///
    /// # Errors
    /// - [`ViewerError::Spawn`] if the program cannot be started
    /// - [`ViewerError::ExitStatus`] if it exits unsuccessfully
    /// - [`ViewerError::TimedOut`] if a timeout is set and elapses
    /// - [`ViewerError::Wait`] if waiting on the child fails
    pub async fn open(&self, artifact: &Path) -> Result<(), ViewerError> {
        let Some(command) = &self.command else {
            return Ok(());
        };
        let program = command.program.to_string_lossy().into_owned();

        let mut child = Command::new(&command.program)
            .args(&command.args)
            .arg(artifact)
            .spawn()
            .map_err(|error| ViewerError::Spawn { program: program.clone(), error })?;

        let waited = match self.timeout {
            None => child.wait().await,
            Some(timeout) => match tokio::time::timeout(timeout, child.wait()).await {
                Ok(waited) => waited,
                Err(_) => {
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill {program}: {e}");
                    }
                    return Err(ViewerError::TimedOut { program, timeout });
                }
            },
        };
        let status =
            waited.map_err(|error| ViewerError::Wait { program: program.clone(), error })?;

        if status.success() {
            Ok(())
        } else {
            Err(ViewerError::ExitStatus { program, status })
        }
    }
}

impl Default for Viewer {
    fn default() -> Self {
        Self::pprof_http()
    }
}

impl fmt::Display for Viewer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(command) = &self.command else {
            return f.write_str("(no viewer)");
        };
        write!(f, "{}", command.program.to_string_lossy())?;
        for arg in &command.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_default_viewer_display() {
        assert_eq!(Viewer::default().to_string(), "go tool pprof -http=:");
        assert_eq!(Viewer::disabled().to_string(), "(no viewer)");
    }

    #[tokio::test]
    async fn test_artifact_is_last_argument() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("argv");
        let script = format!("printf '%s\\n' \"$@\" > '{}'", log.display());
        let viewer = Viewer::new("sh").args(["-c", script.as_str(), "viewer", "-http=:"]);

        viewer.open(Path::new("/tmp/profile-abc")).await.unwrap();

        let argv = std::fs::read_to_string(&log).unwrap();
        assert_eq!(argv.lines().collect::<Vec<_>>(), vec!["-http=:", "/tmp/profile-abc"]);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_error() {
        let viewer = Viewer::new("false");
        let err = viewer.open(Path::new("/tmp/profile-x")).await.unwrap_err();
        assert!(matches!(err, ViewerError::ExitStatus { .. }));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let viewer = Viewer::new("/nonexistent/autoprof-viewer");
        let err = viewer.open(Path::new("/tmp/profile-x")).await.unwrap_err();
        assert!(matches!(err, ViewerError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_timeout_kills_viewer() {
        let viewer = Viewer::new("sleep").args(["5"]).timeout(Duration::from_millis(100));
        let started = std::time::Instant::now();
        // `sleep 5 <path>` is still a long sleep on coreutils and busybox
        let err = viewer.open(Path::new("1")).await.unwrap_err();
        assert!(matches!(err, ViewerError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_from_command_line() {
        assert_eq!(
            Viewer::from_command_line("pprof  -http=:8080 "),
            Some(Viewer::new("pprof").args(["-http=:8080"]))
        );
        assert_eq!(Viewer::from_command_line("off"), Some(Viewer::disabled()));
        assert_eq!(Viewer::from_command_line(" "), None);
    }

    #[tokio::test]
    async fn test_disabled_viewer_is_noop() {
        Viewer::disabled().open(Path::new("/tmp/profile-x")).await.unwrap();
    }
}
