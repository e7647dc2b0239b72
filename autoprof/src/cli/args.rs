//! CLI argument definitions

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::config::CaptureConfig;
use crate::domain::ProfileKind;
use crate::orchestrator::Viewer;
use crate::profile::{CpuProfile, Profile};

#[derive(Parser, Debug)]
#[command(
    name = "autoprof",
    about = "Run a demo workload and capture a profile of it on SIGQUIT",
    after_help = "\
EXAMPLES:
    autoprof                                   Goroutine (thread) profile, opened in go tool pprof
    autoprof --profile cpu --duration 5        5 second CPU profile
    autoprof --profile mutex --no-viewer       Only write the artifact

Press CTRL+\\ (SIGQUIT) while it runs to capture."
)]
pub struct Args {
    /// Profile captured on each trigger
    #[arg(short, long, value_enum, default_value_t = ProfileKind::Goroutine)]
    pub profile: ProfileKind,

    /// CPU sampling window in seconds (0 = 30s)
    #[arg(long, default_value = "0")]
    pub duration: u64,

    /// CPU sampling frequency in Hz (0 = 100 Hz)
    #[arg(long, default_value = "0")]
    pub frequency: i32,

    /// Viewer command the artifact path is appended to (default: go tool pprof -http=:)
    #[arg(long, value_name = "COMMAND", conflicts_with = "no_viewer")]
    pub viewer: Option<String>,

    /// Only write artifacts, do not launch a viewer
    #[arg(long)]
    pub no_viewer: bool,

    /// Directory for artifacts (default: OS temp dir)
    #[arg(long, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Producer threads in the demo workload
    #[arg(short, long, default_value = "2")]
    pub workers: usize,

    /// Exit after N seconds (0 = run until killed)
    #[arg(long, default_value = "0")]
    pub run_for: u64,

    /// Suppress workload output
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// The selected profile with its CPU options applied
    #[must_use]
    pub fn profile(&self) -> Profile {
        match self.profile {
            ProfileKind::Cpu => {
                CpuProfile::new(Duration::from_secs(self.duration)).with_frequency(self.frequency).into()
            }
            kind => kind.into(),
        }
    }

    /// Environment configuration with command-line overrides applied on top
    #[must_use]
    pub fn capture_config(&self, mut config: CaptureConfig) -> CaptureConfig {
        if self.no_viewer {
            config.viewer = Some(Viewer::disabled());
        } else if let Some(line) = self.viewer.as_deref() {
            if let Some(viewer) = Viewer::from_command_line(line) {
                config.viewer = Some(viewer);
            }
        }
        if let Some(dir) = &self.dir {
            config.artifact_dir = Some(dir.clone());
        }
        config
    }
}
