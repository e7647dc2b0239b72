//! Artifact files
//!
//! Every capture writes into a fresh `profile-*` file. The file is persisted
//! as soon as it is created, so it survives the cycle whatever happens next;
//! cleaning it up is left to the operator or the OS temp-dir policy.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::domain::CaptureError;

/// Prefix of every artifact file name
pub const ARTIFACT_PREFIX: &str = "profile-";

/// Where artifacts are created
#[derive(Debug, Clone, Default)]
pub struct ArtifactStore {
    dir: Option<PathBuf>,
}

impl ArtifactStore {
    /// Artifacts go to the OS temp directory
    #[must_use]
    pub fn temp() -> Self {
        Self { dir: None }
    }

    /// Artifacts go to `dir`, which must already exist
    #[must_use]
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        Self { dir: Some(dir.into()) }
    }

    #[must_use]
    pub fn dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Create a new, uniquely named artifact.
    ///
    /// # Errors
    /// Returns [`CaptureError::ArtifactCreation`] if the file cannot be created.
    pub fn create(&self) -> Result<Artifact, CaptureError> {
        let dir = self.dir();
        let (file, path) = tempfile::Builder::new()
            .prefix(ARTIFACT_PREFIX)
            .tempfile_in(&dir)
            .and_then(|tmp| tmp.keep().map_err(|e| e.error))
            .map_err(|error| CaptureError::ArtifactCreation { dir, error })?;

        log::debug!("Created artifact {}", path.display());
        Ok(Artifact { writer: BufWriter::new(file), path })
    }
}

/// An open artifact being written by one capture
#[derive(Debug)]
pub struct Artifact {
    writer: BufWriter<File>,
    path: PathBuf,
}

impl Artifact {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Destination for the profile bytes
    pub fn writer(&mut self) -> &mut dyn Write {
        &mut self.writer
    }

    /// Flush everything to disk and close the file, returning its path.
    ///
    /// # Errors
    /// Returns the I/O error if buffered bytes cannot be flushed or synced.
    pub fn close(self) -> io::Result<PathBuf> {
        let Artifact { writer, path } = self;
        let file = writer.into_inner().map_err(io::IntoInnerError::into_error)?;
        file.sync_all()?;
        Ok(path)
    }
}
