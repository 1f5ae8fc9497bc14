//! Artifact files and the external viewer.
//!
//! Payloads are written to uniquely named files that outlive the handler;
//! cleaning them up is left to the viewer or the OS. The viewer is an
//! opaque executable run with the artifact path as its last argument.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use tokio::process::Command;
use tracing::{debug, trace};

use crate::error::HandlerError;

/// Creates artifact files for validated payloads.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
    prefix: String,
    suffix: String,
}

impl ArtifactStore {
    /// Create a store writing into `dir`, or the system temp directory.
    pub fn new(dir: Option<PathBuf>, prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            dir: dir.unwrap_or_else(std::env::temp_dir),
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    /// Write `payload` to a fresh file and return its path.
    ///
    /// The name combines the prefix, a local timestamp and a random part,
    /// so concurrent writers never collide. The file is closed before this
    /// returns and is not removed afterwards.
    pub fn write(&self, payload: &[u8]) -> std::io::Result<PathBuf> {
        let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        let prefix = format!("{}{}-", self.prefix, stamp);

        let mut file = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(&self.suffix)
            .tempfile_in(&self.dir)?;
        file.write_all(payload)?;
        file.flush()?;

        let (file, path) = file.keep().map_err(|e| e.error)?;
        drop(file);

        trace!(path = %path.display(), bytes = payload.len(), "Artifact written");
        Ok(path)
    }
}

/// The external visualization tool.
#[derive(Debug, Clone)]
pub struct Viewer {
    program: PathBuf,
    args: Vec<String>,
}

impl Viewer {
    /// Create a viewer running `program`, with `args` placed before the
    /// artifact path.
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Run the viewer on `artifact` and wait for it to exit.
    ///
    /// The exit status is returned for logging only. Failing to start the
    /// viewer at all is an error.
    pub async fn open(&self, artifact: &Path) -> Result<ExitStatus, HandlerError> {
        debug!(
            program = %self.program.display(),
            artifact = %artifact.display(),
            "Launching viewer"
        );

        Command::new(&self.program)
            .args(&self.args)
            .arg(artifact)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|source| HandlerError::Viewer {
                program: self.program.clone(),
                source,
            })
    }
}
