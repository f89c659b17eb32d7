//! Snapshot log persistence for the shell.
//!
//! The log is rewritten atomically: write to a `.tmp` file, fsync, then
//! rename over the existing file, so a crash never leaves a half-written log
//! behind. A half-written tmp file would fail its CRC on the next start
//! anyway, but the rename keeps the previous log readable.

use anyhow::{Context, Result};
use snapshot::SnapshotLog;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the log, or an empty one if the file does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but fails its CRC check.
    pub fn load(&self) -> Result<SnapshotLog> {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(SnapshotLog::new()),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("failed to open snapshot log at {}", self.path.display()))
            }
        };
        let log = SnapshotLog::read_from(file)
            .with_context(|| format!("failed to load snapshot log at {}", self.path.display()))?;
        debug!(path = %self.path.display(), records = log.len(), "snapshot log loaded");
        Ok(log)
    }

    /// Persists `log`, replacing the previous file.
    ///
    /// Falls back to truncate-and-write when the rename fails (Windows can
    /// refuse to rename over a file that is still cached).
    pub fn save(&self, log: &SnapshotLog) -> Result<()> {
        let mut tmp_name = self.path.as_os_str().to_owned();
        tmp_name.push(".tmp");
        let tmp_path = PathBuf::from(tmp_name);

        {
            let f = Self::create_truncated(&tmp_path)?;
            Self::write_synced(f, log)?;
        }

        if fs::rename(&tmp_path, &self.path).is_err() {
            let f = Self::create_truncated(&self.path)?;
            Self::write_synced(f, log)?;
            let _ = fs::remove_file(&tmp_path);
        }

        debug!(path = %self.path.display(), records = log.len(), "snapshot log saved");
        Ok(())
    }

    fn create_truncated(path: &Path) -> Result<File> {
        OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("failed to create {}", path.display()))
    }

    fn write_synced(mut f: File, log: &SnapshotLog) -> Result<()> {
        log.write_to(&mut f)?;
        f.flush()?;
        f.sync_all()?;
        Ok(())
    }
}
