use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::fs_utils::remove_file_if_exists;

/// Exclusive claim on the right to run an update, held as a marker file.
#[derive(Debug)]
pub struct UpdateLock {
    path: PathBuf,
    held: bool,
}

impl UpdateLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            held: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    /// Claim the lock. Returns `false` when another holder already owns it.
    pub fn try_acquire(&mut self) -> Result<bool> {
        if self.held {
            return Ok(true);
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
        }

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                debug!(path = %self.path.display(), "update lock is held elsewhere");
                return Ok(false);
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to claim update lock: {}", self.path.display())
                });
            }
        };

        self.record_owner(&mut file)?;
        self.held = true;
        info!(path = %self.path.display(), "update lock acquired");
        Ok(true)
    }

    /// Write the owning pid into a freshly claimed lock file.
    ///
    /// A lock file that cannot be written is removed again.
    pub(crate) fn record_owner<W: Write>(&self, writer: &mut W) -> Result<()> {
        let owner = format!("{}\n", std::process::id());
        if let Err(err) = writer
            .write_all(owner.as_bytes())
            .and_then(|()| writer.flush())
        {
            let _ = remove_file_if_exists(&self.path);
            return Err(err)
                .with_context(|| format!("failed to write update lock: {}", self.path.display()));
        }
        Ok(())
    }

    /// Release the lock if this instance holds it.
    pub fn release(&mut self) -> Result<()> {
        if !self.held {
            return Ok(());
        }
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("failed to release update lock: {}", self.path.display())
                });
            }
        }
        self.held = false;
        info!(path = %self.path.display(), "update lock released");
        Ok(())
    }
}

impl Drop for UpdateLock {
    fn drop(&mut self) {
        let _ = self.release();
    }
}
