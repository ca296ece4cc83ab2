use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// The manifest slots derived from a secondary's `firmware_path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestLayout {
    current: PathBuf,
}

impl ManifestLayout {
    pub fn new(firmware_path: impl Into<PathBuf>) -> Self {
        Self {
            current: firmware_path.into(),
        }
    }

    pub fn current_path(&self) -> &Path {
        &self.current
    }

    /// Staged manifest that has not been promoted yet.
    pub fn new_path(&self) -> PathBuf {
        self.with_suffix(".tmp")
    }

    /// Scratch file used while the target content is being written out.
    pub fn staging_path(&self) -> PathBuf {
        self.with_suffix(".temporary")
    }

    /// Manifest rewritten to reference locally loaded images.
    pub fn offline_path(&self) -> PathBuf {
        self.with_suffix(".off")
    }

    pub fn has_current(&self) -> bool {
        self.current.is_file()
    }

    pub fn has_pending(&self) -> bool {
        self.new_path().exists()
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        let mut raw = OsString::from(self.current.as_os_str());
        raw.push(suffix);
        PathBuf::from(raw)
    }
}
