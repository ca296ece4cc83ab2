use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use stackswap_core::verify_sha256;
use thiserror::Error;
use tracing::{info, warn};

use crate::fs_utils::write_file_atomic;
use crate::runner::ProcessRunner;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OfflineLoadError {
    /// Loading may succeed when retried with the same inputs.
    #[error("offline image loading failed (retryable): {0}")]
    Transient(String),
    /// The update bundle itself is unusable.
    #[error("offline image loading failed: {0}")]
    Fatal(String),
}

impl OfflineLoadError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Inputs for materializing a self-contained manifest from a local bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfflineLoadRequest {
    pub compose_in: PathBuf,
    pub compose_sha256: String,
    pub images_path: PathBuf,
    pub manifests_path: PathBuf,
    pub compose_out: PathBuf,
}

impl OfflineLoadRequest {
    /// Bundle paths for a target, following the `<sha256>.images` and
    /// `docker/<sha256>.manifests` naming of offline update bundles.
    pub fn for_target(
        compose_in: &Path,
        compose_out: &Path,
        compose_sha256: &str,
        images_root: &Path,
        metadata_root: &Path,
    ) -> Self {
        Self {
            compose_in: compose_in.to_path_buf(),
            compose_sha256: compose_sha256.to_string(),
            images_path: images_root.join(format!("{compose_sha256}.images")),
            manifests_path: metadata_root
                .join("docker")
                .join(format!("{compose_sha256}.manifests")),
            compose_out: compose_out.to_path_buf(),
        }
    }
}

pub trait OfflineImageLoader {
    /// Load the images referenced by `request.compose_in` and write the
    /// offline manifest to `request.compose_out`.
    fn load(
        &mut self,
        request: &OfflineLoadRequest,
        runner: &mut dyn ProcessRunner,
    ) -> Result<(), OfflineLoadError>;
}

/// Loads every `*.tar` image archive of a bundle with `docker load`.
#[derive(Debug, Clone)]
pub struct DockerArchiveLoader {
    docker_program: PathBuf,
}

impl DockerArchiveLoader {
    pub fn new(docker_program: impl Into<PathBuf>) -> Self {
        Self {
            docker_program: docker_program.into(),
        }
    }

    pub(crate) fn build_load_command(&self, archive: &Path) -> Command {
        let mut command = Command::new(&self.docker_program);
        command.arg("load").arg("--input").arg(archive);
        command
    }
}

impl OfflineImageLoader for DockerArchiveLoader {
    fn load(
        &mut self,
        request: &OfflineLoadRequest,
        runner: &mut dyn ProcessRunner,
    ) -> Result<(), OfflineLoadError> {
        let compose = fs::read(&request.compose_in).map_err(|err| {
            OfflineLoadError::Transient(format!(
                "failed to read {}: {err}",
                request.compose_in.display()
            ))
        })?;
        if !verify_sha256(&compose, &request.compose_sha256) {
            return Err(OfflineLoadError::Fatal(format!(
                "manifest {} does not match expected sha256 {}",
                request.compose_in.display(),
                request.compose_sha256
            )));
        }
        if !request.manifests_path.is_dir() {
            return Err(OfflineLoadError::Fatal(format!(
                "image manifests directory is missing: {}",
                request.manifests_path.display()
            )));
        }

        let archives = list_image_archives(&request.images_path)?;
        if archives.is_empty() {
            warn!(images = %request.images_path.display(), "offline bundle has no image archives");
        }
        for archive in &archives {
            info!(archive = %archive.display(), "loading image archive");
            runner
                .run(
                    &mut self.build_load_command(archive),
                    "failed to load image archive",
                )
                .map_err(|err| OfflineLoadError::Transient(format!("{err:#}")))?;
        }

        write_file_atomic(&request.compose_out, &compose).map_err(|err| {
            OfflineLoadError::Transient(format!("{err:#}"))
        })?;
        Ok(())
    }
}

fn list_image_archives(images_path: &Path) -> Result<Vec<PathBuf>, OfflineLoadError> {
    let entries = fs::read_dir(images_path).map_err(|err| {
        OfflineLoadError::Fatal(format!(
            "images directory is not readable: {}: {err}",
            images_path.display()
        ))
    })?;

    let mut archives = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| OfflineLoadError::Transient(err.to_string()))?;
        let path = entry.path();
        if path.is_file() && path.extension().and_then(|v| v.to_str()) == Some("tar") {
            archives.push(path);
        }
    }
    archives.sort();
    Ok(archives)
}
