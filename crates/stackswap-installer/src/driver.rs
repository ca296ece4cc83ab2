use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use stackswap_core::{
    sha256_hex, ComposeSecondaryConfig, EngineSettings, FirmwareInfo, InstallationResult,
    InstalledVersionUpdateMode, ResultCode, Target, UpdateMode, NO_IMAGE_NAME,
};
use tracing::{error, info, warn};

use crate::compose::StackController;
use crate::fs_utils::{remove_file_if_exists, write_file_atomic, write_via_rename};
use crate::layout::ManifestLayout;
use crate::offline::{OfflineImageLoader, OfflineLoadRequest};
use crate::resume::{resume_pending_update, ResumeOutcome};
use crate::runner::ProcessRunner;
use crate::sync_gate::SyncGate;
use crate::version_store::VersionStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallInfo {
    pub mode: UpdateMode,
    pub images_path_offline: Option<PathBuf>,
    pub metadata_path_offline: Option<PathBuf>,
}

impl InstallInfo {
    pub fn online() -> Self {
        Self {
            mode: UpdateMode::Online,
            images_path_offline: None,
            metadata_path_offline: None,
        }
    }

    pub fn offline(images_path: impl Into<PathBuf>, metadata_path: impl Into<PathBuf>) -> Self {
        Self {
            mode: UpdateMode::Offline,
            images_path_offline: Some(images_path.into()),
            metadata_path_offline: Some(metadata_path.into()),
        }
    }
}

/// A secondary whose firmware is a compose manifest for the local container engine.
pub struct ComposeSecondary<R: ProcessRunner, S: VersionStore> {
    config: ComposeSecondaryConfig,
    controller: StackController<R>,
    store: S,
    loader: Box<dyn OfflineImageLoader>,
    gate: SyncGate,
    resume_outcome: ResumeOutcome,
}

impl<R: ProcessRunner, S: VersionStore> ComposeSecondary<R, S> {
    /// Build the secondary and reconcile any update left over from a previous run.
    pub fn new(
        config: ComposeSecondaryConfig,
        settings: &EngineSettings,
        runner: R,
        mut store: S,
        loader: Box<dyn OfflineImageLoader>,
        gate: SyncGate,
    ) -> Result<Self> {
        let layout = ManifestLayout::new(config.firmware_path.clone());
        let mut controller = StackController::new(layout, settings, runner);
        let resume_outcome = resume_pending_update(&mut controller, &mut store, &config.ecu_serial)?;
        info!(ecu = %config.ecu_serial, outcome = ?resume_outcome, "pending update check finished");

        Ok(Self {
            config,
            controller,
            store,
            loader,
            gate,
            resume_outcome,
        })
    }

    pub fn config(&self) -> &ComposeSecondaryConfig {
        &self.config
    }

    pub fn controller(&self) -> &StackController<R> {
        &self.controller
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn resume_outcome(&self) -> &ResumeOutcome {
        &self.resume_outcome
    }

    pub fn has_pending_update(&self) -> bool {
        self.controller.layout().has_pending()
    }

    /// Install `target`, whose manifest content is read from `content`.
    pub fn install(
        &mut self,
        target: &Target,
        content: &mut dyn Read,
        info: &InstallInfo,
    ) -> InstallationResult {
        info!(
            target = %target.filename,
            mode = info.mode.as_str(),
            "installing container target"
        );
        let layout = self.controller.layout().clone();

        // Nothing has changed yet if staging fails, so there is nothing to roll back.
        if let Err(err) = write_via_rename(content, &layout.staging_path(), &layout.new_path()) {
            error!(error = %format!("{err:#}"), "failed to stage manifest");
            return InstallationResult::install_failed(format!("{err:#}"));
        }

        let sync_update = self
            .gate
            .decide(self.controller.runner_mut())
            .is_locked_step();

        let status = match info.mode {
            UpdateMode::Online => self.controller.update(false, sync_update),
            UpdateMode::Offline => self.install_offline(target, info, sync_update),
        };

        match status {
            Ok(()) => {
                self.record_target_name(target);
                if self.controller.transaction().sync_update {
                    InstallationResult::need_completion()
                } else {
                    InstallationResult::ok()
                }
            }
            Err(err) => {
                error!(error = %format!("{err:#}"), "container update failed");
                self.controller.rollback();
                InstallationResult::install_failed(format!("{err:#}"))
            }
        }
    }

    fn install_offline(
        &mut self,
        target: &Target,
        info: &InstallInfo,
        sync_update: bool,
    ) -> Result<()> {
        let layout = self.controller.layout().clone();
        let offline_path = layout.offline_path();

        let loaded = match (&info.images_path_offline, &info.metadata_path_offline) {
            (Some(images_root), Some(metadata_root)) => {
                let request = OfflineLoadRequest::for_target(
                    &layout.new_path(),
                    &offline_path,
                    &target.sha256,
                    images_root,
                    metadata_root,
                );
                self.loader
                    .load(&request, self.controller.runner_mut())
                    .map_err(|err| {
                        warn!(retryable = err.is_retryable(), error = %err, "offline loading failed");
                        anyhow!(err)
                    })
                    .and_then(|()| {
                        fs::rename(&offline_path, layout.new_path()).with_context(|| {
                            format!(
                                "failed to replace staged manifest with {}",
                                offline_path.display()
                            )
                        })
                    })
            }
            _ => Err(anyhow!(
                "offline update requires both images and metadata paths"
            )),
        };

        if let Err(err) = loaded {
            let _ = remove_file_if_exists(&offline_path);
            // The caller's locked-step flag holds whatever the load outcome.
            self.controller.reset_transaction(sync_update);
            return Err(err);
        }

        self.controller.update(true, sync_update)
    }

    fn record_target_name(&self, target: &Target) {
        let path = &self.config.target_name_path;
        if let Err(err) = write_file_atomic(path, target.filename.as_bytes()) {
            error!(path = %path.display(), error = %format!("{err:#}"), "failed to record target name");
        }
    }

    /// Discard a staged update and restore the previous stack.
    pub fn rollback(&mut self) {
        self.controller.rollback();
    }

    /// Record an installation outcome the way the outer framework expects it.
    pub fn record_installation(
        &mut self,
        target: &Target,
        result: &InstallationResult,
    ) -> Result<()> {
        let serial = self.config.ecu_serial.clone();
        self.store.save_installation_result(&serial, result)?;
        let mode = match result.code {
            ResultCode::Ok => InstalledVersionUpdateMode::Current,
            ResultCode::NeedCompletion => InstalledVersionUpdateMode::Pending,
            ResultCode::InstallFailed => InstalledVersionUpdateMode::None,
        };
        self.store.save_installed_version(&serial, target, mode)
    }

    /// Report the installed manifest's name and digest.
    pub fn firmware_info(&self) -> Result<FirmwareInfo> {
        read_firmware_info(
            self.controller.layout().current_path(),
            &self.config.target_name_path,
        )
    }
}

/// Name and digest of the manifest at `current`, as recorded in `target_name_path`.
pub fn read_firmware_info(current: &Path, target_name_path: &Path) -> Result<FirmwareInfo> {
    if !target_name_path.exists() || !current.exists() {
        return Ok(FirmwareInfo {
            name: NO_IMAGE_NAME.to_string(),
            sha256: sha256_hex(b""),
            len: 0,
        });
    }

    let name = fs::read_to_string(target_name_path).with_context(|| {
        format!(
            "failed to read target name: {}",
            target_name_path.display()
        )
    })?;
    let content = fs::read(current)
        .with_context(|| format!("failed to read manifest: {}", current.display()))?;
    Ok(FirmwareInfo {
        name: name.trim().to_string(),
        sha256: sha256_hex(&content),
        len: content.len() as u64,
    })
}
