use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use stackswap_core::EngineSettings;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::bootenv::BootEnvironment;
use crate::fs_utils::remove_file_if_exists;
use crate::layout::ManifestLayout;
use crate::runner::ProcessRunner;

/// Per-invocation state consulted by [`StackController::rollback`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateTransaction {
    /// The update is locked to an outer image update.
    pub sync_update: bool,
    /// Rolling back must hand off to the next boot.
    pub reboot: bool,
    /// The previous stack was already torn down.
    pub containers_stopped: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingOutcome {
    NothingPending,
    Completed,
}

#[derive(Debug, Error)]
pub enum PendingUpdateError {
    #[error("pending update was rolled back by a previous boot")]
    RolledBackByPreviousBoot,
    #[error("failed to complete pending update: {0:#}")]
    TransitionFailed(anyhow::Error),
}

/// Drives the compose program against the current/new manifest pair.
pub struct StackController<R: ProcessRunner> {
    layout: ManifestLayout,
    compose_program: PathBuf,
    project_name: String,
    docker_program: PathBuf,
    boot_env: BootEnvironment,
    transaction: UpdateTransaction,
    runner: R,
}

impl<R: ProcessRunner> StackController<R> {
    pub fn new(layout: ManifestLayout, settings: &EngineSettings, runner: R) -> Self {
        Self {
            layout,
            compose_program: settings.compose_program.clone(),
            project_name: settings.project_name.clone(),
            docker_program: settings.docker_program.clone(),
            boot_env: BootEnvironment::from_settings(settings),
            transaction: UpdateTransaction::default(),
            runner,
        }
    }

    pub fn layout(&self) -> &ManifestLayout {
        &self.layout
    }

    pub fn transaction(&self) -> UpdateTransaction {
        self.transaction
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn runner_mut(&mut self) -> &mut R {
        &mut self.runner
    }

    /// Start a fresh transaction without running any stage of it.
    pub fn reset_transaction(&mut self, sync_update: bool) {
        self.transaction = UpdateTransaction {
            sync_update,
            reboot: false,
            containers_stopped: false,
        };
    }

    /// Treat the running stack as already torn down, so rollback restarts it.
    pub fn force_containers_stopped(&mut self) {
        self.transaction.containers_stopped = true;
    }

    pub(crate) fn build_compose_command(&self, manifest: &Path, args: &[&str]) -> Command {
        let mut command = Command::new(&self.compose_program);
        command.arg("--file").arg(manifest);
        command.args(args);
        command
    }

    pub(crate) fn build_prune_command(&self) -> Command {
        let mut command = Command::new(&self.docker_program);
        command.args(["system", "prune", "-a", "--force"]);
        command
    }

    pub fn pull(&mut self, manifest: &Path) -> Result<()> {
        info!(manifest = %manifest.display(), "pulling container images");
        let mut command = self.build_compose_command(manifest, &["pull", "--no-parallel"]);
        self.runner.run(&mut command, "compose pull failed")
    }

    pub fn bring_up(&mut self, manifest: &Path) -> Result<()> {
        info!(manifest = %manifest.display(), "starting container stack");
        let project = self.project_name.clone();
        let mut command = self.build_compose_command(
            manifest,
            &["-p", &project, "up", "--detach", "--remove-orphans"],
        );
        self.runner.run(&mut command, "compose up failed")
    }

    pub fn tear_down(&mut self, manifest: &Path) -> Result<()> {
        info!(manifest = %manifest.display(), "stopping container stack");
        let project = self.project_name.clone();
        let mut command = self.build_compose_command(manifest, &["-p", &project, "down"]);
        self.runner.run(&mut command, "compose down failed")
    }

    /// Remove unused containers, networks and images. Failures are only logged.
    pub fn prune(&mut self) {
        info!("removing unused containers, networks and images");
        let mut command = self.build_prune_command();
        if let Err(err) = self.runner.run(&mut command, "docker system prune failed") {
            warn!(error = %format!("{err:#}"), "cleanup failed; continuing");
        }
    }

    /// Stop the current stack, start the new one and promote the new manifest.
    ///
    /// On failure the new manifest is left in place for [`Self::rollback`].
    pub fn apply_transition(&mut self) -> Result<()> {
        let current = self.layout.current_path().to_path_buf();
        let new = self.layout.new_path();

        if self.layout.has_current() {
            self.tear_down(&current).inspect_err(|err| {
                error!(error = %format!("{err:#}"), "error stopping current stack");
            })?;
            self.transaction.containers_stopped = true;
        }

        self.bring_up(&new).inspect_err(|err| {
            error!(error = %format!("{err:#}"), "error starting new stack");
        })?;

        fs::rename(&new, &current).with_context(|| {
            format!(
                "failed to promote {} to {}",
                new.display(),
                current.display()
            )
        })?;
        info!(manifest = %current.display(), "container update committed");

        self.prune();
        Ok(())
    }

    /// Start an update of the staged manifest.
    ///
    /// A locked-step update only pulls; the transition happens later through
    /// [`Self::pending_update`].
    pub fn update(&mut self, offline_only: bool, sync_update: bool) -> Result<()> {
        info!(offline_only, sync_update, "updating containers");
        self.reset_transaction(sync_update);
        if sync_update {
            info!("outer image update pending; deferring container transition");
        }

        if !offline_only {
            let new = self.layout.new_path();
            self.pull(&new).inspect_err(|err| {
                error!(error = %format!("{err:#}"), "error pulling container images");
            })?;
        }

        if !sync_update {
            self.apply_transition()?;
        }
        Ok(())
    }

    /// Finish an update left pending by a previous run.
    pub fn pending_update(&mut self) -> Result<PendingOutcome, PendingUpdateError> {
        if !self.layout.has_pending() {
            return Ok(PendingOutcome::NothingPending);
        }
        info!(manifest = %self.layout.new_path().display(), "finishing pending container update");

        if self.boot_env.rollback_marker_set(&mut self.runner) {
            warn!("rollback marker is set; not retrying pending container update");
            self.transaction = UpdateTransaction::default();
            return Err(PendingUpdateError::RolledBackByPreviousBoot);
        }

        self.transaction = UpdateTransaction {
            sync_update: true,
            reboot: true,
            containers_stopped: false,
        };
        self.apply_transition()
            .map_err(PendingUpdateError::TransitionFailed)?;
        Ok(PendingOutcome::Completed)
    }

    /// Restore the previous stack and discard the staged manifest.
    ///
    /// Every step is best-effort. If the previous stack cannot be started the
    /// device is left without a running stack.
    pub fn rollback(&mut self) {
        info!("rolling back container update");

        if self.transaction.containers_stopped {
            let current = self.layout.current_path().to_path_buf();
            if let Err(err) = self.bring_up(&current) {
                error!(error = %format!("{err:#}"), "failed to restart previous stack");
            }
            self.transaction.containers_stopped = false;
        }

        let new = self.layout.new_path();
        if let Err(err) = remove_file_if_exists(&new) {
            error!(path = %new.display(), %err, "failed to remove staged manifest");
        }

        self.prune();

        if self.transaction.sync_update {
            if let Err(err) = self.boot_env.set_rollback_marker(&mut self.runner) {
                error!(error = %format!("{err:#}"), "failed to persist rollback marker");
            }
        }

        if self.transaction.reboot {
            if let Err(err) = self.boot_env.reboot(&mut self.runner) {
                error!(error = %format!("{err:#}"), "failed to request reboot");
            }
        }
    }

    pub fn rollback_marker_set(&mut self) -> bool {
        self.boot_env.rollback_marker_set(&mut self.runner)
    }

    pub fn clear_rollback_marker(&mut self) -> Result<()> {
        self.boot_env.clear_rollback_marker(&mut self.runner)
    }
}
