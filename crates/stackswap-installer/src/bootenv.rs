use std::path::PathBuf;
use std::process::Command;

use anyhow::Result;
use stackswap_core::EngineSettings;
use tracing::{info, warn};

use crate::runner::ProcessRunner;

/// Bootloader environment access used to carry the rollback marker across reboots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootEnvironment {
    printenv_program: PathBuf,
    setenv_program: PathBuf,
    reboot_program: PathBuf,
    variable: String,
    marker: String,
}

impl BootEnvironment {
    pub fn from_settings(settings: &EngineSettings) -> Self {
        Self {
            printenv_program: settings.printenv_program.clone(),
            setenv_program: settings.setenv_program.clone(),
            reboot_program: settings.reboot_program.clone(),
            variable: settings.rollback_variable.clone(),
            marker: settings.rollback_marker(),
        }
    }

    pub(crate) fn build_printenv_command(&self) -> Command {
        let mut command = Command::new(&self.printenv_program);
        command.arg(&self.variable);
        command
    }

    pub(crate) fn build_set_marker_command(&self) -> Command {
        let mut command = Command::new(&self.setenv_program);
        command.arg(&self.variable).arg("1");
        command
    }

    pub(crate) fn build_clear_marker_command(&self) -> Command {
        let mut command = Command::new(&self.setenv_program);
        command.arg(&self.variable);
        command
    }

    pub(crate) fn build_reboot_command(&self) -> Command {
        Command::new(&self.reboot_program)
    }

    /// Whether a previous boot recorded that the pending update must not be retried.
    ///
    /// An unreadable environment counts as "not set".
    pub fn rollback_marker_set<R: ProcessRunner + ?Sized>(&self, runner: &mut R) -> bool {
        info!("checking rollback status");
        match runner.run_lines(
            &mut self.build_printenv_command(),
            "failed to read bootloader environment",
        ) {
            Ok(lines) => lines.iter().any(|line| line.contains(&self.marker)),
            Err(err) => {
                warn!(error = %format!("{err:#}"), "could not read rollback marker");
                false
            }
        }
    }

    pub fn set_rollback_marker<R: ProcessRunner + ?Sized>(&self, runner: &mut R) -> Result<()> {
        runner.run(
            &mut self.build_set_marker_command(),
            "failed to persist rollback marker",
        )
    }

    pub fn clear_rollback_marker<R: ProcessRunner + ?Sized>(&self, runner: &mut R) -> Result<()> {
        runner.run(
            &mut self.build_clear_marker_command(),
            "failed to clear rollback marker",
        )
    }

    pub fn reboot<R: ProcessRunner + ?Sized>(&self, runner: &mut R) -> Result<()> {
        runner.run(&mut self.build_reboot_command(), "failed to request reboot")
    }
}
