use anyhow::{Context, Result};
use stackswap_core::{InstallationResult, InstalledVersionUpdateMode, Target};
use tracing::{error, info, warn};

use crate::compose::{PendingOutcome, PendingUpdateError, StackController};
use crate::runner::ProcessRunner;
use crate::version_store::VersionStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// No staged manifest was found.
    Clean,
    /// A staged manifest without a pending record was discarded.
    DiscardedUncommitted,
    /// A deferred update was finished.
    Completed,
    /// A pending update could not be finished and was rolled back.
    RolledBack { reason: String },
}

/// Reconcile manifest files left behind by a previous run.
///
/// Must run once per process, before any update request is accepted.
pub fn resume_pending_update<R, S>(
    controller: &mut StackController<R>,
    store: &mut S,
    ecu_serial: &str,
) -> Result<ResumeOutcome>
where
    R: ProcessRunner,
    S: VersionStore + ?Sized,
{
    let pending_target = store
        .load_pending(ecu_serial)
        .with_context(|| format!("failed to load pending version for ecu '{ecu_serial}'"))?;

    if pending_target.is_none() && controller.layout().has_pending() {
        info!("staged manifest found without a pending update record; discarding it");
        controller.force_containers_stopped();
        controller.rollback();
        clear_stale_rollback_marker(controller);
        return Ok(ResumeOutcome::DiscardedUncommitted);
    }

    let err = match controller.pending_update() {
        Ok(PendingOutcome::NothingPending) => {
            clear_stale_rollback_marker(controller);
            return Ok(ResumeOutcome::Clean);
        }
        Ok(PendingOutcome::Completed) => {
            // The marker was read and found unset before the transition ran.
            if let Some(target) = &pending_target {
                commit_completed_target(store, ecu_serial, target);
            }
            return Ok(ResumeOutcome::Completed);
        }
        Err(err) => err,
    };
    error!(error = %err, "unable to complete pending container update");

    // Unblock the outer framework so it stops waiting on this ECU.
    if let Err(store_err) = store.save_installation_result(
        ecu_serial,
        &InstallationResult::install_failed(err.to_string()),
    ) {
        error!(error = %format!("{store_err:#}"), "failed to record installation result");
    }
    if let Some(target) = &pending_target {
        if let Err(store_err) =
            store.save_installed_version(ecu_serial, target, InstalledVersionUpdateMode::None)
        {
            error!(error = %format!("{store_err:#}"), "failed to reset pending version");
        }
    }

    controller.rollback();

    if matches!(err, PendingUpdateError::RolledBackByPreviousBoot) {
        if let Err(clear_err) = controller.clear_rollback_marker() {
            warn!(error = %format!("{clear_err:#}"), "failed to clear rollback marker");
        }
    }

    Ok(ResumeOutcome::RolledBack {
        reason: err.to_string(),
    })
}

/// Clear a rollback marker that no staged manifest is left to honor.
fn clear_stale_rollback_marker<R: ProcessRunner>(controller: &mut StackController<R>) {
    if !controller.rollback_marker_set() {
        return;
    }
    info!("clearing rollback marker left by an earlier update");
    if let Err(err) = controller.clear_rollback_marker() {
        warn!(error = %format!("{err:#}"), "failed to clear rollback marker");
    }
}

fn commit_completed_target<S>(store: &mut S, ecu_serial: &str, target: &Target)
where
    S: VersionStore + ?Sized,
{
    info!(target = %target.filename, "recording completed container update");
    if let Err(err) = store.save_installation_result(ecu_serial, &InstallationResult::ok()) {
        error!(error = %format!("{err:#}"), "failed to record installation result");
    }
    if let Err(err) =
        store.save_installed_version(ecu_serial, target, InstalledVersionUpdateMode::Current)
    {
        error!(error = %format!("{err:#}"), "failed to promote pending version");
    }
}
