use anyhow::Result;
use stackswap_core::{UpdateEvent, UpdateStatus};
use tracing::{info, warn};

use crate::update_lock::UpdateLock;

/// Handle the outer framework exposes for pausing update checks.
pub trait UpdateControl {
    fn disable_updates(&mut self, disabled: bool);
}

/// Reacts to the outer framework's update events.
pub struct UpdateEvents<C: UpdateControl> {
    lock: UpdateLock,
    control: C,
}

impl<C: UpdateControl> UpdateEvents<C> {
    pub fn new(lock: UpdateLock, control: C) -> Self {
        Self { lock, control }
    }

    pub fn lock(&self) -> &UpdateLock {
        &self.lock
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    pub fn process_event(&mut self, event: &UpdateEvent) -> Result<()> {
        info!("{}", event.log_line());

        match event {
            UpdateEvent::UpdateCheckComplete { status } => {
                self.lock.release()?;
                if *status == UpdateStatus::UpdatesAvailable {
                    let acquired = self.lock.try_acquire()?;
                    if !acquired {
                        warn!(
                            path = %self.lock.path().display(),
                            "update lock is held elsewhere; disabling updates"
                        );
                    }
                    self.control.disable_updates(!acquired);
                }
            }
            UpdateEvent::AllInstallsComplete { .. } => {
                self.lock.release()?;
            }
            _ => {}
        }
        Ok(())
    }
}
