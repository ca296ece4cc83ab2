use std::process::Command;

use tracing::{debug, info};

use crate::runner::ProcessRunner;

/// Answers whether an outer filesystem-image update is pending for this device.
pub trait OuterUpdateProbe {
    fn outer_update_pending(&mut self, runner: &mut dyn ProcessRunner) -> bool;
}

impl OuterUpdateProbe for bool {
    fn outer_update_pending(&mut self, _runner: &mut dyn ProcessRunner) -> bool {
        *self
    }
}

/// Probe backed by a configured command; a successful exit means "pending".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandProbe {
    argv: Vec<String>,
}

impl CommandProbe {
    pub fn new(argv: Vec<String>) -> Option<Self> {
        if argv.is_empty() {
            return None;
        }
        Some(Self { argv })
    }

    pub(crate) fn build_command(&self) -> Command {
        let mut command = Command::new(&self.argv[0]);
        command.args(&self.argv[1..]);
        command
    }
}

impl OuterUpdateProbe for CommandProbe {
    fn outer_update_pending(&mut self, runner: &mut dyn ProcessRunner) -> bool {
        match runner.run(&mut self.build_command(), "outer update probe") {
            Ok(()) => true,
            Err(err) => {
                debug!(error = %format!("{err:#}"), "outer update probe reported no pending update");
                false
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDecision {
    /// Swap the stack within this invocation.
    Immediate,
    /// Stage and pull only; the swap finishes after the outer update lands.
    LockedStep,
}

impl SyncDecision {
    pub fn is_locked_step(self) -> bool {
        matches!(self, Self::LockedStep)
    }
}

/// Couples a stack update to a sibling outer image update.
pub struct SyncGate {
    probe: Box<dyn OuterUpdateProbe>,
}

impl SyncGate {
    pub fn new(probe: Box<dyn OuterUpdateProbe>) -> Self {
        Self { probe }
    }

    pub fn fixed(outer_update_pending: bool) -> Self {
        Self::new(Box::new(outer_update_pending))
    }

    pub fn decide(&mut self, runner: &mut dyn ProcessRunner) -> SyncDecision {
        if self.probe.outer_update_pending(runner) {
            info!("outer image update pending; container update is locked-step");
            SyncDecision::LockedStep
        } else {
            SyncDecision::Immediate
        }
    }
}
