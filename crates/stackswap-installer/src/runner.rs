use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};

use anyhow::{anyhow, Context, Result};
use tracing::{debug, info};

/// Executes external commands on behalf of the engine.
///
/// Implementations block until the command exits. Timeouts, if any, are the
/// implementation's concern.
pub trait ProcessRunner {
    /// Run `command` to completion. Any non-zero exit is an error.
    fn run(&mut self, command: &mut Command, context_message: &str) -> Result<()>;

    /// Run `command` and collect its non-empty stdout lines.
    ///
    /// The exit status is not checked: readers such as `fw_printenv` exit
    /// non-zero for an undefined variable, which callers treat as "no output".
    fn run_lines(&mut self, command: &mut Command, context_message: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&mut self, command: &mut Command, context_message: &str) -> Result<()> {
        info!(command = %describe_command(command), "running command");
        let status = command
            .status()
            .with_context(|| format!("{context_message}: command failed to start"))?;
        if status.success() {
            return Ok(());
        }
        Err(anyhow!("{context_message}: status={status}"))
    }

    fn run_lines(&mut self, command: &mut Command, context_message: &str) -> Result<Vec<String>> {
        info!(command = %describe_command(command), "running command");
        let mut child = command
            .stdout(Stdio::piped())
            .spawn()
            .with_context(|| format!("{context_message}: command failed to start"))?;

        let mut lines = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines() {
                let line = line.with_context(|| format!("{context_message}: failed reading output"))?;
                if !line.is_empty() {
                    lines.push(line);
                }
            }
        }

        let status = child
            .wait()
            .with_context(|| format!("{context_message}: failed waiting for command"))?;
        if !status.success() {
            debug!(%status, "command exited unsuccessfully while capturing output");
        }
        Ok(lines)
    }
}

pub fn describe_command(command: &Command) -> String {
    let mut parts = vec![command.get_program().to_string_lossy().into_owned()];
    parts.extend(
        command
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned()),
    );
    parts.join(" ")
}
