use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod completion;
mod dispatch;
mod render;

use completion::CliCompletionShell;

const DEFAULT_SETTINGS_PATH: &str = "/etc/stackswap/settings.toml";

#[derive(Parser, Debug)]
#[command(name = "stackswap")]
#[command(
    about = "Atomic docker-compose stack updates with rollback",
    long_about = None
)]
struct Cli {
    /// Engine settings file; built-in defaults apply when it does not exist.
    #[arg(long, global = true)]
    settings: Option<PathBuf>,
    /// Log filter, e.g. `debug` or `stackswap_installer=trace`. Overrides RUST_LOG.
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install a compose manifest as the new stack.
    Install {
        #[command(flatten)]
        secondary: SecondaryArgs,
        #[arg(long)]
        target_file: PathBuf,
        /// Expected sha256 of the target file.
        #[arg(long)]
        sha256: Option<String>,
        /// Target name to record; defaults to the target file name.
        #[arg(long)]
        filename: Option<String>,
        #[arg(long, value_enum, default_value_t = CliUpdateMode::Online)]
        mode: CliUpdateMode,
        #[arg(long)]
        images_dir: Option<PathBuf>,
        #[arg(long)]
        metadata_dir: Option<PathBuf>,
        /// Defer the stack swap until an outer image update completes.
        #[arg(long)]
        sync: bool,
    },
    /// Finish or discard an update left by a previous run.
    Resume {
        #[command(flatten)]
        secondary: SecondaryArgs,
    },
    /// Discard a staged update and restore the running stack.
    Rollback {
        #[command(flatten)]
        secondary: SecondaryArgs,
    },
    /// Show the installed manifest and any pending update.
    Status {
        #[command(flatten)]
        secondary: SecondaryArgs,
    },
    /// Write a secondary configuration file.
    InitConfig {
        #[arg(long)]
        output: PathBuf,
        #[arg(long)]
        ecu_serial: String,
        #[arg(long)]
        hardware_id: String,
        #[arg(long)]
        firmware_path: PathBuf,
        #[arg(long)]
        target_name_path: PathBuf,
        #[arg(long)]
        metadata_path: Option<PathBuf>,
    },
    Completions {
        #[arg(value_enum)]
        shell: CliCompletionShell,
    },
}

#[derive(clap::Args, Debug, Clone)]
struct SecondaryArgs {
    /// Secondary configuration file (JSON).
    #[arg(long)]
    config: PathBuf,
    /// ECU serial to select when the file lists several secondaries.
    #[arg(long)]
    ecu: Option<String>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliUpdateMode {
    Online,
    Offline,
}

fn init_tracing(log_level: Option<&str>) -> Result<()> {
    let env_filter = match log_level {
        Some(directive) => EnvFilter::try_new(directive)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .try_init()?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref())?;
    dispatch::run_cli(cli)
}

#[cfg(test)]
mod tests;
