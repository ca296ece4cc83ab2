use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use stackswap_core::{
    sha256_reader_hex, ComposeSecondaryConfig, EngineSettings, InstallationResult,
    InstalledVersionUpdateMode, Target, UpdateEvent, UpdateStatus,
};
use stackswap_installer::{
    read_firmware_info, CommandProbe, ComposeSecondary, DockerArchiveLoader, FileVersionStore,
    InstallInfo, ManifestLayout, ResumeOutcome, StackController, SyncGate, SystemRunner,
    UpdateControl, UpdateEvents, UpdateLock, VersionStore,
};
use tracing::info;

use crate::completion::write_completions_script;
use crate::render::{
    format_install_result_lines, format_resume_outcome_line, format_status_lines,
    TerminalRenderer,
};
use crate::{Cli, CliUpdateMode, Commands, SecondaryArgs, DEFAULT_SETTINGS_PATH};

pub(crate) fn run_cli(cli: Cli) -> Result<()> {
    let renderer = TerminalRenderer::current();

    match cli.command {
        Commands::Install {
            secondary,
            target_file,
            sha256,
            filename,
            mode,
            images_dir,
            metadata_dir,
            sync,
        } => {
            let settings = load_settings(cli.settings.as_deref())?;
            let config = select_secondary_config(&secondary)?;
            let target = build_target(&target_file, sha256.as_deref(), filename)?;
            let install_info = build_install_info(mode, images_dir, metadata_dir)?;
            run_install(
                &settings,
                renderer,
                config,
                &target,
                &target_file,
                &install_info,
                sync,
            )?;
        }
        Commands::Resume { secondary } => {
            let settings = load_settings(cli.settings.as_deref())?;
            let config = select_secondary_config(&secondary)?;
            let secondary = open_secondary(config, &settings, false)?;
            let outcome = secondary.resume_outcome();
            println!(
                "{}",
                format_resume_outcome_line(outcome, renderer.style())
            );
            if let ResumeOutcome::RolledBack { reason } = outcome {
                return Err(anyhow!("pending update was rolled back: {reason}"));
            }
        }
        Commands::Rollback { secondary } => {
            let settings = load_settings(cli.settings.as_deref())?;
            let config = select_secondary_config(&secondary)?;
            run_rollback(&settings, renderer, &config)?;
        }
        Commands::Status { secondary } => {
            let config = select_secondary_config(&secondary)?;
            let layout = ManifestLayout::new(config.firmware_path.clone());
            let firmware = read_firmware_info(layout.current_path(), &config.target_name_path)?;
            renderer.print_section(&format!("ECU {}", config.ecu_serial));
            renderer.print_lines(&format_status_lines(&firmware, layout.has_pending()));
        }
        Commands::InitConfig {
            output,
            ecu_serial,
            hardware_id,
            firmware_path,
            target_name_path,
            metadata_path,
        } => {
            let config = ComposeSecondaryConfig {
                partial_verifying: false,
                ecu_serial,
                ecu_hardware_id: hardware_id,
                full_client_dir: PathBuf::new(),
                ecu_private_key: "sec.private".to_string(),
                ecu_public_key: "sec.public".to_string(),
                firmware_path,
                target_name_path,
                metadata_path: metadata_path.unwrap_or_default(),
            };
            config.dump(&output)?;
            renderer.print_status("ok", &format!("wrote {}", output.display()));
        }
        Commands::Completions { shell } => {
            let mut stdout = std::io::stdout().lock();
            write_completions_script(shell, &mut stdout)?;
        }
    }

    Ok(())
}

fn load_settings(path: Option<&Path>) -> Result<EngineSettings> {
    match path {
        Some(path) if !path.exists() => Err(anyhow!(
            "settings file does not exist: {}",
            path.display()
        )),
        Some(path) => EngineSettings::load(path),
        None => EngineSettings::load(Path::new(DEFAULT_SETTINGS_PATH)),
    }
}

fn select_secondary_config(args: &SecondaryArgs) -> Result<ComposeSecondaryConfig> {
    let entries = ComposeSecondaryConfig::create_from_file(&args.config)?;
    pick_secondary(entries, args.ecu.as_deref(), &args.config)
}

pub(crate) fn pick_secondary(
    mut entries: Vec<ComposeSecondaryConfig>,
    ecu: Option<&str>,
    source: &Path,
) -> Result<ComposeSecondaryConfig> {
    if let Some(serial) = ecu {
        return entries
            .into_iter()
            .find(|entry| entry.ecu_serial == serial)
            .ok_or_else(|| {
                anyhow!(
                    "no docker-compose secondary with ecu serial '{serial}' in {}",
                    source.display()
                )
            });
    }

    match entries.len() {
        0 => Err(anyhow!(
            "no docker-compose secondary configured in {}",
            source.display()
        )),
        1 => Ok(entries.remove(0)),
        count => Err(anyhow!(
            "{} lists {count} docker-compose secondaries; select one with --ecu",
            source.display()
        )),
    }
}

pub(crate) fn build_target(
    target_file: &Path,
    expected_sha256: Option<&str>,
    filename: Option<String>,
) -> Result<Target> {
    let mut file = fs::File::open(target_file)
        .with_context(|| format!("failed to open target file: {}", target_file.display()))?;
    let actual = sha256_reader_hex(&mut file)
        .with_context(|| format!("failed to hash target file: {}", target_file.display()))?;
    if let Some(expected) = expected_sha256 {
        if !expected.eq_ignore_ascii_case(&actual) {
            return Err(anyhow!(
                "sha256 mismatch for {}: expected {expected}, got {actual}",
                target_file.display()
            ));
        }
    }
    let length = fs::metadata(target_file)
        .with_context(|| format!("failed to stat target file: {}", target_file.display()))?
        .len();

    let filename = match filename {
        Some(filename) => filename,
        None => target_file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| {
                anyhow!("target file has no file name: {}", target_file.display())
            })?,
    };
    Ok(Target::new(filename, actual, length))
}

pub(crate) fn build_install_info(
    mode: CliUpdateMode,
    images_dir: Option<PathBuf>,
    metadata_dir: Option<PathBuf>,
) -> Result<InstallInfo> {
    match (mode, images_dir, metadata_dir) {
        (CliUpdateMode::Online, _, _) => Ok(InstallInfo::online()),
        (CliUpdateMode::Offline, Some(images_dir), Some(metadata_dir)) => {
            Ok(InstallInfo::offline(images_dir, metadata_dir))
        }
        (CliUpdateMode::Offline, _, _) => Err(anyhow!(
            "--mode offline requires --images-dir and --metadata-dir"
        )),
    }
}

pub(crate) fn build_sync_gate(settings: &EngineSettings, force_sync: bool) -> SyncGate {
    if force_sync {
        return SyncGate::fixed(true);
    }
    match settings
        .outer_update_probe
        .clone()
        .and_then(CommandProbe::new)
    {
        Some(probe) => SyncGate::new(Box::new(probe)),
        None => SyncGate::fixed(false),
    }
}

fn open_secondary(
    config: ComposeSecondaryConfig,
    settings: &EngineSettings,
    force_sync: bool,
) -> Result<ComposeSecondary<SystemRunner, FileVersionStore>> {
    ComposeSecondary::new(
        config,
        settings,
        SystemRunner,
        FileVersionStore::new(&settings.version_store_dir),
        Box::new(DockerArchiveLoader::new(&settings.docker_program)),
        build_sync_gate(settings, force_sync),
    )
}

#[derive(Debug, Default)]
pub(crate) struct CliUpdateControl {
    pub(crate) disabled: bool,
}

impl UpdateControl for CliUpdateControl {
    fn disable_updates(&mut self, disabled: bool) {
        self.disabled = disabled;
    }
}

fn run_install(
    settings: &EngineSettings,
    renderer: TerminalRenderer,
    config: ComposeSecondaryConfig,
    target: &Target,
    target_file: &Path,
    install_info: &InstallInfo,
    force_sync: bool,
) -> Result<()> {
    let mut events = UpdateEvents::new(
        UpdateLock::new(&settings.update_lock_path),
        CliUpdateControl::default(),
    );
    events.process_event(&UpdateEvent::UpdateCheckComplete {
        status: UpdateStatus::UpdatesAvailable,
    })?;
    if events.control().disabled {
        return Err(anyhow!(
            "another update holds {}",
            settings.update_lock_path.display()
        ));
    }

    let mut secondary = open_secondary(config, settings, force_sync)?;
    if secondary.resume_outcome() != &ResumeOutcome::Clean {
        println!(
            "{}",
            format_resume_outcome_line(secondary.resume_outcome(), renderer.style())
        );
    }

    events.process_event(&UpdateEvent::InstallStarted)?;
    let mut content = fs::File::open(target_file)
        .with_context(|| format!("failed to open target file: {}", target_file.display()))?;
    let result = secondary.install(target, &mut content, install_info);
    events.process_event(&UpdateEvent::InstallTargetComplete {
        success: result.code.is_success(),
    })?;

    secondary.record_installation(target, &result)?;
    events.process_event(&UpdateEvent::AllInstallsComplete {
        result_code: result.code,
    })?;

    renderer.print_section("Install");
    renderer.print_lines(&format_install_result_lines(
        &target.filename,
        &result,
        renderer.style(),
    ));
    if !result.code.is_success() {
        return Err(anyhow!("install failed: {}", result.description));
    }
    Ok(())
}

fn run_rollback(
    settings: &EngineSettings,
    renderer: TerminalRenderer,
    config: &ComposeSecondaryConfig,
) -> Result<()> {
    let layout = ManifestLayout::new(config.firmware_path.clone());
    if !layout.has_pending() {
        renderer.print_status("ok", "no staged update to roll back");
        return Ok(());
    }

    let mut controller = StackController::new(layout, settings, SystemRunner);
    controller.rollback();

    let mut store = FileVersionStore::new(&settings.version_store_dir);
    if let Some(target) = store.load_pending(&config.ecu_serial)? {
        info!(target = %target.filename, "clearing pending version after rollback");
        store.save_installation_result(
            &config.ecu_serial,
            &InstallationResult::install_failed("rolled back on request"),
        )?;
        store.save_installed_version(
            &config.ecu_serial,
            &target,
            InstalledVersionUpdateMode::None,
        )?;
    }

    renderer.print_status("ok", "rolled back staged update");
    Ok(())
}
