use super::*;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use clap::error::ErrorKind;
use stackswap_core::{sha256_hex, FirmwareInfo, InstallationResult, UpdateMode};
use stackswap_installer::ResumeOutcome;

use crate::completion::write_completions_script;
use crate::dispatch::{build_install_info, build_sync_gate, build_target, pick_secondary};
use crate::render::{
    format_install_result_lines, format_resume_outcome_line, format_status_lines,
    render_status_line, OutputStyle,
};

static TEST_LAYOUT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn build_test_layout_path(nanos: u128) -> PathBuf {
    let mut path = std::env::temp_dir();
    let sequence = TEST_LAYOUT_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.push(format!(
        "stackswap-cli-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        sequence
    ));
    path
}

fn test_root() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let root = build_test_layout_path(nanos);
    fs::create_dir_all(&root).expect("must create test root");
    root
}

fn sample_config(serial: &str) -> stackswap_core::ComposeSecondaryConfig {
    stackswap_core::ComposeSecondaryConfig {
        partial_verifying: false,
        ecu_serial: serial.to_string(),
        ecu_hardware_id: "compose-runner".to_string(),
        full_client_dir: PathBuf::new(),
        ecu_private_key: "sec.private".to_string(),
        ecu_public_key: "sec.public".to_string(),
        firmware_path: PathBuf::from("/var/sota/docker-compose.yml"),
        target_name_path: PathBuf::from("/var/sota/target_name"),
        metadata_path: PathBuf::new(),
    }
}

#[test]
fn build_test_layout_path_disambiguates_same_timestamp_calls() {
    let first = build_test_layout_path(42);
    let second = build_test_layout_path(42);
    assert_ne!(
        first, second,
        "test layout paths must remain unique when timestamp granularity is coarse"
    );
}

#[test]
fn install_parses_offline_flags() {
    let cli = Cli::try_parse_from([
        "stackswap",
        "--log-level",
        "debug",
        "install",
        "--config",
        "/etc/sota/secondaries.json",
        "--target-file",
        "/tmp/app-v2.yml",
        "--mode",
        "offline",
        "--images-dir",
        "/media/update/images",
        "--metadata-dir",
        "/media/update/metadata",
        "--sync",
    ])
    .expect("command must parse");

    assert_eq!(cli.log_level.as_deref(), Some("debug"));
    match cli.command {
        Commands::Install {
            secondary,
            mode,
            sync,
            sha256,
            ..
        } => {
            assert_eq!(secondary.config, PathBuf::from("/etc/sota/secondaries.json"));
            assert_eq!(secondary.ecu, None);
            assert_eq!(mode, CliUpdateMode::Offline);
            assert!(sync);
            assert_eq!(sha256, None);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn install_defaults_to_online_mode() {
    let cli = Cli::try_parse_from([
        "stackswap",
        "install",
        "--config",
        "secondaries.json",
        "--target-file",
        "app.yml",
    ])
    .expect("command must parse");

    match cli.command {
        Commands::Install { mode, sync, .. } => {
            assert_eq!(mode, CliUpdateMode::Online);
            assert!(!sync);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn settings_flag_is_accepted_after_subcommand() {
    let cli = Cli::try_parse_from([
        "stackswap",
        "status",
        "--config",
        "secondaries.json",
        "--settings",
        "/etc/stackswap/alt.toml",
    ])
    .expect("command must parse");

    assert_eq!(cli.settings, Some(PathBuf::from("/etc/stackswap/alt.toml")));
    assert!(matches!(cli.command, Commands::Status { .. }));
}

#[test]
fn install_requires_target_file() {
    let err = Cli::try_parse_from(["stackswap", "install", "--config", "secondaries.json"])
        .expect_err("missing target file must fail");
    assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
}

#[test]
fn pick_secondary_selects_by_serial() {
    let source = Path::new("secondaries.json");
    let entries = vec![sample_config("stack-01"), sample_config("stack-02")];

    let picked = pick_secondary(entries.clone(), Some("stack-02"), source).expect("must pick");
    assert_eq!(picked.ecu_serial, "stack-02");

    let err = pick_secondary(entries.clone(), None, source).expect_err("must be ambiguous");
    assert!(err.to_string().contains("select one with --ecu"));

    let err = pick_secondary(entries, Some("stack-09"), source).expect_err("must be missing");
    assert!(err.to_string().contains("stack-09"));

    let single = pick_secondary(vec![sample_config("stack-01")], None, source)
        .expect("single entry needs no serial");
    assert_eq!(single.ecu_serial, "stack-01");

    assert!(pick_secondary(Vec::new(), None, source).is_err());
}

#[test]
fn build_target_hashes_file_and_defaults_filename() {
    let root = test_root();
    let path = root.join("app-v2.yml");
    fs::write(&path, "services: {}\n").expect("must write target");
    let expected = sha256_hex(b"services: {}\n");

    let target = build_target(&path, Some(expected.to_ascii_uppercase().as_str()), None)
        .expect("must build target");
    assert_eq!(target.filename, "app-v2.yml");
    assert_eq!(target.sha256, expected);
    assert_eq!(target.length, 13);

    let named = build_target(&path, None, Some("stack-app-2".to_string())).expect("must build");
    assert_eq!(named.filename, "stack-app-2");

    let err = build_target(&path, Some(sha256_hex(b"other").as_str()), None).expect_err("must reject");
    assert!(err.to_string().contains("sha256 mismatch"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn build_install_info_requires_offline_paths() {
    let online = build_install_info(CliUpdateMode::Online, None, None).expect("online");
    assert_eq!(online.mode, UpdateMode::Online);

    let offline = build_install_info(
        CliUpdateMode::Offline,
        Some(PathBuf::from("/media/images")),
        Some(PathBuf::from("/media/meta")),
    )
    .expect("offline");
    assert_eq!(offline.mode, UpdateMode::Offline);
    assert_eq!(
        offline.images_path_offline,
        Some(PathBuf::from("/media/images"))
    );

    let err = build_install_info(CliUpdateMode::Offline, None, Some(PathBuf::from("/m")))
        .expect_err("must require images dir");
    assert!(err.to_string().contains("--images-dir"));
}

#[test]
fn forced_sync_gate_is_locked_step() {
    let settings = stackswap_core::EngineSettings::default();
    let mut runner = stackswap_installer::SystemRunner;

    assert!(build_sync_gate(&settings, true)
        .decide(&mut runner)
        .is_locked_step());
    assert!(!build_sync_gate(&settings, false)
        .decide(&mut runner)
        .is_locked_step());
}

#[test]
fn render_status_line_plain_is_unadorned() {
    assert_eq!(
        render_status_line(OutputStyle::Plain, "ok", "install app-v2.yml: OK"),
        "install app-v2.yml: OK"
    );
}

#[test]
fn render_status_line_rich_includes_ascii_badge() {
    assert_eq!(
        render_status_line(OutputStyle::Rich, "ok", "install app-v2.yml: OK"),
        "[OK] install app-v2.yml: OK"
    );
    assert_eq!(
        render_status_line(OutputStyle::Rich, "warn", "discarded staged manifest"),
        "[WARN] discarded staged manifest"
    );
}

#[test]
fn install_result_lines_describe_deferred_completion() {
    let lines = format_install_result_lines(
        "app-v2.yml",
        &InstallationResult::need_completion(),
        OutputStyle::Rich,
    );
    assert_eq!(lines[0], "[..] install app-v2.yml: NEED_COMPLETION");
    assert!(lines[1].starts_with("completion: pending"));

    let lines = format_install_result_lines(
        "app-v2.yml",
        &InstallationResult::install_failed("compose pull failed"),
        OutputStyle::Plain,
    );
    assert_eq!(
        lines,
        vec![
            "install app-v2.yml: INSTALL_FAILED".to_string(),
            "reason: compose pull failed".to_string(),
        ]
    );
}

#[test]
fn resume_outcome_line_reports_reason() {
    let line = format_resume_outcome_line(
        &ResumeOutcome::RolledBack {
            reason: "compose up failed".to_string(),
        },
        OutputStyle::Rich,
    );
    assert_eq!(line, "[ERR] rolled back pending update: compose up failed");
}

#[test]
fn status_lines_include_pending_flag() {
    let info = FirmwareInfo {
        name: "app-v2.yml".to_string(),
        sha256: sha256_hex(b"v2"),
        len: 2,
    };
    let lines = format_status_lines(&info, true);
    assert_eq!(lines[0], "name: app-v2.yml");
    assert_eq!(lines[2], "length: 2");
    assert_eq!(lines[3], "pending_update: yes");
}

#[test]
fn completions_script_names_binary() {
    let mut out = Vec::new();
    write_completions_script(completion::CliCompletionShell::Bash, &mut out)
        .expect("must generate completions");
    let script = String::from_utf8(out).expect("utf8 script");
    assert!(script.contains("stackswap"));
}
