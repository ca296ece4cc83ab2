use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use super::*;

static TEST_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_dir() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    std::env::temp_dir().join(format!(
        "stackswap-core-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        TEST_DIR_COUNTER.fetch_add(1, Ordering::Relaxed)
    ))
}

#[test]
fn parse_secondary_config() {
    let content = r#"
{
  "docker-compose": [
    {
      "partial_verifying": false,
      "ecu_serial": "a1b2c3-docker-compose",
      "ecu_hardware_id": "docker-compose",
      "full_client_dir": "/var/sota/storage/docker-compose",
      "ecu_private_key": "sec.private",
      "ecu_public_key": "sec.public",
      "firmware_path": "/var/sota/storage/docker-compose/docker-compose.yml",
      "target_name_path": "/var/sota/storage/docker-compose/target_name",
      "metadata_path": "/var/sota/storage/docker-compose/metadata"
    }
  ]
}
"#;

    let configs = ComposeSecondaryConfig::from_json_str(content).expect("config should parse");
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].ecu_serial, "a1b2c3-docker-compose");
    assert_eq!(configs[0].ecu_hardware_id, "docker-compose");
    assert_eq!(
        configs[0].firmware_path,
        PathBuf::from("/var/sota/storage/docker-compose/docker-compose.yml")
    );
    assert!(!configs[0].partial_verifying);
}

#[test]
fn secondary_config_without_compose_key_is_empty() {
    let configs = ComposeSecondaryConfig::from_json_str(r#"{"virtual": []}"#)
        .expect("unrelated secondaries should parse");
    assert!(configs.is_empty());
}

#[test]
fn secondary_config_rejects_empty_serial() {
    let content = r#"{"docker-compose": [{"ecu_serial": " ", "ecu_hardware_id": "dc", "firmware_path": "/tmp/dc.yml", "target_name_path": "/tmp/name"}]}"#;
    let err = ComposeSecondaryConfig::from_json_str(content).expect_err("must reject");
    assert!(err.to_string().contains("ecu_serial"));
}

#[test]
fn secondary_config_dump_then_load() {
    let dir = test_dir();
    let path = dir.join("nested").join("secondary.json");
    let config = ComposeSecondaryConfig {
        partial_verifying: true,
        ecu_serial: "serial-1".to_string(),
        ecu_hardware_id: "docker-compose".to_string(),
        full_client_dir: dir.join("client"),
        ecu_private_key: "sec.private".to_string(),
        ecu_public_key: "sec.public".to_string(),
        firmware_path: dir.join("docker-compose.yml"),
        target_name_path: dir.join("target_name"),
        metadata_path: dir.join("metadata"),
    };

    config.dump(&path).expect("must dump config");
    let raw = std::fs::read_to_string(&path).expect("must read dumped config");
    assert!(raw.contains(COMPOSE_SECONDARY_TYPE));

    let loaded = ComposeSecondaryConfig::create_from_file(&path).expect("must load config");
    assert_eq!(loaded, vec![config]);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn engine_settings_defaults_fill_missing_fields() {
    let settings = EngineSettings::from_toml_str("project_name = \"apps\"\n")
        .expect("settings should parse");
    assert_eq!(settings.project_name, "apps");
    assert_eq!(
        settings.compose_program,
        PathBuf::from("/usr/bin/docker-compose")
    );
    assert_eq!(settings.rollback_marker(), "rollback=1");
    assert!(settings.outer_update_probe.is_none());
}

#[test]
fn engine_settings_reject_invalid_rollback_variable() {
    let err = EngineSettings::from_toml_str("rollback_variable = \"a=b\"\n")
        .expect_err("must reject variable containing '='");
    assert!(err.to_string().contains("rollback_variable"));
}

#[test]
fn engine_settings_reject_empty_probe() {
    assert!(EngineSettings::from_toml_str("outer_update_probe = []\n").is_err());
}

#[test]
fn engine_settings_missing_file_uses_defaults() {
    let path = test_dir().join("absent.toml");
    let settings = EngineSettings::load(&path).expect("missing file is not an error");
    assert_eq!(settings, EngineSettings::default());
}

#[test]
fn update_mode_parse_is_case_insensitive() {
    assert_eq!(UpdateMode::parse("Online").expect("online"), UpdateMode::Online);
    assert_eq!(UpdateMode::parse("OFFLINE").expect("offline"), UpdateMode::Offline);
    assert!(UpdateMode::parse("lan").is_err());
}

#[test]
fn result_code_tokens() {
    for code in [
        ResultCode::Ok,
        ResultCode::NeedCompletion,
        ResultCode::InstallFailed,
    ] {
        assert_eq!(ResultCode::parse(code.as_str()).expect("known token"), code);
    }
    assert!(!ResultCode::InstallFailed.is_success());
    assert!(ResultCode::NeedCompletion.is_success());
}

#[test]
fn target_normalizes_hash_case() {
    let target = Target::new("docker-compose.yml", "ABCDEF", 12);
    assert_eq!(target.sha256, "abcdef");
}

#[test]
fn sha256_of_known_input() {
    assert_eq!(
        sha256_hex(b"abc"),
        "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
    let mut reader: &[u8] = b"abc";
    assert_eq!(
        sha256_reader_hex(&mut reader).expect("reader hash"),
        sha256_hex(b"abc")
    );
    assert!(verify_sha256(
        b"abc",
        "BA7816BF8F01CFEA414140DE5DAE2223B00361A396177A9CB410FF61F20015AD"
    ));
}

#[test]
fn event_log_lines() {
    assert_eq!(
        UpdateEvent::DownloadProgressReport { progress: 40 }.log_line(),
        "Event: DownloadProgressReport, Progress at 40%"
    );
    assert_eq!(
        UpdateEvent::UpdateCheckComplete {
            status: UpdateStatus::NoUpdatesAvailable
        }
        .log_line(),
        "Event: UpdateCheckComplete, Result - No updates available"
    );
    assert_eq!(
        UpdateEvent::AllDownloadsComplete {
            status: DownloadStatus::PartialSuccess
        }
        .log_line(),
        "Event: AllDownloadsComplete, Result - Partial success"
    );
    assert_eq!(
        UpdateEvent::AllInstallsComplete {
            result_code: ResultCode::NeedCompletion
        }
        .log_line(),
        "Event: AllInstallsComplete, Result - NEED_COMPLETION"
    );
    assert_eq!(UpdateEvent::InstallStarted.log_line(), "Event: InstallStarted");
    assert_eq!(
        UpdateEvent::InstallTargetComplete { success: false }.detail(),
        Some("Result - Error".to_string())
    );
}
