use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

/// Key under which compose secondaries are listed in the outer framework's
/// secondary configuration file.
pub const COMPOSE_SECONDARY_TYPE: &str = "docker-compose";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeSecondaryConfig {
    #[serde(default)]
    pub partial_verifying: bool,
    pub ecu_serial: String,
    pub ecu_hardware_id: String,
    #[serde(default)]
    pub full_client_dir: PathBuf,
    #[serde(default)]
    pub ecu_private_key: String,
    #[serde(default)]
    pub ecu_public_key: String,
    pub firmware_path: PathBuf,
    pub target_name_path: PathBuf,
    #[serde(default)]
    pub metadata_path: PathBuf,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SecondaryConfigFile {
    #[serde(rename = "docker-compose", default)]
    entries: Vec<ComposeSecondaryConfig>,
}

impl ComposeSecondaryConfig {
    pub fn from_json_str(input: &str) -> Result<Vec<Self>> {
        let file: SecondaryConfigFile =
            serde_json::from_str(input).context("failed to parse secondary config")?;
        for entry in &file.entries {
            entry.validate()?;
        }
        Ok(file.entries)
    }

    pub fn create_from_file(path: &Path) -> Result<Vec<Self>> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read secondary config: {}", path.display()))?;
        Self::from_json_str(&raw)
            .with_context(|| format!("invalid secondary config: {}", path.display()))
    }

    pub fn dump(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let file = SecondaryConfigFile {
            entries: vec![self.clone()],
        };
        let mut payload =
            serde_json::to_string_pretty(&file).context("failed to serialize secondary config")?;
        payload.push('\n');
        fs::write(path, payload)
            .with_context(|| format!("failed to write secondary config: {}", path.display()))
    }

    fn validate(&self) -> Result<()> {
        if self.ecu_serial.trim().is_empty() {
            return Err(anyhow!("ecu_serial must not be empty"));
        }
        if self.ecu_hardware_id.trim().is_empty() {
            return Err(anyhow!(
                "ecu_hardware_id must not be empty for ecu '{}'",
                self.ecu_serial
            ));
        }
        if self.firmware_path.as_os_str().is_empty() {
            return Err(anyhow!(
                "firmware_path must not be empty for ecu '{}'",
                self.ecu_serial
            ));
        }
        Ok(())
    }
}

/// External programs and state locations used by the update engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub compose_program: PathBuf,
    pub project_name: String,
    pub docker_program: PathBuf,
    pub printenv_program: PathBuf,
    pub setenv_program: PathBuf,
    pub rollback_variable: String,
    pub reboot_program: PathBuf,
    /// Command whose successful exit means an outer image update is pending.
    pub outer_update_probe: Option<Vec<String>>,
    pub version_store_dir: PathBuf,
    pub update_lock_path: PathBuf,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            compose_program: PathBuf::from("/usr/bin/docker-compose"),
            project_name: "torizon".to_string(),
            docker_program: PathBuf::from("docker"),
            printenv_program: PathBuf::from("/usr/bin/fw_printenv"),
            setenv_program: PathBuf::from("fw_setenv"),
            rollback_variable: "rollback".to_string(),
            reboot_program: PathBuf::from("reboot"),
            outer_update_probe: None,
            version_store_dir: PathBuf::from("/var/sota/stackswap"),
            update_lock_path: PathBuf::from("/run/lock/stackswap-update.lock"),
        }
    }
}

impl EngineSettings {
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let settings: Self = toml::from_str(input).context("failed to parse engine settings")?;
        if settings.project_name.trim().is_empty() {
            return Err(anyhow!("project_name must not be empty"));
        }
        if settings.rollback_variable.trim().is_empty() || settings.rollback_variable.contains('=')
        {
            return Err(anyhow!(
                "rollback_variable must be a non-empty name without '=': {}",
                settings.rollback_variable
            ));
        }
        if let Some(probe) = &settings.outer_update_probe {
            if probe.is_empty() {
                return Err(anyhow!("outer_update_probe must name a program"));
            }
        }
        Ok(settings)
    }

    /// Load settings from `path`, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(raw) => Self::from_toml_str(&raw)
                .with_context(|| format!("invalid engine settings: {}", path.display())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err)
                .with_context(|| format!("failed to read engine settings: {}", path.display())),
        }
    }

    pub fn rollback_marker(&self) -> String {
        format!("{}=1", self.rollback_variable)
    }
}
