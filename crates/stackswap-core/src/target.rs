use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Descriptor of a manifest handed to the engine by the outer update framework.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub filename: String,
    pub sha256: String,
    pub length: u64,
}

impl Target {
    pub fn new(filename: impl Into<String>, sha256: impl Into<String>, length: u64) -> Self {
        Self {
            filename: filename.into(),
            sha256: sha256.into().to_ascii_lowercase(),
            length,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    Online,
    Offline,
}

impl UpdateMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }

    pub fn parse(input: &str) -> Result<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "online" => Ok(Self::Online),
            "offline" => Ok(Self::Offline),
            other => Err(anyhow!("unknown update type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCode {
    Ok,
    NeedCompletion,
    InstallFailed,
}

impl ResultCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::NeedCompletion => "NEED_COMPLETION",
            Self::InstallFailed => "INSTALL_FAILED",
        }
    }

    pub fn parse(input: &str) -> Result<Self> {
        match input.trim() {
            "OK" => Ok(Self::Ok),
            "NEED_COMPLETION" => Ok(Self::NeedCompletion),
            "INSTALL_FAILED" => Ok(Self::InstallFailed),
            other => Err(anyhow!("invalid result code: {other}")),
        }
    }

    pub fn is_success(self) -> bool {
        !matches!(self, Self::InstallFailed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationResult {
    pub code: ResultCode,
    pub description: String,
}

impl InstallationResult {
    pub fn new(code: ResultCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }

    pub fn ok() -> Self {
        Self::new(ResultCode::Ok, "")
    }

    pub fn need_completion() -> Self {
        Self::new(ResultCode::NeedCompletion, "")
    }

    pub fn install_failed(description: impl Into<String>) -> Self {
        Self::new(ResultCode::InstallFailed, description)
    }
}

/// How a target is recorded in the installed-version store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstalledVersionUpdateMode {
    /// Drop any pending record without promoting it.
    None,
    Pending,
    Current,
}

/// Installed manifest as reported back to the outer framework.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareInfo {
    pub name: String,
    pub sha256: String,
    pub len: u64,
}

/// Placeholder name reported when no manifest has been installed yet.
pub const NO_IMAGE_NAME: &str = "noimage";
