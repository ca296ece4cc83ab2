use std::fs;
use std::io;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use stackswap_core::{InstallationResult, InstalledVersionUpdateMode, ResultCode, Target};

use crate::fs_utils::write_file_atomic;

/// Persistent record of installed and pending targets per ECU.
pub trait VersionStore {
    /// Target the outer framework still regards as installed-but-pending.
    fn load_pending(&self, ecu_serial: &str) -> Result<Option<Target>>;

    fn save_installation_result(
        &mut self,
        ecu_serial: &str,
        result: &InstallationResult,
    ) -> Result<()>;

    fn save_installed_version(
        &mut self,
        ecu_serial: &str,
        target: &Target,
        mode: InstalledVersionUpdateMode,
    ) -> Result<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionRecord {
    pub current: Option<Target>,
    pub pending: Option<Target>,
    pub last_result: Option<InstallationResult>,
}

/// Stores one `key=value` record per ECU under a state directory.
#[derive(Debug, Clone)]
pub struct FileVersionStore {
    dir: PathBuf,
}

impl FileVersionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn record_path(&self, ecu_serial: &str) -> PathBuf {
        self.dir.join(format!("{ecu_serial}.version"))
    }

    pub fn load_record(&self, ecu_serial: &str) -> Result<VersionRecord> {
        validate_ecu_serial(ecu_serial)?;
        let path = self.record_path(ecu_serial);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(VersionRecord::default())
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read version record: {}", path.display()));
            }
        };
        parse_version_record(&raw)
            .with_context(|| format!("failed to parse version record: {}", path.display()))
    }

    fn save_record(&self, ecu_serial: &str, record: &VersionRecord) -> Result<()> {
        validate_ecu_serial(ecu_serial)?;
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let path = self.record_path(ecu_serial);
        write_file_atomic(&path, serialize_version_record(record).as_bytes())
            .with_context(|| format!("failed to write version record: {}", path.display()))
    }
}

impl VersionStore for FileVersionStore {
    fn load_pending(&self, ecu_serial: &str) -> Result<Option<Target>> {
        Ok(self.load_record(ecu_serial)?.pending)
    }

    fn save_installation_result(
        &mut self,
        ecu_serial: &str,
        result: &InstallationResult,
    ) -> Result<()> {
        let mut record = self.load_record(ecu_serial)?;
        record.last_result = Some(result.clone());
        self.save_record(ecu_serial, &record)
    }

    fn save_installed_version(
        &mut self,
        ecu_serial: &str,
        target: &Target,
        mode: InstalledVersionUpdateMode,
    ) -> Result<()> {
        let mut record = self.load_record(ecu_serial)?;
        match mode {
            InstalledVersionUpdateMode::None => {
                if record.pending.as_ref() == Some(target) {
                    record.pending = None;
                }
            }
            InstalledVersionUpdateMode::Pending => record.pending = Some(target.clone()),
            InstalledVersionUpdateMode::Current => {
                record.current = Some(target.clone());
                record.pending = None;
            }
        }
        self.save_record(ecu_serial, &record)
    }
}

fn validate_ecu_serial(ecu_serial: &str) -> Result<()> {
    let valid = !ecu_serial.is_empty()
        && ecu_serial != "."
        && ecu_serial != ".."
        && ecu_serial
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'));
    if !valid {
        return Err(anyhow!("invalid ecu serial: '{ecu_serial}'"));
    }
    Ok(())
}

fn serialize_version_record(record: &VersionRecord) -> String {
    let mut payload = String::new();
    for (prefix, target) in [("current", &record.current), ("pending", &record.pending)] {
        if let Some(target) = target {
            payload.push_str(&format!("{prefix}_filename={}\n", target.filename));
            payload.push_str(&format!("{prefix}_sha256={}\n", target.sha256));
            payload.push_str(&format!("{prefix}_length={}\n", target.length));
        }
    }
    if let Some(result) = &record.last_result {
        payload.push_str(&format!("result_code={}\n", result.code.as_str()));
        payload.push_str(&format!(
            "result_description={}\n",
            result.description.replace('\n', " ")
        ));
    }
    payload
}

#[derive(Default)]
struct TargetFields {
    filename: Option<String>,
    sha256: Option<String>,
    length: Option<u64>,
}

impl TargetFields {
    fn finish(self, prefix: &str) -> Result<Option<Target>> {
        match (self.filename, self.sha256, self.length) {
            (None, None, None) => Ok(None),
            (Some(filename), Some(sha256), Some(length)) => {
                Ok(Some(Target::new(filename, sha256, length)))
            }
            _ => Err(anyhow!("incomplete {prefix} target entry")),
        }
    }
}

pub(crate) fn parse_version_record(raw: &str) -> Result<VersionRecord> {
    let mut current = TargetFields::default();
    let mut pending = TargetFields::default();
    let mut result_code = None;
    let mut result_description = None;

    for line in raw.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let Some((k, v)) = line.split_once('=') else {
            continue;
        };
        let (fields, field) = match k.split_once('_') {
            Some(("current", field)) => (&mut current, field),
            Some(("pending", field)) => (&mut pending, field),
            _ => {
                match k {
                    "result_code" => result_code = Some(ResultCode::parse(v)?),
                    "result_description" => result_description = Some(v.to_string()),
                    _ => {}
                }
                continue;
            }
        };
        match field {
            "filename" => fields.filename = Some(v.to_string()),
            "sha256" => fields.sha256 = Some(v.to_string()),
            "length" => fields.length = Some(v.parse().context("target length must be u64")?),
            _ => {}
        }
    }

    Ok(VersionRecord {
        current: current.finish("current")?,
        pending: pending.finish("pending")?,
        last_result: result_code.map(|code| {
            InstallationResult::new(code, result_description.unwrap_or_default())
        }),
    })
}
