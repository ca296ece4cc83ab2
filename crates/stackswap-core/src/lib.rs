mod checksum;
mod config;
mod events;
mod target;

pub use checksum::{sha256_hex, sha256_reader_hex, verify_sha256};
pub use config::{ComposeSecondaryConfig, EngineSettings, COMPOSE_SECONDARY_TYPE};
pub use events::{DownloadStatus, UpdateEvent, UpdateStatus};
pub use target::{
    FirmwareInfo, InstallationResult, InstalledVersionUpdateMode, ResultCode, Target, UpdateMode,
    NO_IMAGE_NAME,
};

#[cfg(test)]
mod tests;
