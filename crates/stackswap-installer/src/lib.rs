mod bootenv;
mod compose;
mod driver;
mod events;
mod fs_utils;
mod layout;
mod offline;
mod resume;
mod runner;
mod sync_gate;
mod update_lock;
mod version_store;

pub use bootenv::BootEnvironment;
pub use compose::{PendingOutcome, PendingUpdateError, StackController, UpdateTransaction};
pub use driver::{read_firmware_info, ComposeSecondary, InstallInfo};
pub use events::{UpdateControl, UpdateEvents};
pub use fs_utils::{remove_file_if_exists, write_file_atomic, write_via_rename};
pub use layout::ManifestLayout;
pub use offline::{DockerArchiveLoader, OfflineImageLoader, OfflineLoadError, OfflineLoadRequest};
pub use resume::{resume_pending_update, ResumeOutcome};
pub use runner::{describe_command, ProcessRunner, SystemRunner};
pub use sync_gate::{CommandProbe, OuterUpdateProbe, SyncDecision, SyncGate};
pub use update_lock::UpdateLock;
pub use version_store::{FileVersionStore, VersionRecord, VersionStore};
