use crate::target::ResultCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    UpdatesAvailable,
    NoUpdatesAvailable,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    Success,
    PartialSuccess,
    NothingToDownload,
    Error,
}

/// Notifications emitted by the outer update framework during a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateEvent {
    SendDeviceDataComplete,
    PutManifestComplete { success: bool },
    UpdateCheckComplete { status: UpdateStatus },
    DownloadProgressReport { progress: u32 },
    DownloadTargetComplete { success: bool },
    AllDownloadsComplete { status: DownloadStatus },
    InstallStarted,
    InstallTargetComplete { success: bool },
    AllInstallsComplete { result_code: ResultCode },
}

impl UpdateEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::SendDeviceDataComplete => "SendDeviceDataComplete",
            Self::PutManifestComplete { .. } => "PutManifestComplete",
            Self::UpdateCheckComplete { .. } => "UpdateCheckComplete",
            Self::DownloadProgressReport { .. } => "DownloadProgressReport",
            Self::DownloadTargetComplete { .. } => "DownloadTargetComplete",
            Self::AllDownloadsComplete { .. } => "AllDownloadsComplete",
            Self::InstallStarted => "InstallStarted",
            Self::InstallTargetComplete { .. } => "InstallTargetComplete",
            Self::AllInstallsComplete { .. } => "AllInstallsComplete",
        }
    }

    /// Extra information appended to the event's log line, if any.
    pub fn detail(&self) -> Option<String> {
        match self {
            Self::SendDeviceDataComplete | Self::InstallStarted => None,
            Self::PutManifestComplete { success }
            | Self::DownloadTargetComplete { success }
            | Self::InstallTargetComplete { success } => Some(success_detail(*success)),
            Self::UpdateCheckComplete { status } => Some(
                match status {
                    UpdateStatus::UpdatesAvailable => "Result - Updates available",
                    UpdateStatus::NoUpdatesAvailable => "Result - No updates available",
                    UpdateStatus::Error => "Result - Error",
                }
                .to_string(),
            ),
            Self::DownloadProgressReport { progress } => Some(format!("Progress at {progress}%")),
            Self::AllDownloadsComplete { status } => Some(
                match status {
                    DownloadStatus::Success => "Result - Success",
                    DownloadStatus::PartialSuccess => "Result - Partial success",
                    DownloadStatus::NothingToDownload => "Result - Nothing to download",
                    DownloadStatus::Error => "Result - Error",
                }
                .to_string(),
            ),
            Self::AllInstallsComplete { result_code } => {
                Some(format!("Result - {}", result_code.as_str()))
            }
        }
    }

    pub fn log_line(&self) -> String {
        match self.detail() {
            Some(detail) => format!("Event: {}, {detail}", self.name()),
            None => format!("Event: {}", self.name()),
        }
    }
}

fn success_detail(success: bool) -> String {
    if success {
        "Result - Success".to_string()
    } else {
        "Result - Error".to_string()
    }
}
