//! End-of-run summary.

use crate::orchestrator::{ActivationResult, MountOutcome, SkipReason, VolumeState};
use serde::Serialize;
use std::fmt::{self, Write as _};
use std::path::PathBuf;

/// Per-mount-point line of the summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountReport {
    pub mount_point: PathBuf,
    pub status: MountStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MountStatus {
    Mounted,
    AlreadyMounted,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HookReport {
    pub command: String,
    pub error: String,
}

/// Serializable view of one [`ActivationResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeReport {
    pub volume: String,
    pub state: VolumeState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decrypt_error: Option<String>,
    pub mounts: Vec<MountReport>,
    pub hooks_ran: bool,
    pub hook_errors: Vec<HookReport>,
}

impl From<&ActivationResult> for VolumeReport {
    fn from(result: &ActivationResult) -> Self {
        let mounts = result
            .mounts
            .iter()
            .map(|record| {
                let (status, error) = match &record.outcome {
                    MountOutcome::Mounted => (MountStatus::Mounted, None),
                    MountOutcome::AlreadyMounted => (MountStatus::AlreadyMounted, None),
                    MountOutcome::Failed(e) => (MountStatus::Failed, Some(e.to_string())),
                };
                MountReport {
                    mount_point: record.mount_point.clone(),
                    status,
                    error,
                }
            })
            .collect();

        Self {
            volume: result.volume_name.clone(),
            state: result.state,
            skip_reason: result.skip_reason,
            decrypt_error: result.decrypt_error.as_ref().map(ToString::to_string),
            mounts,
            hooks_ran: result.hooks_ran,
            hook_errors: result
                .hook_errors()
                .map(|(command, e)| HookReport {
                    command: command.to_string(),
                    error: e.to_string(),
                })
                .collect(),
        }
    }
}

/// Totals for one activation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub activated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub hook_failures: usize,
    pub volumes: Vec<VolumeReport>,
}

impl Summary {
    pub fn from_results(results: &[ActivationResult]) -> Self {
        Self {
            activated: results.iter().filter(|r| r.is_clean()).count(),
            skipped: results.iter().filter(|r| r.skipped()).count(),
            failed: results.iter().filter(|r| r.is_failed()).count(),
            hook_failures: results.iter().map(|r| r.hook_errors().count()).sum(),
            volumes: results.iter().map(VolumeReport::from).collect(),
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0 || self.hook_failures > 0
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Summary")?;
        writeln!(f, "=======")?;
        for volume in &self.volumes {
            let mut line = format!("{:<16} ", volume.volume);
            match (&volume.skip_reason, &volume.decrypt_error) {
                (Some(reason), _) => write!(line, "skipped ({reason})")?,
                (None, Some(error)) => write!(line, "decrypt failed: {error}")?,
                (None, None) if volume.state == VolumeState::MountedWithErrors => {
                    write!(line, "mount errors, programs not run")?
                }
                (None, None) => write!(line, "ok")?,
            }
            writeln!(f, "{line}")?;

            for mount in volume.mounts.iter().filter(|m| m.error.is_some()) {
                if let Some(error) = &mount.error {
                    writeln!(f, "  {}: {}", mount.mount_point.display(), error)?;
                }
            }
            for hook in &volume.hook_errors {
                writeln!(f, "  hook `{}`: {}", hook.command, hook.error)?;
            }
        }
        write!(
            f,
            "{} activated, {} skipped, {} failed, {} hook error(s)",
            self.activated, self.skipped, self.failed, self.hook_failures
        )
    }
}
