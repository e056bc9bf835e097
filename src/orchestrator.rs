//! Per-volume activation.
//!
//! Each configured volume goes through one pass of the state machine below,
//! in declaration order:
//!
//! ```text
//! NotChecked ─┬─ mapper present ─────────────► AlreadyDecrypted  (skip)
//!             ├─ device absent ──────────────► Absent            (skip)
//!             └─► PendingConfirmation ─┬─ no ► Absent            (skip)
//!                                      └─ yes ► Decrypting
//! Decrypting ─┬─ error ──────────────────────► DecryptFailed
//!             └─► MountingAll ─┬─ any error ─► MountedWithErrors
//!                              └─► MountedClean ─► RunningHooks ─► Done
//! ```
//!
//! Nothing that happens to one volume changes how the next one is handled.

use crate::config::{Config, VolumeConfig, DEFAULT_HOOK_DELAY};
use crate::decrypt::Decryptor;
use crate::error::{DecryptError, HookError, MountError};
use crate::hooks::{HookOutcome, HookRunner};
use crate::mount::Mounter;
use crate::probe::SystemProbe;
use crate::prompt::Prompter;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Where a volume is in its activation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeState {
    NotChecked,
    Absent,
    AlreadyDecrypted,
    PendingConfirmation,
    Decrypting,
    DecryptFailed,
    MountingAll,
    MountedWithErrors,
    MountedClean,
    RunningHooks,
    Done,
}

impl VolumeState {
    /// Whether the pass for this volume has ended.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Absent
                | Self::AlreadyDecrypted
                | Self::DecryptFailed
                | Self::MountedWithErrors
                | Self::Done
        )
    }
}

/// Why a volume was left alone. None of these are failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The by-UUID device is not attached.
    Absent,
    /// The mapper device already exists.
    AlreadyDecrypted,
    /// The operator answered no.
    UserDeclined,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Absent => "volume not present",
            Self::AlreadyDecrypted => "volume already decrypted",
            Self::UserDeclined => "declined by user",
        };
        f.write_str(text)
    }
}

/// What happened at one mount point.
#[derive(Debug)]
pub enum MountOutcome {
    Mounted,
    AlreadyMounted,
    Failed(MountError),
}

/// Outcome for one configured mount point.
#[derive(Debug)]
pub struct MountRecord {
    pub mount_point: PathBuf,
    pub outcome: MountOutcome,
}

/// Everything that happened to one volume during a pass.
#[derive(Debug)]
pub struct ActivationResult {
    pub volume_name: String,
    /// Terminal state reached.
    pub state: VolumeState,
    pub skip_reason: Option<SkipReason>,
    pub decrypt_error: Option<DecryptError>,
    /// One record per attempted mount point, in configuration order.
    pub mounts: Vec<MountRecord>,
    pub hooks_ran: bool,
    pub hook_outcomes: Vec<HookOutcome>,
}

impl ActivationResult {
    fn new(volume_name: &str) -> Self {
        Self {
            volume_name: volume_name.to_string(),
            state: VolumeState::NotChecked,
            skip_reason: None,
            decrypt_error: None,
            mounts: Vec::new(),
            hooks_ran: false,
            hook_outcomes: Vec::new(),
        }
    }

    pub fn skipped(&self) -> bool {
        self.skip_reason.is_some()
    }

    /// Mount points that failed, in configuration order.
    pub fn mount_errors(&self) -> impl Iterator<Item = (&Path, &MountError)> {
        self.mounts.iter().filter_map(|record| match &record.outcome {
            MountOutcome::Failed(e) => Some((record.mount_point.as_path(), e)),
            _ => None,
        })
    }

    /// Hook commands that failed, in run order.
    pub fn hook_errors(&self) -> impl Iterator<Item = (&str, &HookError)> {
        self.hook_outcomes
            .iter()
            .filter_map(|outcome| match &outcome.result {
                Err(e) => Some((outcome.command.as_str(), e)),
                Ok(()) => None,
            })
    }

    /// Decrypt succeeded and every mount point is mounted.
    pub fn is_clean(&self) -> bool {
        matches!(
            self.state,
            VolumeState::MountedClean | VolumeState::RunningHooks | VolumeState::Done
        )
    }

    /// Decrypt or mount failed. Hook failures do not count.
    pub fn is_failed(&self) -> bool {
        matches!(
            self.state,
            VolumeState::DecryptFailed | VolumeState::MountedWithErrors
        )
    }

    fn enter(&mut self, state: VolumeState) {
        debug!("{}: {:?} -> {:?}", self.volume_name, self.state, state);
        self.state = state;
    }

    fn skip(mut self, reason: SkipReason) -> Self {
        let state = match reason {
            SkipReason::AlreadyDecrypted => VolumeState::AlreadyDecrypted,
            SkipReason::Absent | SkipReason::UserDeclined => VolumeState::Absent,
        };
        self.enter(state);
        self.skip_reason = Some(reason);
        self
    }
}

/// Drives volumes through activation using the injected collaborators.
pub struct VolumeOrchestrator<'a> {
    probe: &'a dyn SystemProbe,
    prompter: &'a dyn Prompter,
    decryptor: &'a dyn Decryptor,
    mounter: &'a dyn Mounter,
    hooks: &'a dyn HookRunner,
    hook_delay: Duration,
}

impl<'a> VolumeOrchestrator<'a> {
    pub fn new(
        probe: &'a dyn SystemProbe,
        prompter: &'a dyn Prompter,
        decryptor: &'a dyn Decryptor,
        mounter: &'a dyn Mounter,
        hooks: &'a dyn HookRunner,
    ) -> Self {
        Self {
            probe,
            prompter,
            decryptor,
            mounter,
            hooks,
            hook_delay: DEFAULT_HOOK_DELAY,
        }
    }

    /// Override the wait before hook commands.
    pub fn with_hook_delay(mut self, delay: Duration) -> Self {
        self.hook_delay = delay;
        self
    }

    /// Activate every configured volume in declaration order.
    pub fn activate_all(&self, config: &Config) -> Vec<ActivationResult> {
        config
            .volumes
            .iter()
            .map(|volume| {
                let result = self.activate(volume);
                debug_assert!(result.state.is_terminal(), "{:?}", result.state);
                result
            })
            .collect()
    }

    /// Run one volume through its activation pass.
    pub fn activate(&self, volume: &VolumeConfig) -> ActivationResult {
        info!("Volume: {}", volume.name);
        info!("UUID: {}", volume.uuid);

        let mut result = ActivationResult::new(&volume.name);

        // An open mapper wins even if the by-UUID link has gone away.
        if self.probe.mapper_exists(&volume.name) {
            info!("Volume already decrypted. Skipping...");
            return result.skip(SkipReason::AlreadyDecrypted);
        }
        if !self.probe.device_exists(&volume.uuid) {
            info!("Volume not present. Skipping...");
            return result.skip(SkipReason::Absent);
        }

        result.enter(VolumeState::PendingConfirmation);
        match self.prompter.confirm(&volume.name) {
            Ok(true) => {}
            Ok(false) => {
                info!("Skipping...");
                return result.skip(SkipReason::UserDeclined);
            }
            Err(e) => {
                warn!("No answer for {} ({}). Skipping...", volume.name, e);
                return result.skip(SkipReason::UserDeclined);
            }
        }

        result.enter(VolumeState::Decrypting);
        if let Err(e) = self.decrypt(volume) {
            error!("Could not decrypt {}: {}", volume.name, e);
            result.decrypt_error = Some(e);
            result.enter(VolumeState::DecryptFailed);
            return result;
        }

        result.enter(VolumeState::MountingAll);
        result.mounts = self.mount_all(&volume.mount_points);

        if result.mount_errors().next().is_some() {
            warn!("Errors found! Did not run associated program(s).");
            result.enter(VolumeState::MountedWithErrors);
            return result;
        }

        result.enter(VolumeState::MountedClean);
        result.enter(VolumeState::RunningHooks);
        result.hook_outcomes =
            self.hooks
                .run_hooks(&volume.name, &volume.hook_commands, self.hook_delay);
        result.hooks_ran = !volume.hook_commands.is_empty();
        result.enter(VolumeState::Done);
        result
    }

    fn decrypt(&self, volume: &VolumeConfig) -> Result<(), DecryptError> {
        let passphrase = self
            .prompter
            .passphrase(&volume.name)
            .map_err(|e| DecryptError::Prompt(e.to_string()))?;
        self.decryptor
            .decrypt(&volume.name, &volume.uuid, passphrase.as_str())
    }

    /// Attempt every mount point against one snapshot of the mount table.
    fn mount_all(&self, mount_points: &[PathBuf]) -> Vec<MountRecord> {
        let mounted = self.probe.list_mounted_paths();

        mount_points
            .iter()
            .map(|mount_point| {
                info!("Mounting: {}", mount_point.display());
                let outcome = if mounted.contains(mount_point) {
                    info!("Already mounted. Skipping...");
                    MountOutcome::AlreadyMounted
                } else {
                    match self.mounter.mount(mount_point) {
                        Ok(()) => MountOutcome::Mounted,
                        Err(e) => {
                            error!("Command error: {}", e);
                            MountOutcome::Failed(e)
                        }
                    }
                };
                MountRecord {
                    mount_point: mount_point.clone(),
                    outcome,
                }
            })
            .collect()
    }
}
