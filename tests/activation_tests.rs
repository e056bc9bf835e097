//! Activation flow tests against in-memory host, prompt and tool doubles.

use mount_crypt::config::{Config, VolumeConfig};
use mount_crypt::{
    ActivationResult, DecryptError, Decryptor, HookError, HookOutcome, HookRunner, MountError,
    MountOutcome, Mounter, Prompter, SkipReason, SystemProbe, VolumeOrchestrator, VolumeState,
};
use std::cell::RefCell;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use zeroize::Zeroizing;

/// Everything a volume did, in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Confirm(String),
    Decrypt(String),
    Mount(PathBuf),
    Hooks(String, Vec<String>, Duration),
}

#[derive(Default)]
struct FakeHost {
    devices: HashSet<String>,
    mappers: HashSet<String>,
    mounted: HashSet<PathBuf>,
    decline: HashSet<String>,
    bad_passphrase: HashSet<String>,
    broken_mounts: HashSet<PathBuf>,
    failing_hooks: HashSet<String>,
    unanswered: HashSet<String>,
    unreadable_passphrase: HashSet<String>,
    calls: RefCell<Vec<Call>>,
}

impl FakeHost {
    fn with_devices(uuids: &[&str]) -> Self {
        Self {
            devices: uuids.iter().map(|u| u.to_string()).collect(),
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    fn calls_for(&self, volume: &VolumeConfig) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| match call {
                Call::Confirm(name) | Call::Decrypt(name) | Call::Hooks(name, _, _) => {
                    name == &volume.name
                }
                Call::Mount(path) => volume.mount_points.contains(path),
            })
            .collect()
    }

    fn run(&self, config: &Config) -> Vec<ActivationResult> {
        VolumeOrchestrator::new(self, self, self, self, self)
            .with_hook_delay(Duration::from_secs(30))
            .activate_all(config)
    }
}

impl SystemProbe for FakeHost {
    fn device_exists(&self, uuid: &str) -> bool {
        self.devices.contains(uuid)
    }

    fn mapper_exists(&self, name: &str) -> bool {
        self.mappers.contains(name)
    }

    fn list_mounted_paths(&self) -> HashSet<PathBuf> {
        self.mounted.clone()
    }
}

impl Prompter for FakeHost {
    fn confirm(&self, volume: &str) -> mount_crypt::Result<bool> {
        self.calls.borrow_mut().push(Call::Confirm(volume.to_string()));
        if self.unanswered.contains(volume) {
            return Err(mount_crypt::Error::Prompt("stdin closed".to_string()));
        }
        Ok(!self.decline.contains(volume))
    }

    fn passphrase(&self, volume: &str) -> mount_crypt::Result<Zeroizing<String>> {
        if self.unreadable_passphrase.contains(volume) {
            Err(mount_crypt::Error::Prompt("not a terminal".to_string()))
        } else if self.bad_passphrase.contains(volume) {
            Ok(Zeroizing::new("wrong".to_string()))
        } else {
            Ok(Zeroizing::new("correct horse".to_string()))
        }
    }
}

impl Decryptor for FakeHost {
    fn decrypt(&self, volume_name: &str, _uuid: &str, passphrase: &str) -> Result<(), DecryptError> {
        self.calls
            .borrow_mut()
            .push(Call::Decrypt(volume_name.to_string()));
        if passphrase == "correct horse" {
            Ok(())
        } else {
            Err(DecryptError::Failed {
                status: 2,
                detail: "No key available with this passphrase.".to_string(),
            })
        }
    }
}

impl Mounter for FakeHost {
    fn mount(&self, path: &Path) -> Result<(), MountError> {
        self.calls.borrow_mut().push(Call::Mount(path.to_path_buf()));
        if self.broken_mounts.contains(path) {
            Err(MountError::Failed {
                status: 32,
                detail: format!("mount {} failed: can't find in /etc/fstab.", path.display()),
            })
        } else {
            Ok(())
        }
    }
}

impl HookRunner for FakeHost {
    fn run_hooks(&self, volume_name: &str, commands: &[String], delay: Duration) -> Vec<HookOutcome> {
        self.calls.borrow_mut().push(Call::Hooks(
            volume_name.to_string(),
            commands.to_vec(),
            delay,
        ));
        commands
            .iter()
            .map(|command| HookOutcome {
                command: command.clone(),
                result: if self.failing_hooks.contains(command) {
                    Err(HookError::Failed {
                        status: 1,
                        detail: "no additional output".to_string(),
                    })
                } else {
                    Ok(())
                },
            })
            .collect()
    }
}

fn volume(name: &str, uuid: &str, mounts: &[&str], hooks: &[&str]) -> VolumeConfig {
    VolumeConfig::new(
        name,
        uuid,
        mounts.iter().map(PathBuf::from).collect(),
        hooks.iter().map(|h| h.to_string()).collect(),
    )
}

fn config(volumes: Vec<VolumeConfig>) -> Config {
    Config {
        decrypt_tool_path: PathBuf::from("/sbin/cryptsetup"),
        mount_tool_path: PathBuf::from("/bin/mount"),
        volumes,
    }
}

fn backup() -> VolumeConfig {
    volume("backup", "uuid-backup", &["/mnt/backup"], &[])
}

fn data() -> VolumeConfig {
    volume(
        "data",
        "uuid-data",
        &["/mnt/data", "/opt/vbox"],
        &["lxc start", "lxc list"],
    )
}

#[test]
fn absent_device_is_skipped_without_any_tool_call() {
    let host = FakeHost::default();
    let results = host.run(&config(vec![backup()]));

    assert_eq!(results.len(), 1);
    let result = &results[0];
    assert_eq!(result.volume_name, "backup");
    assert!(result.skipped());
    assert_eq!(result.skip_reason, Some(SkipReason::Absent));
    assert_eq!(result.state, VolumeState::Absent);
    assert!(result.decrypt_error.is_none());
    assert!(result.mounts.is_empty());
    assert!(!result.hooks_ran);
    assert!(host.calls().is_empty());
}

#[test]
fn open_mapper_is_skipped_whether_or_not_the_device_is_attached() {
    for attached in [true, false] {
        let mut host = if attached {
            FakeHost::with_devices(&["uuid-data"])
        } else {
            FakeHost::default()
        };
        host.mappers.insert("data".to_string());

        let results = host.run(&config(vec![data()]));

        assert_eq!(results[0].skip_reason, Some(SkipReason::AlreadyDecrypted));
        assert_eq!(results[0].state, VolumeState::AlreadyDecrypted);
        assert!(host.calls().is_empty(), "attached = {attached}");
    }
}

#[test]
fn decrypt_failure_prevents_mounts_and_hooks() {
    let mut host = FakeHost::with_devices(&["uuid-data"]);
    host.bad_passphrase.insert("data".to_string());

    let results = host.run(&config(vec![data()]));

    let result = &results[0];
    assert_eq!(result.state, VolumeState::DecryptFailed);
    assert!(matches!(
        result.decrypt_error,
        Some(DecryptError::Failed { status: 2, .. })
    ));
    assert!(result.mounts.is_empty());
    assert!(!result.hooks_ran);
    assert_eq!(
        host.calls(),
        vec![
            Call::Confirm("data".to_string()),
            Call::Decrypt("data".to_string())
        ]
    );
}

#[test]
fn failed_mount_point_blocks_hooks_but_not_other_mounts() {
    let mut host = FakeHost::with_devices(&["uuid-data"]);
    host.broken_mounts.insert(PathBuf::from("/mnt/data"));

    let results = host.run(&config(vec![data()]));

    let result = &results[0];
    assert_eq!(result.state, VolumeState::MountedWithErrors);
    assert_eq!(result.mounts.len(), 2);
    assert_eq!(result.mounts[0].mount_point, PathBuf::from("/mnt/data"));
    assert!(matches!(result.mounts[0].outcome, MountOutcome::Failed(_)));
    assert_eq!(result.mounts[1].mount_point, PathBuf::from("/opt/vbox"));
    assert!(matches!(result.mounts[1].outcome, MountOutcome::Mounted));

    let errors: Vec<&Path> = result.mount_errors().map(|(path, _)| path).collect();
    assert_eq!(errors, vec![Path::new("/mnt/data")]);

    assert!(!result.hooks_ran);
    assert!(result.hook_outcomes.is_empty());
    assert!(!host
        .calls()
        .iter()
        .any(|call| matches!(call, Call::Hooks(..))));
    assert_eq!(
        host.calls(),
        vec![
            Call::Confirm("data".to_string()),
            Call::Decrypt("data".to_string()),
            Call::Mount(PathBuf::from("/mnt/data")),
            Call::Mount(PathBuf::from("/opt/vbox")),
        ]
    );
}

#[test]
fn already_mounted_points_are_not_remounted_and_hooks_still_run() {
    let mut host = FakeHost::with_devices(&["uuid-data"]);
    host.mounted.insert(PathBuf::from("/mnt/data"));

    let results = host.run(&config(vec![data()]));

    let result = &results[0];
    assert_eq!(result.state, VolumeState::Done);
    assert!(matches!(result.mounts[0].outcome, MountOutcome::AlreadyMounted));
    assert!(matches!(result.mounts[1].outcome, MountOutcome::Mounted));
    assert_eq!(result.mount_errors().count(), 0);
    assert!(result.hooks_ran);

    let mounts: Vec<Call> = host
        .calls()
        .into_iter()
        .filter(|call| matches!(call, Call::Mount(_)))
        .collect();
    assert_eq!(mounts, vec![Call::Mount(PathBuf::from("/opt/vbox"))]);
}

#[test]
fn clean_mount_runs_hooks_with_configured_delay_and_keeps_failures() {
    let mut host = FakeHost::with_devices(&["uuid-data"]);
    host.failing_hooks.insert("lxc start".to_string());

    let results = host.run(&config(vec![data()]));

    let result = &results[0];
    assert_eq!(result.state, VolumeState::Done);
    assert!(result.hooks_ran);
    assert_eq!(result.hook_outcomes.len(), 2);
    assert!(result.hook_outcomes[0].result.is_err());
    assert!(result.hook_outcomes[1].result.is_ok());

    let failed: Vec<&str> = result.hook_errors().map(|(command, _)| command).collect();
    assert_eq!(failed, vec!["lxc start"]);

    assert!(host.calls().contains(&Call::Hooks(
        "data".to_string(),
        vec!["lxc start".to_string(), "lxc list".to_string()],
        Duration::from_secs(30),
    )));
    // Hook failures do not make the volume a failure.
    assert!(!result.is_failed());
}

#[test]
fn declined_volume_is_skipped_after_confirmation() {
    let mut host = FakeHost::with_devices(&["uuid-data"]);
    host.decline.insert("data".to_string());

    let results = host.run(&config(vec![data()]));

    assert_eq!(results[0].skip_reason, Some(SkipReason::UserDeclined));
    assert_eq!(host.calls(), vec![Call::Confirm("data".to_string())]);
}

#[test]
fn unanswered_confirmation_is_treated_as_a_decline() {
    let mut host = FakeHost::with_devices(&["uuid-data", "uuid-backup"]);
    host.unanswered.insert("data".to_string());

    let results = host.run(&config(vec![data(), backup()]));

    assert_eq!(results[0].skip_reason, Some(SkipReason::UserDeclined));
    assert_eq!(results[0].state, VolumeState::Absent);
    assert!(results[0].decrypt_error.is_none());
    assert_eq!(host.calls_for(&data()), vec![Call::Confirm("data".to_string())]);

    // The next volume is still offered.
    assert_eq!(results[1].state, VolumeState::Done);
}

#[test]
fn unreadable_passphrase_fails_decryption_without_running_the_tool() {
    let mut host = FakeHost::with_devices(&["uuid-data"]);
    host.unreadable_passphrase.insert("data".to_string());

    let results = host.run(&config(vec![data()]));

    let result = &results[0];
    assert_eq!(result.state, VolumeState::DecryptFailed);
    assert!(result.is_failed());
    match &result.decrypt_error {
        Some(DecryptError::Prompt(message)) => assert!(message.contains("not a terminal")),
        other => panic!("expected a prompt error, got {other:?}"),
    }
    assert!(result.mounts.is_empty());
    assert!(!result.hooks_ran);
    assert_eq!(host.calls(), vec![Call::Confirm("data".to_string())]);
}

#[test]
fn volumes_run_in_order_and_failures_stay_isolated() {
    let media = volume("media", "uuid-media", &["/srv/media"], &["systemctl start jellyfin"]);
    let mut host = FakeHost::with_devices(&["uuid-data", "uuid-media"]);
    host.broken_mounts.insert(PathBuf::from("/mnt/data"));

    let cfg = config(vec![backup(), data(), media.clone()]);
    let results = host.run(&cfg);

    let names: Vec<&str> = results.iter().map(|r| r.volume_name.as_str()).collect();
    assert_eq!(names, vec!["backup", "data", "media"]);

    assert_eq!(results[0].skip_reason, Some(SkipReason::Absent));
    assert_eq!(results[1].state, VolumeState::MountedWithErrors);
    assert_eq!(results[2].state, VolumeState::Done);
    assert!(results[2].hooks_ran);

    // The media volume sees exactly what it would have seen on its own.
    let alone = FakeHost::with_devices(&["uuid-media"]);
    alone.run(&config(vec![media.clone()]));
    assert_eq!(host.calls_for(&media), alone.calls());
}

#[test]
fn volume_without_hooks_reports_empty_hook_results() {
    let host = FakeHost::with_devices(&["uuid-backup"]);
    let results = host.run(&config(vec![backup()]));

    let result = &results[0];
    assert_eq!(result.state, VolumeState::Done);
    assert!(!result.hooks_ran);
    assert!(result.hook_outcomes.is_empty());
}
