//! mount-crypt
//!
//! Brings a fixed set of LUKS-encrypted volumes online: for each configured
//! volume it checks whether the device is attached and not yet open, asks for
//! confirmation and a passphrase, opens it with `cryptsetup`, mounts its
//! fstab-declared mount points and finally runs optional hook commands.
//!
//! # Architecture
//!
//! ```text
//! Config → VolumeOrchestrator ─┬─ SystemProbe  (by-uuid, /dev/mapper, /proc/mounts)
//!                              ├─ Prompter     (confirm, passphrase)
//!                              ├─ Decryptor    (cryptsetup open)
//!                              ├─ Mounter      (mount <path>)
//!                              └─ HookRunner   (sh -c <command>)
//! ```
//!
//! Hooks only run when every mount point of a volume is mounted; a decrypt
//! failure stops that volume before any mount is attempted.
//!
//! # Example
//!
//! ```rust,no_run
//! use mount_crypt::{Config, Cryptsetup, HostProbe, MountTool, ShellHookRunner};
//! use mount_crypt::{SystemRunner, TerminalPrompter, VolumeOrchestrator};
//! use std::path::Path;
//!
//! let config = Config::load(Path::new("/etc/mount.crypt.ini")).unwrap();
//! let probe = HostProbe::default();
//! let decryptor = Cryptsetup::new(&config.decrypt_tool_path, SystemRunner);
//! let mounter = MountTool::new(&config.mount_tool_path, SystemRunner);
//! let hooks = ShellHookRunner::new(SystemRunner);
//!
//! let orchestrator =
//!     VolumeOrchestrator::new(&probe, &TerminalPrompter, &decryptor, &mounter, &hooks);
//! for result in orchestrator.activate_all(&config) {
//!     println!("{}: {:?}", result.volume_name, result.state);
//! }
//! ```

pub mod config;
pub mod decrypt;
pub mod error;
pub mod exec;
pub mod hooks;
pub mod mount;
pub mod orchestrator;
pub mod probe;
pub mod prompt;
pub mod report;

pub use config::{Config, VolumeConfig};
pub use decrypt::{Cryptsetup, Decryptor};
pub use error::{DecryptError, Error, HookError, MountError, Result};
pub use exec::{SystemRunner, ToolOutput, ToolRunner};
pub use hooks::{HookOutcome, HookRunner, ShellHookRunner};
pub use mount::{MountTool, Mounter};
pub use orchestrator::{ActivationResult, MountOutcome, SkipReason, VolumeOrchestrator, VolumeState};
pub use probe::{HostProbe, SystemProbe};
pub use prompt::{AutoConfirm, Prompter, TerminalPrompter};
pub use report::Summary;
