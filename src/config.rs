//! Configuration constants and types for mount-crypt.
//!
//! The configuration file is INI-formatted:
//!
//! ```text
//! [DEFAULT]
//! cryptsetup=/sbin/cryptsetup
//! mount=/bin/mount
//!
//! [data]
//! UUID=456ab45c-de67-8901-a234-bcd5efab601d
//! mounts=/mnt/data,/opt/vbox
//! run_progs=lxc start testbox devbox,lxc list
//! ```
//!
//! Every section other than `DEFAULT` describes one volume; the section name
//! doubles as the device-mapper name.

use crate::error::{Error, Result};
use configparser::ini::{Ini, IniDefault};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Section holding tool paths.
pub const DEFAULT_SECTION: &str = "DEFAULT";

/// Where the INI parser puts keys that precede the first section header.
const IMPLICIT_SECTION: &str = "default";

/// Decrypt tool used when `cryptsetup` is not configured.
pub const DEFAULT_CRYPTSETUP_PATH: &str = "/sbin/cryptsetup";

/// Mount tool used when `mount` is not configured.
pub const DEFAULT_MOUNT_PATH: &str = "/bin/mount";

/// Wait before the first hook command of a volume.
pub const DEFAULT_HOOK_DELAY: Duration = Duration::from_secs(30);

/// Directory of stable by-UUID device links.
pub const BY_UUID_DIR: &str = "/dev/disk/by-uuid";

/// Directory of decrypted mapper devices.
pub const MAPPER_DIR: &str = "/dev/mapper";

/// Kernel view of the current mount table.
pub const MOUNT_TABLE_PATH: &str = "/proc/mounts";

/// Longest name device-mapper accepts (DM_NAME_LEN - 1).
pub const MAX_MAPPER_NAME_LEN: usize = 127;

mod keys {
    pub const CRYPTSETUP: &str = "cryptsetup";
    pub const MOUNT: &str = "mount";
    pub const UUID: &str = "UUID";
    pub const MOUNTS: &str = "mounts";
    pub const RUN_PROGS: &str = "run_progs";
}

/// One encrypted volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeConfig {
    /// Section name, also used as the mapper name.
    pub name: String,
    /// Filesystem UUID of the LUKS container.
    pub uuid: String,
    /// Mount points, attempted in this order.
    pub mount_points: Vec<PathBuf>,
    /// Shell commands run after a clean mount pass.
    pub hook_commands: Vec<String>,
}

impl VolumeConfig {
    pub fn new(
        name: impl Into<String>,
        uuid: impl Into<String>,
        mount_points: Vec<PathBuf>,
        hook_commands: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            uuid: uuid.into(),
            mount_points,
            hook_commands,
        }
    }
}

/// Whole-run configuration, loaded once and shared by reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub decrypt_tool_path: PathBuf,
    pub mount_tool_path: PathBuf,
    /// Volumes in declaration order.
    pub volumes: Vec<VolumeConfig>,
}

impl Config {
    /// Read and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate configuration text.
    pub fn parse(content: &str) -> Result<Self> {
        // Section names stay case-sensitive (they are mapper names); `;` and
        // `#` inside values belong to the value, e.g. in shell hooks.
        let mut defaults: IniDefault = Ini::new().defaults();
        defaults.enable_inline_comments = false;
        defaults.case_sensitive = true;
        let mut ini = Ini::new_from_defaults(defaults);
        ini.read(content.to_string()).map_err(Error::ConfigParse)?;

        let decrypt_tool_path = non_empty(lookup(&ini, DEFAULT_SECTION, keys::CRYPTSETUP))
            .unwrap_or_else(|| DEFAULT_CRYPTSETUP_PATH.to_string());
        let mount_tool_path = non_empty(lookup(&ini, DEFAULT_SECTION, keys::MOUNT))
            .unwrap_or_else(|| DEFAULT_MOUNT_PATH.to_string());

        let mut volumes = Vec::new();
        for section in ini.sections() {
            if section == DEFAULT_SECTION || section == IMPLICIT_SECTION {
                continue;
            }

            let uuid = non_empty(lookup(&ini, &section, keys::UUID)).ok_or_else(|| {
                Error::InvalidConfig(format!("volume `{section}` is missing `{}`", keys::UUID))
            })?;
            let mounts = lookup(&ini, &section, keys::MOUNTS).ok_or_else(|| {
                Error::InvalidConfig(format!("volume `{section}` is missing `{}`", keys::MOUNTS))
            })?;
            let hooks = lookup(&ini, &section, keys::RUN_PROGS).unwrap_or_default();

            volumes.push(VolumeConfig {
                name: section.clone(),
                uuid,
                mount_points: split_list(&mounts).map(PathBuf::from).collect(),
                hook_commands: split_list(&hooks).map(str::to_string).collect(),
            });
        }

        let config = Self {
            decrypt_tool_path: PathBuf::from(decrypt_tool_path),
            mount_tool_path: PathBuf::from(mount_tool_path),
            volumes,
        };
        config.validate()?;
        debug!("Parsed {} volume sections", config.volumes.len());
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for volume in &self.volumes {
            validate_mapper_name(&volume.name)?;
            if !seen.insert(volume.name.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "volume `{}` is defined more than once",
                    volume.name
                )));
            }
            if volume.uuid.trim().is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "volume `{}` has an empty UUID",
                    volume.name
                )));
            }
            if volume.mount_points.is_empty() {
                return Err(Error::InvalidConfig(format!(
                    "volume `{}` has no mount points",
                    volume.name
                )));
            }
            if let Some(relative) = volume.mount_points.iter().find(|p| !p.is_absolute()) {
                return Err(Error::InvalidConfig(format!(
                    "volume `{}` mount point {} is not an absolute path",
                    volume.name,
                    relative.display()
                )));
            }
        }
        Ok(())
    }
}

/// Check that `name` can be used as a `/dev/mapper` entry.
pub fn validate_mapper_name(name: &str) -> Result<()> {
    let invalid = |why: &str| Err(Error::InvalidConfig(format!("volume name `{name}` {why}")));

    if name.is_empty() {
        return invalid("is empty");
    }
    if name.len() > MAX_MAPPER_NAME_LEN {
        return invalid("is longer than 127 bytes");
    }
    if name == "." || name == ".." {
        return invalid("is not a valid device name");
    }
    if name
        .chars()
        .any(|c| c == '/' || c.is_whitespace() || c.is_control())
    {
        return invalid("contains `/`, whitespace or control characters");
    }
    Ok(())
}

/// Key lookup ignoring ASCII case, within a case-sensitive section.
fn lookup(ini: &Ini, section: &str, key: &str) -> Option<String> {
    ini.get_map_ref()
        .get(section)?
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(key))
        .and_then(|(_, value)| value.clone())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Split a comma-separated list, dropping empty items.
fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|item| !item.is_empty())
}
