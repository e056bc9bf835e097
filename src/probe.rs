//! Read-only queries against host state.

use crate::config::{BY_UUID_DIR, MAPPER_DIR, MOUNT_TABLE_PATH};
use std::collections::HashSet;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;
use tracing::warn;

/// Host state the activation flow depends on.
///
/// Absence is a normal answer; none of these queries fail.
pub trait SystemProbe {
    /// Is the by-UUID device link for `uuid` present?
    fn device_exists(&self, uuid: &str) -> bool;

    /// Is `/dev/mapper/<name>` already present?
    fn mapper_exists(&self, name: &str) -> bool;

    /// Paths currently mounted.
    fn list_mounted_paths(&self) -> HashSet<PathBuf>;
}

/// Probe backed by the live filesystem.
#[derive(Debug, Clone)]
pub struct HostProbe {
    by_uuid_dir: PathBuf,
    mapper_dir: PathBuf,
    mount_table: PathBuf,
}

impl Default for HostProbe {
    fn default() -> Self {
        Self::new(BY_UUID_DIR, MAPPER_DIR, MOUNT_TABLE_PATH)
    }
}

impl HostProbe {
    /// Build a probe rooted at custom locations (used for testing against temp dirs).
    pub fn new(
        by_uuid_dir: impl Into<PathBuf>,
        mapper_dir: impl Into<PathBuf>,
        mount_table: impl Into<PathBuf>,
    ) -> Self {
        Self {
            by_uuid_dir: by_uuid_dir.into(),
            mapper_dir: mapper_dir.into(),
            mount_table: mount_table.into(),
        }
    }

    /// Path where the device for `uuid` appears when attached.
    pub fn device_path(&self, uuid: &str) -> PathBuf {
        self.by_uuid_dir.join(uuid)
    }

    /// Path where the decrypted device for `name` appears.
    pub fn mapper_path(&self, name: &str) -> PathBuf {
        self.mapper_dir.join(name)
    }
}

impl SystemProbe for HostProbe {
    fn device_exists(&self, uuid: &str) -> bool {
        // Guard against a UUID that would escape the by-uuid directory.
        !uuid.contains('/') && self.device_path(uuid).exists()
    }

    fn mapper_exists(&self, name: &str) -> bool {
        self.mapper_dir.is_dir() && self.mapper_path(name).exists()
    }

    fn list_mounted_paths(&self) -> HashSet<PathBuf> {
        match std::fs::read(&self.mount_table) {
            Ok(table) => parse_mount_table(&table),
            Err(e) => {
                warn!(
                    "Could not read mount table {}: {}",
                    self.mount_table.display(),
                    e
                );
                HashSet::new()
            }
        }
    }
}

/// Extract the mount point column from `/proc/mounts`-formatted text.
///
/// Works on raw bytes: the kernel only escapes whitespace and backslashes,
/// so other path bytes need not be UTF-8.
pub fn parse_mount_table(table: &[u8]) -> HashSet<PathBuf> {
    table
        .split(|&b| b == b'\n')
        .filter_map(|line| {
            line.split(u8::is_ascii_whitespace)
                .filter(|field| !field.is_empty())
                .nth(1)
        })
        .map(|field| PathBuf::from(OsStr::from_bytes(&unescape_mount_field(field))))
        .collect()
}

/// Decode the octal escapes the kernel uses for spaces, tabs and backslashes.
fn unescape_mount_field(bytes: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() && is_octal_escape(&bytes[i + 1..i + 4]) {
            let value = bytes[i + 1..i + 4]
                .iter()
                .fold(0u32, |acc, d| acc * 8 + u32::from(d - b'0'));
            if let Ok(value) = u8::try_from(value) {
                output.push(value);
                i += 4;
                continue;
            }
        }
        output.push(bytes[i]);
        i += 1;
    }

    output
}

fn is_octal_escape(digits: &[u8]) -> bool {
    digits.len() == 3 && digits.iter().all(|d| (b'0'..=b'7').contains(d))
}
