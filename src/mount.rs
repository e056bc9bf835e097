//! Mounting fstab-declared mount points.

use crate::error::MountError;
use crate::exec::ToolRunner;
use std::path::{Path, PathBuf};

/// Mounts a single mount point.
///
/// Implementations do not check whether `path` is already mounted; callers
/// consult [`SystemProbe::list_mounted_paths`](crate::probe::SystemProbe::list_mounted_paths) first.
pub trait Mounter {
    fn mount(&self, path: &Path) -> Result<(), MountError>;
}

/// [`Mounter`] that drives the `mount` binary.
///
/// Only the mount point is passed; the device and options come from the
/// host's `/etc/fstab` entry.
#[derive(Debug, Clone)]
pub struct MountTool<R> {
    binary: PathBuf,
    runner: R,
}

impl<R: ToolRunner> MountTool<R> {
    pub fn new(binary: impl Into<PathBuf>, runner: R) -> Self {
        Self {
            binary: binary.into(),
            runner,
        }
    }
}

impl<R: ToolRunner> Mounter for MountTool<R> {
    fn mount(&self, path: &Path) -> Result<(), MountError> {
        let target = path.to_string_lossy();
        let out = self
            .runner
            .invoke(&self.binary, &[target.as_ref()], None)
            .map_err(|source| MountError::Launch {
                tool: self.binary.clone(),
                source,
            })?;

        if out.success() {
            Ok(())
        } else {
            Err(MountError::Failed {
                status: out.status,
                detail: format!("mount {} failed: {}", path.display(), out.diagnostic()),
            })
        }
    }
}
