//! Opening LUKS containers with `cryptsetup`.

use crate::error::DecryptError;
use crate::exec::ToolRunner;
use std::path::PathBuf;
use tracing::debug;
use zeroize::Zeroizing;

/// Opens an encrypted volume under a mapper name.
pub trait Decryptor {
    /// Open the device identified by `uuid` as `/dev/mapper/<volume_name>`.
    fn decrypt(&self, volume_name: &str, uuid: &str, passphrase: &str) -> Result<(), DecryptError>;
}

/// [`Decryptor`] that drives the `cryptsetup` binary.
///
/// The passphrase goes over stdin, never argv or the environment.
#[derive(Debug, Clone)]
pub struct Cryptsetup<R> {
    binary: PathBuf,
    runner: R,
}

impl<R: ToolRunner> Cryptsetup<R> {
    pub fn new(binary: impl Into<PathBuf>, runner: R) -> Self {
        Self {
            binary: binary.into(),
            runner,
        }
    }

    fn open_args<'a>(volume_name: &'a str, device: &'a str) -> [&'a str; 5] {
        ["open", "--type", "luks", device, volume_name]
    }
}

impl<R: ToolRunner> Decryptor for Cryptsetup<R> {
    fn decrypt(&self, volume_name: &str, uuid: &str, passphrase: &str) -> Result<(), DecryptError> {
        let device = format!("UUID={uuid}");
        let args = Self::open_args(volume_name, &device);

        let mut input = Zeroizing::new(Vec::with_capacity(passphrase.len() + 1));
        input.extend_from_slice(passphrase.as_bytes());
        input.push(b'\n');

        let out = self
            .runner
            .invoke(&self.binary, &args, Some(input.as_slice()))
            .map_err(|source| match source.kind() {
                std::io::ErrorKind::BrokenPipe => DecryptError::Input {
                    tool: self.binary.clone(),
                    source,
                },
                _ => DecryptError::Launch {
                    tool: self.binary.clone(),
                    source,
                },
            })?;

        if out.success() {
            debug!("Opened {} as /dev/mapper/{}", device, volume_name);
            return Ok(());
        }

        Err(DecryptError::Failed {
            status: out.status,
            detail: format!(
                "cryptsetup failed to open `{device}` as `{volume_name}`: {}",
                out.diagnostic()
            ),
        })
    }
}
