//! Error types for mount-crypt.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for configuration and setup operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort a run before any volume is touched.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error while reading host state or the configuration file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file does not exist.
    #[error("Configuration file not found: {0}")]
    ConfigNotFound(PathBuf),

    /// Configuration file could not be parsed as INI.
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(String),

    /// Configuration parsed but describes an unusable setup.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Interactive prompt could not be shown or answered.
    #[error("Prompt failed: {0}")]
    Prompt(String),
}

/// Failure opening an encrypted volume.
#[derive(Error, Debug)]
pub enum DecryptError {
    /// The decrypt tool could not be started.
    #[error("failed to launch {tool}: {source}")]
    Launch {
        tool: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The passphrase could not be written to the tool's stdin.
    #[error("failed to pass passphrase to {tool}: {source}")]
    Input {
        tool: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The tool ran and exited non-zero.
    #[error("{detail} (exit code {status})")]
    Failed { status: i32, detail: String },

    /// No passphrase could be read from the user.
    #[error("could not read passphrase: {0}")]
    Prompt(String),
}

/// Failure mounting a single mount point.
#[derive(Error, Debug)]
pub enum MountError {
    /// The mount tool could not be started.
    #[error("failed to launch {tool}: {source}")]
    Launch {
        tool: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The tool ran and exited non-zero.
    #[error("{detail} (exit code {status})")]
    Failed { status: i32, detail: String },
}

/// Failure running a single hook command.
#[derive(Error, Debug)]
pub enum HookError {
    /// The shell could not be started.
    #[error("failed to launch shell: {0}")]
    Launch(#[source] std::io::Error),

    /// The command exited non-zero.
    #[error("{detail} (exit code {status})")]
    Failed { status: i32, detail: String },
}
