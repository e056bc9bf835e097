//! Launching external tools.
//!
//! Every external program (decrypt tool, mount tool, hook shell) goes through
//! [`ToolRunner`], so activation logic can be exercised with fake runners
//! that never spawn a process.

use std::io::{self, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

/// Shell used for hook commands.
pub const SHELL: &str = "/bin/sh";

/// Captured result of one tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// Exit code; -1 when the process was killed by a signal.
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status == 0
    }

    /// Best human-readable explanation of a failure.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        let stdout = self.stdout.trim();
        if !stderr.is_empty() {
            stderr.to_string()
        } else if !stdout.is_empty() {
            stdout.to_string()
        } else {
            "no additional output".to_string()
        }
    }
}

/// Capability to run a program to completion.
pub trait ToolRunner {
    /// Run `program` with `args`, optionally feeding `stdin`, and wait for it.
    ///
    /// Returns `Err` only when the process could not be launched or its
    /// input could not be delivered; a non-zero exit is a normal `Ok`.
    fn invoke(&self, program: &Path, args: &[&str], stdin: Option<&[u8]>) -> io::Result<ToolOutput>;
}

impl<T: ToolRunner + ?Sized> ToolRunner for &T {
    fn invoke(&self, program: &Path, args: &[&str], stdin: Option<&[u8]>) -> io::Result<ToolOutput> {
        (**self).invoke(program, args, stdin)
    }
}

/// Runs tools as real child processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ToolRunner for SystemRunner {
    fn invoke(&self, program: &Path, args: &[&str], stdin: Option<&[u8]>) -> io::Result<ToolOutput> {
        debug!("Running {} {:?}", program.display(), args);

        let mut command = Command::new(program);
        command.args(args);
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());
        command.stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::inherit()
        });

        let mut child = command.spawn()?;

        if let Some(payload) = stdin {
            // Dropping the handle closes the pipe so the tool sees EOF.
            if let Some(mut pipe) = child.stdin.take() {
                match pipe.write_all(payload).and_then(|_| pipe.flush()) {
                    Ok(()) => {}
                    // The tool exited without reading all of its input; its
                    // own status and stderr explain why.
                    Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                        debug!("{} closed its input early", program.display());
                    }
                    Err(e) => {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(e);
                    }
                }
            }
        }

        let output = child.wait_with_output()?;
        Ok(ToolOutput {
            status: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Arguments that make the shell run `command` as a script line.
pub fn shell_args(command: &str) -> [&str; 2] {
    ["-c", command]
}
