//! Post-mount hook commands.

use crate::error::HookError;
use crate::exec::{shell_args, ToolRunner, SHELL};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

/// Result of one hook command.
#[derive(Debug)]
pub struct HookOutcome {
    pub command: String,
    pub result: Result<(), HookError>,
}

/// Runs the hook commands of a volume.
pub trait HookRunner {
    /// Wait `delay`, then run every command in order.
    ///
    /// One outcome per command; a failure never stops later commands. No
    /// wait happens when `commands` is empty.
    fn run_hooks(&self, volume_name: &str, commands: &[String], delay: Duration) -> Vec<HookOutcome>;
}

/// [`HookRunner`] that runs each command through `/bin/sh -c`.
#[derive(Debug, Clone)]
pub struct ShellHookRunner<R> {
    shell: PathBuf,
    runner: R,
    sleep: fn(Duration),
}

impl<R: ToolRunner> ShellHookRunner<R> {
    pub fn new(runner: R) -> Self {
        Self {
            shell: PathBuf::from(SHELL),
            runner,
            sleep: std::thread::sleep,
        }
    }

    /// Replace the blocking wait, e.g. to observe it in tests.
    pub fn with_sleep(mut self, sleep: fn(Duration)) -> Self {
        self.sleep = sleep;
        self
    }

    fn run_one(&self, command: &str) -> Result<(), HookError> {
        let out = self
            .runner
            .invoke(&self.shell, &shell_args(command), None)
            .map_err(HookError::Launch)?;

        if out.success() {
            Ok(())
        } else {
            Err(HookError::Failed {
                status: out.status,
                detail: out.diagnostic(),
            })
        }
    }
}

impl<R: ToolRunner> HookRunner for ShellHookRunner<R> {
    fn run_hooks(&self, volume_name: &str, commands: &[String], delay: Duration) -> Vec<HookOutcome> {
        if commands.is_empty() {
            info!("Nothing to run for volume {}", volume_name);
            return Vec::new();
        }

        if !delay.is_zero() {
            info!(
                "Sleeping for {} seconds before running programs",
                delay.as_secs_f64()
            );
            (self.sleep)(delay);
        }

        commands
            .iter()
            .map(|command| {
                info!("Running: {}", command);
                let result = self.run_one(command);
                if let Err(e) = &result {
                    error!("Hook `{}` failed: {}", command, e);
                }
                HookOutcome {
                    command: command.clone(),
                    result,
                }
            })
            .collect()
    }
}
