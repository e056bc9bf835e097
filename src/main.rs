//! mount-crypt - unlock and mount encrypted volumes.
//!
//! Decrypts the LUKS volumes listed in an INI configuration, mounts their
//! fstab-declared mount points and runs optional post-mount programs.

use anyhow::Context;
use clap::{ArgAction, Parser};
use mount_crypt::{
    AutoConfirm, Config, Cryptsetup, HostProbe, MountTool, Prompter, ShellHookRunner, Summary,
    SystemRunner, TerminalPrompter, VolumeOrchestrator,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const CONFIG_HELP: &str = "\
CONFIG FILE

EXAMPLE:

[DEFAULT]
cryptsetup=/sbin/cryptsetup
mount=/bin/mount

# The section name is the mapper name. Mount points must have matching
# entries in /etc/fstab, e.g.:
#
# LABEL=data  /mnt/data  btrfs  defaults,noauto,subvol=@data  0 0
# LABEL=data  /opt/vbox  btrfs  defaults,noauto,subvol=@vbox  0 0
#
# Lists are comma-separated and MUST NOT contain spaces or quotes around
# the commas. run_progs is optional and only runs after a clean mount.

[backup]
UUID=123ab45c-de67-8901-a234-bcd5efab678c
mounts=/mnt/backup

[data]
UUID=456ab45c-de67-8901-a234-bcd5efab601d
mounts=/mnt/data,/opt/vbox
run_progs=lxc start testbox devbox,lxc list
";

#[derive(Parser)]
#[command(name = "mount-crypt")]
#[command(author, version, about, long_about = None)]
#[command(
    about = "Decrypt LUKS volumes, mount them and run post-mount programs",
    after_help = CONFIG_HELP,
    disable_version_flag = true
)]
struct Cli {
    /// Configuration file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Decrypt without asking for confirmation (passphrases are still prompted)
    #[arg(short = 'y', long)]
    yes: bool,

    /// Seconds to wait after mounting before running programs
    #[arg(long, value_name = "SECONDS", default_value_t = 30)]
    hook_delay: u64,

    /// Print the final summary as JSON on stdout
    #[arg(long)]
    json: bool,

    /// Log debug detail
    #[arg(long)]
    verbose: bool,

    /// Print version
    #[arg(short = 'v', long, action = ArgAction::Version)]
    version: Option<bool>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .without_time()
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    info!("Using config {}", cli.config.display());
    let config = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    if !running_as_root() {
        warn!("Not running as root; cryptsetup and mount will probably fail");
    }

    let probe = HostProbe::default();
    let decryptor = Cryptsetup::new(&config.decrypt_tool_path, SystemRunner);
    let mounter = MountTool::new(&config.mount_tool_path, SystemRunner);
    let hooks = ShellHookRunner::new(SystemRunner);
    let auto_confirm = AutoConfirm::new(TerminalPrompter);
    let prompter: &dyn Prompter = if cli.yes {
        &auto_confirm
    } else {
        &TerminalPrompter
    };

    let orchestrator = VolumeOrchestrator::new(&probe, prompter, &decryptor, &mounter, &hooks)
        .with_hook_delay(Duration::from_secs(cli.hook_delay));
    let results = orchestrator.activate_all(&config);

    let summary = Summary::from_results(&results);
    if cli.json {
        println!("{}", summary.to_json()?);
    } else {
        println!();
        println!("{summary}");
    }
    if summary.has_failures() {
        warn!(
            "{} volume(s) failed, {} hook(s) failed",
            summary.failed, summary.hook_failures
        );
    }

    Ok(())
}

#[cfg(unix)]
fn running_as_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
fn running_as_root() -> bool {
    true
}
