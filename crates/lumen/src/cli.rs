//! Clap derive structures for the `lumen` CLI.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// lumen -- find, track, and drive WLED lighting controllers
#[derive(Debug, Parser)]
#[command(
    name = "lumen",
    version,
    about = "Discover and control WLED lighting controllers on your network",
    long_about = "Keeps a registry of known lighting controllers keyed by hardware\n\
        address, finds new ones over mDNS, and holds live status sockets\n\
        to every registered device.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Registry file (overrides config)
    #[arg(long, short = 'r', env = "LUMEN_REGISTRY", global = true)]
    pub registry: Option<PathBuf>,

    /// Output format [default: from config, else table]
    #[arg(long, short = 'o', env = "LUMEN_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output [default: from config, else auto]
    #[arg(long, global = true)]
    pub color: Option<ColorMode>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Browse the local network and register every device found
    #[command(alias = "scan")]
    Discover(DiscoverArgs),

    /// Identify the device at an address and register it
    Add(AddArgs),

    /// List registered devices
    #[command(alias = "ls")]
    List(ListArgs),

    /// Set or clear a device's custom name
    Rename(RenameArgs),

    /// Hide a device from listings
    Hide(DeviceArg),

    /// Show a previously hidden device again
    Unhide(DeviceArg),

    /// Forget a device
    #[command(alias = "rm")]
    Remove(DeviceArg),

    /// Connect to every registered device and print live state changes
    Watch(WatchArgs),

    /// Send a state change to one device
    Send(SendArgs),

    /// Manage the configuration file
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Per-command arguments ────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DiscoverArgs {
    /// How long to browse
    #[arg(long, short = 'd', default_value = "5s", value_parser = humantime::parse_duration)]
    pub duration: Duration,
}

#[derive(Debug, Args)]
pub struct AddArgs {
    /// Host, host:port, or http(s) URL of the device
    pub address: String,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Include hidden devices
    #[arg(long, short = 'a')]
    pub all: bool,
}

/// A device given by hardware address, network address, or name.
#[derive(Debug, Args)]
pub struct DeviceArg {
    pub device: String,
}

#[derive(Debug, Args)]
pub struct RenameArgs {
    pub device: String,

    /// New name; omit to clear the custom name
    pub name: Option<String>,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only show this device
    pub device: Option<String>,

    /// Stop after this long instead of waiting for Ctrl-C
    #[arg(long, short = 'd', value_parser = humantime::parse_duration)]
    pub duration: Option<Duration>,
}

#[derive(Debug, Args)]
pub struct SendArgs {
    pub device: String,

    /// Turn the device on
    #[arg(long, conflicts_with = "off")]
    pub on: bool,

    /// Turn the device off
    #[arg(long)]
    pub off: bool,

    /// Master brightness (0-255)
    #[arg(long, short = 'b')]
    pub brightness: Option<u8>,

    /// Primary color as RRGGBB hex
    #[arg(long, short = 'c')]
    pub rgb: Option<String>,

    /// Preset to apply
    #[arg(long, short = 'p')]
    pub preset: Option<i16>,

    /// Crossfade duration
    #[arg(long, short = 't', value_parser = humantime::parse_duration)]
    pub transition: Option<Duration>,

    /// How long to wait for the device to accept a connection
    #[arg(long, default_value = "5s", value_parser = humantime::parse_duration)]
    pub timeout: Duration,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,

    /// Print the effective configuration
    Show,

    /// Write a config file populated with defaults
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    pub shell: clap_complete::Shell,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }
}
