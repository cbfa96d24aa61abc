//! Clap derive structures for the `fleetsync` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

use fleetsync_core::{Direction, EventCategory, Priority};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// fleetsync -- stream fleet events and drive robots from the command line
#[derive(Debug, Parser)]
#[command(
    name = "fleetsync",
    version,
    about = "Stream fleet events and send robot commands from the command line",
    long_about = "Keeps a persistent WebSocket channel to a fleet server, prints its\n\
        event stream, and issues control commands. When the channel is down and\n\
        a REST URL is configured, commands fall back to the HTTP API.",
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
    /// Config profile to use
    #[arg(long, short = 'p', env = "FLEETSYNC_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Channel URL, ws:// or wss:// (overrides profile)
    #[arg(long, short = 'u', env = "FLEETSYNC_URL", global = true)]
    pub url: Option<String>,

    /// REST fallback base URL (overrides profile)
    #[arg(long, env = "FLEETSYNC_REST_URL", global = true)]
    pub rest_url: Option<String>,

    /// Bearer token for the channel and REST fallback
    #[arg(long, env = "FLEETSYNC_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Command timeout, e.g. "5s" or "750ms"
    #[arg(long, env = "FLEETSYNC_TIMEOUT", global = true, value_parser = humantime::parse_duration)]
    pub timeout: Option<Duration>,

    /// Accept invalid TLS certificates on the REST fallback
    #[arg(long, short = 'k', env = "FLEETSYNC_INSECURE", global = true)]
    pub insecure: bool,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "FLEETSYNC_OUTPUT",
        default_value = "plain",
        global = true
    )]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

// ── Output Enum ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable lines
    Plain,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON (one event per line)
    JsonCompact,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Stream events from the channel until interrupted
    #[command(alias = "w")]
    Watch(WatchArgs),

    /// Move an entity in a direction
    Move(MoveArgs),

    /// Rotate an entity in place
    Rotate(RotateArgs),

    /// Stop an entity
    Stop(EntityArg),

    /// Emergency stop (critical priority, short timeout)
    #[command(name = "estop", alias = "emergency-stop")]
    EmergencyStop(EntityArg),

    /// Switch an entity's operating mode
    Mode(ModeArgs),

    /// Fetch an entity's current status
    Status(EntityArg),

    /// Send an arbitrary command
    Send(SendArgs),

    /// Manage configuration profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only show these categories (repeatable; default: all)
    #[arg(long = "category", short = 'c')]
    pub categories: Vec<EventCategory>,

    /// Only show events about this entity
    #[arg(long, short = 'e')]
    pub entity: Option<String>,

    /// Exit after this many events
    #[arg(long, short = 'n')]
    pub count: Option<usize>,

    /// Exit after this long, e.g. "30s"
    #[arg(long, value_parser = humantime::parse_duration)]
    pub duration: Option<Duration>,
}

// ── Control ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct EntityArg {
    /// Target entity (robot) id
    pub entity: String,
}

#[derive(Debug, Args)]
pub struct MoveArgs {
    /// Target entity (robot) id
    pub entity: String,

    /// forward, backward, left, or right
    pub direction: Direction,

    /// Speed, 0.0 to 1.0
    #[arg(long, short = 's', default_value_t = 0.5)]
    pub speed: f64,

    /// How long to move, e.g. "1500ms"
    #[arg(long, short = 'd', default_value = "1s", value_parser = humantime::parse_duration)]
    pub duration: Duration,
}

#[derive(Debug, Args)]
pub struct RotateArgs {
    /// Target entity (robot) id
    pub entity: String,

    /// Angle in degrees; negative turns the other way
    #[arg(allow_negative_numbers = true)]
    pub angle: f64,

    /// Angular speed, 0.0 to 1.0
    #[arg(long, short = 's', default_value_t = 0.5)]
    pub speed: f64,
}

#[derive(Debug, Args)]
pub struct ModeArgs {
    /// Target entity (robot) id
    pub entity: String,

    /// Mode name, e.g. "autonomous" or "manual"
    pub mode: String,
}

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Target entity (robot) id
    pub entity: String,

    /// Command type string understood by the remote
    pub command_type: String,

    /// Parameters as a JSON object
    #[arg(long, default_value = "{}")]
    pub params: String,

    /// low, normal, high, or critical
    #[arg(long, default_value = "normal")]
    pub priority: Priority,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Show the effective configuration (tokens redacted)
    Show,

    /// List configured profiles
    Profiles,

    /// Add or replace a profile
    Add(AddProfileArgs),

    /// Store a profile's token in the system keyring
    SetToken(SetTokenArgs),
}

#[derive(Debug, Args)]
pub struct AddProfileArgs {
    /// Profile name
    pub name: String,

    /// Channel URL for the profile
    #[arg(long = "channel-url")]
    pub channel_url: String,

    /// REST fallback base URL
    #[arg(long = "fallback-url")]
    pub fallback_url: Option<String>,

    /// Environment variable holding the token
    #[arg(long)]
    pub token_env: Option<String>,

    /// Make this the default profile
    #[arg(long)]
    pub default: bool,
}

#[derive(Debug, Args)]
pub struct SetTokenArgs {
    /// Token value; read from stdin when omitted
    pub token: Option<String>,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
