use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pedal_bus::{KeyAction, KeyActionEvent};

/// Struct that gets generated from `RawOpt`.
#[derive(Debug, PartialEq)]
pub struct Opt {
    pub log_debug: bool,
    pub config_path: Option<std::path::PathBuf>,
    pub overrides: IdentityOverrides,
    pub action: Action,
}

/// Bus identity values given on the command line. These take precedence over the config file.
#[derive(clap::Args, Debug, Default, Clone, PartialEq)]
pub struct IdentityOverrides {
    /// Well-known bus name to own or talk to
    #[arg(long, global = true)]
    pub service_name: Option<String>,

    /// Object path of the exported object
    #[arg(long, global = true)]
    pub object_path: Option<String>,

    /// Name of the signal carrying pedal events
    #[arg(long, global = true)]
    pub signal_name: Option<String>,
}

#[derive(Parser, Debug, PartialEq)]
#[command(version, about)]
pub(super) struct RawOpt {
    /// Write out debug logs.
    #[arg(long = "debug", global = true)]
    log_debug: bool,

    /// Override path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<std::path::PathBuf>,

    #[command(flatten)]
    overrides: IdentityOverrides,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Action {
    /// Generate a shell completion script
    ShellCompletions {
        #[arg(short, long)]
        shell: clap_complete::shells::Shell,
    },

    /// Own the bus name and show pedal events as they come in.
    ///
    /// Lines of `key=icon:state` entries on stdin are sent out as events. SIGUSR1 disables and
    /// re-enables the bus endpoint.
    #[command(name = "daemon", alias = "d")]
    Daemon,

    /// Send a pedal event, e.g. `send left=media-record-symbolic:pressed`
    #[command(name = "send", alias = "s")]
    Send {
        /// key=icon:state entries, in order
        #[arg(value_parser = parse_key_action_arg, required = true)]
        entries: Vec<KeyAction>,
    },

    /// Call HelloWorld on a running indicator
    #[command(name = "hello")]
    Hello { name: String },

    /// Show or set the feature switch of a running indicator
    #[command(name = "feature")]
    Feature {
        #[arg(value_parser = parse_switch)]
        enabled: Option<bool>,
    },
}

impl Opt {
    pub fn from_env() -> Self {
        let raw: RawOpt = RawOpt::parse();
        raw.into()
    }
}

impl From<RawOpt> for Opt {
    fn from(other: RawOpt) -> Self {
        let RawOpt { action, log_debug, config, overrides } = other;
        Opt { action, log_debug, config_path: config, overrides }
    }
}

/// Parse `key=icon:state`.
pub fn parse_key_action_arg(s: &str) -> Result<KeyAction> {
    let (key, value) =
        s.split_once('=').with_context(|| format!("arguments must be in the shape `key=icon:state`, but got: {}", s))?;
    let (icon, state) =
        value.rsplit_once(':').with_context(|| format!("arguments must be in the shape `key=icon:state`, but got: {}", s))?;
    if key.is_empty() || icon.is_empty() {
        anyhow::bail!("key and icon must not be empty in {}", s);
    }
    let state = state.parse().with_context(|| format!("invalid state {:?}", state))?;
    Ok(KeyAction::new(key, icon, state))
}

/// Parse a whitespace separated line of `key=icon:state` entries.
pub fn parse_event_line(line: &str) -> Result<KeyActionEvent> {
    let entries = line.split_whitespace().map(parse_key_action_arg).collect::<Result<Vec<_>>>()?;
    Ok(KeyActionEvent::new(entries)?)
}

fn parse_switch(s: &str) -> Result<bool> {
    match s {
        "on" | "true" | "1" => Ok(true),
        "off" | "false" | "0" => Ok(false),
        _ => anyhow::bail!("expected `on` or `off`, got {}", s),
    }
}
