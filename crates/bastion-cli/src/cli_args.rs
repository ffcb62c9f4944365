use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Command-line interface for the bastion infrastructure agent.
#[derive(Parser, Debug)]
#[command(name = "bastion-agent", about = "An LLM collaborator scoped to a fixed set of infrastructure tools")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,

    /// Directory holding agent.toml and servers.toml. Defaults to
    /// $XDG_CONFIG_HOME/bastion-agent or ~/.config/bastion-agent.
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    /// Log level for structured diagnostics (error, warn, info, debug, trace).
    /// Overrides RUST_LOG when set.
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Shorthand for --log-level debug.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Daemon socket path override.
    #[arg(long, global = true)]
    pub socket: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run an interactive conversation directly in this process.
    Run,
    /// Start the background daemon and listen on the configured socket.
    Daemon,
    /// Send one message to a running daemon, or attach interactively.
    Send {
        /// The message to send. Omit with --interactive to attach a REPL instead.
        message: Option<String>,
        /// Attach an interactive session instead of sending one message.
        #[arg(short, long)]
        interactive: bool,
        /// Resume a previously saved session by id.
        #[arg(long)]
        resume: Option<String>,
    },
    /// Validate the configuration and inventory files, then exit.
    CheckConfig,
    /// List saved sessions.
    Sessions {
        /// Maximum number of sessions to list.
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}
