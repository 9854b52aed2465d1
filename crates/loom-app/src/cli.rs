use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// loom: branching conversations with a local language model.
#[derive(Parser, Debug)]
#[command(name = "loom", version, about)]
pub struct Args {
    /// Config file path override.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level override (debug, info, warn, error, or a full filter directive).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Interactive chat (the default).
    Chat {
        /// Open a saved chat instead of starting a new one.
        #[arg(long)]
        load: Option<String>,

        /// Print chat events as JSON lines instead of formatted text.
        #[arg(long)]
        json: bool,
    },
    /// List saved chats, newest first.
    List,
    /// Print the current branch of a saved chat.
    Show { id: String },
    /// Print the effective configuration as JSON.
    Config,
}

impl Args {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Chat {
            load: None,
            json: false,
        })
    }

    /// Filter directive for the log subscriber. A bare level applies to
    /// loom's own crates only.
    pub fn log_directive(&self, configured: &str) -> String {
        match self.log_level.as_deref() {
            Some(level @ ("trace" | "debug" | "info" | "warn" | "error")) => {
                format!("loom={level}")
            }
            Some(directive) => directive.to_string(),
            None => configured.to_string(),
        }
    }
}

pub fn parse() -> Args {
    Args::parse()
}
