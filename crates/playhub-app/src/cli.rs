use clap::{Parser, Subcommand};

/// Playhub realtime client: text chat over the signaling server.
#[derive(Parser, Debug)]
#[command(name = "playhub", version, about)]
pub struct Args {
    /// Config file path override.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Log level override (debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Signaling server URL override.
    #[arg(long, global = true)]
    pub url: Option<String>,

    /// User id to sign in as.
    #[arg(long, global = true)]
    pub user_id: Option<String>,

    /// Display name shown to other participants.
    #[arg(long, global = true)]
    pub display_name: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Join a chat room and relay stdin lines as messages.
    Chat {
        /// Room to join.
        #[arg(long)]
        room: String,
    },
    /// Print the effective configuration as JSON.
    Config,
}

pub fn parse() -> Args {
    Args::parse()
}
