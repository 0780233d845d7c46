use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line configuration of the demo client.
#[derive(Debug, Clone, Parser)]
#[command(name = "peercall", version, about = "1:1 audio/video calls over a signaling relay")]
pub struct ClientConfig {
    /// WebSocket URL of the signaling relay.
    #[arg(long, env = "PEERCALL_SIGNALING_URL", default_value = "ws://localhost:5000/ws")]
    pub signaling_url: String,

    /// Base URL of the API serving `/api/config/ice`.
    #[arg(long, env = "PEERCALL_API_URL", default_value = "http://localhost:5000")]
    pub api_url: String,

    /// Our user id on the relay.
    #[arg(long, short, env = "PEERCALL_USER")]
    pub user: String,

    /// Bearer token for the relay and the API.
    #[arg(long, env = "PEERCALL_TOKEN")]
    pub token: Option<String>,

    /// File holding the current bearer token. Re-read periodically so a
    /// re-login refreshes the ICE configuration.
    #[arg(long, env = "PEERCALL_TOKEN_FILE")]
    pub token_file: Option<PathBuf>,

    /// Capture a camera track in addition to the microphone.
    #[arg(long)]
    pub video: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Call a user and stay in the call until either side hangs up.
    Call {
        /// Id of the user to call.
        user: String,
    },
    /// Wait for incoming calls and answer them automatically.
    Listen,
}
