//! CLI entry point for Parley.

pub mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Parley streaming chat CLI
#[derive(Parser, Debug)]
#[command(name = "parley", version, about = "Streaming agent chat server and client")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the chat server with an in-memory demo store
    Serve(ServeArgs),
    /// Stream one reply from a running server
    Chat(ChatArgs),
}

/// Arguments for the `serve` subcommand.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to bind (defaults to the configured bind address)
    #[arg(long)]
    pub bind: Option<String>,

    /// Model to use (format: provider:model, e.g. openai:gpt-4o-mini)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Config file (defaults to <config_dir>/parley.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Arguments for the `chat` subcommand.
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// Server base URL
    #[arg(long, default_value = "http://127.0.0.1:8787")]
    pub url: String,

    /// Caller identity sent as x-user-id
    #[arg(long, default_value = commands::DEMO_USER)]
    pub user: String,

    /// Conversation to post into
    #[arg(long, default_value = commands::DEMO_CONVERSATION)]
    pub conversation: String,

    /// Message text
    pub message: String,
}
