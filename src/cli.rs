//! Command-line interface definition for DataChat
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for interactive chat and session management.

use clap::{Parser, Subcommand};

/// DataChat - conversational data-analytics client
///
/// Chat with your data over a streaming backend, review generated SQL
/// before it runs, and manage saved conversation threads.
#[derive(Parser, Debug, Clone)]
#[command(name = "datachat")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Override the backend base URL from config
    #[arg(long, env = "DATACHAT_SERVER")]
    pub server: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for DataChat
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start interactive chat mode
    Chat {
        /// Resume a saved session by ID
        #[arg(short, long)]
        resume: Option<String>,

        /// Start under a freshly minted thread instead of the persisted one
        #[arg(long)]
        new: bool,

        /// Project scope for this conversation
        #[arg(short, long)]
        project: Option<u64>,
    },

    /// Manage saved conversation sessions
    Sessions {
        #[command(subcommand)]
        command: SessionCommand,
    },
}

/// Session management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum SessionCommand {
    /// List saved sessions
    List {
        /// Project scope to list sessions for
        #[arg(short, long)]
        project: Option<u64>,
    },

    /// Rename a saved session
    Rename {
        /// Session ID
        id: String,
        /// New title
        title: String,
    },

    /// Delete a saved session
    Delete {
        /// Session ID
        id: String,
    },
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
