//! DriftSync CLI
//!
//! Command-line front end that drives a client replica against a server
//! replica, both stored on disk.
//!
//! # Commands
//!
//! - `init` - Create both replicas and the device identity
//! - `add`, `edit`, `delete` - Local edits, pushed on the next sync
//! - `list` - Show the client replica
//! - `status` - Show device id, cursor and pending edits
//! - `sync` - Run one sync cycle
//! - `resync` - Forget the cursor and run a full cycle
//! - `watch` - Sync periodically until interrupted
//! - `server-list` - Show the server replica

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use commands::replica::Replicas;

/// DriftSync offline sync tools.
#[derive(Parser)]
#[command(name = "driftsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Client replica directory
    #[arg(global = true, long, default_value = "driftsync-client")]
    client: PathBuf,

    /// Server replica directory
    #[arg(global = true, long, default_value = "driftsync-server")]
    server: PathBuf,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create both replicas and the device identity
    Init,

    /// Create a task
    Add {
        /// Task title
        title: String,

        /// Task description
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Edit a task
    Edit {
        /// Task id
        id: String,

        /// New title
        #[arg(short, long)]
        title: Option<String>,

        /// New description
        #[arg(short, long)]
        description: Option<String>,
    },

    /// Soft-delete a task
    Delete {
        /// Task id
        id: String,
    },

    /// List tasks in the client replica
    List {
        /// Include soft-deleted tasks
        #[arg(short, long)]
        all: bool,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show device id, cursor and pending edits
    Status {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Run one sync cycle
    Sync {
        /// Retry transient failures with backoff
        #[arg(short, long)]
        retry: bool,

        /// Maximum attempts when retrying
        #[arg(long, default_value = "3")]
        max_attempts: u32,
    },

    /// Forget the cursor and run a full sync cycle
    Resync,

    /// Sync periodically until interrupted
    Watch {
        /// Seconds between cycles
        #[arg(short, long, default_value = "30")]
        interval: u64,
    },

    /// List tasks in the server replica, tombstones included
    ServerList {
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let replicas = Replicas::new(cli.client, cli.server);

    match cli.command {
        Commands::Init => commands::tasks::init(&replicas)?,
        Commands::Add { title, description } => {
            commands::tasks::add(&replicas, title, description)?;
        }
        Commands::Edit {
            id,
            title,
            description,
        } => {
            if title.is_none() && description.is_none() {
                return Err("Nothing to change: pass --title or --description".into());
            }
            commands::tasks::edit(&replicas, &id, title, description)?;
        }
        Commands::Delete { id } => commands::tasks::delete(&replicas, &id)?,
        Commands::List { all, format } => commands::tasks::list(&replicas, all, &format)?,
        Commands::Status { format } => commands::tasks::status(&replicas, &format)?,
        Commands::Sync {
            retry,
            max_attempts,
        } => {
            let attempts = if retry { max_attempts } else { 1 };
            commands::sync::sync(&replicas, attempts)?;
        }
        Commands::Resync => commands::sync::resync(&replicas)?,
        Commands::Watch { interval } => commands::sync::watch(&replicas, interval)?,
        Commands::ServerList { format } => commands::sync::server_list(&replicas, &format)?,
        Commands::Version => {
            println!("DriftSync CLI v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
