//! Command-line arguments
//!
//! Global flags cover identity, configuration and logging; the subcommand
//! picks the node's role for this process.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "workmesh")]
#[command(about = "Peer-to-peer work-distribution mesh node")]
#[command(version)]
pub struct Args {
    /// Configuration file path (TOML, camelCase option names)
    #[arg(short = 'c', long = "config-file", value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Channel identifier override
    #[arg(short = 'i', long = "id", value_name = "ID")]
    pub id: Option<String>,

    /// Session id override (random by default)
    #[arg(long = "sid", value_name = "SID")]
    pub sid: Option<String>,

    /// Log level
    #[arg(short = 'l', long = "log-level", value_name = "LEVEL", value_parser = ["trace", "debug", "info", "warn", "error", "off"])]
    pub log_level: Option<String>,

    /// Log file path
    #[arg(short = 'f', long = "log-file", value_name = "FILE")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: NodeCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum NodeCommand {
    /// Run the authoritative queue server
    Serve {
        /// Poll interval driving run() in milliseconds (0 = caller-driven)
        #[arg(long = "run-interval", value_name = "MS")]
        run_interval: Option<u64>,
    },
    /// Connect as a client and forward items to the server
    Queue {
        /// Work items, one line of text each
        #[arg(required = true, value_name = "ITEMS")]
        items: Vec<String>,

        /// Insert at the front of the pool
        #[arg(short = 'p', long = "priority")]
        priority: bool,
    },
    /// Send a control command into the mesh
    Exec {
        /// Command name (pause, resume, start, stop, alive, config, ...)
        #[arg(value_name = "NAME")]
        name: String,

        /// JSON value payload (plain text is sent as a string)
        #[arg(short = 'v', long = "value", value_name = "JSON")]
        value: Option<String>,

        /// Restrict execution to one session id
        #[arg(short = 't', long = "target", value_name = "SID")]
        target: Option<String>,
    },
}
