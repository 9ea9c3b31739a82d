//! CLI command definitions

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::domain::DomainId;

/// ms - cross-process update signalling and comment scoring
#[derive(Parser)]
#[command(
    name = "ms",
    about = "Shared update counter and comment scoring for moderation backends",
    version = env!("CARGO_PKG_VERSION"),
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Print the shared update counter
    Counter,

    /// Record a write: bump the counter and notify listeners
    Bump {
        /// Item that changed; omit for a full update
        #[arg(short, long)]
        item: Option<DomainId>,
    },

    /// Poll the counter and print every change until Ctrl-C
    Watch,

    /// Submit a comment to a service user's scoring endpoint
    Score {
        /// Comment to score
        #[arg(long)]
        comment: DomainId,

        /// Service user whose endpoint does the scoring
        #[arg(long = "service-user")]
        service_user: DomainId,

        /// Token echoed in the callback link (a v7 UUID when omitted)
        #[arg(long)]
        correlator: Option<String>,
    },
}
