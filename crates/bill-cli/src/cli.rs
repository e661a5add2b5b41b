//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::invoice::InvoiceArgs;

/// Monthly per-customer invoices from a calendar feed.
///
/// Events whose description starts with a three-letter customer code
/// (`ABC: ...`) are billed to that customer.
#[derive(Debug, Parser)]
#[command(name = "bill", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file, instead of the per-user default.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Produce invoices for one billing month.
    Invoice(InvoiceArgs),

    /// Write a configuration template for a user.
    Init {
        /// The user to create the configuration for.
        username: String,
    },
}
