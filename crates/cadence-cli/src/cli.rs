//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI
//! arguments. The actual command implementations are in the `commands`
//! module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Cadence - Detect recurring and subscription spending patterns
#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Recurring-spend pattern detection service", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "cadence.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Analyze a CSV batch: ingest transactions and detect patterns
    Analyze {
        /// CSV file with description,amount,date columns
        #[arg(short, long)]
        file: PathBuf,

        /// Ingest only; skip pattern detection
        #[arg(long)]
        no_detect: bool,
    },

    /// List transactions
    Transactions {
        /// Maximum rows to show
        #[arg(short, long, default_value = "20")]
        limit: i64,

        /// Filter by merchant ID
        #[arg(short, long)]
        merchant: Option<i64>,
    },

    /// List or search merchants
    Merchants {
        /// Substring to search names for
        #[arg(short, long)]
        query: Option<String>,

        /// Filter by category
        #[arg(short, long)]
        category: Option<String>,
    },

    /// Manage detected patterns
    Patterns {
        #[command(subcommand)]
        action: Option<PatternsAction>,
    },

    /// Manage merchant override rules
    Rules {
        #[command(subcommand)]
        action: Option<RulesAction>,
    },

    /// Test the configured oracle
    Oracle {
        /// Description to classify
        #[arg(short, long)]
        description: String,
    },

    /// Analysis cache maintenance
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}

#[derive(Subcommand)]
pub enum PatternsAction {
    /// List patterns (default)
    List {
        /// Filter by merchant ID
        #[arg(short, long)]
        merchant: Option<i64>,
    },

    /// Delete patterns older than N days
    Prune {
        /// Age threshold in days
        #[arg(long, default_value = "365")]
        days: i64,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub enum RulesAction {
    /// Add an override rule
    Add {
        /// Regex pattern matched against descriptions (case-insensitive)
        #[arg(short, long)]
        pattern: String,

        /// Canonical merchant name the rule resolves to
        #[arg(short, long)]
        name: String,

        /// Merchant category
        #[arg(short, long)]
        category: String,

        /// Merchant subcategory
        #[arg(long)]
        sub_category: Option<String>,

        /// Rule priority (higher wins)
        #[arg(long, default_value = "0")]
        priority: i64,
    },

    /// Delete a rule
    Delete {
        /// Rule ID
        id: i64,
    },

    /// Test a description against all rules
    Test {
        /// Transaction description to test
        description: String,
    },
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// Delete expired cache entries
    Cleanup,
}
