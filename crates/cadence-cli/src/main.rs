//! Cadence CLI - recurring-spend pattern detection
//!
//! Usage:
//!   cadence init                 Initialize database
//!   cadence analyze --file CSV   Ingest a batch and detect patterns
//!   cadence patterns list        Show detected patterns
//!   cadence serve --port 3000    Start web server

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db),
        Commands::Analyze { file, no_detect } => {
            commands::cmd_analyze(&cli.db, &file, no_detect).await
        }
        Commands::Transactions { limit, merchant } => {
            let db = commands::open_db(&cli.db)?;
            commands::cmd_transactions_list(&db, limit, merchant)
        }
        Commands::Merchants { query, category } => {
            let db = commands::open_db(&cli.db)?;
            commands::cmd_merchants_list(&db, query.as_deref(), category.as_deref())
        }
        Commands::Patterns { action } => {
            let db = commands::open_db(&cli.db)?;
            match action {
                None => commands::cmd_patterns_list(&db, None),
                Some(PatternsAction::List { merchant }) => {
                    commands::cmd_patterns_list(&db, merchant)
                }
                Some(PatternsAction::Prune { days, yes }) => {
                    commands::cmd_patterns_prune(&db, days, yes)
                }
            }
        }
        Commands::Rules { action } => {
            let db = commands::open_db(&cli.db)?;
            match action {
                None => commands::cmd_rules_list(&db),
                Some(RulesAction::Add {
                    pattern,
                    name,
                    category,
                    sub_category,
                    priority,
                }) => commands::cmd_rules_add(
                    &db,
                    &pattern,
                    &name,
                    &category,
                    sub_category.as_deref(),
                    priority,
                ),
                Some(RulesAction::Delete { id }) => commands::cmd_rules_delete(&db, id),
                Some(RulesAction::Test { description }) => {
                    commands::cmd_rules_test(&db, &description)
                }
            }
        }
        Commands::Oracle { description } => commands::cmd_oracle_test(&description).await,
        Commands::Cache { action } => {
            let db = commands::open_db(&cli.db)?;
            match action {
                CacheAction::Cleanup => commands::cmd_cache_cleanup(&db),
            }
        }
        Commands::Serve { port, host } => commands::cmd_serve(&cli.db, &host, port).await,
    }
}
