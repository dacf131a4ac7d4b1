//! storesync CLI - mirror Shopify into Notion and search both.
//!
//! # Usage
//!
//! ```bash
//! # Mirror the product catalog
//! storesync sync products
//!
//! # Mirror orders without writing anything
//! storesync sync orders --dry-run
//!
//! # Search both systems and export the results
//! storesync search linen --export
//! storesync search summer-sale --shopify-only --export results.json
//! ```
//!
//! Configuration comes from the environment (or a `.env` file); see
//! `storesync::config` for the variables. Logs go to stderr, results to
//! stdout. Set `LOG_FORMAT=json` for structured logs.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use storesync::{SearchScope, SyncConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "storesync")]
#[command(author, version, about = "Mirror a Shopify store into Notion and search both")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Mirror a Shopify collection into its Notion database
    Sync {
        #[command(subcommand)]
        target: SyncTarget,
    },
    /// Search Shopify and Notion for a keyword
    Search {
        /// Keyword or phrase (a lowercase-hyphenated keyword also looks up a collection)
        keyword: String,

        /// Only search Shopify
        #[arg(long, conflicts_with = "notion_only")]
        shopify_only: bool,

        /// Only search Notion
        #[arg(long)]
        notion_only: bool,

        /// Write results to a JSON file (default name includes a timestamp)
        #[arg(long, value_name = "FILE")]
        export: Option<Option<PathBuf>>,
    },
}

#[derive(Subcommand)]
enum SyncTarget {
    /// Mirror the product catalog
    Products {
        /// Fetch and map, resolve create vs update, but write nothing
        #[arg(long)]
        dry_run: bool,
    },
    /// Mirror the order history
    Orders {
        /// Fetch and map, resolve create vs update, but write nothing
        #[arg(long)]
        dry_run: bool,
    },
}

fn init_sentry(config: &SyncConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "storesync=info,storesync_cli=info".into());

    let is_json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    let json_layer = is_json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_writer(std::io::stderr)
    });
    let text_layer =
        (!is_json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        // No arguments: show usage and exit cleanly.
        if Cli::command().print_help().is_err() {
            std::process::exit(1);
        }
        return;
    };

    // Config is loaded before tracing so Sentry can hook in first.
    let config = SyncConfig::from_env();
    let sentry_guard = config.as_ref().ok().and_then(init_sentry);
    init_tracing();

    let result: Result<(), Box<dyn std::error::Error>> = match config {
        Ok(config) => run(command, &config).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        drop(sentry_guard);
        std::process::exit(1);
    }
}

async fn run(command: Commands, config: &SyncConfig) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Sync { target } => match target {
            SyncTarget::Products { dry_run } => commands::sync::products(config, dry_run).await?,
            SyncTarget::Orders { dry_run } => commands::sync::orders(config, dry_run).await?,
        },
        Commands::Search {
            keyword,
            shopify_only,
            notion_only,
            export,
        } => {
            let scope = if shopify_only {
                SearchScope::ShopifyOnly
            } else if notion_only {
                SearchScope::NotionOnly
            } else {
                SearchScope::All
            };
            commands::search::run(config, &keyword, scope, export).await?;
        }
    }
    Ok(())
}
