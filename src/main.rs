//! Indexarr - search many torrent and usenet indexers through one query model
//!
//! Indexers are declared in a YAML file; every subcommand loads them, then
//! lists, tests or searches them.

mod cli;

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use indexarr::config::{Config, LogFormat};
use indexarr::indexer::definitions::available_indexers;
use indexarr::indexer::{IndexerManager, IndexerSearchResult, ReqwestHttpClient, SystemClock};

use cli::{Cli, Command, SearchArgs};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(path) = &cli.indexers {
        config.indexers_path = path.clone();
    }

    let default_level = match cli.verbose {
        0 => "indexarr=info",
        1 => "indexarr=debug",
        _ => "indexarr=trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    // Logs go to stderr so search output can be piped
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }

    tracing::debug!(?config, "Configuration loaded");

    if let Command::List = cli.command {
        print_kinds();
        return Ok(());
    }

    let manager = load_manager(&config)?;

    match cli.command {
        Command::List => {}
        Command::Indexers => {
            for indexer in manager.get_all_indexers() {
                let descriptor = indexer.descriptor();
                println!(
                    "{:<16} {:<24} {:<12} {:<8} {}",
                    indexer.id(),
                    indexer.name(),
                    descriptor.privacy,
                    descriptor.protocol,
                    descriptor.kind
                );
            }
        }
        Command::Caps { id } => {
            let indexer = manager
                .get_indexer(&id)
                .with_context(|| format!("Indexer not loaded: {id}"))?;
            let caps = indexer.capabilities();
            println!("{}", serde_json::to_string_pretty(caps)?);
            println!("categories:");
            for mapping in caps.categories.mappings() {
                println!(
                    "  {:<8} -> {:<6} {}",
                    mapping.native_id,
                    mapping.standard,
                    mapping.label.as_deref().unwrap_or_default()
                );
            }
        }
        Command::Test { id } => {
            manager.test_indexer(&id).await?;
            println!("{id}: OK");
        }
        Command::Search(args) => search(&manager, &args).await?,
        Command::Download { id, link, output } => {
            let bytes = manager.download(&id, &link).await?;
            match output {
                Some(path) => {
                    tokio::fs::write(&path, &bytes)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("{} bytes written to {}", bytes.len(), path.display());
                }
                None => std::io::stdout().write_all(&bytes)?,
            }
        }
    }

    Ok(())
}

fn load_manager(config: &Config) -> Result<IndexerManager> {
    let file = config.load_indexers()?;
    let http = Arc::new(ReqwestHttpClient::new(&config.user_agent, config.request_timeout)?);

    let manager = IndexerManager::new(config.cache_ttl);
    let loaded = manager.load_indexers(file.enabled(), http, Arc::new(SystemClock), config.request_timeout);
    tracing::info!(loaded, configured = file.indexers.len(), "Indexers loaded");
    Ok(manager)
}

fn print_kinds() {
    for info in available_indexers() {
        println!("{} ({}, {}, {})", info.kind, info.name, info.privacy, info.protocol);
        println!("    {}", info.description);
        for link in info.links {
            println!("    link: {link}");
        }
        for setting in info.settings {
            let required = if setting.required { " (required)" } else { "" };
            println!("    {:<16} {}{}", setting.key, setting.label, required);
        }
    }
}

async fn search(manager: &IndexerManager, args: &SearchArgs) -> Result<()> {
    let criteria = args.criteria();
    tracing::info!(criteria = %criteria, "Searching");

    let results = if args.indexer_ids.is_empty() {
        manager.search_all(&criteria).await
    } else {
        manager.search_indexers(&args.indexer_ids, &criteria).await
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    print_results(&results);
    Ok(())
}

fn print_results(results: &[IndexerSearchResult]) {
    for result in results {
        let status = match (&result.error, result.from_cache) {
            (Some(error), _) => format!("failed: {error}"),
            (None, true) => format!("{} releases (cached)", result.releases.len()),
            (None, false) if result.failed_pages > 0 => format!(
                "{} releases, {} pages failed",
                result.releases.len(),
                result.failed_pages
            ),
            (None, false) => format!("{} releases in {}ms", result.releases.len(), result.elapsed_ms),
        };
        println!("== {} ({}): {}", result.indexer_name, result.indexer_id, status);

        for release in &result.releases {
            let size = release.size.map(format_size).unwrap_or_else(|| "-".to_string());
            println!(
                "  {:>10}  S:{:<5} P:{:<5} {}  {}",
                size,
                release.seeders,
                release.peers,
                release.publish_date.format("%Y-%m-%d"),
                release.title
            );
        }
    }
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}
