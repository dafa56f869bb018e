mod cli;
mod commands;
mod crawl;
mod report;

use anyhow::Result;
use clap::Parser;
use tracing::warn;

// mimalloc keeps memory in check under high worker concurrency
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use siteloom_core::config::AppConfig;

use crate::cli::{Cli, Commands, OverrideAction};
use crate::crawl::{run_crawl, CrawlOptions};

fn main() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(async_main())
}

fn init_tracing(debug: bool) {
    let default_level = if debug {
        "debug".to_string()
    } else {
        std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string())
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    let pretty = std::env::var("LOG_PRETTY")
        .map(|v| v != "0" && v.to_lowercase() != "false")
        .unwrap_or(false);
    if pretty {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .pretty()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Database settings may come from the environment instead of the config
/// file: a full DATABASE_URL, or the individual DB_* parts.
fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(url) = std::env::var("DATABASE_URL") {
        config.database.postgres_url = url;
    } else if ["DB_HOST", "DB_PORT", "DB_USER", "DB_PASSWORD", "DB_NAME"]
        .iter()
        .any(|key| std::env::var(key).is_ok())
    {
        let host = std::env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string());
        let port = std::env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string());
        let user = std::env::var("DB_USER").unwrap_or_else(|_| "siteloom".to_string());
        let password = std::env::var("DB_PASSWORD").unwrap_or_default();
        let name = std::env::var("DB_NAME").unwrap_or_else(|_| "siteloom".to_string());
        config.database.postgres_url = if password.is_empty() {
            format!("postgres://{user}@{host}:{port}/{name}")
        } else {
            format!("postgres://{user}:{password}@{host}:{port}/{name}")
        };
    }

    if let Ok(v) = std::env::var("CRAWL_WORKERS") {
        if let Some(n) = v.parse::<usize>().ok().filter(|&n| n > 0 && n <= 128) {
            config.general.workers = n;
        }
    }
}

async fn async_main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let config_str = std::fs::read_to_string(&cli.config).unwrap_or_else(|_| {
        warn!(path = %cli.config, "config file not found, using defaults");
        include_str!("../config/default.toml").to_string()
    });
    let mut config: AppConfig = toml::from_str(&config_str)?;
    apply_env_overrides(&mut config);

    match cli.command {
        Commands::Crawl {
            sitemaps,
            max_pages,
            fetch_mode,
            recrawl,
            dry_run,
        } => {
            let opts = CrawlOptions {
                sitemaps,
                max_pages: max_pages.unwrap_or(config.general.max_pages),
                fetch_mode: fetch_mode.into(),
                recrawl,
                dry_run,
            };
            run_crawl(config, opts).await?;
        }
        Commands::Status => {
            commands::status::run(config).await?;
        }
        Commands::Override { action } => match action {
            OverrideAction::Set {
                domain,
                selectors,
                removals,
                disable,
                notes,
            } => {
                commands::overrides::set(config, domain, selectors, removals, disable, notes)
                    .await?;
            }
            OverrideAction::Show { domain } => {
                commands::overrides::show(config, domain).await?;
            }
        },
    }

    Ok(())
}
