use clap::{Parser, Subcommand, ValueEnum};

use siteloom_core::FetchMode;

#[derive(Parser)]
#[command(
    name = "siteloom",
    about = "Sitemap-driven crawler producing a canonical Markdown archive"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    /// Verbose logs
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Crawl pages discovered from sitemap seeds
    Crawl {
        /// Sitemap XML seed URL (repeatable)
        #[arg(long = "sitemap", required = true)]
        sitemaps: Vec<String>,

        /// Stop after this many successful fetches
        #[arg(long)]
        max_pages: Option<u64>,

        /// How pages are fetched
        #[arg(long, value_enum, default_value_t = FetchModeArg::Static)]
        fetch_mode: FetchModeArg,

        /// Re-fetch pages that already exist (updates remain hash-gated)
        #[arg(long)]
        recrawl: bool,

        /// Sitemap intake only: print the first 10 URLs, write nothing
        #[arg(long)]
        dry_run: bool,
    },
    /// Show database stats and the latest run
    Status,
    /// Configure per-domain extraction overrides
    Override {
        #[command(subcommand)]
        action: OverrideAction,
    },
}

#[derive(Subcommand)]
pub enum OverrideAction {
    /// Create or update the override for a domain
    Set {
        /// Host the override applies to, e.g. example.com
        domain: String,

        /// Main-content selector, in priority order (repeatable)
        #[arg(long = "selector")]
        selectors: Vec<String>,

        /// Extra removal selector applied during cleaning (repeatable)
        #[arg(long = "remove")]
        removals: Vec<String>,

        /// Keep the override but stop applying it
        #[arg(long)]
        disable: bool,

        #[arg(long)]
        notes: Option<String>,
    },
    /// Show the stored override for a domain
    Show { domain: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FetchModeArg {
    Static,
    Browser,
}

impl From<FetchModeArg> for FetchMode {
    fn from(arg: FetchModeArg) -> Self {
        match arg {
            FetchModeArg::Static => FetchMode::Static,
            FetchModeArg::Browser => FetchMode::Browser,
        }
    }
}
