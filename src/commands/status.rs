use anyhow::Result;

use siteloom_core::config::AppConfig;
use siteloom_storage::Storage;

pub async fn run(config: AppConfig) -> Result<()> {
    let storage = Storage::new(&config.database.postgres_url).await?;

    match storage.check_connectivity().await {
        Ok(()) => println!("Database: connected"),
        Err(e) => {
            println!("Database: ERROR - {}", e);
            return Ok(());
        }
    }

    storage.run_migrations().await?;

    let stats = storage.get_stats().await?;

    println!("\n╔══════════════════════════════════════════════╗");
    println!("║             siteloom Status                  ║");
    println!("╠══════════════════════════════════════════════╣");
    println!("║ Pages archived:     {:>20}    ║", stats.pages);
    println!("║ URL aliases:        {:>20}    ║", stats.aliases);
    println!("║ Crawl runs:         {:>20}    ║", stats.runs);
    println!("║ Error pages:        {:>20}    ║", stats.error_pages);
    println!("╚══════════════════════════════════════════════╝");

    if let Some(run) = storage.latest_run().await? {
        println!("Latest run {}:", run.run_id);
        println!("  started:  {}", run.started_at);
        match run.finished_at {
            Some(finished) => println!("  finished: {}", finished),
            None => println!("  finished: (still running or aborted)"),
        }
        println!("  crawled:  {}", run.pages_crawled);
        println!("  errors:   {}", run.errors);
    }
    println!();

    Ok(())
}
