use anyhow::Result;

use siteloom_core::config::AppConfig;
use siteloom_core::{canonical, DomainOverride};
use siteloom_storage::Storage;

pub async fn set(
    config: AppConfig,
    domain: String,
    selectors: Vec<String>,
    removals: Vec<String>,
    disable: bool,
    notes: Option<String>,
) -> Result<()> {
    let domain = canonical::domain(&domain)
        .ok_or_else(|| anyhow::anyhow!("not a valid domain: {domain}"))?;

    let storage = Storage::new(&config.database.postgres_url).await?;
    storage.run_migrations().await?;

    let override_cfg = DomainOverride {
        domain: domain.clone(),
        enabled: !disable,
        main_content_selectors: selectors,
        remove_selectors: removals,
        force_fetch_mode: None,
        notes,
    };
    storage.upsert_domain_override(&override_cfg).await?;
    println!(
        "override for {domain} saved ({})",
        if override_cfg.enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}

pub async fn show(config: AppConfig, domain: String) -> Result<()> {
    let domain = canonical::domain(&domain)
        .ok_or_else(|| anyhow::anyhow!("not a valid domain: {domain}"))?;

    let storage = Storage::new(&config.database.postgres_url).await?;
    storage.run_migrations().await?;

    match storage.get_domain_override(&domain).await? {
        Some(cfg) => {
            println!("domain:    {}", cfg.domain);
            println!("enabled:   {}", cfg.enabled);
            println!("selectors: {:?}", cfg.main_content_selectors);
            println!("removals:  {:?}", cfg.remove_selectors);
            if let Some(notes) = cfg.notes {
                println!("notes:     {notes}");
            }
        }
        None => println!("no override stored for {domain}"),
    }
    Ok(())
}
