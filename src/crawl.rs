use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use dashmap::DashMap;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use url::Url;
use uuid::Uuid;

use siteloom_core::{
    canonical, AppConfig, CrawlRun, CrawlStatus, DomainOverride, FetchConfig, FetchMode, Page,
    PageFetcher, SitemapEntry, UrlAlias,
};
use siteloom_fetch::StaticFetcher;
use siteloom_frontier::CrawlQueue;
use siteloom_sitemap::SitemapIntake;
use siteloom_storage::Storage;

use crate::report::RunStats;

pub struct CrawlOptions {
    pub sitemaps: Vec<String>,
    pub max_pages: u64,
    pub fetch_mode: FetchMode,
    pub recrawl: bool,
    pub dry_run: bool,
}

/// Shared state for the worker pool.
struct WorkerCtx {
    storage: Storage,
    fetcher: Arc<dyn PageFetcher>,
    fetch_config: FetchConfig,
    /// Per-host override cache; loaded from the DB once per host per run.
    overrides: DashMap<String, Option<DomainOverride>>,
    stats: RunStats,
    run_id: Uuid,
    fetch_mode: FetchMode,
    max_pages: u64,
    progress_interval: u64,
}

pub async fn run_crawl(config: AppConfig, opts: CrawlOptions) -> Result<()> {
    let fetch_config = FetchConfig {
        timeout: Duration::from_secs(config.fetch.request_timeout_seconds),
        max_body_size: config.general.max_body_size_mb * 1024 * 1024,
        user_agent: config.fetch.user_agent.clone(),
    };
    if opts.fetch_mode == FetchMode::Browser {
        warn!("browser fetch mode is not built in; pages will be fetched statically");
    }
    let fetcher: Arc<dyn PageFetcher> = Arc::new(StaticFetcher::new(&fetch_config)?);

    if opts.dry_run {
        let intake = SitemapIntake::new(fetcher.as_ref(), &fetch_config);
        let entries = intake.collect(&opts.sitemaps).await;
        if entries.is_empty() {
            bail!("no URLs discovered from any sitemap");
        }
        println!(
            "discovered {} URLs, showing first {}:",
            entries.len(),
            entries.len().min(10)
        );
        for entry in entries.iter().take(10) {
            println!(
                "  {}  [{}]",
                entry.canonical,
                entry.type_hint.as_deref().unwrap_or("-")
            );
        }
        return Ok(());
    }

    // The database must be reachable before any page fetch happens.
    let pool_size = config
        .database
        .max_connections
        .unwrap_or((config.general.workers as u32 + 5).max(10));
    let storage = Storage::with_pool_size(&config.database.postgres_url, pool_size)
        .await
        .context("database unreachable at startup")?;
    storage.run_migrations().await?;

    let run_id = Uuid::new_v4();
    let intake = SitemapIntake::new(fetcher.as_ref(), &fetch_config);
    let entries = intake.collect(&opts.sitemaps).await;
    if entries.is_empty() {
        bail!("no URLs discovered from any sitemap");
    }
    info!(run_id = %run_id, urls = entries.len(), "sitemap intake complete");

    storage
        .create_run(&CrawlRun {
            run_id,
            seed_sitemaps: opts.sitemaps.clone(),
            max_pages: opts.max_pages as i64,
            fetch_mode: opts.fetch_mode,
            started_at: Utc::now(),
            finished_at: None,
            urls_discovered: 0,
            pages_crawled: 0,
            pages_skipped: 0,
            redirects: 0,
            errors: 0,
        })
        .await?;

    let ctx = Arc::new(WorkerCtx {
        storage,
        fetcher,
        fetch_config,
        overrides: DashMap::new(),
        stats: RunStats::new(),
        run_id,
        fetch_mode: opts.fetch_mode,
        max_pages: opts.max_pages,
        progress_interval: config.general.progress_interval.max(1),
    });
    ctx.stats
        .discovered
        .store(entries.len() as u64, std::sync::atomic::Ordering::Relaxed);

    // Enqueue phase: an alias row is recorded for every requested URL, even
    // ones that are deduped or skipped; workers never enqueue.
    let queue = Arc::new(CrawlQueue::new());
    for entry in entries {
        let alias = UrlAlias {
            requested_url: entry.raw.clone(),
            final_url: entry.canonical.clone(),
            status_code: None,
            redirect_chain: Vec::new(),
            run_id,
        };
        if let Err(e) = ctx.storage.upsert_alias(&alias).await {
            warn!(url = %entry.raw, "alias write failed: {e}");
        }

        if !opts.recrawl {
            match ctx.storage.page_exists(&entry.canonical).await {
                Ok(true) => {
                    ctx.stats
                        .skipped
                        .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                    queue.mark_seen(&entry.canonical);
                    continue;
                }
                Ok(false) => {}
                Err(e) => warn!(url = %entry.canonical, "existence check failed: {e}"),
            }
        }
        queue.push(entry).await;
    }
    info!(queued = queue.len().await, "enqueue complete");

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let workers = config.general.workers.max(1);
    info!(workers, "spawning crawl workers");
    let mut worker_handles = Vec::with_capacity(workers);
    for worker_id in 0..workers {
        let ctx = Arc::clone(&ctx);
        let queue = Arc::clone(&queue);
        let mut shutdown = shutdown_tx.subscribe();
        worker_handles.push(tokio::spawn(async move {
            loop {
                match shutdown.try_recv() {
                    Err(broadcast::error::TryRecvError::Empty) => {}
                    _ => {
                        info!(worker_id, "worker shutting down");
                        break;
                    }
                }
                if ctx.stats.crawled_count() >= ctx.max_pages {
                    break;
                }
                let Some(entry) = queue.pop().await else { break };
                process_entry(&ctx, entry).await;
            }
        }));
    }

    // Cancellation is observed between items; in-flight pages complete.
    let signal_shutdown = shutdown_tx.clone();
    let signal_task = tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("shutdown signal received, finishing in-flight pages");
            let _ = signal_shutdown.send(());
        }
    });

    for handle in worker_handles {
        let _ = handle.await;
    }
    signal_task.abort();

    let (discovered, crawled, skipped, redirects, errors) = ctx.stats.snapshot();
    ctx.storage
        .update_run_stats(
            run_id,
            discovered as i64,
            crawled as i64,
            skipped as i64,
            redirects as i64,
            errors as i64,
        )
        .await?;
    ctx.storage.finish_run(run_id).await?;

    ctx.stats.print_summary();
    Ok(())
}

fn classify_status(status: u16) -> CrawlStatus {
    match status {
        404 | 410 => CrawlStatus::NotFound,
        s if s >= 400 => CrawlStatus::Error,
        _ => CrawlStatus::Ok,
    }
}

async fn lookup_override(ctx: &WorkerCtx, final_url: &str) -> Option<DomainOverride> {
    let host = canonical::domain(final_url)?;
    if let Some(cached) = ctx.overrides.get(&host) {
        return cached.clone();
    }
    let loaded = match ctx.storage.get_domain_override(&host).await {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(host = %host, "override lookup failed: {e}");
            None
        }
    };
    ctx.overrides.insert(host, loaded.clone());
    loaded
}

fn empty_page(entry: &SitemapEntry, ctx: &WorkerCtx) -> Page {
    Page {
        final_url: entry.canonical.clone(),
        requested_url_original: entry.raw.clone(),
        status_code: None,
        crawl_status: CrawlStatus::Error,
        redirect_chain: Vec::new(),
        fetch_mode: ctx.fetch_mode,
        run_id: ctx.run_id,
        sitemap_type_hint: entry.type_hint.clone(),
        html_content: None,
        clean_html: None,
        markdown: None,
        markdown_enhanced: None,
        content_hash: None,
        title: None,
        h1: None,
        meta_description: None,
        word_count: None,
        nav_structure: None,
        structural_stats: None,
        extraction_method: None,
        junk_score: None,
        last_crawled_at: Utc::now(),
        last_error: None,
    }
}

/// The full per-URL pipeline. Never propagates an error out of the worker;
/// failures become ERROR pages or logged writes.
async fn process_entry(ctx: &WorkerCtx, entry: SitemapEntry) {
    use std::sync::atomic::Ordering;

    let url = match Url::parse(&entry.canonical) {
        Ok(u) => u,
        Err(e) => {
            warn!(url = %entry.canonical, "unparseable canonical URL dropped: {e}");
            return;
        }
    };

    let response = match ctx.fetcher.fetch(&url, &ctx.fetch_config).await {
        Ok(response) => response,
        Err(e) => {
            ctx.stats.errors.fetch_add(1, Ordering::Relaxed);
            let mut page = empty_page(&entry, ctx);
            page.last_error = Some(e.to_string());
            if let Err(store_err) = ctx.storage.upsert_page(&page).await {
                error!(url = %entry.canonical, "page write failed: {store_err}");
            }
            return;
        }
    };

    let final_url = canonical::normalize(response.final_url.as_str())
        .unwrap_or_else(|_| response.final_url.to_string());
    let redirected = final_url != entry.canonical;
    // The fetch layer surfaces only the terminal URL; intermediate hops are
    // not reconstructed.
    let redirect_chain = if redirected {
        vec![entry.canonical.clone(), final_url.clone()]
    } else {
        Vec::new()
    };

    let mut crawl_status = classify_status(response.status);
    if response.status >= 400 {
        ctx.stats.errors.fetch_add(1, Ordering::Relaxed);
    }

    let is_html = response
        .content_type
        .as_deref()
        .map(|ct| ct.contains("text/html"))
        .unwrap_or(true);

    let mut page = empty_page(&entry, ctx);
    page.final_url = final_url.clone();
    page.status_code = Some(response.status as i32);
    page.redirect_chain = redirect_chain.clone();

    if is_html && response.status < 400 {
        let html = String::from_utf8_lossy(&response.body).into_owned();
        let override_cfg = lookup_override(ctx, &final_url).await;
        let page_url = Url::parse(&final_url).unwrap_or_else(|_| response.final_url.clone());

        let parsed = siteloom_parser::process_page(&html, &page_url, override_cfg.as_ref());

        if crawl_status == CrawlStatus::Ok
            && siteloom_parser::hash::is_soft_404(
                parsed.meta.title.as_deref(),
                &parsed.body_text,
                parsed.word_count,
            )
        {
            crawl_status = CrawlStatus::Soft404;
        }
        if let Some(issue) = &parsed.h1_issue {
            info!(url = %final_url, issue, "seo issue");
        }

        page.html_content = Some(html);
        page.clean_html = Some(parsed.clean_html);
        page.markdown = Some(parsed.markdown);
        page.markdown_enhanced = Some(parsed.markdown_enhanced);
        page.content_hash = parsed.content_hash;
        page.title = parsed.meta.title;
        page.h1 = parsed.meta.h1;
        page.meta_description = parsed.meta.meta_description;
        page.word_count = Some(parsed.word_count as i32);
        page.nav_structure = Some(parsed.nav);
        page.structural_stats = Some(parsed.structural_stats);
        page.extraction_method = Some(parsed.extraction_method);
        page.junk_score = Some(parsed.junk_score);
    }
    page.crawl_status = crawl_status;

    // Page first, alias second; either can fail independently.
    if let Err(e) = ctx.storage.upsert_page(&page).await {
        error!(url = %final_url, "page write failed: {e}");
    }

    let alias = UrlAlias {
        requested_url: entry.raw.clone(),
        final_url: final_url.clone(),
        status_code: Some(response.status as i32),
        redirect_chain: redirect_chain.clone(),
        run_id: ctx.run_id,
    };
    if let Err(e) = ctx.storage.upsert_alias(&alias).await {
        error!(url = %entry.raw, "alias write failed: {e}");
    }

    if redirected {
        ctx.stats.redirects.fetch_add(1, Ordering::Relaxed);
        if entry.canonical != entry.raw {
            let canonical_alias = UrlAlias {
                requested_url: entry.canonical.clone(),
                final_url,
                status_code: Some(response.status as i32),
                redirect_chain,
                run_id: ctx.run_id,
            };
            if let Err(e) = ctx.storage.upsert_alias(&canonical_alias).await {
                error!(url = %entry.canonical, "alias write failed: {e}");
            }
        }
    }

    let crawled = ctx.stats.crawled.fetch_add(1, Ordering::Relaxed) + 1;
    if crawled % ctx.progress_interval == 0 {
        let (discovered, _, skipped, redirects, errors) = ctx.stats.snapshot();
        info!(crawled, discovered, skipped, redirects, errors, "progress");
        if let Err(e) = ctx
            .storage
            .update_run_stats(
                ctx.run_id,
                discovered as i64,
                crawled as i64,
                skipped as i64,
                redirects as i64,
                errors as i64,
            )
            .await
        {
            warn!("run stats update failed: {e}");
        }
    }
}

/// Classification is a pure function of the HTTP status; keep it testable
/// without a live fetch.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(classify_status(200), CrawlStatus::Ok);
        assert_eq!(classify_status(301), CrawlStatus::Ok);
        assert_eq!(classify_status(404), CrawlStatus::NotFound);
        assert_eq!(classify_status(410), CrawlStatus::NotFound);
        assert_eq!(classify_status(500), CrawlStatus::Error);
        assert_eq!(classify_status(403), CrawlStatus::Error);
    }
}
