//! Postgres persistence. Every entity has exactly one mutation, and the
//! page mutation is hash-gated: raw/clean HTML are only overwritten when
//! the new content hash is present and differs from the stored one, so
//! repeated crawls of unchanged pages never churn content columns.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use siteloom_core::{CrawlRun, DomainOverride, FetchMode, Page, UrlAlias};

#[derive(Clone)]
pub struct Storage {
    pool: PgPool,
}

/// Run counters for the status command.
#[derive(Debug, Clone, Copy, Default)]
pub struct StorageStats {
    pub pages: i64,
    pub aliases: i64,
    pub runs: i64,
    pub error_pages: i64,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub pages_crawled: i64,
    pub errors: i64,
}

fn string_array(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::with_pool_size(database_url, 20).await
    }

    pub async fn with_pool_size(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!(max_connections, "connected to postgres");
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::raw_sql(include_str!("../migrations/001_init.sql"))
            .execute(&self.pool)
            .await?;
        info!("migrations complete");
        Ok(())
    }

    pub async fn check_connectivity(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Insert-or-update keyed by final_url. Status/provenance always take
    /// the new values; html/clean_html only move behind the content-hash
    /// gate; Markdown overwrites whenever provided (its generation logic
    /// can improve independently of content); the remaining metadata
    /// coalesces so nulls never erase earlier extractions.
    pub async fn upsert_page(&self, page: &Page) -> Result<i64> {
        let redirect_chain = serde_json::to_value(&page.redirect_chain)?;
        let nav_structure = page
            .nav_structure
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;
        let structural_stats = page
            .structural_stats
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        let row: (i64,) = sqlx::query_as(
            r#"INSERT INTO pages (
                   final_url, requested_url_original, status_code, crawl_status,
                   redirect_chain, fetch_mode, run_id, sitemap_type_hint,
                   html_content, clean_html, markdown, markdown_enhanced,
                   content_hash, title, h1, meta_description, word_count,
                   nav_structure, structural_stats, extraction_method,
                   junk_score, last_crawled_at, last_error
               )
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                       $13, $14, $15, $16, $17, $18, $19, $20, $21, $22, $23)
               ON CONFLICT (final_url) DO UPDATE SET
                   status_code = EXCLUDED.status_code,
                   crawl_status = EXCLUDED.crawl_status,
                   redirect_chain = EXCLUDED.redirect_chain,
                   fetch_mode = EXCLUDED.fetch_mode,
                   run_id = EXCLUDED.run_id,
                   last_crawled_at = EXCLUDED.last_crawled_at,
                   last_error = EXCLUDED.last_error,
                   html_content = CASE
                       WHEN EXCLUDED.content_hash IS NOT NULL
                        AND EXCLUDED.content_hash IS DISTINCT FROM pages.content_hash
                       THEN EXCLUDED.html_content
                       ELSE pages.html_content
                   END,
                   clean_html = CASE
                       WHEN EXCLUDED.content_hash IS NOT NULL
                        AND EXCLUDED.content_hash IS DISTINCT FROM pages.content_hash
                       THEN EXCLUDED.clean_html
                       ELSE pages.clean_html
                   END,
                   markdown = COALESCE(EXCLUDED.markdown, pages.markdown),
                   markdown_enhanced = COALESCE(EXCLUDED.markdown_enhanced, pages.markdown_enhanced),
                   title = COALESCE(EXCLUDED.title, pages.title),
                   h1 = COALESCE(EXCLUDED.h1, pages.h1),
                   meta_description = COALESCE(EXCLUDED.meta_description, pages.meta_description),
                   word_count = COALESCE(EXCLUDED.word_count, pages.word_count),
                   extraction_method = COALESCE(EXCLUDED.extraction_method, pages.extraction_method),
                   junk_score = COALESCE(EXCLUDED.junk_score, pages.junk_score),
                   content_hash = COALESCE(EXCLUDED.content_hash, pages.content_hash),
                   sitemap_type_hint = COALESCE(EXCLUDED.sitemap_type_hint, pages.sitemap_type_hint),
                   nav_structure = COALESCE(EXCLUDED.nav_structure, pages.nav_structure),
                   structural_stats = COALESCE(EXCLUDED.structural_stats, pages.structural_stats)
               RETURNING id"#,
        )
        .bind(&page.final_url)
        .bind(&page.requested_url_original)
        .bind(page.status_code)
        .bind(page.crawl_status.as_str())
        .bind(redirect_chain)
        .bind(page.fetch_mode.as_str())
        .bind(page.run_id)
        .bind(&page.sitemap_type_hint)
        .bind(&page.html_content)
        .bind(&page.clean_html)
        .bind(&page.markdown)
        .bind(&page.markdown_enhanced)
        .bind(&page.content_hash)
        .bind(&page.title)
        .bind(&page.h1)
        .bind(&page.meta_description)
        .bind(page.word_count)
        .bind(nav_structure)
        .bind(structural_stats)
        .bind(page.extraction_method.map(|m| m.as_str()))
        .bind(page.junk_score)
        .bind(page.last_crawled_at)
        .bind(&page.last_error)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    /// Keyed by requested_url; non-null fields overwrite, first_seen_at is
    /// preserved, last_seen_at bumps to now.
    pub async fn upsert_alias(&self, alias: &UrlAlias) -> Result<()> {
        let redirect_chain = serde_json::to_value(&alias.redirect_chain)?;
        sqlx::query(
            r#"INSERT INTO url_aliases
                   (requested_url, final_url, status_code, redirect_chain, run_id,
                    first_seen_at, last_seen_at)
               VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
               ON CONFLICT (requested_url) DO UPDATE SET
                   final_url = EXCLUDED.final_url,
                   status_code = COALESCE(EXCLUDED.status_code, url_aliases.status_code),
                   redirect_chain = EXCLUDED.redirect_chain,
                   run_id = EXCLUDED.run_id,
                   last_seen_at = NOW()"#,
        )
        .bind(&alias.requested_url)
        .bind(&alias.final_url)
        .bind(alias.status_code)
        .bind(redirect_chain)
        .bind(alias.run_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn page_exists(&self, final_url: &str) -> Result<bool> {
        let exists: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pages WHERE final_url = $1)")
                .bind(final_url)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists.0)
    }

    pub async fn create_run(&self, run: &CrawlRun) -> Result<()> {
        let seeds = serde_json::to_value(&run.seed_sitemaps)?;
        sqlx::query(
            r#"INSERT INTO crawl_runs (run_id, seed_sitemaps, max_pages, fetch_mode, started_at)
               VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(run.run_id)
        .bind(seeds)
        .bind(run.max_pages)
        .bind(run.fetch_mode.as_str())
        .bind(run.started_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn update_run_stats(
        &self,
        run_id: Uuid,
        discovered: i64,
        crawled: i64,
        skipped: i64,
        redirects: i64,
        errors: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"UPDATE crawl_runs SET
                   urls_discovered = $2,
                   pages_crawled = $3,
                   pages_skipped = $4,
                   redirects = $5,
                   errors = $6
               WHERE run_id = $1"#,
        )
        .bind(run_id)
        .bind(discovered)
        .bind(crawled)
        .bind(skipped)
        .bind(redirects)
        .bind(errors)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn finish_run(&self, run_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE crawl_runs SET finished_at = NOW() WHERE run_id = $1")
            .bind(run_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn get_domain_override(&self, domain: &str) -> Result<Option<DomainOverride>> {
        let row: Option<(String, bool, Value, Value, Option<String>, Option<String>)> =
            sqlx::query_as(
                r#"SELECT domain, enabled, main_content_selectors, remove_selectors,
                          force_fetch_mode, notes
                   FROM domain_overrides WHERE domain = $1"#,
            )
            .bind(domain)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(
            |(domain, enabled, main_selectors, remove_selectors, force_mode, notes)| {
                DomainOverride {
                    domain,
                    enabled,
                    main_content_selectors: string_array(&main_selectors),
                    remove_selectors: string_array(&remove_selectors),
                    force_fetch_mode: match force_mode.as_deref() {
                        Some("browser") => Some(FetchMode::Browser),
                        Some("static") => Some(FetchMode::Static),
                        _ => None,
                    },
                    notes,
                }
            },
        ))
    }

    pub async fn upsert_domain_override(&self, override_cfg: &DomainOverride) -> Result<()> {
        let main_selectors = serde_json::to_value(&override_cfg.main_content_selectors)?;
        let remove_selectors = serde_json::to_value(&override_cfg.remove_selectors)?;
        sqlx::query(
            r#"INSERT INTO domain_overrides
                   (domain, enabled, main_content_selectors, remove_selectors,
                    force_fetch_mode, notes)
               VALUES ($1, $2, $3, $4, $5, $6)
               ON CONFLICT (domain) DO UPDATE SET
                   enabled = EXCLUDED.enabled,
                   main_content_selectors = EXCLUDED.main_content_selectors,
                   remove_selectors = EXCLUDED.remove_selectors,
                   force_fetch_mode = EXCLUDED.force_fetch_mode,
                   notes = EXCLUDED.notes"#,
        )
        .bind(&override_cfg.domain)
        .bind(override_cfg.enabled)
        .bind(main_selectors)
        .bind(remove_selectors)
        .bind(override_cfg.force_fetch_mode.map(|m| m.as_str()))
        .bind(&override_cfg.notes)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_stats(&self) -> Result<StorageStats> {
        let pages: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM pages")
            .fetch_one(&self.pool)
            .await?;
        let aliases: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM url_aliases")
            .fetch_one(&self.pool)
            .await?;
        let runs: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM crawl_runs")
            .fetch_one(&self.pool)
            .await?;
        let error_pages: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM pages WHERE crawl_status = 'ERROR'")
                .fetch_one(&self.pool)
                .await?;
        Ok(StorageStats {
            pages: pages.0,
            aliases: aliases.0,
            runs: runs.0,
            error_pages: error_pages.0,
        })
    }

    pub async fn latest_run(&self) -> Result<Option<RunSummary>> {
        let row: Option<(Uuid, DateTime<Utc>, Option<DateTime<Utc>>, i64, i64)> = sqlx::query_as(
            r#"SELECT run_id, started_at, finished_at, pages_crawled, errors
               FROM crawl_runs ORDER BY started_at DESC LIMIT 1"#,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(
            row.map(|(run_id, started_at, finished_at, pages_crawled, errors)| RunSummary {
                run_id,
                started_at,
                finished_at,
                pages_crawled,
                errors,
            }),
        )
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
