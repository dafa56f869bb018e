//! In-memory crawl queue. The producer fills it during the enqueue phase;
//! workers only pop. Dedup is exact, keyed by canonical URL, so a page can
//! be queued at most once per run regardless of how many sitemaps list it.

use std::collections::VecDeque;

use dashmap::DashSet;
use tokio::sync::Mutex;
use tracing::debug;

use siteloom_core::SitemapEntry;

pub struct CrawlQueue {
    /// Canonical URLs ever enqueued this run.
    seen: DashSet<String>,
    queue: Mutex<VecDeque<SitemapEntry>>,
}

impl Default for CrawlQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CrawlQueue {
    pub fn new() -> Self {
        Self {
            seen: DashSet::new(),
            queue: Mutex::new(VecDeque::new()),
        }
    }

    /// Record a canonical URL without queueing it. Returns false if it was
    /// already known. Used for existence-skips so later sitemap duplicates
    /// are still deduped.
    pub fn mark_seen(&self, canonical: &str) -> bool {
        self.seen.insert(canonical.to_string())
    }

    /// Enqueue one entry. Returns false when the canonical URL was already
    /// queued (first-seen sitemap source wins).
    pub async fn push(&self, entry: SitemapEntry) -> bool {
        if !self.seen.insert(entry.canonical.clone()) {
            return false;
        }
        self.queue.lock().await.push_back(entry);
        true
    }

    /// Enqueue a batch under a single queue lock. Returns how many survived
    /// dedup.
    pub async fn push_batch(&self, entries: Vec<SitemapEntry>) -> usize {
        let fresh: Vec<SitemapEntry> = entries
            .into_iter()
            .filter(|e| self.seen.insert(e.canonical.clone()))
            .collect();
        let added = fresh.len();
        if added > 0 {
            let mut queue = self.queue.lock().await;
            queue.extend(fresh);
        }
        debug!(added, "entries enqueued");
        added
    }

    pub async fn pop(&self) -> Option<SitemapEntry> {
        self.queue.lock().await.pop_front()
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(canonical: &str, source: &str) -> SitemapEntry {
        SitemapEntry {
            raw: canonical.to_string(),
            canonical: canonical.to_string(),
            sitemap_source: source.to_string(),
            type_hint: None,
        }
    }

    #[tokio::test]
    async fn dedups_by_canonical() {
        let queue = CrawlQueue::new();
        assert!(queue.push(entry("https://ex.com/a", "post-sitemap.xml")).await);
        assert!(!queue.push(entry("https://ex.com/a", "page-sitemap.xml")).await);
        assert_eq!(queue.len().await, 1);

        let popped = queue.pop().await.unwrap();
        assert_eq!(popped.sitemap_source, "post-sitemap.xml");
        assert!(queue.pop().await.is_none());
    }

    #[tokio::test]
    async fn mark_seen_blocks_later_push() {
        let queue = CrawlQueue::new();
        assert!(queue.mark_seen("https://ex.com/skip"));
        assert!(!queue.push(entry("https://ex.com/skip", "s.xml")).await);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn batch_push_counts_fresh_only() {
        let queue = CrawlQueue::new();
        let added = queue
            .push_batch(vec![
                entry("https://ex.com/a", "s.xml"),
                entry("https://ex.com/b", "s.xml"),
                entry("https://ex.com/a", "s.xml"),
            ])
            .await;
        assert_eq!(added, 2);
        assert_eq!(queue.len().await, 2);
    }
}
