//! Per-run counters, shared across workers with atomic increments, and the
//! end-of-run summary.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug)]
pub struct RunStats {
    pub discovered: AtomicU64,
    pub crawled: AtomicU64,
    pub skipped: AtomicU64,
    pub redirects: AtomicU64,
    pub errors: AtomicU64,
    started: Instant,
}

impl Default for RunStats {
    fn default() -> Self {
        Self::new()
    }
}

impl RunStats {
    pub fn new() -> Self {
        Self {
            discovered: AtomicU64::new(0),
            crawled: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            redirects: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            started: Instant::now(),
        }
    }

    pub fn crawled_count(&self) -> u64 {
        self.crawled.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> (u64, u64, u64, u64, u64) {
        (
            self.discovered.load(Ordering::Relaxed),
            self.crawled.load(Ordering::Relaxed),
            self.skipped.load(Ordering::Relaxed),
            self.redirects.load(Ordering::Relaxed),
            self.errors.load(Ordering::Relaxed),
        )
    }

    pub fn print_summary(&self) {
        let (discovered, crawled, skipped, redirects, errors) = self.snapshot();
        let elapsed = self.started.elapsed();
        println!("\n╔══════════════════════════════════════════════╗");
        println!("║             Crawl Run Summary                ║");
        println!("╠══════════════════════════════════════════════╣");
        println!("║ URLs discovered:    {:>20}    ║", discovered);
        println!("║ Pages crawled:      {:>20}    ║", crawled);
        println!("║ Pages skipped:      {:>20}    ║", skipped);
        println!("║ Redirects:          {:>20}    ║", redirects);
        println!("║ Errors:             {:>20}    ║", errors);
        println!("║ Duration:           {:>19.1}s    ║", elapsed.as_secs_f64());
        println!("╚══════════════════════════════════════════════╝\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn counters_accumulate_independently() {
        let stats = RunStats::new();
        stats.discovered.store(5, Ordering::Relaxed);
        stats.crawled.fetch_add(1, Ordering::Relaxed);
        stats.crawled.fetch_add(1, Ordering::Relaxed);
        stats.errors.fetch_add(1, Ordering::Relaxed);
        assert_eq!(stats.snapshot(), (5, 2, 0, 0, 1));
        assert_eq!(stats.crawled_count(), 2);
    }
}
