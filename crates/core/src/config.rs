use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub fetch: FetchSettings,
    pub database: DatabaseConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    /// Parallel crawl workers.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Run-wide successful-fetch cap. Overridable per run from the CLI.
    #[serde(default = "default_max_pages")]
    pub max_pages: u64,
    /// Emit a progress record every N crawled pages.
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
    #[serde(default = "default_max_body_size_mb")]
    pub max_body_size_mb: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FetchSettings {
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub postgres_url: String,
    #[serde(default)]
    pub max_connections: Option<u32>,
}

fn default_workers() -> usize {
    10
}
fn default_max_pages() -> u64 {
    10_000
}
fn default_progress_interval() -> u64 {
    10
}
fn default_max_body_size_mb() -> usize {
    10
}
fn default_request_timeout() -> u64 {
    60
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; rv:128.0) Gecko/20100101 Firefox/128.0".to_string()
}
