//! Static HTTP fetch layer. Redirects are followed by the client; only the
//! terminal URL is surfaced, per the fetch contract. Browser-mode fetching
//! would be a second `PageFetcher` implementation behind the same seam.

use async_trait::async_trait;
use reqwest::redirect::Policy;
use tracing::debug;
use url::Url;

use siteloom_core::{CrawlError, FetchConfig, FetchMode, FetchResponse, PageFetcher};

const MAX_REDIRECTS: usize = 10;

pub struct StaticFetcher {
    client: reqwest::Client,
}

impl StaticFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, CrawlError> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .redirect(Policy::limited(MAX_REDIRECTS))
            .timeout(config.timeout)
            .build()
            .map_err(|e| CrawlError::Fetch(format!("client build failed: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for StaticFetcher {
    fn mode(&self) -> FetchMode {
        FetchMode::Static
    }

    async fn fetch(&self, url: &Url, config: &FetchConfig) -> Result<FetchResponse, CrawlError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(config.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CrawlError::Timeout(config.timeout.as_secs())
                } else {
                    CrawlError::Fetch(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let mut body = response
            .bytes()
            .await
            .map_err(|e| CrawlError::Fetch(format!("body read failed: {e}")))?
            .to_vec();
        if body.len() > config.max_body_size {
            debug!(url = %url, size = body.len(), max = config.max_body_size, "truncating body");
            body.truncate(config.max_body_size);
        }

        Ok(FetchResponse {
            requested_url: url.clone(),
            final_url,
            status,
            body,
            content_type,
            fetched_at: chrono::Utc::now(),
        })
    }
}
