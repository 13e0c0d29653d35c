//! YouTube results-page lookup.
//!
//! Fetches the public results page for a query and reads the first video
//! identifier out of the embedded page data. No API key is involved.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::config::SearchConfig;
use crate::engine::VideoEngine;
use crate::error::SearchError;
use crate::http;
use crate::types::VideoMatch;

static VIDEO_ID_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""videoId"\s*:\s*"([A-Za-z0-9_-]{11})""#)
        .unwrap_or_else(|e| unreachable!("video id pattern is valid: {e}"))
});

static WATCH_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"watch\?v=([A-Za-z0-9_-]{11})")
        .unwrap_or_else(|e| unreachable!("watch link pattern is valid: {e}"))
});

/// Scraper for the YouTube results page.
pub struct YouTubeEngine;

impl YouTubeEngine {
    /// Build the results-page URL for `query` under `base_url`.
    pub fn results_url(base_url: &str, query: &str) -> Result<Url, SearchError> {
        let mut url = Url::parse(base_url)
            .and_then(|base| base.join("/results"))
            .map_err(|e| SearchError::Parse(format!("invalid base URL: {e}")))?;
        url.query_pairs_mut().append_pair("search_query", query);
        Ok(url)
    }

    /// Build the watch-page URL for a video identifier.
    pub fn watch_url(base_url: &str, video_id: &str) -> Result<Url, SearchError> {
        let mut url = Url::parse(base_url)
            .and_then(|base| base.join("/watch"))
            .map_err(|e| SearchError::Parse(format!("invalid base URL: {e}")))?;
        url.query_pairs_mut().append_pair("v", video_id);
        Ok(url)
    }
}

impl VideoEngine for YouTubeEngine {
    async fn lookup(&self, query: &str, config: &SearchConfig) -> Result<VideoMatch, SearchError> {
        tracing::trace!(query, "YouTube lookup");

        let results = Self::results_url(&config.base_url, query)?;
        let client = http::build_client(config)?;

        let response = client
            .get(results.clone())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SearchError::Timeout(format!("exceeded {}s limit", config.timeout_seconds))
                } else {
                    SearchError::Http(format!("YouTube request failed: {e}"))
                }
            })?
            .error_for_status()
            .map_err(|e| SearchError::Http(format!("YouTube HTTP error: {e}")))?;

        let html = response
            .text()
            .await
            .map_err(|e| SearchError::Http(format!("YouTube response read failed: {e}")))?;

        tracing::trace!(bytes = html.len(), "YouTube response received");

        match extract_video_id(&html) {
            Some(id) => {
                let url = Self::watch_url(&config.base_url, &id)?;
                Ok(VideoMatch {
                    video_id: Some(id),
                    url: url.into(),
                })
            }
            None => {
                tracing::debug!("no video id on results page, falling back to results link");
                Ok(VideoMatch {
                    video_id: None,
                    url: results.into(),
                })
            }
        }
    }

    fn name(&self) -> &'static str {
        "YouTube"
    }
}

/// Pull the first eleven-character video identifier out of a results page.
///
/// Prefers the structured `"videoId":"…"` field and falls back to the first
/// `watch?v=` link.
pub fn extract_video_id(html: &str) -> Option<String> {
    VIDEO_ID_FIELD
        .captures(html)
        .or_else(|| WATCH_LINK.captures(html))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_owned())
}
