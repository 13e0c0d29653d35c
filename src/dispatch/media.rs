//! Video lookup and platform opener for `play_youtube`.

use async_trait::async_trait;
use laila_search::{SearchConfig, SearchError};

/// Turns a free-text query into a link to open.
#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> Result<String, SearchError>;
}

/// [`MediaResolver`] backed by `laila-search`.
#[derive(Debug, Clone, Default)]
pub struct SearchResolver {
    config: SearchConfig,
}

impl SearchResolver {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl MediaResolver for SearchResolver {
    async fn resolve(&self, query: &str) -> Result<String, SearchError> {
        let found = laila_search::find_video(query, &self.config).await?;
        tracing::debug!(direct = found.is_direct(), "video lookup finished");
        Ok(found.url)
    }
}

/// Shell line that opens `url` with the platform's default handler.
pub fn opener_command(url: &str) -> String {
    let opener = if cfg!(target_os = "macos") {
        "open"
    } else {
        "xdg-open"
    };
    format!("{opener} '{}'", url.replace('\'', "'\\''"))
}
