//! # laila-search
//!
//! Keyless video lookup for Laila's `play_youtube` command.
//!
//! The crate fetches a public results page and pulls the first video
//! identifier out of it. There are no API keys and no listeners.
//!
//! ## Behaviour
//!
//! - One results-page request per lookup, with a rotating browser User-Agent
//! - First `"videoId"` field wins, then the first `watch?v=` link
//! - No identifier on the page falls back to the results link itself
//! - Queries are logged only at trace level

pub mod config;
pub mod engine;
pub mod engines;
pub mod error;
pub mod http;
pub mod types;

pub use config::SearchConfig;
pub use engine::VideoEngine;
pub use engines::YouTubeEngine;
pub use error::{Result, SearchError};
pub use types::VideoMatch;

/// Find a video to play for a free-text query.
///
/// # Errors
///
/// Returns [`SearchError::Config`] for an invalid configuration or an
/// empty query, and [`SearchError::Http`]/[`SearchError::Timeout`] when the
/// results page cannot be fetched.
///
/// # Examples
///
/// ```no_run
/// # async fn example() -> laila_search::Result<()> {
/// let found = laila_search::find_video("lofi beats", &laila_search::SearchConfig::default()).await?;
/// println!("{}", found.url);
/// # Ok(())
/// # }
/// ```
pub async fn find_video(query: &str, config: &SearchConfig) -> Result<VideoMatch> {
    config.validate()?;
    let query = query.trim();
    if query.is_empty() {
        return Err(SearchError::Config("query must not be empty".into()));
    }
    YouTubeEngine.lookup(query, config).await
}
