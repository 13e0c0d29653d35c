//! Client for the YouTube results page.
//!
//! The page only embeds its video data for clients that look like a browser
//! that has already been through the cookie consent screen, so every request
//! carries a browser User-Agent, the configured language and a consent
//! cookie.

use std::time::Duration;

use rand::seq::SliceRandom;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, COOKIE, HeaderMap, HeaderValue};

use crate::config::SearchConfig;
use crate::error::SearchError;

/// Desktop browser User-Agents the results page serves full data to.
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:133.0) Gecko/20100101 Firefox/133.0",
];

/// Skips the EU consent interstitial, which has no video data.
const CONSENT_COOKIE: &str = "CONSENT=YES+1";

/// Build a [`reqwest::Client`] for fetching results pages.
///
/// # Errors
///
/// Returns [`SearchError::Http`] if the client cannot be constructed.
pub fn build_client(config: &SearchConfig) -> Result<reqwest::Client, SearchError> {
    let ua = match config.user_agent {
        Some(ref custom) => custom.clone(),
        None => random_user_agent().to_owned(),
    };

    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .user_agent(ua)
        .default_headers(results_headers(config)?)
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| SearchError::Http(format!("failed to build HTTP client: {e}")))
}

/// Headers sent with every results-page request.
pub fn results_headers(config: &SearchConfig) -> Result<HeaderMap, SearchError> {
    let language = HeaderValue::from_str(config.language.trim())
        .map_err(|e| SearchError::Config(format!("language is not a valid header value: {e}")))?;

    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("text/html"));
    headers.insert(ACCEPT_LANGUAGE, language);
    headers.insert(COOKIE, HeaderValue::from_static(CONSENT_COOKIE));
    Ok(headers)
}

fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}
