//! Trait definition for pluggable video lookup backends.

use crate::config::SearchConfig;
use crate::error::SearchError;
use crate::types::VideoMatch;

/// A video lookup backend.
///
/// Implementors build the results URL for a query, fetch it, and pick the
/// first playable video. When no identifier can be found the backend falls
/// back to the results link rather than failing.
///
/// All implementations must be `Send + Sync`.
pub trait VideoEngine: Send + Sync {
    /// Look up the best video for `query`.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError`] if the request fails or times out.
    fn lookup(
        &self,
        query: &str,
        config: &SearchConfig,
    ) -> impl std::future::Future<Output = Result<VideoMatch, SearchError>> + Send;

    /// Human-readable backend name used in logs.
    fn name(&self) -> &'static str;
}
