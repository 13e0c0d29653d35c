//! Core lookup result type.

use serde::{Deserialize, Serialize};

/// Outcome of looking up a video for a free-text query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoMatch {
    /// Eleven-character identifier of the first result, when one was found.
    pub video_id: Option<String>,
    /// Link to open: the watch page when `video_id` is set, otherwise the
    /// results page itself.
    pub url: String,
}

impl VideoMatch {
    /// Whether the match points at a specific video rather than a results page.
    pub fn is_direct(&self) -> bool {
        self.video_id.is_some()
    }
}
