//! Video lookup backends.

pub mod youtube;

pub use youtube::YouTubeEngine;
