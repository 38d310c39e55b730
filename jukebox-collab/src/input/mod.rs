use async_trait::async_trait;
use thiserror::Error;

mod youtube;
pub use youtube::YouTubeResolver;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("No video matched the query")]
    NotFound,

    #[error("Live broadcasts cannot be queued")]
    LiveBroadcast,

    #[error("Metadata resolver quota is exhausted")]
    QuotaExhausted,

    #[error("Metadata resolver did not respond: {0}")]
    Unavailable(String),

    #[error("Failed to parse resolver response: {0}")]
    ParseError(String),
}

/// Normalized track metadata returned by a resolver.
#[derive(Debug, Clone)]
pub struct ResolvedTrack {
    /// The resolver's canonical id for the media
    pub video_id: String,
    pub title: String,
    /// The attributed creator, a channel name in the YouTube case
    pub channel: String,
    pub thumbnail: String,
    /// Duration in whole seconds
    pub duration: u32,
    /// Whether the resolver classifies the media as music
    pub is_music: bool,
}

/// Represents a service that resolves a free-text query or URL into
/// track metadata. Resolution always happens before a room actor is
/// asked to mutate state, so a slow lookup can never stall a room.
#[async_trait]
pub trait TrackResolver: Send + Sync + 'static {
    async fn resolve(&self, query: &str) -> Result<ResolvedTrack, ResolveError>;
}
