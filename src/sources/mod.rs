//! # Sources Module
//!
//! Track resolution for the player. Everything that talks to a search or
//! metadata provider lives here, behind the [`TrackResolver`] trait that the
//! playback core consumes:
//!
//! - [`youtube`] - yt-dlp backed search, page lookup and stream URL resolution
//! - [`spotify`] - Spotify Web API expansion of track/playlist/album links
//! - [`direct_url`] - recognition of links that are already playable streams
//!
//! Stream URLs handed out by yt-dlp expire, so a [`TrackRef`] only carries a
//! locator at enqueue time. The stream URL is resolved right before playback.

pub mod direct_url;
pub mod spotify;
pub mod youtube;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Config;

pub use spotify::SpotifyClient;
pub use youtube::YouTubeClient;

/// Errors reported by a track provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("no results found")]
    NoResults,

    #[error("provider error: {0}")]
    Provider(String),
}

/// A track waiting in (or playing from) a guild queue.
///
/// Title and locator never change once the track is enqueued. The stream URL
/// is filled in lazily by the player just before the track starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackRef {
    title: String,
    locator: String,
    resolved_stream_url: Option<String>,
}

impl TrackRef {
    pub fn new(title: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            locator: locator.into(),
            resolved_stream_url: None,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Search query, page URL or direct stream URL.
    pub fn locator(&self) -> &str {
        &self.locator
    }

    pub fn resolved_stream_url(&self) -> Option<&str> {
        self.resolved_stream_url.as_deref()
    }

    pub fn with_stream_url(mut self, stream_url: impl Into<String>) -> Self {
        self.resolved_stream_url = Some(stream_url.into());
        self
    }

    pub(crate) fn set_stream_url(&mut self, stream_url: String) {
        self.resolved_stream_url = Some(stream_url);
    }
}

/// Capability the playback core uses to turn user input into playable tracks.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Finds the single best match for a query or page URL.
    async fn search(&self, query: &str) -> Result<TrackRef, ResolveError>;

    /// Expands an external playlist/album/track link into ordered search queries.
    ///
    /// Returns an empty list when the input is not a recognised external link;
    /// the caller then treats the input itself as one query.
    async fn expand(&self, input: &str) -> Vec<String>;

    /// Resolves a direct, time-limited stream URL for a track about to play.
    async fn resolve_stream(&self, track: &TrackRef) -> Result<String, ResolveError>;
}

/// Returns `true` for absolute http(s) URLs.
pub fn is_url(input: &str) -> bool {
    url::Url::parse(input)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

/// Resolver combining Spotify expansion, yt-dlp search and direct links.
pub struct SmartResolver {
    youtube: YouTubeClient,
    spotify: Option<SpotifyClient>,
    max_playlist_size: usize,
}

impl SmartResolver {
    pub fn new(youtube: YouTubeClient, spotify: Option<SpotifyClient>, max_playlist_size: usize) -> Self {
        Self {
            youtube,
            spotify,
            max_playlist_size,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let spotify = match (&config.spotify_client_id, &config.spotify_client_secret) {
            (Some(id), Some(secret)) => {
                info!("🎧 Spotify expansion enabled");
                Some(SpotifyClient::new(id.clone(), secret.clone()))
            }
            _ => {
                warn!("🎧 Spotify credentials not found, Spotify links will be searched as text");
                None
            }
        };

        Self::new(
            YouTubeClient::new(config.ytdlp_path.clone()),
            spotify,
            config.max_playlist_size,
        )
    }
}

#[async_trait]
impl TrackResolver for SmartResolver {
    async fn search(&self, query: &str) -> Result<TrackRef, ResolveError> {
        if direct_url::is_direct_stream(query) {
            debug!("🎯 Direct stream link: {}", query);
            return Ok(TrackRef::new(direct_url::title_from_url(query), query).with_stream_url(query));
        }

        if is_url(query) {
            return self.youtube.lookup(query).await;
        }

        self.youtube.search(query).await
    }

    async fn expand(&self, input: &str) -> Vec<String> {
        let expanded = if spotify::is_spotify_url(input) {
            match &self.spotify {
                Some(client) => client.expand(input, self.max_playlist_size).await,
                None => Ok(Vec::new()),
            }
        } else if YouTubeClient::is_playlist_url(input) {
            self.youtube
                .playlist_entries(input, self.max_playlist_size)
                .await
        } else {
            Ok(Vec::new())
        };

        match expanded {
            Ok(mut queries) => {
                queries.truncate(self.max_playlist_size);
                if !queries.is_empty() {
                    info!("📋 Expanded {} into {} entries", input, queries.len());
                }
                queries
            }
            Err(e) => {
                warn!("⚠️ Could not expand {}: {}", input, e);
                Vec::new()
            }
        }
    }

    async fn resolve_stream(&self, track: &TrackRef) -> Result<String, ResolveError> {
        if let Some(stream_url) = track.resolved_stream_url() {
            return Ok(stream_url.to_string());
        }

        if direct_url::is_direct_stream(track.locator()) {
            return Ok(track.locator().to_string());
        }

        self.youtube.stream_url(track.locator()).await
    }
}
