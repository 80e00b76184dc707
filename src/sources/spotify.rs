use base64::{engine::general_purpose::STANDARD, Engine as _};
use regex::Regex;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{de::DeserializeOwned, Deserialize};
use std::{
    sync::LazyLock,
    time::{Duration, Instant},
};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::ResolveError;

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";

static SPOTIFY_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"open\.spotify\.com/(?:intl-[a-z]{2}(?:-[A-Za-z]{2})?/)?(track|playlist|album)/([A-Za-z0-9]+)")
        .expect("valid spotify regex")
});

/// Kind of Spotify link the bot knows how to expand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpotifyLink {
    Track(String),
    Playlist(String),
    Album(String),
}

pub fn is_spotify_url(input: &str) -> bool {
    input.contains("open.spotify.com")
}

pub fn parse_link(input: &str) -> Option<SpotifyLink> {
    let captures = SPOTIFY_LINK.captures(input)?;
    let id = captures[2].to_string();

    match &captures[1] {
        "track" => Some(SpotifyLink::Track(id)),
        "playlist" => Some(SpotifyLink::Playlist(id)),
        "album" => Some(SpotifyLink::Album(id)),
        _ => None,
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    name: String,
    #[serde(default)]
    artists: Vec<SpotifyArtist>,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistItem {
    track: Option<SpotifyTrack>,
}

#[derive(Debug, Deserialize)]
struct Page<T> {
    items: Vec<T>,
    next: Option<String>,
}

/// Search query for a Spotify track: `"{name} {first artist}"`.
fn track_query(track: &SpotifyTrack) -> Option<String> {
    let name = track.name.trim();
    if name.is_empty() {
        return None;
    }

    Some(match track.artists.first() {
        Some(artist) => format!("{} {}", name, artist.name),
        None => name.to_string(),
    })
}

/// Client-credentials Spotify Web API client. Only used to turn links into
/// search queries; audio always comes from the search provider.
pub struct SpotifyClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<AccessToken>>,
}

impl SpotifyClient {
    pub fn new(client_id: String, client_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id,
            client_secret,
            token: Mutex::new(None),
        }
    }

    /// Expands a Spotify link into search queries, in link order.
    ///
    /// Unrecognised Spotify links expand to nothing.
    pub async fn expand(&self, url: &str, limit: usize) -> Result<Vec<String>, ResolveError> {
        let Some(link) = parse_link(url) else {
            debug!("🎧 Not an expandable Spotify link: {}", url);
            return Ok(Vec::new());
        };

        info!("🎧 Expanding Spotify {:?}", link);

        match link {
            SpotifyLink::Track(id) => {
                let track: SpotifyTrack = self.get_json(&format!("{}/tracks/{}", API_BASE, id)).await?;
                Ok(track_query(&track).into_iter().collect())
            }
            SpotifyLink::Playlist(id) => {
                self.collect_queries(
                    format!("{}/playlists/{}/tracks?limit=100", API_BASE, id),
                    limit,
                    |item: PlaylistItem| item.track,
                )
                .await
            }
            SpotifyLink::Album(id) => {
                self.collect_queries(
                    format!("{}/albums/{}/tracks?limit=50", API_BASE, id),
                    limit,
                    |track: SpotifyTrack| Some(track),
                )
                .await
            }
        }
    }

    async fn collect_queries<T, F>(&self, mut url: String, limit: usize, to_track: F) -> Result<Vec<String>, ResolveError>
    where
        T: DeserializeOwned,
        F: Fn(T) -> Option<SpotifyTrack>,
    {
        let mut queries = Vec::new();

        loop {
            let page: Page<T> = self.get_json(&url).await?;
            queries.extend(
                page.items
                    .into_iter()
                    .filter_map(&to_track)
                    .filter_map(|track| track_query(&track)),
            );

            match page.next {
                Some(next) if queries.len() < limit => url = next,
                _ => break,
            }
        }

        queries.truncate(limit);
        Ok(queries)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ResolveError> {
        let token = self.access_token().await?;

        self.http
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(provider_error)?
            .json::<T>()
            .await
            .map_err(provider_error)
    }

    async fn access_token(&self) -> Result<String, ResolveError> {
        let mut cached = self.token.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        let credentials = STANDARD.encode(format!("{}:{}", self.client_id, self.client_secret));
        let response: TokenResponse = self
            .http
            .post(TOKEN_URL)
            .header(AUTHORIZATION, format!("Basic {}", credentials))
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials")
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(provider_error)?
            .json()
            .await
            .map_err(provider_error)?;

        debug!("🔑 Refreshed Spotify token, valid for {}s", response.expires_in);

        // refresh a minute early so a token never expires mid-expansion
        let lifetime = Duration::from_secs(response.expires_in.saturating_sub(60));
        let value = response.access_token;
        *cached = Some(AccessToken {
            value: value.clone(),
            expires_at: Instant::now() + lifetime,
        });

        Ok(value)
    }
}

fn provider_error(err: reqwest::Error) -> ResolveError {
    ResolveError::Provider(format!("spotify: {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_links() {
        assert_eq!(
            parse_link("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC?si=x"),
            Some(SpotifyLink::Track("4uLU6hMCjMI75M1A2tKUQC".into()))
        );
        assert_eq!(
            parse_link("https://open.spotify.com/intl-es/playlist/37i9dQZF1DXcBWIGoYBM5M"),
            Some(SpotifyLink::Playlist("37i9dQZF1DXcBWIGoYBM5M".into()))
        );
        assert_eq!(
            parse_link("https://open.spotify.com/album/1DFixLWuPkv3KT3TnV35m3"),
            Some(SpotifyLink::Album("1DFixLWuPkv3KT3TnV35m3".into()))
        );
        assert_eq!(parse_link("https://open.spotify.com/artist/0OdUWJ0sBjDrqHygGUXeCF"), None);
        assert!(is_spotify_url("https://open.spotify.com/artist/0OdUWJ0sBjDrqHygGUXeCF"));
    }

    #[test]
    fn test_playlist_page_to_queries() {
        let body = r#"{
            "items": [
                {"track": {"name": "One More Time", "artists": [{"name": "Daft Punk"}, {"name": "Romanthony"}]}},
                {"track": null},
                {"track": {"name": "Podcast Episode"}}
            ],
            "next": null
        }"#;

        let page: Page<PlaylistItem> = serde_json::from_str(body).unwrap();
        let queries: Vec<String> = page
            .items
            .into_iter()
            .filter_map(|item| item.track)
            .filter_map(|track| track_query(&track))
            .collect();

        assert_eq!(queries, vec!["One More Time Daft Punk", "Podcast Episode"]);
    }

    #[test]
    fn test_blank_track_names_are_dropped() {
        let track = SpotifyTrack {
            name: "  ".into(),
            artists: vec![SpotifyArtist { name: "Nobody".into() }],
        };
        assert_eq!(track_query(&track), None);
    }

    #[tokio::test]
    async fn test_unknown_link_expands_to_nothing() {
        let client = SpotifyClient::new("id".into(), "secret".into());
        let queries = client
            .expand("https://open.spotify.com/show/2MAi0BvDc6GTFvKFPXnkCL", 10)
            .await
            .unwrap();
        assert!(queries.is_empty());
    }
}
