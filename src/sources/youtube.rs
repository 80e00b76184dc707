use async_process::Command;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use super::{ResolveError, TrackRef};

static YOUTUBE_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(https?://)?(www\.|m\.)?(youtube\.com/(watch\?v=|embed/|v/|playlist\?)|youtu\.be/|music\.youtube\.com/)")
        .expect("valid youtube regex")
});

static PLAYLIST_PARAM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]list=[\w-]+").expect("valid playlist regex"));

/// Client for yt-dlp.
pub struct YouTubeClient {
    binary: String,
    // yt-dlp gets throttled quickly when hammered in parallel
    rate_limiter: Semaphore,
}

/// One line of `--dump-json` output. Flat entries only carry `url`, full
/// lookups carry `webpage_url`.
#[derive(Debug, Deserialize)]
struct YtDlpEntry {
    id: Option<String>,
    title: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
}

impl YtDlpEntry {
    fn locator(&self) -> Option<String> {
        self.webpage_url
            .clone()
            .or_else(|| self.url.clone())
            .or_else(|| {
                self.id
                    .as_ref()
                    .map(|id| format!("https://www.youtube.com/watch?v={}", id))
            })
    }

    fn into_track(self) -> Option<TrackRef> {
        let locator = self.locator()?;
        let title = self.title.unwrap_or_else(|| "Untitled".to_string());
        Some(TrackRef::new(title, locator))
    }
}

impl YouTubeClient {
    pub fn new(binary: String) -> Self {
        Self {
            binary,
            rate_limiter: Semaphore::new(3),
        }
    }

    /// Searches YouTube and returns the first hit.
    pub async fn search(&self, query: &str) -> Result<TrackRef, ResolveError> {
        info!("🔍 Searching YouTube: {}", query);

        let search_query = format!("ytsearch1:{}", query);
        let stdout = self
            .run(&[
                "--flat-playlist",
                "--dump-json",
                "--skip-download",
                "--no-warnings",
                &search_query,
            ])
            .await?;

        parse_entries(&stdout)
            .into_iter()
            .next()
            .ok_or(ResolveError::NoResults)
    }

    /// Looks up a single page URL without searching.
    pub async fn lookup(&self, url: &str) -> Result<TrackRef, ResolveError> {
        debug!("📊 Looking up: {}", url);

        let stdout = self
            .run(&["--no-playlist", "--flat-playlist", "--dump-json", "--no-warnings", url])
            .await?;

        parse_entries(&stdout)
            .into_iter()
            .next()
            .ok_or(ResolveError::NoResults)
    }

    /// Lists the entry URLs of a YouTube playlist, in playlist order.
    pub async fn playlist_entries(&self, url: &str, max_items: usize) -> Result<Vec<String>, ResolveError> {
        info!("📋 Reading playlist: {}", url);

        let playlist_end = max_items.to_string();
        let stdout = self
            .run(&[
                "--flat-playlist",
                "--dump-json",
                "--playlist-end",
                &playlist_end,
                "--no-warnings",
                url,
            ])
            .await?;

        Ok(parse_entries(&stdout)
            .into_iter()
            .map(|track| track.locator().to_string())
            .collect())
    }

    /// Resolves the direct audio stream URL for a page URL.
    pub async fn stream_url(&self, locator: &str) -> Result<String, ResolveError> {
        debug!("🎵 Resolving stream URL for: {}", locator);

        let stdout = self
            .run(&["--no-playlist", "-f", "bestaudio/best", "--get-url", "--no-warnings", locator])
            .await?;

        stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ResolveError::Provider("yt-dlp returned no stream URL".to_string()))
    }

    pub fn is_youtube_url(url: &str) -> bool {
        YOUTUBE_URL.is_match(url)
    }

    pub fn is_playlist_url(url: &str) -> bool {
        Self::is_youtube_url(url) && PLAYLIST_PARAM.is_match(url)
    }

    async fn run(&self, args: &[&str]) -> Result<String, ResolveError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| ResolveError::Provider(e.to_string()))?;

        let output = Command::new(&self.binary)
            .args(args)
            .output()
            .await
            .map_err(|e| ResolveError::Provider(format!("failed to run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ResolveError::Provider(format!("yt-dlp error: {}", stderr.trim())));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Parses `--dump-json` output, one JSON document per line. Unparseable lines are skipped.
fn parse_entries(stdout: &str) -> Vec<TrackRef> {
    stdout
        .lines()
        .filter_map(|line| serde_json::from_str::<YtDlpEntry>(line).ok())
        .filter_map(YtDlpEntry::into_track)
        .collect()
}
