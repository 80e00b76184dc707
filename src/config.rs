use anyhow::{Context, Result};
use std::{str::FromStr, time::Duration};

#[derive(Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // dev guild for instant command registration

    // Playback
    pub default_volume: f32,
    pub idle_timeout: Duration,
    pub max_queue_size: usize,
    pub max_playlist_size: usize,
    pub resolve_concurrency: usize,

    // Sources
    pub ytdlp_path: String,
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,

    // Supervisor
    pub restart_backoff: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let config = Self {
            discord_token: var("DISCORD_TOKEN")
                .or_else(|| var("DISCORD_BOT_TOKEN"))
                .context("DISCORD_TOKEN is not set")?,
            guild_id: var("GUILD_ID")
                .map(|id| parse_var("GUILD_ID", &id))
                .transpose()?,

            default_volume: parse_or(&var, "DEFAULT_VOLUME", defaults.default_volume)?,
            idle_timeout: duration_or(&var, "IDLE_TIMEOUT", defaults.idle_timeout)?,
            max_queue_size: parse_or(&var, "MAX_QUEUE_SIZE", defaults.max_queue_size)?,
            max_playlist_size: parse_or(&var, "MAX_PLAYLIST_SIZE", defaults.max_playlist_size)?,
            resolve_concurrency: parse_or(&var, "RESOLVE_CONCURRENCY", defaults.resolve_concurrency)?,

            ytdlp_path: var("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
            spotify_client_id: var("SPOTIFY_CLIENT_ID"),
            spotify_client_secret: var("SPOTIFY_CLIENT_SECRET"),

            restart_backoff: duration_or(&var, "RESTART_BACKOFF", defaults.restart_backoff)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be in (0.0, 1.0]
    /// - Queue, playlist and concurrency limits must be > 0
    /// - Idle timeout must be > 0
    pub fn validate(&self) -> Result<()> {
        if !(self.default_volume > 0.0 && self.default_volume <= 1.0) {
            anyhow::bail!("Default volume must be in (0.0, 1.0], got: {}", self.default_volume);
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.max_playlist_size == 0 {
            anyhow::bail!("Max playlist size must be greater than 0");
        }

        if self.resolve_concurrency == 0 {
            anyhow::bail!("Resolve concurrency must be greater than 0");
        }

        if self.idle_timeout.is_zero() {
            anyhow::bail!("Idle timeout must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    /// The token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: commands {}\n  \
            Playback: {}% vol, {} idle timeout\n  \
            Limits: {} queue, {} playlist, {} parallel lookups\n  \
            Sources: yt-dlp at {}, Spotify {}",
            self.guild_id
                .map_or("global".to_string(), |id| format!("on guild {}", id)),
            (self.default_volume * 100.0).round() as u32,
            humantime::format_duration(self.idle_timeout),
            self.max_queue_size,
            self.max_playlist_size,
            self.resolve_concurrency,
            self.ytdlp_path,
            if self.spotify_enabled() { "enabled" } else { "disabled" },
        )
    }

    pub fn spotify_enabled(&self) -> bool {
        self.spotify_client_id.is_some() && self.spotify_client_secret.is_some()
    }
}

fn parse_var<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {}: {:?}", key, value))
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match var(key) {
        Some(value) => parse_var(key, &value),
        None => Ok(default),
    }
}

fn duration_or(var: &impl Fn(&str) -> Option<String>, key: &str, default: Duration) -> Result<Duration> {
    match var(key) {
        Some(value) => humantime::parse_duration(value.trim())
            .with_context(|| format!("Invalid duration for {}: {:?}", key, value)),
        None => Ok(default),
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            discord_token: String::new(),
            guild_id: None,

            default_volume: 0.5,
            idle_timeout: Duration::from_secs(180),
            max_queue_size: 1000,
            max_playlist_size: 100,
            resolve_concurrency: 4,

            ytdlp_path: "yt-dlp".to_string(),
            spotify_client_id: None,
            spotify_client_secret: None,

            restart_backoff: Duration::from_secs(15),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("DISCORD_TOKEN", "token")]).unwrap();
        assert_eq!(config.default_volume, 0.5);
        assert_eq!(config.idle_timeout, Duration::from_secs(180));
        assert_eq!(config.max_queue_size, 1000);
        assert_eq!(config.max_playlist_size, 100);
        assert_eq!(config.resolve_concurrency, 4);
        assert_eq!(config.ytdlp_path, "yt-dlp");
        assert_eq!(config.restart_backoff, Duration::from_secs(15));
        assert_eq!(config.guild_id, None);
        assert!(!config.spotify_enabled());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("DISCORD_BOT_TOKEN", "token"),
            ("GUILD_ID", "1234"),
            ("IDLE_TIMEOUT", "5m"),
            ("DEFAULT_VOLUME", "0.8"),
            ("SPOTIFY_CLIENT_ID", "id"),
            ("SPOTIFY_CLIENT_SECRET", "secret"),
        ])
        .unwrap();

        assert_eq!(config.discord_token, "token");
        assert_eq!(config.guild_id, Some(1234));
        assert_eq!(config.idle_timeout, Duration::from_secs(300));
        assert_eq!(config.default_volume, 0.8);
        assert!(config.spotify_enabled());
    }

    #[test]
    fn test_missing_token_and_bad_values() {
        assert!(load(&[]).is_err());
        assert!(load(&[("DISCORD_TOKEN", "t"), ("DEFAULT_VOLUME", "1.5")]).is_err());
        assert!(load(&[("DISCORD_TOKEN", "t"), ("MAX_QUEUE_SIZE", "0")]).is_err());
        assert!(load(&[("DISCORD_TOKEN", "t"), ("IDLE_TIMEOUT", "soon")]).is_err());
    }

    #[test]
    fn test_summary_hides_token() {
        let config = load(&[("DISCORD_TOKEN", "super-secret")]).unwrap();
        let summary = config.summary();
        assert!(!summary.contains("super-secret"));
        assert!(summary.contains("3m"));
    }
}
