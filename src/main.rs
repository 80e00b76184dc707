use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info, warn};

mod audio;
mod bot;
mod config;
mod sources;
mod ui;

use crate::audio::{driver::SongbirdConnector, PlaybackSequencer, PlayerSettings};
use crate::bot::JukeboxBot;
use crate::config::Config;
use crate::sources::SmartResolver;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("jukebox=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Starting Jukebox v{}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(Config::load()?);

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    info!("⚙️ {}", config.summary());

    loop {
        let session = tokio::spawn(run_bot(Arc::clone(&config)));
        let abort = session.abort_handle();

        tokio::select! {
            outcome = session => match outcome {
                Ok(Ok(())) => warn!("⚠️ Discord client stopped"),
                Ok(Err(e)) => error!("❌ Discord client failed: {:?}", e),
                Err(e) => error!("💥 Discord client crashed: {}", e),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("⚠️ Shutdown signal received");
                abort.abort();
                break;
            }
        }

        info!(
            "🔄 Restarting in {}",
            humantime::format_duration(config.restart_backoff)
        );

        tokio::select! {
            _ = tokio::time::sleep(config.restart_backoff) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("⚠️ Shutdown signal received");
                break;
            }
        }
    }

    info!("👋 Bye");
    Ok(())
}

/// Builds a fresh client with its own playback core and runs it until the
/// gateway connection ends.
async fn run_bot(config: Arc<Config>) -> Result<()> {
    let manager = Songbird::serenity();
    let connector = Arc::new(SongbirdConnector::new(Arc::clone(&manager))?);
    let resolver = Arc::new(SmartResolver::from_config(&config));

    let (player, player_events) =
        PlaybackSequencer::new(PlayerSettings::from(config.as_ref()), resolver, connector);

    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;
    let handler = JukeboxBot::new(Arc::clone(&config), player.clone(), player_events);

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(manager)
        .await?;

    info!("🚀 Connecting to Discord");
    let outcome = client.start().await;

    player.shutdown();
    outcome?;

    Ok(())
}

/// Checks that the external tools playback depends on are installed.
async fn health_check(config: &Config) -> Result<()> {
    let yt_dlp = async_process::Command::new(&config.ytdlp_path)
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = async_process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("yt-dlp or ffmpeg is missing");
    }
}
