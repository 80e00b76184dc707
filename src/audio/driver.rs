use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{HttpRequest, Input},
    tracks::{PlayMode, Track, TrackHandle},
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info, warn};

use super::{
    error::{MusicError, MusicResult},
    source::{AudioSource, EndNotifier, TrackOutcome},
    voice::{VoiceConnector, VoiceSession},
};

/// Opens songbird voice calls.
pub struct SongbirdConnector {
    manager: Arc<Songbird>,
    http: reqwest::Client,
}

impl SongbirdConnector {
    pub fn new(manager: Arc<Songbird>) -> MusicResult<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| MusicError::Connection(e.to_string()))?;

        Ok(Self { manager, http })
    }
}

#[async_trait]
impl VoiceConnector for SongbirdConnector {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<Arc<dyn VoiceSession>> {
        let call = self.manager.join(guild_id, channel_id).await.map_err(|e| {
            error!("❌ Voice join failed in guild {}: {:?}", guild_id, e);
            MusicError::Connection(e.to_string())
        })?;

        if let Err(e) = call.lock().await.deafen(true).await {
            warn!("⚠️ Could not self-deafen in guild {}: {:?}", guild_id, e);
        }

        Ok(Arc::new(SongbirdSession {
            guild_id,
            manager: Arc::clone(&self.manager),
            call,
            channel: Mutex::new(channel_id),
            http: self.http.clone(),
        }))
    }
}

/// One guild's songbird call.
pub struct SongbirdSession {
    guild_id: GuildId,
    manager: Arc<Songbird>,
    call: Arc<tokio::sync::Mutex<songbird::Call>>,
    channel: Mutex<ChannelId>,
    http: reqwest::Client,
}

#[async_trait]
impl VoiceSession for SongbirdSession {
    fn channel_id(&self) -> ChannelId {
        *self.channel.lock()
    }

    async fn move_to(&self, channel_id: ChannelId) -> MusicResult<()> {
        // joining again with an existing call moves it
        self.manager
            .join(self.guild_id, channel_id)
            .await
            .map_err(|e| MusicError::Connection(e.to_string()))?;

        *self.channel.lock() = channel_id;
        Ok(())
    }

    async fn start(&self, stream_url: &str, volume: f32, notifier: EndNotifier) -> MusicResult<Box<dyn AudioSource>> {
        let input: Input = HttpRequest::new(self.http.clone(), stream_url.to_string()).into();
        let track = Track::from(input).volume(volume);

        let handle = self.call.lock().await.play(track);

        for event in [TrackEvent::End, TrackEvent::Error] {
            let relay = TrackEndRelay { notifier: notifier.clone() };
            if let Err(e) = handle.add_event(Event::Track(event), relay) {
                // an unobserved track would never advance the queue
                if let Err(stop_err) = handle.stop() {
                    debug!("Track already finished: {}", stop_err);
                }
                return Err(MusicError::Playback(e.to_string()));
            }
        }

        debug!(
            "🎧 Stream started in guild {} (generation {})",
            self.guild_id,
            notifier.generation()
        );
        Ok(Box::new(SongbirdSource { handle }))
    }

    async fn disconnect(&self) {
        match self.manager.remove(self.guild_id).await {
            Ok(()) => info!("👋 Left voice in guild {}", self.guild_id),
            // already gone, e.g. kicked from the channel
            Err(e) => debug!("Voice call of guild {} already closed: {:?}", self.guild_id, e),
        }
    }
}

/// Forwards a track's end or error to the player, then deregisters itself.
struct TrackEndRelay {
    notifier: EndNotifier,
}

#[async_trait]
impl VoiceEventHandler for TrackEndRelay {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let outcome = match ctx {
            EventContext::Track(tracks) => tracks
                .iter()
                .find_map(|(state, _)| match &state.playing {
                    PlayMode::Errored(e) => Some(TrackOutcome::Failed(format!("{:?}", e))),
                    _ => None,
                })
                .unwrap_or(TrackOutcome::Completed),
            _ => TrackOutcome::Completed,
        };

        self.notifier.notify(outcome);
        Some(Event::Cancel)
    }
}

struct SongbirdSource {
    handle: TrackHandle,
}

fn control_error(e: songbird::error::ControlError) -> MusicError {
    MusicError::Playback(e.to_string())
}

impl AudioSource for SongbirdSource {
    fn pause(&self) -> MusicResult<()> {
        self.handle.pause().map_err(control_error)
    }

    fn resume(&self) -> MusicResult<()> {
        self.handle.play().map_err(control_error)
    }

    fn set_volume(&self, volume: f32) -> MusicResult<()> {
        self.handle.set_volume(volume).map_err(control_error)
    }

    fn stop(&self) {
        if let Err(e) = self.handle.stop() {
            debug!("Track already finished: {}", e);
        }
    }
}
