use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;

use super::{
    error::MusicResult,
    source::{AudioSource, EndNotifier},
};

/// Opens voice sessions. One session per guild at a time.
#[async_trait]
pub trait VoiceConnector: Send + Sync {
    async fn connect(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<Arc<dyn VoiceSession>>;
}

/// A live connection to one guild's voice channel.
#[async_trait]
pub trait VoiceSession: Send + Sync {
    fn channel_id(&self) -> ChannelId;

    /// Moves the connection to another channel of the same guild.
    async fn move_to(&self, channel_id: ChannelId) -> MusicResult<()>;

    /// Starts streaming `stream_url` at `volume`. The returned source reports
    /// its single terminal event through `notifier`.
    async fn start(&self, stream_url: &str, volume: f32, notifier: EndNotifier) -> MusicResult<Box<dyn AudioSource>>;

    async fn disconnect(&self);
}
