use serenity::model::id::GuildId;

/// Why a guild's voice session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `leave`, the stop button, or the bot being removed from the channel.
    Manual,
    /// Nothing started within the idle timeout.
    Idle,
}

/// Notifications emitted by the player toward the command layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerEvent {
    NowPlaying {
        guild_id: GuildId,
        title: String,
    },
    TrackFetchFailed {
        guild_id: GuildId,
        query: String,
        reason: String,
    },
    PlaybackFailed {
        guild_id: GuildId,
        title: String,
        reason: String,
    },
    Disconnected {
        guild_id: GuildId,
        reason: DisconnectReason,
    },
}

impl PlayerEvent {
    pub fn guild_id(&self) -> GuildId {
        match self {
            PlayerEvent::NowPlaying { guild_id, .. }
            | PlayerEvent::TrackFetchFailed { guild_id, .. }
            | PlayerEvent::PlaybackFailed { guild_id, .. }
            | PlayerEvent::Disconnected { guild_id, .. } => *guild_id,
        }
    }
}
