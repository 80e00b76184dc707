use anyhow::Result;
use dashmap::DashMap;
use serenity::{
    builder::CreateMessage,
    http::Http,
    model::id::{ChannelId, GuildId, MessageId},
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{DisconnectReason, PlaybackSequencer, PlaybackState, PlayerEvent},
    ui::{buttons, embeds},
};

/// Where each guild's player notifications go: the text channel playback was
/// last requested from, and the current now-playing message there.
#[derive(Default)]
pub struct Announcements {
    text_channels: DashMap<GuildId, ChannelId>,
    now_playing: DashMap<GuildId, (ChannelId, MessageId)>,
}

impl Announcements {
    pub fn bind_channel(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.text_channels.insert(guild_id, channel_id);
    }

    pub fn channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.text_channels.get(&guild_id).map(|c| *c)
    }

    fn take_now_playing(&self, guild_id: GuildId) -> Option<(ChannelId, MessageId)> {
        self.now_playing.remove(&guild_id).map(|(_, message)| message)
    }

    fn set_now_playing(&self, guild_id: GuildId, channel_id: ChannelId, message_id: MessageId) {
        self.now_playing.insert(guild_id, (channel_id, message_id));
    }

    fn forget(&self, guild_id: GuildId) {
        self.text_channels.remove(&guild_id);
    }
}

/// Forwards player notifications to Discord until the player goes away.
pub async fn forward_player_events(
    http: Arc<Http>,
    player: PlaybackSequencer,
    announcements: Arc<Announcements>,
    events: flume::Receiver<PlayerEvent>,
) {
    info!("📣 Player event forwarder started");

    loop {
        let event = tokio::select! {
            _ = player.stopped() => break,
            event = events.recv_async() => match event {
                Ok(event) => event,
                Err(_) => break,
            },
        };

        let guild_id = event.guild_id();
        if let Err(e) = announce(&http, &player, &announcements, event).await {
            error!("Error announcing player event in guild {}: {:?}", guild_id, e);
        }
    }

    debug!("📣 Player event forwarder stopped");
}

async fn announce(
    http: &Arc<Http>,
    player: &PlaybackSequencer,
    announcements: &Announcements,
    event: PlayerEvent,
) -> Result<()> {
    let guild_id = event.guild_id();

    match event {
        PlayerEvent::NowPlaying { title, .. } => {
            delete_now_playing(http, announcements, guild_id).await;

            let Some(channel_id) = announcements.channel(guild_id) else {
                return Ok(());
            };
            let paused = player.state(guild_id) == PlaybackState::Paused;
            let message = channel_id
                .send_message(
                    http,
                    CreateMessage::new()
                        .embed(embeds::create_now_playing_embed(&title, player.volume(guild_id)))
                        .components(buttons::create_player_controls(paused)),
                )
                .await?;

            announcements.set_now_playing(guild_id, channel_id, message.id);
        }
        PlayerEvent::TrackFetchFailed { query, reason, .. } => {
            send(
                http,
                announcements,
                guild_id,
                embeds::create_warning_embed("Couldn't load a song", &format!("`{}`: {}", query, reason)),
            )
            .await?;
        }
        PlayerEvent::PlaybackFailed { title, reason, .. } => {
            send(
                http,
                announcements,
                guild_id,
                embeds::create_warning_embed("Skipped an unplayable song", &format!("**{}**: {}", title, reason)),
            )
            .await?;
        }
        PlayerEvent::Disconnected { reason, .. } => {
            delete_now_playing(http, announcements, guild_id).await;

            if reason == DisconnectReason::Idle {
                send(
                    http,
                    announcements,
                    guild_id,
                    embeds::create_success_embed("Left the voice channel", "Nothing was playing for a while 💤"),
                )
                .await?;
            }
            announcements.forget(guild_id);
        }
    }

    Ok(())
}

async fn send(
    http: &Arc<Http>,
    announcements: &Announcements,
    guild_id: GuildId,
    embed: serenity::builder::CreateEmbed,
) -> Result<()> {
    if let Some(channel_id) = announcements.channel(guild_id) {
        channel_id
            .send_message(http, CreateMessage::new().embed(embed))
            .await?;
    }
    Ok(())
}

async fn delete_now_playing(http: &Arc<Http>, announcements: &Announcements, guild_id: GuildId) {
    if let Some((channel_id, message_id)) = announcements.take_now_playing(guild_id) {
        // already deleted by someone else is fine
        if let Err(e) = channel_id.delete_message(http, message_id).await {
            warn!("⚠️ Could not delete now-playing message in guild {}: {:?}", guild_id, e);
        }
    }
}
