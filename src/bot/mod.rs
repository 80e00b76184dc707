//! # Bot Module
//!
//! Discord front-end of the jukebox.
//!
//! This module contains:
//! - Slash command registration ([`commands`])
//! - Command, button and volume pop-up dispatch onto the playback control API ([`handlers`])
//! - Forwarding of player notifications to text channels ([`events`])
//! - Voice state tracking for the bot's own connection
//!
//! ## Architecture
//!
//! [`JukeboxBot`] implements Serenity's [`EventHandler`]. It owns a handle to
//! the [`PlaybackSequencer`], which does all the playback work, and the
//! [`events::Announcements`] bookkeeping that decides where notifications go.

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{error, info};

pub mod commands;
pub mod events;
pub mod handlers;

use crate::{
    audio::{PlaybackSequencer, PlayerEvent},
    config::Config,
};
use events::Announcements;

/// Main Discord event handler.
pub struct JukeboxBot {
    config: Arc<Config>,
    /// Playback core shared with the voice backend
    pub player: PlaybackSequencer,
    pub announcements: Arc<Announcements>,
    player_events: flume::Receiver<PlayerEvent>,
    forwarder_started: AtomicBool,
}

impl JukeboxBot {
    pub fn new(config: Arc<Config>, player: PlaybackSequencer, player_events: flume::Receiver<PlayerEvent>) -> Self {
        Self {
            config,
            player,
            announcements: Arc::new(Announcements::default()),
            player_events,
            forwarder_started: AtomicBool::new(false),
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// With `GUILD_ID` set the commands are registered on that guild only and
    /// show up immediately; otherwise they are global.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registering commands on guild {}", guild_id);
                commands::register_guild_commands(ctx, guild_id).await?;
            }
            None => {
                info!("🌐 Registering global commands");
                commands::register_global_commands(ctx).await?;
            }
        }

        info!("✅ Slash commands registered");
        Ok(())
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    /// Called after every (re)connect to the gateway.
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} is online in {} servers", ready.user.name, ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error registering commands: {:?}", e);
        }

        // ready fires again on reconnects; one forwarder is enough
        if !self.forwarder_started.swap(true, Ordering::SeqCst) {
            tokio::spawn(events::forward_player_events(
                ctx.http.clone(),
                self.player.clone(),
                Arc::clone(&self.announcements),
                self.player_events.clone(),
            ));
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Error handling command: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) = handlers::handle_component(&ctx, component_interaction, self).await {
                    error!("Error handling component: {:?}", e);
                }
            }
            Interaction::Modal(modal_interaction) => {
                if let Err(e) = handlers::handle_modal(&ctx, modal_interaction, self).await {
                    error!("Error handling modal: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Detects the bot being disconnected from voice by someone else.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        if new.user_id != ctx.cache.current_user().id {
            return;
        }

        let Some(guild_id) = new.guild_id else {
            return;
        };

        if old.is_some() && new.channel_id.is_none() {
            info!("🔌 Bot left voice in guild {}", guild_id);
            self.player.handle_external_disconnect(guild_id).await;
        }
    }
}
