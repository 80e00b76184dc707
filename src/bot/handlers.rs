use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::{ActionRowComponent, CommandInteraction, ComponentInteraction, ModalInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{info, warn};

use crate::{
    audio::MusicResult,
    bot::JukeboxBot,
    ui::{buttons, buttons::button_ids, embeds},
};

/// Handles slash commands.
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    let Some(guild_id) = command.guild_id else {
        return reply(
            ctx,
            &command,
            embeds::create_error_embed("Servers only", "Music commands only work inside a server"),
            true,
        )
        .await;
    };

    info!(
        "📝 /{} used by {} in guild {}",
        command.data.name, command.user.name, guild_id
    );

    if command.data.name == "play" {
        return handle_play(ctx, &command, bot, guild_id).await;
    }

    let outcome = match command.data.name.as_str() {
        "join" => handle_join(ctx, &command, bot, guild_id).await,
        "leave" => bot
            .player
            .leave(guild_id)
            .await
            .map(|()| embeds::create_success_embed("Left", "Disconnected from the voice channel")),
        "skip" => bot
            .player
            .skip(guild_id)
            .await
            .map(|track| embeds::create_success_embed("Skipped", &format!("**{}**", track.title()))),
        "pause" => bot
            .player
            .pause(guild_id)
            .map(|()| embeds::create_success_embed("Paused", "⏸️ Use /resume to continue")),
        "resume" => bot
            .player
            .resume(guild_id)
            .map(|()| embeds::create_success_embed("Resumed", "▶️ Back to the music")),
        "stop" => bot
            .player
            .stop(guild_id)
            .map(|()| embeds::create_success_embed("Stopped", "⏹️ Playback stopped and queue cleared")),
        "shuffle" => bot
            .player
            .shuffle(guild_id)
            .map(|()| embeds::create_success_embed("Shuffled", "🔀 The queue was shuffled")),
        "volume" => handle_volume(&command, bot, guild_id),
        "queue" => Ok(queue_embed(bot, guild_id)),
        other => {
            warn!("Unknown command /{}", other);
            Ok(embeds::create_error_embed("Unknown command", "This command is not supported"))
        }
    };

    match outcome {
        Ok(embed) => reply(ctx, &command, embed, false).await,
        Err(e) => reply(ctx, &command, embeds::create_music_error_embed(&e), true).await,
    }
}

/// Handles the now-playing control buttons.
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    let Some(guild_id) = component.guild_id else {
        return Ok(());
    };

    info!(
        "🔘 Button {} pressed by {} in guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    let response = match component.data.custom_id.as_str() {
        button_ids::PAUSE => bot.player.pause(guild_id).map(|()| update_controls(true)),
        button_ids::RESUME => bot.player.resume(guild_id).map(|()| update_controls(false)),
        button_ids::SKIP => bot.player.skip(guild_id).await.map(|track| {
            message(
                embeds::create_success_embed(
                    "Skipped",
                    &format!("**{}** (by <@{}>)", track.title(), component.user.id),
                ),
                false,
            )
        }),
        button_ids::STOP => stop_and_leave(bot, guild_id).await.map(|()| {
            message(
                embeds::create_success_embed("Stopped", "⏹️ Queue cleared and voice channel left"),
                false,
            )
        }),
        button_ids::SHUFFLE => bot
            .player
            .shuffle(guild_id)
            .map(|()| message(embeds::create_success_embed("Shuffled", "🔀 The queue was shuffled"), true)),
        button_ids::QUEUE => Ok(message(queue_embed(bot, guild_id), true)),
        button_ids::VOLUME => Ok(CreateInteractionResponse::Modal(buttons::create_volume_modal(
            bot.player.volume(guild_id),
        ))),
        other => {
            warn!("Unknown button {}", other);
            return Ok(());
        }
    };

    let response = response.unwrap_or_else(|e| message(embeds::create_music_error_embed(&e), true));
    component.create_response(&ctx.http, response).await?;

    Ok(())
}

/// Handles the volume pop-up opened from the Volume button.
pub async fn handle_modal(ctx: &Context, modal: ModalInteraction, bot: &JukeboxBot) -> Result<()> {
    let Some(guild_id) = modal.guild_id else {
        return Ok(());
    };

    if modal.data.custom_id != button_ids::VOLUME_MODAL {
        warn!("Unknown modal {}", modal.data.custom_id);
        return Ok(());
    }

    let input = modal
        .data
        .components
        .iter()
        .flat_map(|row| row.components.iter())
        .find_map(|component| match component {
            ActionRowComponent::InputText(text) if text.custom_id == button_ids::VOLUME_INPUT => text.value.clone(),
            _ => None,
        })
        .unwrap_or_default();

    info!("🔊 Volume {:?} submitted by {} in guild {}", input, modal.user.name, guild_id);

    let embed = match parse_volume_level(&input) {
        Some(level) => match bot.player.set_volume(guild_id, level) {
            Ok(()) => embeds::create_success_embed("Volume", &format!("🔊 Set to {}%", level)),
            Err(e) => embeds::create_music_error_embed(&e),
        },
        None => embeds::create_error_embed("Invalid volume", "Enter a number between 1 and 100"),
    };

    modal.create_response(&ctx.http, message(embed, true)).await?;
    Ok(())
}

/// Range checks happen in the player.
fn parse_volume_level(input: &str) -> Option<i64> {
    input.trim().parse().ok()
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<()> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .unwrap_or_default()
        .trim()
        .to_string();

    if query.is_empty() {
        return reply(
            ctx,
            command,
            embeds::create_error_embed("Nothing to play", "Give me a song name or a link"),
            true,
        )
        .await;
    }

    // resolving can take a few seconds
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let user_channel = user_voice_channel(ctx, guild_id, command.user.id);
    if user_channel.is_some() {
        bot.announcements.bind_channel(guild_id, command.channel_id);
    }

    let embed = match bot.player.play(guild_id, user_channel, &query).await {
        Ok(outcome) => embeds::create_tracks_added_embed(&outcome.titles, outcome.started),
        Err(e) => {
            warn!("❌ /play {:?} failed in guild {}: {}", query, guild_id, e);
            embeds::create_music_error_embed(&e)
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> MusicResult<CreateEmbed> {
    let channel = bot
        .player
        .join(guild_id, user_voice_channel(ctx, guild_id, command.user.id))
        .await?;

    bot.announcements.bind_channel(guild_id, command.channel_id);
    Ok(embeds::create_success_embed("Joined", &format!("🔊 Connected to <#{}>", channel)))
}

fn handle_volume(command: &CommandInteraction, bot: &JukeboxBot, guild_id: GuildId) -> MusicResult<CreateEmbed> {
    let level = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "level")
        .and_then(|opt| opt.value.as_i64())
        .unwrap_or(0);

    bot.player.set_volume(guild_id, level)?;
    Ok(embeds::create_success_embed("Volume", &format!("🔊 Set to {}%", level)))
}

/// The Stop button ends the session entirely.
async fn stop_and_leave(bot: &JukeboxBot, guild_id: GuildId) -> MusicResult<()> {
    bot.player.stop(guild_id)?;
    bot.player.leave(guild_id).await
}

fn queue_embed(bot: &JukeboxBot, guild_id: GuildId) -> CreateEmbed {
    embeds::create_queue_embed(&bot.player.queue_view(guild_id))
}

fn message(embed: CreateEmbed, ephemeral: bool) -> CreateInteractionResponse {
    CreateInteractionResponse::Message(
        CreateInteractionResponseMessage::new()
            .embed(embed)
            .ephemeral(ephemeral),
    )
}

fn update_controls(paused: bool) -> CreateInteractionResponse {
    CreateInteractionResponse::UpdateMessage(
        CreateInteractionResponseMessage::new().components(buttons::create_player_controls(paused)),
    )
}

async fn reply(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed, ephemeral: bool) -> Result<()> {
    command.create_response(&ctx.http, message(embed, ephemeral)).await?;
    Ok(())
}

/// Voice channel the user currently sits in, from the gateway cache.
fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}
