use anyhow::Result;
use serenity::{
    all::Command,
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Every slash command of the bot.
pub fn all_commands() -> Vec<CreateCommand> {
    vec![
        join_command(),
        leave_command(),
        play_command(),
        skip_command(),
        pause_command(),
        resume_command(),
        stop_command(),
        shuffle_command(),
        volume_command(),
        queue_command(),
    ]
}

/// Registers the commands globally (propagation can take up to an hour).
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    Command::set_global_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

/// Registers the commands on one guild, visible immediately (development).
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

// Voice

fn join_command() -> CreateCommand {
    CreateCommand::new("join").description("Join your voice channel")
}

fn leave_command() -> CreateCommand {
    CreateCommand::new("leave").description("Leave the voice channel and clear the queue")
}

// Playback

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Play a song, or queue it if something is already playing")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "Search terms, a YouTube link or a Spotify track/playlist/album link",
            )
            .required(true),
        )
}

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Skip the current song")
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pause the current song")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Resume the paused song")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Stop playback and clear the queue")
}

// Queue

fn shuffle_command() -> CreateCommand {
    CreateCommand::new("shuffle").description("Shuffle the upcoming songs")
}

fn volume_command() -> CreateCommand {
    CreateCommand::new("volume")
        .description("Set the playback volume")
        .add_option(
            CreateCommandOption::new(CommandOptionType::Integer, "level", "Volume level (1-100)")
                .min_int_value(1)
                .max_int_value(100)
                .required(true),
        )
}

fn queue_command() -> CreateCommand {
    CreateCommand::new("queue").description("Show the current queue")
}
