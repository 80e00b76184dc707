use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::audio::{player::QueueView, MusicError};

/// Shared embed colours.
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
}

const STANDARD_FOOTER: &str = "🎵 Jukebox";

/// Entries shown by the queue embed before collapsing into "...and N more".
pub const QUEUE_PREVIEW_LEN: usize = 10;

pub fn create_now_playing_embed(title: &str, volume_percent: u8) -> CreateEmbed {
    CreateEmbed::default()
        .title("🎵 Now Playing")
        .description(format!("**{}**", title))
        .color(colors::SUCCESS_GREEN)
        .field("🔊 Volume", format!("{}%", volume_percent), true)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Reply to `/play`: what was added and whether it started right away.
pub fn create_tracks_added_embed(titles: &[String], started: bool) -> CreateEmbed {
    let title = if started { "▶️ Playing" } else { "➕ Added to Queue" };

    let description = match titles {
        [single] => format!("**{}**", single),
        _ => format!(
            "{} songs\n{}",
            titles.len(),
            preview_lines(titles.iter().map(String::as_str))
        ),
    };

    CreateEmbed::default()
        .title(title)
        .description(description)
        .color(colors::MUSIC_PURPLE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Queue listing: the now-playing track, then the first upcoming ones.
pub fn create_queue_embed(view: &QueueView) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Queue")
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER));

    if let Some(left) = view.idle_left {
        // whole seconds only
        let left = Duration::from_secs(left.as_secs());
        embed = embed.field("💤 Leaving in", humantime::format_duration(left).to_string(), true);
    }

    if view.now_playing.is_none() && view.upcoming.is_empty() {
        return embed.description("The queue is empty");
    }

    let mut description = String::new();
    if let Some(current) = &view.now_playing {
        description.push_str(&format!("🎵 **Now:** {}\n\n", current));
    }
    if view.upcoming.is_empty() {
        description.push_str("Nothing else queued");
    } else {
        description.push_str(&preview_lines(view.upcoming.iter().map(String::as_str)));
    }

    embed.description(description)
}

/// Numbered list of the first [`QUEUE_PREVIEW_LEN`] titles.
fn preview_lines<'a>(titles: impl ExactSizeIterator<Item = &'a str>) -> String {
    let total = titles.len();
    let mut lines: Vec<String> = titles
        .take(QUEUE_PREVIEW_LEN)
        .enumerate()
        .map(|(i, title)| format!("`{}.` {}", i + 1, title))
        .collect();

    if total > QUEUE_PREVIEW_LEN {
        lines.push(format!("...and {} more", total - QUEUE_PREVIEW_LEN));
    }
    lines.join("\n")
}

pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
}

pub fn create_music_error_embed(error: &MusicError) -> CreateEmbed {
    use crate::audio::error::ErrorKind;

    let title = match error.kind() {
        ErrorKind::UserInput => "Can't do that",
        ErrorKind::Provider => "Search failed",
        ErrorKind::Playback => "Playback error",
        ErrorKind::Infrastructure => "Voice connection failed",
    };
    create_error_embed(title, &error.to_string())
}

pub fn create_warning_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("⚠️ {}", title))
        .description(description)
        .color(colors::WARNING_ORANGE)
}

pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
}
