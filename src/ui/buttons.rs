use serenity::{
    all::{ButtonStyle, InputTextStyle},
    builder::{CreateActionRow, CreateButton, CreateInputText, CreateModal},
};

/// Custom ids of the player buttons.
pub mod button_ids {
    pub const PAUSE: &str = "music_pause";
    pub const RESUME: &str = "music_resume";
    pub const SKIP: &str = "music_skip";
    pub const STOP: &str = "music_stop";
    pub const SHUFFLE: &str = "music_shuffle";
    pub const QUEUE: &str = "music_queue";
    pub const VOLUME: &str = "music_volume";

    pub const VOLUME_MODAL: &str = "music_volume_modal";
    pub const VOLUME_INPUT: &str = "music_volume_level";
}

/// Controls attached to the now-playing message: playback on the first row,
/// queue and volume on the second. The first button toggles between pause
/// and resume.
pub fn create_player_controls(paused: bool) -> Vec<CreateActionRow> {
    let toggle = if paused {
        CreateButton::new(button_ids::RESUME)
            .emoji('▶')
            .label("Resume")
            .style(ButtonStyle::Success)
    } else {
        CreateButton::new(button_ids::PAUSE)
            .emoji('⏸')
            .label("Pause")
            .style(ButtonStyle::Primary)
    };

    let skip = CreateButton::new(button_ids::SKIP)
        .emoji('⏭')
        .label("Skip")
        .style(ButtonStyle::Secondary);

    let stop = CreateButton::new(button_ids::STOP)
        .emoji('⏹')
        .label("Stop")
        .style(ButtonStyle::Danger);

    let shuffle = CreateButton::new(button_ids::SHUFFLE)
        .emoji('🔀')
        .label("Shuffle")
        .style(ButtonStyle::Secondary);

    let queue = CreateButton::new(button_ids::QUEUE)
        .emoji('📋')
        .label("Queue")
        .style(ButtonStyle::Secondary);

    let volume = CreateButton::new(button_ids::VOLUME)
        .emoji('🔊')
        .label("Volume")
        .style(ButtonStyle::Secondary);

    vec![
        CreateActionRow::Buttons(vec![toggle, skip, stop]),
        CreateActionRow::Buttons(vec![shuffle, queue, volume]),
    ]
}

/// Pop-up asking for a new volume level.
pub fn create_volume_modal(current_percent: u8) -> CreateModal {
    let level = CreateInputText::new(InputTextStyle::Short, "Volume Level (1-100)", button_ids::VOLUME_INPUT)
        .placeholder(format!("Currently {}%", current_percent))
        .min_length(1)
        .max_length(3)
        .required(true);

    CreateModal::new(button_ids::VOLUME_MODAL, "Set Volume").components(vec![CreateActionRow::InputText(level)])
}
