use serenity::{
    all::ButtonStyle,
    builder::{CreateActionRow, CreateButton},
};

/// IDs personalizados para los botones
pub mod button_ids {
    pub const PAUSE: &str = "music_pause";
    pub const RESUME: &str = "music_resume";
    pub const SKIP: &str = "music_skip";
    pub const STOP: &str = "music_stop";
}

/// Acción pedida por un botón del mensaje "reproduciendo ahora"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerControl {
    Pause,
    Resume,
    Skip,
    Stop,
}

impl PlayerControl {
    pub fn from_custom_id(custom_id: &str) -> Option<Self> {
        match custom_id {
            button_ids::PAUSE => Some(PlayerControl::Pause),
            button_ids::RESUME => Some(PlayerControl::Resume),
            button_ids::SKIP => Some(PlayerControl::Skip),
            button_ids::STOP => Some(PlayerControl::Stop),
            _ => None,
        }
    }
}

/// Crea los controles del reproductor; el primer botón alterna pausa/reanudar
pub fn create_player_controls(paused: bool) -> Vec<CreateActionRow> {
    let toggle = if paused {
        CreateButton::new(button_ids::RESUME)
            .label("Reanudar")
            .emoji('▶')
            .style(ButtonStyle::Success)
    } else {
        CreateButton::new(button_ids::PAUSE)
            .label("Pausar")
            .emoji('⏸')
            .style(ButtonStyle::Primary)
    };

    let skip = CreateButton::new(button_ids::SKIP)
        .label("Saltar")
        .emoji('⏭')
        .style(ButtonStyle::Secondary);

    let stop = CreateButton::new(button_ids::STOP)
        .label("Detener")
        .emoji('⏹')
        .style(ButtonStyle::Danger);

    vec![CreateActionRow::Buttons(vec![toggle, skip, stop])]
}
