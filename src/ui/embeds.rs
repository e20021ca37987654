use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::audio::{
    queue::SerializedQueue,
    session::{LoopMode, SessionSnapshot, TrackSummary},
    track::Track,
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 BassBot";

/// Canciones por página en `/queue` y `/history`
const LIST_LIMIT: usize = 10;

/// Límite de Discord para el valor de un campo de embed
const FIELD_LIMIT: usize = 1024;

/// Largo máximo de títulos y artistas dentro de listas
const TITLE_LIMIT: usize = 60;
const AUTHOR_LIMIT: usize = 30;

/// Títulos por cola en la vista previa de `/history`
const PREVIEW_TRACKS: usize = 3;

/// Crea el embed de "Reproduciendo Ahora"
pub fn create_now_playing_embed(track: &Track, paused: bool) -> CreateEmbed {
    let (title, color) = if paused {
        ("⏸️ En Pausa", colors::WARNING_ORANGE)
    } else {
        ("🎵 Reproduciendo Ahora", colors::SUCCESS_GREEN)
    };

    let mut embed = CreateEmbed::default()
        .title(title)
        .description(format!("**{}**", track.title))
        .color(color)
        .field("🎤 Artista", &track.author, true)
        .field("⏱️ Duración", track_duration(track), true)
        .field("🔗 Fuente", source_label(track.source_name.as_deref()), true);

    if let Some(artwork) = &track.artwork_uri {
        embed = embed.thumbnail(artwork);
    }
    if let Some(uri) = &track.uri {
        embed = embed.url(uri);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_added_embed(track: &Track, next: bool) -> CreateEmbed {
    let description = if next {
        format!("**{}** sonará a continuación", track.title)
    } else {
        format!("**{}** se ha agregado a la cola de reproducción", track.title)
    };

    let mut embed = CreateEmbed::default()
        .title("✅ Canción Agregada")
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .field("🎤 Artista", &track.author, true)
        .field("⏱️ Duración", track_duration(track), true);

    if let Some(artwork) = &track.artwork_uri {
        embed = embed.thumbnail(artwork);
    }

    embed
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(
            "🎵 Se reproducirá automáticamente si no hay música sonando",
        ))
}

/// Crea el embed de la cola a partir de un snapshot de la sesión
pub fn create_queue_embed(snapshot: &SessionSnapshot) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if snapshot.current.is_none() && snapshot.upcoming_total == 0 {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <url>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    if let Some(current) = &snapshot.current {
        let status = if snapshot.paused {
            "⏸️"
        } else {
            loop_emoji(snapshot.loop_mode)
        };
        embed = embed.field(
            format!("{} Reproduciendo", status),
            format!(
                "**{}** - {} `[{} / {}]`",
                shorten(&current.title, TITLE_LIMIT),
                shorten(&current.author, AUTHOR_LIMIT),
                format_duration(Duration::from_millis(snapshot.position_ms)),
                summary_duration(current)
            ),
            false,
        );
    }

    if snapshot.upcoming_total > 0 {
        embed = embed.field("⏭️ Próximas", upcoming_lines(snapshot), false);
    }

    embed
        .field("📊 Canciones", snapshot.upcoming_total.to_string(), true)
        .field(
            "⏱️ Duración restante",
            format_duration(Duration::from_millis(snapshot.upcoming_duration_ms)),
            true,
        )
        .field("🔁 Repetición", snapshot.loop_mode.to_string(), true)
        .field("🔊 Volumen", format!("{}%", snapshot.volume), true)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(format!(
            "{} • {} reproducidas",
            STANDARD_FOOTER, snapshot.history_total
        )))
}

/// Crea el embed con las colas reproducidas recientemente
pub fn create_history_embed(records: &[SerializedQueue]) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("🕘 Colas Recientes")
        .color(colors::MUSIC_PURPLE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(
            "💡 Usa /loadqueue <número> para volver a cargar una cola",
        ));

    if records.is_empty() {
        return embed
            .description("No hay colas guardadas para este servidor")
            .color(colors::NEUTRAL_GRAY);
    }

    embed.description(history_lines(records))
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de éxito
pub fn create_success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de información
pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("ℹ️ {}", title))
        .description(description)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Líneas de "Próximas"; se corta antes de pasar el límite del campo
fn upcoming_lines(snapshot: &SessionSnapshot) -> String {
    // Espacio reservado para la línea "... y N más"
    const MORE_RESERVE: usize = 32;

    let mut lines = String::new();
    let mut shown = 0;

    for (i, track) in snapshot.upcoming.iter().take(LIST_LIMIT).enumerate() {
        let line = format!(
            "**{}**. {} - {} `[{}]`",
            i + 1,
            shorten(&track.title, TITLE_LIMIT),
            shorten(&track.author, AUTHOR_LIMIT),
            summary_duration(track)
        );
        if lines.chars().count() + line.chars().count() + 1 + MORE_RESERVE > FIELD_LIMIT {
            break;
        }
        if !lines.is_empty() {
            lines.push('\n');
        }
        lines.push_str(&line);
        shown += 1;
    }

    if snapshot.upcoming_total > shown {
        lines.push_str(&format!("\n*... y {} más*", snapshot.upcoming_total - shown));
    }
    lines
}

fn history_lines(records: &[SerializedQueue]) -> String {
    records
        .iter()
        .take(LIST_LIMIT)
        .enumerate()
        .map(|(i, record)| {
            let saved = if record.saved_at > 0 {
                format!("<t:{}:R>", record.saved_at / 1000)
            } else {
                String::new()
            };
            let header = format!(
                "**{}**. {} canciones `[{}]` {}",
                i + 1,
                record.tracks.len(),
                format_duration(record.total_duration()),
                saved
            );

            let mut preview = record
                .tracks
                .iter()
                .take(PREVIEW_TRACKS)
                .map(|track| format!("`{}`", shorten(&track.title, TITLE_LIMIT)))
                .collect::<Vec<_>>()
                .join(", ");
            if record.tracks.len() > PREVIEW_TRACKS {
                preview.push_str(&format!(" +{} más", record.tracks.len() - PREVIEW_TRACKS));
            }

            format!("{}\n{}", header.trim_end(), preview)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Recorta `text` a `max` caracteres terminando en "…"
fn shorten(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut short: String = text.chars().take(max.saturating_sub(1)).collect();
    short.push('…');
    short
}

fn loop_emoji(mode: LoopMode) -> &'static str {
    match mode {
        LoopMode::Song => "🔂",
        LoopMode::Queue => "🔁",
        LoopMode::Autoplay => "📻",
        LoopMode::None => "▶️",
    }
}

fn source_label(source: Option<&str>) -> String {
    match source {
        Some("youtube") => "YouTube".to_string(),
        Some("soundcloud") => "SoundCloud".to_string(),
        Some("bandcamp") => "Bandcamp".to_string(),
        Some(other) => other.to_string(),
        None => "Desconocida".to_string(),
    }
}

fn track_duration(track: &Track) -> String {
    if track.is_stream() {
        "🔴 En vivo".to_string()
    } else {
        format_duration(track.duration())
    }
}

fn summary_duration(track: &TrackSummary) -> String {
    if track.duration_ms == 0 {
        "🔴 En vivo".to_string()
    } else {
        format_duration(Duration::from_millis(track.duration_ms))
    }
}

/// Formatea una duración como `m:ss` o `h:mm:ss`
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::session::SessionState;
    use pretty_assertions::assert_eq;
    use serenity::model::id::GuildId;

    fn summary(title: &str, secs: u64) -> TrackSummary {
        TrackSummary {
            title: title.to_string(),
            author: "artist".to_string(),
            uri: None,
            artwork_uri: None,
            duration_ms: secs * 1000,
            source_name: None,
        }
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(Duration::from_secs(5)), "0:05");
        assert_eq!(format_duration(Duration::from_secs(185)), "3:05");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
    }

    #[test]
    fn upcoming_lines_are_one_based_and_truncated() {
        let snapshot = SessionSnapshot {
            guild_id: GuildId::new(1),
            state: SessionState::Playing,
            paused: false,
            position_ms: 0,
            current: Some(summary("now", 60)),
            upcoming: vec![summary("a", 61), summary("live", 0)],
            upcoming_total: 5,
            upcoming_duration_ms: 0,
            history: Vec::new(),
            history_total: 0,
            loop_mode: LoopMode::None,
            volume: 50,
            node: "songbird".to_string(),
        };

        assert_eq!(
            upcoming_lines(&snapshot),
            "**1**. a - artist `[1:01]`\n**2**. live - artist `[🔴 En vivo]`\n*... y 3 más*"
        );
    }

    #[test]
    fn long_titles_keep_the_upcoming_field_within_discord_limits() {
        let long = summary(&"Official Music Video (Remastered 2024) ".repeat(3), 245);
        let snapshot = SessionSnapshot {
            guild_id: GuildId::new(1),
            state: SessionState::Playing,
            paused: false,
            position_ms: 0,
            current: Some(long.clone()),
            upcoming: vec![long; 10],
            upcoming_total: 40,
            upcoming_duration_ms: 0,
            history: Vec::new(),
            history_total: 0,
            loop_mode: LoopMode::None,
            volume: 50,
            node: "songbird".to_string(),
        };

        let lines = upcoming_lines(&snapshot);
        assert!(lines.chars().count() <= FIELD_LIMIT);
        assert!(lines.starts_with("**1**. "));
        assert!(lines.ends_with("más*"));
    }

    #[test]
    fn history_lines_preview_the_first_three_titles() {
        let record = SerializedQueue {
            tracks: vec![
                Track::new("first", "x", "h1").with_duration(Duration::from_secs(90)),
                Track::new("second", "x", "h2").with_duration(Duration::from_secs(30)),
                Track::new("third", "x", "h3"),
                Track::new("fourth", "x", "h4"),
                Track::new("fifth", "x", "h5"),
            ],
            position: 0,
            saved_at: 1_700_000_000_000,
        };
        let short = SerializedQueue {
            tracks: vec![Track::new("solo", "x", "h6")],
            position: 0,
            saved_at: 0,
        };

        assert_eq!(
            history_lines(&[record, short]),
            "**1**. 5 canciones `[2:00]` <t:1700000000:R>\n`first`, `second`, `third` +2 más\n\n\
             **2**. 1 canciones `[0:00]`\n`solo`"
        );
    }

    #[test]
    fn shorten_cuts_on_characters() {
        assert_eq!(shorten("canción", 10), "canción");
        assert_eq!(shorten("ñandú ñandú", 6), "ñandú…");
    }

    #[test]
    fn source_labels() {
        assert_eq!(source_label(Some("youtube")), "YouTube");
        assert_eq!(source_label(Some("example.org")), "example.org");
        assert_eq!(source_label(None), "Desconocida");
    }
}
