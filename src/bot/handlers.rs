use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ComponentInteraction},
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::time::Duration;
use tracing::{info, warn};

use crate::{
    audio::{
        manager::SessionManager,
        session::{LoopMode, SeekOutcome, SessionHandle},
        songbird_backend::resolve_track,
    },
    bot::{session_manager, BassBot},
    ui::{
        buttons::PlayerControl,
        embeds,
    },
};

const NOTHING_PLAYING: &str = "❌ No hay nada reproduciéndose";

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &BassBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    let sessions = session_manager(ctx).await?;

    match command.data.name.as_str() {
        "play" => handle_play(ctx, &command, bot, &sessions, guild_id).await?,
        "history" => handle_history(ctx, &command, bot, &sessions, guild_id).await?,
        "loadqueue" => handle_loadqueue(ctx, &command, bot, &sessions, guild_id).await?,
        name => {
            let Some(session) = sessions.get(guild_id) else {
                return respond(ctx, &command, NOTHING_PLAYING, true).await;
            };

            match name {
                "next" => handle_next(ctx, &command, &session).await?,
                "prev" => handle_prev(ctx, &command, &session).await?,
                "pause" => {
                    session.set_paused(true).await?;
                    respond(ctx, &command, "⏸️ Reproducción pausada", false).await?;
                }
                "resume" => {
                    session.set_paused(false).await?;
                    respond(ctx, &command, "▶️ Reproducción reanudada", false).await?;
                }
                "stop" => {
                    session.disconnect().await?;
                    respond(ctx, &command, "⏹️ Reproducción detenida, ¡hasta luego!", false).await?;
                }
                "shuffle" => {
                    session.shuffle().await?;
                    respond(ctx, &command, "🔀 Cola mezclada", false).await?;
                }
                "clear" => {
                    session.clear().await?;
                    respond(ctx, &command, "🗑️ Canciones pendientes eliminadas", false).await?;
                }
                "seek" => handle_seek(ctx, &command, &session).await?,
                "volume" => handle_volume(ctx, &command, &session).await?,
                "move" => handle_move(ctx, &command, &session).await?,
                "remove" => handle_remove(ctx, &command, &session).await?,
                "loop" => handle_loop(ctx, &command, &session).await?,
                "queue" => {
                    let snapshot = session.snapshot(bot.config.snapshot_limit).await?;
                    respond_embed(ctx, &command, embeds::create_queue_embed(&snapshot)).await?;
                }
                _ => respond(ctx, &command, "❌ Comando no reconocido", true).await?,
            }
        }
    }

    Ok(())
}

/// Maneja los botones del mensaje "reproduciendo ahora"
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
) -> Result<()> {
    let guild_id = component
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Componente usado fuera de un servidor"))?;

    info!(
        "🔘 Botón {} presionado por {} en guild {}",
        component.data.custom_id, component.user.name, guild_id
    );

    let control = PlayerControl::from_custom_id(&component.data.custom_id);
    let session = session_manager(ctx).await?.get(guild_id);

    let (Some(control), Some(session)) = (control, session) else {
        component
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Message(
                    CreateInteractionResponseMessage::new()
                        .content(NOTHING_PLAYING)
                        .ephemeral(true),
                ),
            )
            .await?;
        return Ok(());
    };

    // La sesión actualiza o borra el mensaje por su cuenta
    component
        .create_response(&ctx.http, CreateInteractionResponse::Acknowledge)
        .await?;

    match control {
        PlayerControl::Pause => {
            session.set_paused(true).await?;
        }
        PlayerControl::Resume => {
            session.set_paused(false).await?;
        }
        PlayerControl::Skip => {
            session.next(None).await?;
        }
        PlayerControl::Stop => {
            session.disconnect().await?;
        }
    }

    Ok(())
}

// Handlers específicos para cada comando

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &BassBot,
    sessions: &SessionManager,
    guild_id: GuildId,
) -> Result<()> {
    let url = option_str(command, "url").ok_or_else(|| anyhow::anyhow!("URL no proporcionada"))?;
    let next = option_bool(command, "next").unwrap_or(false);

    if !is_playable_url(url) {
        return respond(ctx, command, "❌ Debes indicar una URL http(s) válida", true).await;
    }

    let Some(voice_channel) = get_user_voice_channel(ctx, guild_id, command.user.id) else {
        return respond(ctx, command, "❌ Debes estar en un canal de voz", true).await;
    };

    // Defer la respuesta ya que yt-dlp puede tardar
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let track = match resolve_track(&bot.http_client, url).await {
        Ok(track) => track,
        Err(e) => {
            warn!("No se pudo cargar {}: {}", url, e);
            let embed = embeds::create_error_embed("No se pudo cargar la canción", &e.to_string());
            command
                .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
                .await?;
            return Ok(());
        }
    };

    let session = match sessions
        .get_or_create(guild_id, voice_channel, Some(command.channel_id))
        .await
    {
        Ok(session) => session,
        Err(e) => {
            let embed = embeds::create_error_embed("No se pudo conectar al canal de voz", &e.to_string());
            command
                .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
                .await?;
            return Ok(());
        }
    };

    session.add_tracks(vec![track.clone()], next).await?;

    let embed = embeds::create_track_added_embed(&track, next);
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;

    Ok(())
}

async fn handle_next(ctx: &Context, command: &CommandInteraction, session: &SessionHandle) -> Result<()> {
    let position = option_i64(command, "position").and_then(|p| usize::try_from(p).ok());

    match session.next(position).await? {
        Some(track) => respond(ctx, command, &format!("⏭️ Reproduciendo **{}**", track.title), false).await,
        None => {
            let embed = embeds::create_info_embed("Fin de la cola", "📭 No hay más canciones en la cola");
            respond_embed(ctx, command, embed).await
        }
    }
}

async fn handle_prev(ctx: &Context, command: &CommandInteraction, session: &SessionHandle) -> Result<()> {
    match session.prev().await? {
        Some(track) => respond(ctx, command, &format!("⏮️ Reproduciendo **{}**", track.title), false).await,
        None => respond(ctx, command, "❌ No hay una canción anterior", true).await,
    }
}

async fn handle_seek(ctx: &Context, command: &CommandInteraction, session: &SessionHandle) -> Result<()> {
    let Some(position) = option_str(command, "time").and_then(parse_timestamp) else {
        return respond(ctx, command, "❌ Formato inválido, usa M:SS o 1m 30s", true).await;
    };

    match session.seek(position).await? {
        SeekOutcome::Seeked(position) => {
            respond(ctx, command, &format!("⏩ Saltando a **{}**", embeds::format_duration(position)), false).await
        }
        SeekOutcome::NothingPlaying => respond(ctx, command, NOTHING_PLAYING, true).await,
        SeekOutcome::NotSeekable => respond(ctx, command, "❌ Esta canción no permite adelantar", true).await,
        SeekOutcome::OutOfRange { length } => {
            let message = format!("❌ La canción solo dura **{}**", embeds::format_duration(length));
            respond(ctx, command, &message, true).await
        }
    }
}

async fn handle_volume(ctx: &Context, command: &CommandInteraction, session: &SessionHandle) -> Result<()> {
    let Some(volume) = option_i64(command, "value").and_then(|v| u8::try_from(v).ok()) else {
        return respond(ctx, command, "❌ El volumen debe estar entre 0 y 100", true).await;
    };

    let volume = session.set_volume(volume).await?;
    respond(ctx, command, &format!("🔊 Volumen ajustado a **{}%**", volume), false).await
}

async fn handle_move(ctx: &Context, command: &CommandInteraction, session: &SessionHandle) -> Result<()> {
    let from = option_i64(command, "from").and_then(to_index);
    let to = option_i64(command, "to").and_then(to_index);

    let moved = match (from, to) {
        (Some(from), Some(to)) => session.move_track(from, to).await?,
        _ => None,
    };

    match moved {
        Some(track) => {
            let position = to.map_or(0, |to| to + 1);
            respond(ctx, command, &format!("📍 **{}** movida a la posición {}", track.title, position), false).await
        }
        None => respond(ctx, command, "❌ Posición inválida", true).await,
    }
}

async fn handle_remove(ctx: &Context, command: &CommandInteraction, session: &SessionHandle) -> Result<()> {
    let from = option_i64(command, "from").and_then(to_index);
    let to = match option_i64(command, "to") {
        Some(to) => to_index(to),
        None => from,
    };

    let removed = match (from, to) {
        (Some(from), Some(to)) => session.remove(from, to).await?,
        _ => None,
    };

    match removed {
        Some(1) => respond(ctx, command, "❌ 1 canción eliminada de la cola", false).await,
        Some(count) => respond(ctx, command, &format!("❌ {} canciones eliminadas de la cola", count), false).await,
        None => respond(ctx, command, "❌ Rango inválido", true).await,
    }
}

async fn handle_loop(ctx: &Context, command: &CommandInteraction, session: &SessionHandle) -> Result<()> {
    let Some(mode) = option_str(command, "mode").and_then(LoopMode::from_name) else {
        return respond(ctx, command, "❌ Modo de repetición inválido", true).await;
    };

    session.set_loop_mode(mode).await?;
    respond(ctx, command, &format!("🔁 Modo de repetición: **{}**", mode), false).await
}

async fn handle_history(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &BassBot,
    sessions: &SessionManager,
    guild_id: GuildId,
) -> Result<()> {
    let records = sessions
        .history(guild_id, bot.config.queue_history_limit)
        .await;
    respond_embed(ctx, command, embeds::create_history_embed(&records)).await
}

async fn handle_loadqueue(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &BassBot,
    sessions: &SessionManager,
    guild_id: GuildId,
) -> Result<()> {
    let replace = option_bool(command, "replace").unwrap_or(false);
    let records = sessions
        .history(guild_id, bot.config.queue_history_limit)
        .await;

    let Some(record) = option_i64(command, "index")
        .and_then(to_index)
        .and_then(|index| records.into_iter().nth(index))
    else {
        return respond(ctx, command, "❌ Esa cola no existe, revisa `/history`", true).await;
    };

    let Some(voice_channel) = get_user_voice_channel(ctx, guild_id, command.user.id) else {
        return respond(ctx, command, "❌ Debes estar en un canal de voz", true).await;
    };

    let session = sessions
        .get_or_create(guild_id, voice_channel, Some(command.channel_id))
        .await?;

    if replace {
        session.clear().await?;
    }
    let count = record.tracks.len();
    session.add_tracks(record.tracks, false).await?;

    let embed = embeds::create_success_embed(
        "Cola cargada",
        &format!("Se agregaron **{}** canciones a la cola", count),
    );
    respond_embed(ctx, command, embed).await
}

// Funciones auxiliares

async fn respond(ctx: &Context, command: &CommandInteraction, content: &str, ephemeral: bool) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;
    Ok(())
}

async fn respond_embed(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(CreateInteractionResponseMessage::new().embed(embed)),
        )
        .await?;
    Ok(())
}

fn option_str<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn option_i64(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

fn option_bool(command: &CommandInteraction, name: &str) -> Option<bool> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_bool())
}

/// Convierte una posición visible (1-based) en índice de la cola
fn to_index(position: i64) -> Option<usize> {
    usize::try_from(position).ok()?.checked_sub(1)
}

/// Interpreta `M:SS`, `H:MM:SS`, `1m 30s`, `90s` o `2m`
fn parse_timestamp(input: &str) -> Option<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    if input.contains(':') {
        let parts = input
            .split(':')
            .map(|part| part.trim().parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()?;
        let (hours, minutes, seconds) = match parts[..] {
            [minutes, seconds] => (0, minutes, seconds),
            [hours, minutes, seconds] if minutes < 60 => (hours, minutes, seconds),
            _ => return None,
        };
        if seconds >= 60 {
            return None;
        }
        return Some(Duration::from_secs(hours * 3600 + minutes * 60 + seconds));
    }

    let compact: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    let (minutes, rest) = match compact.split_once('m') {
        Some((minutes, rest)) => (minutes.parse::<u64>().ok()?, rest.trim_start_matches("in")),
        None => (0, compact.as_str()),
    };
    let seconds = match rest.strip_suffix('s') {
        Some(seconds) => seconds.parse::<u64>().ok()?,
        None if rest.is_empty() && compact.contains('m') => 0,
        None => return None,
    };
    if minutes > 0 && seconds >= 60 {
        return None;
    }
    Some(Duration::from_secs(minutes * 60 + seconds))
}

fn is_playable_url(input: &str) -> bool {
    url::Url::parse(input).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}
