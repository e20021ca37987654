use anyhow::Result;
use async_trait::async_trait;
use serenity::{
    builder::{CreateMessage, EditMessage},
    cache::Cache,
    http::Http,
    model::id::{ChannelId, GuildId, MessageId},
};
use songbird::Songbird;
use std::sync::Arc;
use tracing::info;

use crate::{
    audio::{
        backend::{AudioBackend, BackendEventSink, ChatPlatform, Notice},
        songbird_backend::SongbirdBackend,
    },
    error::BackendError,
    ui::{buttons, embeds},
};

/// Discord como plataforma de chat: voz vía songbird, mensajes vía serenity
pub struct SerenityPlatform {
    http: Arc<Http>,
    cache: Arc<Cache>,
    songbird: Arc<Songbird>,
    client: reqwest::Client,
}

impl SerenityPlatform {
    pub fn new(http: Arc<Http>, cache: Arc<Cache>, songbird: Arc<Songbird>, client: reqwest::Client) -> Self {
        Self {
            http,
            cache,
            songbird,
            client,
        }
    }
}

#[async_trait]
impl ChatPlatform for SerenityPlatform {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        events: BackendEventSink,
    ) -> Result<Arc<dyn AudioBackend>, BackendError> {
        let call = self
            .songbird
            .join(guild_id, channel_id)
            .await
            .map_err(|e| BackendError::Voice(format!("{:?}", e)))?;

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
        let backend: Arc<dyn AudioBackend> =
            SongbirdBackend::attach(guild_id, call, self.client.clone(), events).await;
        Ok(backend)
    }

    async fn leave(&self, guild_id: GuildId) -> Result<(), BackendError> {
        if self.songbird.get(guild_id).is_none() {
            return Ok(());
        }

        self.songbird
            .remove(guild_id)
            .await
            .map_err(|e| BackendError::Voice(format!("{:?}", e)))?;

        info!("👋 Desconectado del canal de voz en guild {}", guild_id);
        Ok(())
    }

    fn voice_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        let bot_id = self.cache.current_user().id;
        let guild = self.cache.guild(guild_id)?;
        guild.voice_states.get(&bot_id)?.channel_id
    }

    fn listener_count(&self, guild_id: GuildId) -> Option<usize> {
        let bot_id = self.cache.current_user().id;
        let channel_id = self.voice_channel(guild_id)?;
        let guild = self.cache.guild(guild_id)?;

        let listeners = guild
            .voice_states
            .values()
            .filter(|state| state.channel_id == Some(channel_id) && state.user_id != bot_id)
            .filter(|state| match &state.member {
                Some(member) => !member.user.bot,
                None => !guild.members.get(&state.user_id).is_some_and(|m| m.user.bot),
            })
            .count();
        Some(listeners)
    }

    async fn send_notice(&self, channel_id: ChannelId, notice: Notice) -> Result<MessageId> {
        let message = match notice {
            Notice::NowPlaying { track, paused } => CreateMessage::new()
                .embed(embeds::create_now_playing_embed(&track, paused))
                .components(buttons::create_player_controls(paused)),
            Notice::Error { message } => CreateMessage::new()
                .embed(embeds::create_error_embed("Error de reproducción", &message)),
        };

        let sent = channel_id.send_message(&self.http, message).await?;
        Ok(sent.id)
    }

    async fn delete_message(&self, channel_id: ChannelId, message_id: MessageId) -> Result<()> {
        channel_id.delete_message(&self.http, message_id).await?;
        Ok(())
    }

    async fn edit_controls(&self, channel_id: ChannelId, message_id: MessageId, paused: bool) -> Result<()> {
        let edit = EditMessage::new().components(buttons::create_player_controls(paused));
        channel_id.edit_message(&self.http, message_id, edit).await?;
        Ok(())
    }
}
