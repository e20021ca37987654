//! Colaboradores externos de una sesión de reproducción.
//!
//! The engine never talks to songbird or serenity directly: a session only
//! sees an [`AudioBackend`] (the per-guild voice/audio connection) and a
//! [`ChatPlatform`] (voice membership and text messages). Backend callbacks
//! come back as [`BackendEvent`]s pushed through a [`BackendEventSink`] into
//! the session mailbox.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId, MessageId};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc::WeakUnboundedSender;
use tracing::debug;

use super::{session::SessionMessage, track::Track};
use crate::error::BackendError;

/// Motivo por el que terminó un track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// Terminó de forma natural
    Finished,
    /// El backend no pudo cargarlo
    LoadFailed,
    /// Detenido explícitamente
    Stopped,
    /// Reemplazado por otro track
    Replaced,
    /// La sesión del backend fue destruida
    Cleared,
}

impl EndReason {
    /// Solo los finales naturales (o fallidos) avanzan la cola
    pub fn advances_queue(self) -> bool {
        matches!(self, EndReason::Finished | EndReason::LoadFailed)
    }
}

/// Eventos del ciclo de vida que reporta el backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendEvent {
    Start { handle: String },
    End { handle: String, reason: EndReason },
    Exception { handle: String, message: String },
    Closed,
}

/// Canal por el que el backend entrega eventos al mailbox de la sesión.
///
/// Holds only a weak sender: a backend that outlives its session just drops
/// the events.
#[derive(Debug, Clone)]
pub struct BackendEventSink {
    mailbox: WeakUnboundedSender<SessionMessage>,
}

impl BackendEventSink {
    pub(crate) fn new(mailbox: WeakUnboundedSender<SessionMessage>) -> Self {
        Self { mailbox }
    }

    pub fn emit(&self, event: BackendEvent) {
        match self.mailbox.upgrade() {
            Some(tx) => {
                let _ = tx.send(SessionMessage::Backend(event));
            }
            None => debug!("Evento de backend descartado, sesión cerrada: {:?}", event),
        }
    }
}

/// Conexión de audio por guild (el "Node" que decodifica y transmite)
#[async_trait]
pub trait AudioBackend: Send + Sync {
    async fn play_track(&self, handle: &str, volume: u8) -> Result<(), BackendError>;

    async fn stop(&self) -> Result<(), BackendError>;

    async fn set_paused(&self, paused: bool) -> Result<(), BackendError>;

    /// Salta a `position` dentro del track actual
    async fn seek(&self, position: Duration) -> Result<(), BackendError>;

    /// Volumen del track actual (0-100)
    async fn set_volume(&self, volume: u8) -> Result<(), BackendError>;

    async fn destroy(&self) -> Result<(), BackendError>;

    async fn is_connected(&self) -> bool;

    /// Posición de reproducción del track actual
    async fn position(&self) -> Duration;

    /// Identificador del nodo asignado (para el dashboard)
    fn node_name(&self) -> String;
}

/// Avisos visibles que la sesión publica en el canal de texto
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    NowPlaying { track: Track, paused: bool },
    Error { message: String },
}

/// Plataforma de chat: voz y mensajes de texto
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        events: BackendEventSink,
    ) -> Result<Arc<dyn AudioBackend>, BackendError>;

    async fn leave(&self, guild_id: GuildId) -> Result<(), BackendError>;

    /// Canal de voz en el que está el bot
    fn voice_channel(&self, guild_id: GuildId) -> Option<ChannelId>;

    /// Miembros (no bots) en el canal de voz del bot, `None` si no está conectado
    fn listener_count(&self, guild_id: GuildId) -> Option<usize>;

    async fn send_notice(&self, channel_id: ChannelId, notice: Notice) -> anyhow::Result<MessageId>;

    async fn delete_message(&self, channel_id: ChannelId, message_id: MessageId) -> anyhow::Result<()>;

    /// Actualiza los botones de control del aviso "reproduciendo ahora"
    async fn edit_controls(
        &self,
        channel_id: ChannelId,
        message_id: MessageId,
        paused: bool,
    ) -> anyhow::Result<()>;
}
