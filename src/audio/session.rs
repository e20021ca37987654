//! Sesión de reproducción por guild.
//!
//! A [`PlaybackSession`] owns the guild's [`Queue`], loop mode, pause flag,
//! now-playing notice and idle timer, and drives the [`AudioBackend`]. It runs
//! inside its own task and only reacts to [`SessionMessage`]s taken from one
//! mailbox: command requests from [`SessionHandle`], backend lifecycle events,
//! voice-membership changes and idle timeouts. Messages are handled one at a
//! time, so a request always observes the effect of every earlier one.
//!
//! ## States
//!
//! | State | Meaning |
//! |-------|---------|
//! | `Idle` | nothing current |
//! | `Playing` / `Paused` | a track is current |
//! | `DisconnectScheduled` | idle timer armed (takes precedence over the above) |
//! | `Destroyed` | terminal, the task has stopped |

use serde::{Deserialize, Serialize};
use serenity::model::id::{ChannelId, GuildId, MessageId};
use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::{
        mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender},
        oneshot,
    },
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use super::{
    backend::{AudioBackend, BackendEvent, BackendEventSink, ChatPlatform, EndReason, Notice},
    idle::IdleTimer,
    queue::Queue,
    track::Track,
};
use crate::{
    error::{BackendError, SessionError},
    storage::{PersistQueue, QueuePersistence},
};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Qué hacer cuando el track actual termina de forma natural
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LoopMode {
    #[default]
    None,
    Song,
    Queue,
    /// Sin colaborador de recomendaciones se comporta como `None`
    Autoplay,
}

impl LoopMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "none" => Some(LoopMode::None),
            "song" => Some(LoopMode::Song),
            "queue" => Some(LoopMode::Queue),
            "autoplay" => Some(LoopMode::Autoplay),
            _ => None,
        }
    }
}

impl fmt::Display for LoopMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopMode::None => "None",
            LoopMode::Song => "Song",
            LoopMode::Queue => "Queue",
            LoopMode::Autoplay => "Autoplay",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    Playing,
    Paused,
    DisconnectScheduled,
    Destroyed,
}

/// Parámetros de una sesión tomados de la configuración
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// Volumen inicial de cada track (0-100)
    pub initial_volume: u8,
    /// Espera antes de salir de un canal sin oyentes
    pub idle_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            initial_volume: 50,
            idle_timeout: Duration::from_secs(60),
        }
    }
}

/// Dependencias compartidas por todas las sesiones
#[derive(Clone)]
pub struct SessionContext {
    pub platform: Arc<dyn ChatPlatform>,
    pub persistence: QueuePersistence,
    pub settings: SessionSettings,
}

/// Resumen de un track para el dashboard/API
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackSummary {
    pub title: String,
    pub author: String,
    pub uri: Option<String>,
    pub artwork_uri: Option<String>,
    pub duration_ms: u64,
    pub source_name: Option<String>,
}

impl From<&Track> for TrackSummary {
    fn from(track: &Track) -> Self {
        Self {
            title: track.title.clone(),
            author: track.author.clone(),
            uri: track.uri.clone(),
            artwork_uri: track.artwork_uri.clone(),
            duration_ms: track.duration_ms,
            source_name: track.source_name.clone(),
        }
    }
}

/// Proyección de solo lectura de una sesión
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub guild_id: GuildId,
    pub state: SessionState,
    pub paused: bool,
    pub position_ms: u64,
    pub current: Option<TrackSummary>,
    pub upcoming: Vec<TrackSummary>,
    pub upcoming_total: usize,
    pub upcoming_duration_ms: u64,
    /// Los últimos tracks reproducidos, en orden de reproducción
    pub history: Vec<TrackSummary>,
    pub history_total: usize,
    pub loop_mode: LoopMode,
    pub volume: u8,
    pub node: String,
}

/// Resultado de un `/seek`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOutcome {
    Seeked(Duration),
    NothingPlaying,
    NotSeekable,
    /// La posición pedida pasa el final del track
    OutOfRange { length: Duration },
}

/// Peticiones de comandos; cada una lleva su canal de respuesta
#[derive(Debug)]
pub enum Request {
    AddTracks {
        tracks: Vec<Track>,
        next: bool,
        reply: oneshot::Sender<()>,
    },
    Next {
        position: Option<usize>,
        reply: oneshot::Sender<Option<Track>>,
    },
    Prev {
        reply: oneshot::Sender<Option<Track>>,
    },
    Shuffle {
        reply: oneshot::Sender<()>,
    },
    Clear {
        reply: oneshot::Sender<()>,
    },
    Move {
        from: usize,
        to: usize,
        reply: oneshot::Sender<Option<Track>>,
    },
    Remove {
        from: usize,
        to: usize,
        reply: oneshot::Sender<Option<usize>>,
    },
    SetPaused {
        paused: bool,
        reply: oneshot::Sender<bool>,
    },
    SetLoopMode {
        mode: LoopMode,
        reply: oneshot::Sender<()>,
    },
    Seek {
        position: Duration,
        reply: oneshot::Sender<SeekOutcome>,
    },
    SetVolume {
        volume: u8,
        reply: oneshot::Sender<u8>,
    },
    Snapshot {
        limit: usize,
        reply: oneshot::Sender<SessionSnapshot>,
    },
    Disconnect {
        reply: oneshot::Sender<()>,
    },
}

/// Todo lo que llega al mailbox de una sesión
#[derive(Debug)]
pub enum SessionMessage {
    Request(Request),
    Backend(BackendEvent),
    Membership { listeners: usize },
    IdleTimeout { generation: u64 },
}

/// Handle clonable para hablar con la sesión de un guild.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: u64,
    guild_id: GuildId,
    tx: UnboundedSender<SessionMessage>,
}

impl SessionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// `true` una vez que la sesión terminó
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Request,
    ) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SessionMessage::Request(make(reply)))
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    pub async fn add_tracks(&self, tracks: Vec<Track>, next: bool) -> Result<(), SessionError> {
        self.request(|reply| Request::AddTracks { tracks, next, reply })
            .await
    }

    /// Salta a la posición dada (1 = siguiente); devuelve el nuevo track
    pub async fn next(&self, position: Option<usize>) -> Result<Option<Track>, SessionError> {
        self.request(|reply| Request::Next { position, reply }).await
    }

    pub async fn prev(&self) -> Result<Option<Track>, SessionError> {
        self.request(|reply| Request::Prev { reply }).await
    }

    pub async fn shuffle(&self) -> Result<(), SessionError> {
        self.request(|reply| Request::Shuffle { reply }).await
    }

    pub async fn clear(&self) -> Result<(), SessionError> {
        self.request(|reply| Request::Clear { reply }).await
    }

    pub async fn move_track(&self, from: usize, to: usize) -> Result<Option<Track>, SessionError> {
        self.request(|reply| Request::Move { from, to, reply }).await
    }

    pub async fn remove(&self, from: usize, to: usize) -> Result<Option<usize>, SessionError> {
        self.request(|reply| Request::Remove { from, to, reply }).await
    }

    pub async fn set_paused(&self, paused: bool) -> Result<bool, SessionError> {
        self.request(|reply| Request::SetPaused { paused, reply })
            .await
    }

    pub async fn set_loop_mode(&self, mode: LoopMode) -> Result<(), SessionError> {
        self.request(|reply| Request::SetLoopMode { mode, reply })
            .await
    }

    pub async fn seek(&self, position: Duration) -> Result<SeekOutcome, SessionError> {
        self.request(|reply| Request::Seek { position, reply }).await
    }

    /// Cambia el volumen de la sesión; devuelve el valor aplicado (0-100)
    pub async fn set_volume(&self, volume: u8) -> Result<u8, SessionError> {
        self.request(|reply| Request::SetVolume { volume, reply })
            .await
    }

    pub async fn snapshot(&self, limit: usize) -> Result<SessionSnapshot, SessionError> {
        self.request(|reply| Request::Snapshot { limit, reply })
            .await
    }

    /// Cierra la sesión; sobre una sesión ya cerrada no hace nada
    pub async fn disconnect(&self) -> Result<(), SessionError> {
        match self.request(|reply| Request::Disconnect { reply }).await {
            Err(SessionError::Closed) => {
                debug!("Sesión de guild {} ya estaba cerrada", self.guild_id);
                Ok(())
            }
            result => result,
        }
    }

    /// Notifica cuántos oyentes (no bots) quedan en el canal de voz
    pub fn membership_changed(&self, listeners: usize) {
        let _ = self.tx.send(SessionMessage::Membership { listeners });
    }
}

/// Aviso "reproduciendo ahora" publicado y el track al que pertenece
#[derive(Debug)]
struct NowPlaying {
    message_id: MessageId,
    handle: String,
}

/// Máquina de estados de la reproducción de un guild.
pub struct PlaybackSession {
    guild_id: GuildId,
    queue: Queue,
    loop_mode: LoopMode,
    paused: bool,
    playing: bool,
    destroyed: bool,
    volume: u8,
    text_channel: Option<ChannelId>,
    now_playing: Option<NowPlaying>,
    idle: IdleTimer,
    settings: SessionSettings,
    backend: Arc<dyn AudioBackend>,
    platform: Arc<dyn ChatPlatform>,
    persist: PersistQueue,
    mailbox: WeakUnboundedSender<SessionMessage>,
}

impl PlaybackSession {
    /// Se une al canal de voz y lanza la tarea de la sesión.
    ///
    /// The persisted queue is adopted inside the task before the first message
    /// is handled, so requests sent right away already see it.
    pub async fn spawn(
        guild_id: GuildId,
        voice_channel: ChannelId,
        text_channel: Option<ChannelId>,
        context: &SessionContext,
    ) -> Result<(SessionHandle, JoinHandle<()>), BackendError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mailbox = tx.downgrade();

        let backend = context
            .platform
            .join(guild_id, voice_channel, BackendEventSink::new(mailbox.clone()))
            .await?;

        let session = Self {
            guild_id,
            queue: Queue::new(),
            loop_mode: LoopMode::None,
            paused: false,
            playing: false,
            destroyed: false,
            volume: context.settings.initial_volume.min(100),
            text_channel,
            now_playing: None,
            idle: IdleTimer::new(context.settings.idle_timeout),
            settings: context.settings,
            backend,
            platform: context.platform.clone(),
            persist: PersistQueue::spawn(guild_id, context.persistence.clone()),
            mailbox,
        };

        let persistence = context.persistence.clone();
        let task = tokio::spawn(session.run(rx, persistence));

        let handle = SessionHandle {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            guild_id,
            tx,
        };

        info!("🔊 Sesión de reproducción creada para guild {}", guild_id);
        Ok((handle, task))
    }

    async fn run(mut self, mut rx: UnboundedReceiver<SessionMessage>, persistence: QueuePersistence) {
        self.init(&persistence).await;

        while let Some(message) = rx.recv().await {
            self.handle(message).await;
            if self.destroyed {
                break;
            }
        }

        // Todos los handles se soltaron sin un stop explícito
        if !self.destroyed {
            self.disconnect().await;
        }

        debug!("Tarea de sesión finalizada para guild {}", self.guild_id);
    }

    /// Adopta la cola guardada del guild si no expiró
    pub async fn init(&mut self, persistence: &QueuePersistence) {
        if let Some(record) = persistence.resolve(self.guild_id).await {
            self.queue = Queue::deserialize(record);
            info!(
                "📂 Cola restaurada para guild {} ({} tracks)",
                self.guild_id,
                self.queue.total_len()
            );
        }
    }

    async fn handle(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::Request(request) => self.handle_request(request).await,
            SessionMessage::Backend(event) => self.on_backend_event(event).await,
            SessionMessage::Membership { listeners } => self.on_membership_change(listeners),
            SessionMessage::IdleTimeout { generation } => {
                if self.idle.fire(generation) {
                    info!("🚪 Desconexión por inactividad en guild {}", self.guild_id);
                    self.disconnect().await;
                }
            }
        }
    }

    async fn handle_request(&mut self, request: Request) {
        match request {
            Request::AddTracks { tracks, next, reply } => {
                self.add_tracks(tracks, next).await;
                let _ = reply.send(());
            }
            Request::Next { position, reply } => {
                let track = self.next(position).await;
                let _ = reply.send(track);
            }
            Request::Prev { reply } => {
                let track = self.prev().await;
                let _ = reply.send(track);
            }
            Request::Shuffle { reply } => {
                self.shuffle();
                let _ = reply.send(());
            }
            Request::Clear { reply } => {
                self.clear();
                let _ = reply.send(());
            }
            Request::Move { from, to, reply } => {
                let _ = reply.send(self.move_track(from, to));
            }
            Request::Remove { from, to, reply } => {
                let _ = reply.send(self.remove(from, to));
            }
            Request::SetPaused { paused, reply } => {
                let paused = self.set_paused(paused).await;
                let _ = reply.send(paused);
            }
            Request::SetLoopMode { mode, reply } => {
                self.set_loop_mode(mode);
                let _ = reply.send(());
            }
            Request::Seek { position, reply } => {
                let outcome = self.seek(position).await;
                let _ = reply.send(outcome);
            }
            Request::SetVolume { volume, reply } => {
                let volume = self.set_volume(volume).await;
                let _ = reply.send(volume);
            }
            Request::Snapshot { limit, reply } => {
                let snapshot = self.snapshot(limit).await;
                let _ = reply.send(snapshot);
            }
            Request::Disconnect { reply } => {
                self.disconnect().await;
                let _ = reply.send(());
            }
        }
    }

    /// Track actual, solo mientras se está reproduciendo
    pub fn current(&self) -> Option<&Track> {
        if self.playing {
            self.queue.current()
        } else {
            None
        }
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn state(&self) -> SessionState {
        if self.destroyed {
            SessionState::Destroyed
        } else if self.idle.is_armed() {
            SessionState::DisconnectScheduled
        } else if self.playing && self.paused {
            SessionState::Paused
        } else if self.playing {
            SessionState::Playing
        } else {
            SessionState::Idle
        }
    }

    /// Reproduce `track`, o detiene y programa la desconexión si no hay
    pub async fn play(&mut self, track: Option<Track>) {
        let Some(track) = track else {
            self.playing = false;
            if let Err(e) = self.backend.stop().await {
                warn!("Error al detener reproducción en guild {}: {}", self.guild_id, e);
            }
            self.schedule_disconnect();
            return;
        };

        self.playing = true;
        self.paused = false;
        self.idle.cancel();

        if let Err(e) = self
            .backend
            .play_track(&track.backend_handle, self.volume)
            .await
        {
            error!("❌ Error al reproducir {} en guild {}: {}", track.title, self.guild_id, e);
            self.notify(Notice::Error {
                message: format!("No se pudo reproducir **{}**: {}", track.title, e),
            })
            .await;
            self.playing = false;
            self.schedule_disconnect();
        }
    }

    /// Avanza `max(position, 1)` tracks y reproduce el resultado
    pub async fn next(&mut self, position: Option<usize>) -> Option<Track> {
        let skip = position.filter(|pos| *pos > 1).unwrap_or(1);
        let track = self.queue.next(skip).cloned();

        match &track {
            Some(track) => info!("⏭️ Siguiente en guild {}: {}", self.guild_id, track.title),
            None => info!("📭 Fin de la cola en guild {}", self.guild_id),
        }

        self.play(track.clone()).await;
        self.persist_queue();
        track
    }

    /// Vuelve al track anterior; sin anterior la reproducción sigue igual
    pub async fn prev(&mut self) -> Option<Track> {
        let track = self.queue.prev().cloned()?;
        info!("⏮️ Anterior en guild {}: {}", self.guild_id, track.title);

        self.play(Some(track.clone())).await;
        self.persist_queue();
        Some(track)
    }

    /// Agrega tracks; si no hay nada sonando empieza a reproducir.
    ///
    /// While not playing, new tracks always go right after the cursor so they
    /// win over whatever was left in a restored queue.
    pub async fn add_tracks(&mut self, tracks: Vec<Track>, next: bool) {
        if tracks.is_empty() {
            return;
        }

        info!("➕ {} tracks agregados en guild {}", tracks.len(), self.guild_id);
        self.queue.add(tracks, next || !self.playing);

        if self.current().is_none() {
            self.next(None).await;
        } else {
            self.persist_queue();
        }
    }

    pub fn shuffle(&mut self) {
        self.queue.shuffle();
        info!("🔀 Cola mezclada en guild {}", self.guild_id);
        self.persist_queue();
    }

    pub fn clear(&mut self) {
        self.queue.clear();
        info!("🗑️ Cola limpiada en guild {}", self.guild_id);
        self.persist_queue();
    }

    pub fn move_track(&mut self, from: usize, to: usize) -> Option<Track> {
        let track = self.queue.move_track(from, to).cloned()?;
        debug!("📍 Track movido de {} a {} en guild {}", from, to, self.guild_id);
        self.persist_queue();
        Some(track)
    }

    pub fn remove(&mut self, from: usize, to: usize) -> Option<usize> {
        let removed = self.queue.remove(from, to)?;
        debug!("❌ {} tracks eliminados en guild {}", removed, self.guild_id);
        self.persist_queue();
        Some(removed)
    }

    pub fn set_loop_mode(&mut self, mode: LoopMode) {
        self.loop_mode = mode;
        match mode {
            LoopMode::None => info!("➡️ Repetición desactivada en guild {}", self.guild_id),
            LoopMode::Song => info!("🔂 Repetir canción en guild {}", self.guild_id),
            LoopMode::Queue => info!("🔁 Repetir cola en guild {}", self.guild_id),
            LoopMode::Autoplay => info!("📻 Autoplay en guild {}", self.guild_id),
        }
    }

    /// Pausa o reanuda; primero actualiza los botones, luego el backend
    pub async fn set_paused(&mut self, paused: bool) -> bool {
        if self.paused != paused {
            let message_id = self.now_playing.as_ref().map(|notice| notice.message_id);
            if let (Some(channel_id), Some(message_id)) = (self.text_channel, message_id) {
                if let Err(e) = self
                    .platform
                    .edit_controls(channel_id, message_id, paused)
                    .await
                {
                    warn!("No se pudieron actualizar los controles: {:?}", e);
                }
            }
        }

        if let Err(e) = self.backend.set_paused(paused).await {
            warn!("Error al cambiar pausa en guild {}: {}", self.guild_id, e);
        }

        self.paused = paused;
        if paused {
            info!("⏸️ Reproducción pausada en guild {}", self.guild_id);
        } else {
            info!("▶️ Reproducción reanudada en guild {}", self.guild_id);
        }
        paused
    }

    /// Salta dentro del track actual si es seekable y la posición cabe
    pub async fn seek(&mut self, position: Duration) -> SeekOutcome {
        let Some(track) = self.current() else {
            return SeekOutcome::NothingPlaying;
        };
        if !track.seekable {
            return SeekOutcome::NotSeekable;
        }
        if position > track.duration() {
            return SeekOutcome::OutOfRange {
                length: track.duration(),
            };
        }

        if let Err(e) = self.backend.seek(position).await {
            warn!("Error al hacer seek en guild {}: {}", self.guild_id, e);
        }
        info!("⏩ Seek a {}s en guild {}", position.as_secs(), self.guild_id);
        SeekOutcome::Seeked(position)
    }

    /// Ajusta el volumen del track actual y de los siguientes
    pub async fn set_volume(&mut self, volume: u8) -> u8 {
        self.volume = volume.min(100);
        if self.playing {
            if let Err(e) = self.backend.set_volume(self.volume).await {
                warn!("Error al cambiar volumen en guild {}: {}", self.guild_id, e);
            }
        }
        info!("🔊 Volumen {}% en guild {}", self.volume, self.guild_id);
        self.volume
    }

    /// Guarda la cola, destruye la sesión del backend y sale del canal.
    /// Una segunda llamada no hace nada.
    pub async fn disconnect(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        self.playing = false;
        self.idle.cancel();

        let record = self.queue.serialize();
        self.persist.save(record.clone());
        self.persist.archive(record);

        self.clear_now_playing().await;

        if let Err(e) = self.backend.destroy().await {
            warn!("Error al destruir el backend en guild {}: {}", self.guild_id, e);
        }
        if let Err(e) = self.platform.leave(self.guild_id).await {
            warn!("Error al salir del canal de voz en guild {}: {}", self.guild_id, e);
        }

        info!("👋 Sesión cerrada para guild {}", self.guild_id);
    }

    pub async fn snapshot(&self, limit: usize) -> SessionSnapshot {
        let position_ms = if self.playing {
            self.backend.position().await.as_millis() as u64
        } else {
            0
        };
        let history = self.queue.history();
        let recent = &history[history.len().saturating_sub(limit)..];

        SessionSnapshot {
            guild_id: self.guild_id,
            state: self.state(),
            paused: self.paused,
            position_ms,
            current: self.current().map(TrackSummary::from),
            upcoming: self.queue.upcoming().iter().take(limit).map(TrackSummary::from).collect(),
            upcoming_total: self.queue.len(),
            upcoming_duration_ms: self.queue.upcoming_duration().as_millis() as u64,
            history: recent.iter().map(TrackSummary::from).collect(),
            history_total: history.len(),
            loop_mode: self.loop_mode,
            volume: self.volume,
            node: self.backend.node_name(),
        }
    }

    async fn on_backend_event(&mut self, event: BackendEvent) {
        match event {
            BackendEvent::Start { handle } => self.on_track_start(&handle).await,
            BackendEvent::End { handle, reason } => self.on_track_end(&handle, reason).await,
            BackendEvent::Exception { handle, message } => {
                warn!("⚠️ Excepción en {} (guild {}): {}", handle, self.guild_id, message);
                self.notify(Notice::Error {
                    message: format!("Ocurrió un error al reproducir el track: {}", message),
                })
                .await;
            }
            BackendEvent::Closed => {
                if !self.backend.is_connected().await {
                    warn!("🔌 Conexión de voz cerrada en guild {}", self.guild_id);
                    self.disconnect().await;
                }
            }
        }
    }

    async fn on_track_start(&mut self, handle: &str) {
        let Some(track) = self.current().filter(|t| t.backend_handle == handle).cloned() else {
            debug!("Inicio de un track que ya no es el actual: {}", handle);
            return;
        };

        info!(
            "🎵 [guild {} @ {}] {} - {}",
            self.guild_id,
            self.backend.node_name(),
            track.title,
            track.author
        );

        self.clear_now_playing().await;
        if let Some(channel_id) = self.text_channel {
            let notice = Notice::NowPlaying {
                track,
                paused: self.paused,
            };
            match self.platform.send_notice(channel_id, notice).await {
                Ok(message_id) => {
                    self.now_playing = Some(NowPlaying {
                        message_id,
                        handle: handle.to_string(),
                    })
                }
                Err(e) => error!("Error al enviar mensaje now playing: {:?}", e),
            }
        }
    }

    async fn on_track_end(&mut self, handle: &str, reason: EndReason) {
        // Solo se borra el aviso del track que terminó, nunca el de uno nuevo
        if self.now_playing.as_ref().is_some_and(|notice| notice.handle == handle) {
            self.clear_now_playing().await;
        }

        if !reason.advances_queue() {
            debug!("Track {} terminó ({:?}), sin acción", handle, reason);
            return;
        }

        if self.current().map(|t| t.backend_handle.as_str()) != Some(handle) {
            debug!("Fin de un track que ya no es el actual: {}", handle);
            return;
        }

        match self.loop_mode {
            LoopMode::Song => {
                let current = self.queue.current().cloned();
                self.play(current).await;
            }
            LoopMode::Queue if self.queue.upcoming().is_empty() => {
                info!("🔁 Reiniciando cola en guild {}", self.guild_id);
                self.queue.restart();
                self.next(None).await;
            }
            LoopMode::None | LoopMode::Queue | LoopMode::Autoplay => {
                self.next(None).await;
            }
        }
    }

    fn on_membership_change(&mut self, listeners: usize) {
        // Un canal que sigue vacío no reinicia la cuenta regresiva
        if listeners == 0 && self.idle.is_armed() {
            debug!("Canal sigue vacío en guild {}", self.guild_id);
        } else if listeners == 0 {
            info!(
                "🚪 Canal vacío en guild {}, desconexión en {}s",
                self.guild_id,
                self.idle.grace().as_secs()
            );
            self.schedule_disconnect();
        } else if self.idle.cancel() {
            info!("👥 Oyentes de vuelta en guild {}, desconexión cancelada", self.guild_id);
        }
    }

    fn schedule_disconnect(&mut self) {
        let mailbox = self.mailbox.clone();
        self.idle.arm(move |generation| {
            if let Some(tx) = mailbox.upgrade() {
                let _ = tx.send(SessionMessage::IdleTimeout { generation });
            }
        });
    }

    async fn notify(&self, notice: Notice) {
        let Some(channel_id) = self.text_channel else {
            return;
        };
        if let Err(e) = self.platform.send_notice(channel_id, notice).await {
            warn!("No se pudo enviar aviso en guild {}: {:?}", self.guild_id, e);
        }
    }

    async fn clear_now_playing(&mut self) {
        let message_id = self.now_playing.take().map(|notice| notice.message_id);
        let (Some(channel_id), Some(message_id)) = (self.text_channel, message_id) else {
            return;
        };
        if let Err(e) = self.platform.delete_message(channel_id, message_id).await {
            warn!("No se pudo borrar el mensaje now playing {}: {:?}", message_id, e);
        }
    }

    fn persist_queue(&self) {
        self.persist.save(self.queue.serialize());
    }
}
