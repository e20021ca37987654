use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use serenity::model::id::GuildId;
use songbird::{
    events::CoreEvent,
    input::{Compose, Input, YoutubeDl},
    tracks::{PlayMode, Track as VoiceTrack, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, TrackEvent,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::{
    backend::{AudioBackend, BackendEvent, BackendEventSink, EndReason},
    track::Track,
};
use crate::error::BackendError;

/// Backend de audio sobre una llamada de songbird (yt-dlp como fuente).
///
/// The backend handle of a [`Track`] is the URL handed to yt-dlp.
pub struct SongbirdBackend {
    guild_id: GuildId,
    call: Arc<Mutex<Call>>,
    http: reqwest::Client,
    sink: BackendEventSink,
    current: SyncMutex<Option<ActiveTrack>>,
}

struct ActiveTrack {
    handle: TrackHandle,
    events: Arc<TrackEvents>,
}

impl ActiveTrack {
    /// Detiene el track dejando anotado por qué terminó
    fn finish(self, reason: EndReason) {
        *self.events.end_reason.lock() = Some(reason);
        if let Err(e) = self.handle.stop() {
            debug!("Track {} ya estaba detenido: {}", self.events.backend_handle, e);
        }
    }
}

/// Estado compartido por los handlers de eventos de un track
struct TrackEvents {
    guild_id: GuildId,
    backend_handle: String,
    sink: BackendEventSink,
    started: AtomicBool,
    end_reason: SyncMutex<Option<EndReason>>,
}

#[derive(Clone, Copy)]
enum TrackEventKind {
    Play,
    End,
    Error,
}

struct TrackEventHandler {
    kind: TrackEventKind,
    events: Arc<TrackEvents>,
}

#[async_trait]
impl VoiceEventHandler for TrackEventHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let events = &self.events;
        let handle = events.backend_handle.clone();

        match self.kind {
            // Play también se dispara al reanudar una pausa
            TrackEventKind::Play => {
                if !events.started.swap(true, Ordering::SeqCst) {
                    events.sink.emit(BackendEvent::Start { handle });
                }
            }
            TrackEventKind::End => {
                let reason = events.end_reason.lock().take().unwrap_or(EndReason::Finished);
                debug!("⏹️ Track {} terminó en guild {} ({:?})", handle, events.guild_id, reason);
                events.sink.emit(BackendEvent::End { handle, reason });
            }
            TrackEventKind::Error => {
                let message = match ctx {
                    EventContext::Track(tracks) => tracks
                        .iter()
                        .find_map(|(state, _)| match &state.playing {
                            PlayMode::Errored(e) => Some(format!("{:?}", e)),
                            _ => None,
                        })
                        .unwrap_or_else(|| "error desconocido".to_string()),
                    _ => "error desconocido".to_string(),
                };
                error!("❌ Error en track {} (guild {}): {}", handle, events.guild_id, message);
                events.sink.emit(BackendEvent::Exception {
                    handle: handle.clone(),
                    message,
                });
                events.sink.emit(BackendEvent::End {
                    handle,
                    reason: EndReason::LoadFailed,
                });
            }
        }

        None
    }
}

/// Avisa a la sesión cuando se cae la conexión de voz
struct DriverDisconnectHandler {
    guild_id: GuildId,
    sink: BackendEventSink,
}

#[async_trait]
impl VoiceEventHandler for DriverDisconnectHandler {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        warn!("🔌 Driver de voz desconectado en guild {}", self.guild_id);
        self.sink.emit(BackendEvent::Closed);
        None
    }
}

impl SongbirdBackend {
    /// Envuelve una llamada ya unida y registra sus eventos globales
    pub async fn attach(
        guild_id: GuildId,
        call: Arc<Mutex<Call>>,
        http: reqwest::Client,
        sink: BackendEventSink,
    ) -> Arc<Self> {
        {
            let mut call = call.lock().await;
            call.add_global_event(
                Event::Core(CoreEvent::DriverDisconnect),
                DriverDisconnectHandler {
                    guild_id,
                    sink: sink.clone(),
                },
            );
        }

        Arc::new(Self {
            guild_id,
            call,
            http,
            sink,
            current: SyncMutex::new(None),
        })
    }

    /// Copia del handle del track actual (sin retener el lock en un await)
    fn current_handle(&self) -> Option<TrackHandle> {
        self.current.lock().as_ref().map(|active| active.handle.clone())
    }

    fn register_events(&self, track: &TrackHandle, events: &Arc<TrackEvents>) -> Result<(), BackendError> {
        let kinds = [
            (TrackEvent::Play, TrackEventKind::Play),
            (TrackEvent::End, TrackEventKind::End),
            (TrackEvent::Error, TrackEventKind::Error),
        ];

        for (event, kind) in kinds {
            track
                .add_event(
                    Event::Track(event),
                    TrackEventHandler {
                        kind,
                        events: events.clone(),
                    },
                )
                .map_err(|e| BackendError::Control(e.to_string()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl AudioBackend for SongbirdBackend {
    async fn play_track(&self, handle: &str, volume: u8) -> Result<(), BackendError> {
        let previous = self.current.lock().take();
        if let Some(previous) = previous {
            previous.finish(EndReason::Replaced);
        }

        let input: Input = YoutubeDl::new(self.http.clone(), handle.to_string()).into();
        let voice_track = VoiceTrack::from(input).volume(volume_scale(volume));
        let track = {
            let mut call = self.call.lock().await;
            if call.current_connection().is_none() {
                return Err(BackendError::NotConnected);
            }
            call.play(voice_track)
        };

        let events = Arc::new(TrackEvents {
            guild_id: self.guild_id,
            backend_handle: handle.to_string(),
            sink: self.sink.clone(),
            started: AtomicBool::new(false),
            end_reason: SyncMutex::new(None),
        });

        if let Err(e) = self.register_events(&track, &events) {
            let _ = track.stop();
            return Err(e);
        }

        debug!("▶️ Track {} enviado al driver de guild {}", handle, self.guild_id);
        *self.current.lock() = Some(ActiveTrack { handle: track, events });
        Ok(())
    }

    async fn stop(&self) -> Result<(), BackendError> {
        let active = self.current.lock().take();
        if let Some(active) = active {
            active.finish(EndReason::Stopped);
        }
        Ok(())
    }

    async fn set_paused(&self, paused: bool) -> Result<(), BackendError> {
        let current = self.current.lock();
        let Some(active) = current.as_ref() else {
            return Ok(());
        };

        let result = if paused {
            active.handle.pause()
        } else {
            active.handle.play()
        };
        result.map_err(|e| BackendError::Control(e.to_string()))
    }

    async fn seek(&self, position: Duration) -> Result<(), BackendError> {
        let Some(handle) = self.current_handle() else {
            return Ok(());
        };

        handle
            .seek_async(position)
            .await
            .map_err(|e| BackendError::Control(e.to_string()))?;
        debug!("⏩ Seek a {:?} en guild {}", position, self.guild_id);
        Ok(())
    }

    async fn set_volume(&self, volume: u8) -> Result<(), BackendError> {
        let Some(handle) = self.current_handle() else {
            return Ok(());
        };

        handle
            .set_volume(volume_scale(volume))
            .map_err(|e| BackendError::Control(e.to_string()))
    }

    async fn destroy(&self) -> Result<(), BackendError> {
        let active = self.current.lock().take();
        if let Some(active) = active {
            active.finish(EndReason::Cleared);
        }

        let mut call = self.call.lock().await;
        call.remove_all_global_events();
        call.stop();
        info!("🧹 Backend de audio destruido para guild {}", self.guild_id);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.call.lock().await.current_connection().is_some()
    }

    async fn position(&self) -> Duration {
        match self.current_handle() {
            Some(handle) => handle
                .get_info()
                .await
                .map(|state| state.position)
                .unwrap_or(Duration::ZERO),
            None => Duration::ZERO,
        }
    }

    fn node_name(&self) -> String {
        "songbird".to_string()
    }
}

/// Volumen 0-100 a la escala lineal de songbird (1.0 = original)
fn volume_scale(volume: u8) -> f32 {
    f32::from(volume.min(100)) / 100.0
}

/// Construye un [`Track`] a partir de los metadatos que reporta yt-dlp
pub async fn resolve_track(http: &reqwest::Client, url: &str) -> Result<Track, BackendError> {
    let mut source = YoutubeDl::new(http.clone(), url.to_string());
    let metadata = source
        .aux_metadata()
        .await
        .map_err(|e| BackendError::Play(e.to_string()))?;

    let title = metadata.title.unwrap_or_else(|| url.to_string());
    let author = metadata
        .artist
        .or(metadata.channel)
        .unwrap_or_else(|| "Desconocido".to_string());

    let mut track = Track::new(title, author, url).with_uri(metadata.source_url.unwrap_or_else(|| url.to_string()));
    if let Some(duration) = metadata.duration {
        track = track.with_duration(duration);
    }
    if let Some(thumbnail) = metadata.thumbnail {
        track = track.with_artwork(thumbnail);
    }
    if let Some(source_name) = source_name(url) {
        track = track.with_source(source_name);
    }

    debug!("🔎 Track resuelto: {} - {}", track.title, track.author);
    Ok(track)
}

/// Nombre de la fuente a partir del host de la URL
pub fn source_name(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let host = parsed.host_str()?.trim_start_matches("www.").trim_start_matches("m.");

    let name = match host {
        "youtube.com" | "youtu.be" | "music.youtube.com" => "youtube",
        "soundcloud.com" => "soundcloud",
        "bandcamp.com" => "bandcamp",
        other if other.ends_with(".bandcamp.com") => "bandcamp",
        other => other,
    };
    Some(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_names_from_hosts() {
        assert_eq!(source_name("https://www.youtube.com/watch?v=abc").as_deref(), Some("youtube"));
        assert_eq!(source_name("https://youtu.be/abc").as_deref(), Some("youtube"));
        assert_eq!(source_name("https://artist.bandcamp.com/track/x").as_deref(), Some("bandcamp"));
        assert_eq!(source_name("https://example.org/song.mp3").as_deref(), Some("example.org"));
        assert_eq!(source_name("not a url"), None);
    }

    #[test]
    fn volume_is_scaled_and_capped() {
        assert_eq!(volume_scale(0), 0.0);
        assert_eq!(volume_scale(50), 0.5);
        assert_eq!(volume_scale(100), 1.0);
        assert_eq!(volume_scale(250), 1.0);
    }
}
