use dashmap::DashMap;
use serenity::{
    model::id::{ChannelId, GuildId},
    prelude::TypeMapKey,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::{
    queue::SerializedQueue,
    session::{PlaybackSession, SessionContext, SessionHandle, SessionSnapshot},
};
use crate::error::BackendError;

/// Registro de sesiones activas, una por guild.
///
/// A session removes itself from the registry when its task ends, so a guild
/// whose session was destroyed gets a fresh one on the next `/play`.
pub struct SessionManager {
    sessions: Arc<DashMap<GuildId, SessionHandle>>,
    /// Un candado por guild: un join lento no frena a los demás
    creating: DashMap<GuildId, Arc<Mutex<()>>>,
    context: SessionContext,
}

impl SessionManager {
    pub fn new(context: SessionContext) -> Self {
        info!("🎵 Inicializando SessionManager");
        Self {
            sessions: Arc::new(DashMap::new()),
            creating: DashMap::new(),
            context,
        }
    }

    /// Sesión viva del guild, si existe
    pub fn get(&self, guild_id: GuildId) -> Option<SessionHandle> {
        self.sessions
            .get(&guild_id)
            .map(|entry| entry.value().clone())
            .filter(|handle| !handle.is_closed())
    }

    /// Devuelve la sesión del guild o se une al canal de voz y crea una
    pub async fn get_or_create(
        &self,
        guild_id: GuildId,
        voice_channel: ChannelId,
        text_channel: Option<ChannelId>,
    ) -> Result<SessionHandle, BackendError> {
        if let Some(handle) = self.get(guild_id) {
            return Ok(handle);
        }

        // Evita dos joins concurrentes para el mismo guild
        let lock = self.creating.entry(guild_id).or_default().clone();
        let _guard = lock.lock().await;
        if let Some(handle) = self.get(guild_id) {
            return Ok(handle);
        }

        let (handle, task) =
            PlaybackSession::spawn(guild_id, voice_channel, text_channel, &self.context).await?;
        self.sessions.insert(guild_id, handle.clone());

        let sessions = self.sessions.clone();
        let session_id = handle.id();
        tokio::spawn(async move {
            if let Err(e) = task.await {
                error!("💥 La sesión de guild {} terminó con error: {:?}", guild_id, e);
            }
            sessions.remove_if(&guild_id, |_, handle| handle.id() == session_id);
            debug!("🗑️ Sesión {} eliminada del registro", session_id);
        });

        Ok(handle)
    }

    /// Reenvía el conteo de oyentes cuando alguien entra o sale del canal del bot.
    ///
    /// Updates that touch neither `old_channel` nor `new_channel` of the bot
    /// (mutes, joins in other channels) are ignored.
    pub fn voice_state_changed(
        &self,
        guild_id: GuildId,
        old_channel: Option<ChannelId>,
        new_channel: Option<ChannelId>,
    ) {
        let Some(handle) = self.get(guild_id) else {
            return;
        };
        let Some(bot_channel) = self.context.platform.voice_channel(guild_id) else {
            return;
        };
        if old_channel == new_channel || ![old_channel, new_channel].contains(&Some(bot_channel)) {
            return;
        }
        if let Some(listeners) = self.context.platform.listener_count(guild_id) {
            debug!("👥 {} oyentes en guild {}", listeners, guild_id);
            handle.membership_changed(listeners);
        }
    }

    /// Colas recientes del guild, la más nueva primero
    pub async fn history(&self, guild_id: GuildId, limit: usize) -> Vec<SerializedQueue> {
        self.context.persistence.history(guild_id, limit).await
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// Snapshots de todas las sesiones activas
    pub async fn snapshots(&self, limit: usize) -> Vec<SessionSnapshot> {
        let handles: Vec<SessionHandle> = self.sessions.iter().map(|e| e.value().clone()).collect();
        let mut snapshots = Vec::with_capacity(handles.len());
        for handle in handles {
            if let Ok(snapshot) = handle.snapshot(limit).await {
                snapshots.push(snapshot);
            }
        }
        snapshots
    }

    /// Cierra todas las sesiones (apagado del bot)
    pub async fn shutdown(&self) {
        let handles: Vec<SessionHandle> = self.sessions.iter().map(|e| e.value().clone()).collect();
        info!("🛑 Cerrando {} sesiones activas", handles.len());
        for handle in handles {
            let _ = handle.disconnect().await;
        }
    }
}

impl TypeMapKey for SessionManager {
    type Value = Arc<SessionManager>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{
            session::{SessionSettings, SessionState},
            testing::{FakePlatform, MemoryStore},
        },
        storage::QueuePersistence,
    };
    use std::{sync::atomic::Ordering, time::Duration};

    const GUILD: GuildId = GuildId::new(7);
    const VOICE: ChannelId = ChannelId::new(70);

    fn manager() -> (SessionManager, Arc<FakePlatform>, Arc<MemoryStore>) {
        let platform = Arc::new(FakePlatform::default());
        let store = Arc::new(MemoryStore::default());
        let manager = SessionManager::new(SessionContext {
            platform: platform.clone(),
            persistence: QueuePersistence::new(store.clone()),
            settings: SessionSettings::default(),
        });
        (manager, platform, store)
    }

    #[tokio::test(start_paused = true)]
    async fn reuses_the_live_session_for_a_guild() {
        let (manager, platform, _store) = manager();

        let first = manager.get_or_create(GUILD, VOICE, None).await.unwrap();
        let second = manager.get_or_create(GUILD, VOICE, None).await.unwrap();

        assert_eq!(first.id(), second.id());
        assert_eq!(platform.joins.load(Ordering::SeqCst), 1);
        assert_eq!(manager.active_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn destroyed_session_leaves_the_registry() {
        let (manager, platform, _store) = manager();
        let first = manager.get_or_create(GUILD, VOICE, None).await.unwrap();

        first.disconnect().await.unwrap();
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert!(manager.get(GUILD).is_none());
        assert_eq!(manager.active_count(), 0);

        let second = manager.get_or_create(GUILD, VOICE, None).await.unwrap();
        assert_ne!(first.id(), second.id());
        assert_eq!(platform.joins.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_channel_schedules_disconnect() {
        let (manager, platform, _store) = manager();
        let session = manager.get_or_create(GUILD, VOICE, None).await.unwrap();

        platform.listeners.store(0, Ordering::SeqCst);
        manager.voice_state_changed(GUILD, Some(VOICE), None);
        tokio::time::sleep(Duration::from_secs(61)).await;
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert!(session.is_closed());
        assert!(manager.get(GUILD).is_none());
        assert_eq!(platform.leaves.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn voice_updates_outside_the_bot_channel_are_ignored() {
        let (manager, platform, _store) = manager();
        let session = manager.get_or_create(GUILD, VOICE, None).await.unwrap();
        let elsewhere = ChannelId::new(71);

        platform.listeners.store(0, Ordering::SeqCst);
        manager.voice_state_changed(GUILD, None, Some(elsewhere));
        manager.voice_state_changed(GUILD, Some(VOICE), Some(VOICE));
        assert_eq!(session.snapshot(10).await.unwrap().state, SessionState::Idle);

        manager.voice_state_changed(GUILD, Some(VOICE), Some(elsewhere));
        assert_eq!(
            session.snapshot(10).await.unwrap().state,
            SessionState::DisconnectScheduled
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_join_does_not_block_other_guilds() {
        let (manager, platform, _store) = manager();
        let manager = Arc::new(manager);
        let slow_guild = GuildId::new(8);
        *platform.stalled_guild.lock() = Some(slow_guild);

        let slow = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.get_or_create(slow_guild, VOICE, None).await })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;

        let created = tokio::time::timeout(
            Duration::from_secs(5),
            manager.get_or_create(GUILD, VOICE, None),
        )
        .await;

        assert!(matches!(created, Ok(Ok(_))));
        assert!(!slow.is_finished());
        slow.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_saves_and_archives_queues() {
        let (manager, _platform, store) = manager();
        let session = manager.get_or_create(GUILD, VOICE, None).await.unwrap();
        session
            .add_tracks(vec![crate::audio::track::Track::new("a", "b", "h")], false)
            .await
            .unwrap();

        manager.shutdown().await;
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert!(store.saved.lock().contains_key(&GUILD));
        let history = manager.history(GUILD, 5).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].tracks[0].title, "a");
    }
}
