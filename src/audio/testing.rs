//! Dobles de prueba para el motor de reproducción.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId, MessageId};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use super::{
    backend::{AudioBackend, BackendEvent, BackendEventSink, ChatPlatform, Notice},
    queue::SerializedQueue,
};
use crate::{
    error::{BackendError, StorageError},
    storage::QueueStore,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Play(String, u8),
    Stop,
    Pause(bool),
    Seek(Duration),
    Volume(u8),
    Destroy,
}

#[derive(Default)]
pub(crate) struct FakeBackend {
    calls: Mutex<Vec<Call>>,
    pub disconnected: AtomicBool,
}

impl FakeBackend {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn played(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Play(handle, _) => Some(handle),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }
}

#[async_trait]
impl AudioBackend for FakeBackend {
    async fn play_track(&self, handle: &str, volume: u8) -> Result<(), BackendError> {
        self.calls.lock().push(Call::Play(handle.to_string(), volume));
        Ok(())
    }

    async fn stop(&self) -> Result<(), BackendError> {
        self.calls.lock().push(Call::Stop);
        Ok(())
    }

    async fn set_paused(&self, paused: bool) -> Result<(), BackendError> {
        self.calls.lock().push(Call::Pause(paused));
        Ok(())
    }

    async fn seek(&self, position: Duration) -> Result<(), BackendError> {
        self.calls.lock().push(Call::Seek(position));
        Ok(())
    }

    async fn set_volume(&self, volume: u8) -> Result<(), BackendError> {
        self.calls.lock().push(Call::Volume(volume));
        Ok(())
    }

    async fn destroy(&self) -> Result<(), BackendError> {
        self.calls.lock().push(Call::Destroy);
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        !self.disconnected.load(Ordering::SeqCst)
    }

    async fn position(&self) -> Duration {
        Duration::from_secs(42)
    }

    fn node_name(&self) -> String {
        "test-node".to_string()
    }
}

#[derive(Default)]
pub(crate) struct FakePlatform {
    pub backend: Arc<FakeBackend>,
    pub sink: Mutex<Option<BackendEventSink>>,
    pub notices: Mutex<Vec<Notice>>,
    pub deleted: Mutex<Vec<MessageId>>,
    pub edits: Mutex<Vec<bool>>,
    pub leaves: AtomicUsize,
    pub joins: AtomicUsize,
    pub listeners: AtomicUsize,
    /// Canal al que se unió el bot por última vez
    pub channel: Mutex<Option<ChannelId>>,
    /// Los joins de este guild nunca terminan
    pub stalled_guild: Mutex<Option<GuildId>>,
    next_message: AtomicU64,
}

impl FakePlatform {
    pub fn emit(&self, event: BackendEvent) {
        if let Some(sink) = self.sink.lock().as_ref() {
            sink.emit(event);
        }
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        events: BackendEventSink,
    ) -> Result<Arc<dyn AudioBackend>, BackendError> {
        let stalled = *self.stalled_guild.lock() == Some(guild_id);
        if stalled {
            std::future::pending::<()>().await;
        }

        self.joins.fetch_add(1, Ordering::SeqCst);
        *self.channel.lock() = Some(channel_id);
        *self.sink.lock() = Some(events);
        let backend: Arc<dyn AudioBackend> = self.backend.clone();
        Ok(backend)
    }

    async fn leave(&self, _guild_id: GuildId) -> Result<(), BackendError> {
        self.leaves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn voice_channel(&self, _guild_id: GuildId) -> Option<ChannelId> {
        *self.channel.lock()
    }

    fn listener_count(&self, _guild_id: GuildId) -> Option<usize> {
        Some(self.listeners.load(Ordering::SeqCst))
    }

    async fn send_notice(&self, _channel_id: ChannelId, notice: Notice) -> anyhow::Result<MessageId> {
        self.notices.lock().push(notice);
        Ok(MessageId::new(self.next_message.fetch_add(1, Ordering::SeqCst) + 1))
    }

    async fn delete_message(&self, _channel_id: ChannelId, message_id: MessageId) -> anyhow::Result<()> {
        self.deleted.lock().push(message_id);
        Ok(())
    }

    async fn edit_controls(
        &self,
        _channel_id: ChannelId,
        _message_id: MessageId,
        paused: bool,
    ) -> anyhow::Result<()> {
        self.edits.lock().push(paused);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    pub saved: Mutex<HashMap<GuildId, SerializedQueue>>,
    pub archived: Mutex<Vec<SerializedQueue>>,
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn load(&self, guild_id: GuildId) -> Result<Option<SerializedQueue>, StorageError> {
        Ok(self.saved.lock().get(&guild_id).cloned())
    }

    async fn save(&self, guild_id: GuildId, record: SerializedQueue) -> Result<(), StorageError> {
        self.saved.lock().insert(guild_id, record);
        Ok(())
    }

    async fn delete(&self, guild_id: GuildId) -> Result<(), StorageError> {
        self.saved.lock().remove(&guild_id);
        Ok(())
    }

    async fn archive(&self, _guild_id: GuildId, record: SerializedQueue) -> Result<(), StorageError> {
        self.archived.lock().push(record);
        Ok(())
    }

    async fn archived(&self, _guild_id: GuildId, limit: usize) -> Result<Vec<SerializedQueue>, StorageError> {
        Ok(self.archived.lock().iter().rev().take(limit).cloned().collect())
    }
}

/// Store cuyas escrituras nunca terminan
pub(crate) struct StalledStore;

#[async_trait]
impl QueueStore for StalledStore {
    async fn load(&self, _guild_id: GuildId) -> Result<Option<SerializedQueue>, StorageError> {
        Ok(None)
    }

    async fn save(&self, _guild_id: GuildId, _record: SerializedQueue) -> Result<(), StorageError> {
        std::future::pending().await
    }

    async fn delete(&self, _guild_id: GuildId) -> Result<(), StorageError> {
        std::future::pending().await
    }

    async fn archive(&self, _guild_id: GuildId, _record: SerializedQueue) -> Result<(), StorageError> {
        std::future::pending().await
    }

    async fn archived(&self, _guild_id: GuildId, _limit: usize) -> Result<Vec<SerializedQueue>, StorageError> {
        Ok(Vec::new())
    }
}
