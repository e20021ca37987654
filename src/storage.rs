//! Persistencia de colas por guild.
//!
//! - [`QueueStore`]: raw guild-keyed storage, free to fail.
//! - [`JsonQueueStore`]: default store, one JSON file per guild plus an archive
//!   of recently played queues.
//! - [`QueuePersistence`]: failure-tolerant adapter used by the engine. Storage
//!   errors are logged and swallowed, expired records are dropped.
//! - [`PersistQueue`]: per-guild background writer so playback never waits on
//!   storage.

use async_trait::async_trait;
use serenity::model::id::GuildId;
use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{fs, sync::mpsc};
use tracing::{debug, info, warn};

use crate::{audio::queue::SerializedQueue, error::StorageError};

/// Almacenamiento de colas serializadas por guild
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueueStore: Send + Sync {
    async fn load(&self, guild_id: GuildId) -> Result<Option<SerializedQueue>, StorageError>;

    /// Upsert de la cola actual del guild
    async fn save(&self, guild_id: GuildId, record: SerializedQueue) -> Result<(), StorageError>;

    async fn delete(&self, guild_id: GuildId) -> Result<(), StorageError>;

    /// Guarda una copia en el historial de colas del guild
    async fn archive(&self, guild_id: GuildId, record: SerializedQueue) -> Result<(), StorageError>;

    /// Colas archivadas, la más reciente primero
    async fn archived(&self, guild_id: GuildId, limit: usize) -> Result<Vec<SerializedQueue>, StorageError>;
}

/// Manager de almacenamiento basado en archivos JSON
pub struct JsonQueueStore {
    queues_dir: PathBuf,
    history_limit: usize,
}

impl JsonQueueStore {
    pub async fn new(data_dir: &Path, history_limit: usize) -> Result<Self, StorageError> {
        let queues_dir = data_dir.join("queues");
        fs::create_dir_all(queues_dir.join("history")).await?;

        info!("📁 Colas persistidas en: {}", queues_dir.display());

        Ok(Self {
            queues_dir,
            history_limit,
        })
    }

    fn queue_path(&self, guild_id: GuildId) -> PathBuf {
        self.queues_dir.join(format!("guild_{}.json", guild_id))
    }

    fn history_dir(&self, guild_id: GuildId) -> PathBuf {
        self.queues_dir
            .join("history")
            .join(format!("guild_{}", guild_id))
    }

    /// Archivos del historial ordenados del más nuevo al más viejo
    async fn history_entries(&self, guild_id: GuildId) -> Result<Vec<(i64, PathBuf)>, StorageError> {
        let dir = self.history_dir(guild_id);
        let mut files = match fs::read_dir(&dir).await {
            Ok(files) => files,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        while let Some(entry) = files.next_entry().await? {
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                if let Some(saved_at) = path
                    .file_stem()
                    .and_then(|n| n.to_str())
                    .and_then(|n| n.parse::<i64>().ok())
                {
                    entries.push((saved_at, path));
                }
            }
        }

        entries.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(entries)
    }
}

#[async_trait]
impl QueueStore for JsonQueueStore {
    async fn load(&self, guild_id: GuildId) -> Result<Option<SerializedQueue>, StorageError> {
        match fs::read_to_string(self.queue_path(guild_id)).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, guild_id: GuildId, record: SerializedQueue) -> Result<(), StorageError> {
        let content = serde_json::to_string_pretty(&record)?;
        fs::write(self.queue_path(guild_id), content).await?;
        Ok(())
    }

    async fn delete(&self, guild_id: GuildId) -> Result<(), StorageError> {
        match fs::remove_file(self.queue_path(guild_id)).await {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    async fn archive(&self, guild_id: GuildId, record: SerializedQueue) -> Result<(), StorageError> {
        let dir = self.history_dir(guild_id);
        fs::create_dir_all(&dir).await?;

        let content = serde_json::to_string_pretty(&record)?;
        fs::write(dir.join(format!("{}.json", record.saved_at)), content).await?;

        // Mantener solo las últimas N colas
        for (_, path) in self.history_entries(guild_id).await?.into_iter().skip(self.history_limit) {
            fs::remove_file(&path).await?;
        }

        Ok(())
    }

    async fn archived(&self, guild_id: GuildId, limit: usize) -> Result<Vec<SerializedQueue>, StorageError> {
        let mut records = Vec::new();

        for (_, path) in self.history_entries(guild_id).await?.into_iter().take(limit) {
            let content = fs::read_to_string(&path).await?;
            match serde_json::from_str(&content) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Cola archivada ilegible {}: {}", path.display(), e),
            }
        }

        Ok(records)
    }
}

/// Adaptador tolerante a fallos sobre un [`QueueStore`].
#[derive(Clone)]
pub struct QueuePersistence {
    store: Arc<dyn QueueStore>,
}

impl QueuePersistence {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self { store }
    }

    /// Carga la cola guardada si existe y no expiró; borra las expiradas
    pub async fn resolve(&self, guild_id: GuildId) -> Option<SerializedQueue> {
        match self.store.load(guild_id).await {
            Ok(Some(record)) if record.is_valid() => Some(record),
            Ok(Some(_)) => {
                debug!("⌛ Cola guardada expirada para guild {}, descartando", guild_id);
                self.delete(guild_id).await;
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Error cargando cola para guild {}: {}", guild_id, e);
                None
            }
        }
    }

    pub async fn save(&self, guild_id: GuildId, record: SerializedQueue) {
        if let Err(e) = self.store.save(guild_id, record).await {
            warn!("Error guardando cola para guild {}: {}", guild_id, e);
        }
    }

    pub async fn delete(&self, guild_id: GuildId) {
        if let Err(e) = self.store.delete(guild_id).await {
            warn!("Error eliminando cola guardada para guild {}: {}", guild_id, e);
        }
    }

    pub async fn archive(&self, guild_id: GuildId, record: SerializedQueue) {
        if record.tracks.is_empty() {
            return;
        }
        if let Err(e) = self.store.archive(guild_id, record).await {
            warn!("Error archivando cola para guild {}: {}", guild_id, e);
        }
    }

    /// Colas recientes del guild (vacías descartadas)
    pub async fn history(&self, guild_id: GuildId, limit: usize) -> Vec<SerializedQueue> {
        match self.store.archived(guild_id, limit).await {
            Ok(records) => records.into_iter().filter(|r| !r.tracks.is_empty()).collect(),
            Err(e) => {
                warn!("Error leyendo historial de colas para guild {}: {}", guild_id, e);
                Vec::new()
            }
        }
    }
}

#[derive(Debug)]
enum PersistJob {
    Save(SerializedQueue),
    Archive(SerializedQueue),
}

/// Escritor en segundo plano de un guild.
///
/// Jobs are applied one at a time in submission order, so the last submitted
/// save wins. Submitting never blocks; the task ends once every handle is
/// dropped and the backlog is drained.
#[derive(Debug, Clone)]
pub struct PersistQueue {
    guild_id: GuildId,
    tx: mpsc::UnboundedSender<PersistJob>,
}

impl PersistQueue {
    pub fn spawn(guild_id: GuildId, persistence: QueuePersistence) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                match job {
                    PersistJob::Save(record) => persistence.save(guild_id, record).await,
                    PersistJob::Archive(record) => persistence.archive(guild_id, record).await,
                }
            }
            debug!("💾 Escritor de cola finalizado para guild {}", guild_id);
        });

        Self { guild_id, tx }
    }

    pub fn save(&self, record: SerializedQueue) {
        self.submit(PersistJob::Save(record));
    }

    pub fn archive(&self, record: SerializedQueue) {
        self.submit(PersistJob::Archive(record));
    }

    fn submit(&self, job: PersistJob) {
        if self.tx.send(job).is_err() {
            warn!("Escritor de cola no disponible para guild {}", self.guild_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        queue::{now_ms, Queue, QUEUE_MAX_AGE_MS},
        track::Track,
    };
    use pretty_assertions::assert_eq;

    fn record(names: &[&str], saved_at: i64) -> SerializedQueue {
        let mut queue = Queue::new();
        queue.add(
            names.iter().map(|n| Track::new(*n, "artist", format!("handle:{n}"))).collect(),
            false,
        );
        queue.next(1);
        queue.serialize_at(saved_at)
    }

    #[tokio::test]
    async fn json_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonQueueStore::new(dir.path(), 5).await.unwrap();
        let guild = GuildId::new(42);

        assert_eq!(store.load(guild).await.unwrap(), None);

        let saved = record(&["A", "B"], now_ms());
        store.save(guild, saved.clone()).await.unwrap();
        assert_eq!(store.load(guild).await.unwrap(), Some(saved));
        assert!(dir.path().join("queues").join("guild_42.json").exists());

        store.delete(guild).await.unwrap();
        assert_eq!(store.load(guild).await.unwrap(), None);
        // Borrar dos veces no falla
        store.delete(guild).await.unwrap();
    }

    #[tokio::test]
    async fn json_store_prunes_archive() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonQueueStore::new(dir.path(), 2).await.unwrap();
        let guild = GuildId::new(7);

        for saved_at in [100, 300, 200] {
            store.archive(guild, record(&["A"], saved_at)).await.unwrap();
        }

        let archived = store.archived(guild, 10).await.unwrap();
        let stamps: Vec<i64> = archived.iter().map(|r| r.saved_at).collect();
        assert_eq!(stamps, vec![300, 200]);

        let limited = store.archived(guild, 1).await.unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].saved_at, 300);
    }

    #[tokio::test]
    async fn resolve_drops_and_deletes_expired_queue() {
        let guild = GuildId::new(1);
        let mut store = MockQueueStore::new();
        store
            .expect_load()
            .returning(|_| Ok(Some(record(&["A"], now_ms() - QUEUE_MAX_AGE_MS - 1))));
        store.expect_delete().times(1).returning(|_| Ok(()));

        let persistence = QueuePersistence::new(Arc::new(store));
        assert_eq!(persistence.resolve(guild).await, None);
    }

    #[tokio::test]
    async fn resolve_adopts_fresh_queue() {
        let guild = GuildId::new(1);
        let fresh = record(&["A", "B"], now_ms() - 1_000);
        let expected = fresh.clone();

        let mut store = MockQueueStore::new();
        store.expect_load().returning(move |_| Ok(Some(fresh.clone())));
        store.expect_delete().never();

        let persistence = QueuePersistence::new(Arc::new(store));
        assert_eq!(persistence.resolve(guild).await, Some(expected));
    }

    #[tokio::test]
    async fn storage_failures_are_swallowed() {
        let guild = GuildId::new(1);
        let mut store = MockQueueStore::new();
        store
            .expect_load()
            .returning(|_| Err(std::io::Error::other("disk gone").into()));
        store
            .expect_save()
            .returning(|_, _| Err(std::io::Error::other("disk gone").into()));
        store
            .expect_archived()
            .returning(|_, _| Err(std::io::Error::other("disk gone").into()));

        let persistence = QueuePersistence::new(Arc::new(store));
        assert_eq!(persistence.resolve(guild).await, None);
        persistence.save(guild, record(&["A"], now_ms())).await;
        assert!(persistence.history(guild, 5).await.is_empty());
    }

    #[tokio::test]
    async fn empty_queues_are_not_archived() {
        let mut store = MockQueueStore::new();
        store.expect_archive().never();

        let persistence = QueuePersistence::new(Arc::new(store));
        persistence
            .archive(GuildId::new(1), Queue::new().serialize())
            .await;
    }
}
