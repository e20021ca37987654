//! Error types for the playback engine.
//!
//! Invalid queue positions are not errors: they come back as `None`/`false`.
//! Storage and backend failures are typed here so they can be logged with
//! context and swallowed where the engine must keep going.

use thiserror::Error;

/// Fallos del almacenamiento de colas
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Fallos reportados por el backend de audio
#[derive(Error, Debug)]
pub enum BackendError {
    /// No hay conexión de voz activa
    #[error("voice connection is not available")]
    NotConnected,

    /// No se pudo crear/reproducir el input
    #[error("failed to start track: {0}")]
    Play(String),

    /// Fallo en el control de un track ya iniciado
    #[error("track control failed: {0}")]
    Control(String),

    /// Fallo al unirse o salir del canal de voz
    #[error("voice gateway error: {0}")]
    Voice(String),
}

/// Errores al hablar con una sesión por medio de su mailbox
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// La sesión ya fue destruida
    #[error("playback session is closed")]
    Closed,
}
