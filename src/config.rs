use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr, time::Duration};

use crate::audio::session::SessionSettings;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Audio
    pub default_volume: u8, // 0-100
    pub idle_timeout_secs: u64,

    // Colas
    pub queue_history_limit: usize,
    pub snapshot_limit: usize,

    // Paths
    pub data_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;

        // Create directories if they don't exist
        std::fs::create_dir_all(&config.data_dir)?;

        Ok(config)
    }

    /// Construye la configuración a partir de una función de búsqueda de variables
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            // Discord
            discord_token: lookup("DISCORD_TOKEN").context("DISCORD_TOKEN no definido")?,
            application_id: lookup("APPLICATION_ID")
                .context("APPLICATION_ID no definido")?
                .parse()
                .context("APPLICATION_ID inválido")?,
            guild_id: lookup("GUILD_ID").and_then(|s| s.parse().ok()),

            // Audio
            default_volume: parse_or(&lookup, "DEFAULT_VOLUME", defaults.default_volume)?,
            idle_timeout_secs: parse_or(&lookup, "IDLE_TIMEOUT_SECS", defaults.idle_timeout_secs)?,

            // Colas
            queue_history_limit: parse_or(&lookup, "QUEUE_HISTORY_LIMIT", defaults.queue_history_limit)?,
            snapshot_limit: parse_or(&lookup, "SNAPSHOT_LIMIT", defaults.snapshot_limit)?,

            // Paths
            data_dir: lookup("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0 and 100
    /// - The idle timeout must be at least one second
    /// - History and snapshot limits must be greater than 0
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN cannot be empty");
        }

        if self.default_volume > 100 {
            anyhow::bail!("Default volume must be between 0 and 100, got: {}", self.default_volume);
        }

        if self.idle_timeout_secs == 0 {
            anyhow::bail!("Idle timeout must be at least 1 second");
        }

        if self.queue_history_limit == 0 {
            anyhow::bail!("Queue history limit must be greater than 0");
        }

        if self.snapshot_limit == 0 {
            anyhow::bail!("Snapshot limit must be greater than 0");
        }

        Ok(())
    }

    /// Parámetros que comparten todas las sesiones de reproducción
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            initial_volume: self.default_volume,
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
        }
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the Discord token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}% vol, {}s idle timeout\n  \
            Queues: {} archived per guild, {} tracks per snapshot\n  \
            Data: {}",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.default_volume,
            self.idle_timeout_secs,
            self.queue_history_limit,
            self.snapshot_limit,
            self.data_dir.display()
        )
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .with_context(|| format!("{} inválido: {}", key, value)),
        _ => Ok(default),
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            // Audio defaults
            default_volume: 50,
            idle_timeout_secs: 60,

            // Queue defaults
            queue_history_limit: 25,
            snapshot_limit: 10,

            // Path defaults
            data_dir: "/app/data".into(),
        }
    }
}
