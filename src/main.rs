use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{debug, error, info};

mod audio;
mod bot;
mod config;
mod error;
mod storage;
mod ui;

use crate::audio::{manager::SessionManager, session::SessionContext};
use crate::bot::{platform::SerenityPlatform, BassBot};
use crate::config::Config;
use crate::storage::{JsonQueueStore, QueuePersistence};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("bassbot=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando BassBot v{}", env!("CARGO_PKG_VERSION"));

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    // Cargar configuración
    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    // Inicializar almacenamiento de colas
    let store = JsonQueueStore::new(&config.data_dir, config.queue_history_limit).await?;
    let persistence = QueuePersistence::new(Arc::new(store));

    // Solo necesitamos guilds y estados de voz: todo lo demás son interacciones
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let http_client = reqwest::Client::new();
    let handler = BassBot::new(config.clone(), http_client.clone());

    // Construir cliente
    let songbird = Songbird::serenity();
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird.clone())
        .await?;

    // El registro de sesiones necesita el Http y la caché del cliente
    let platform = SerenityPlatform::new(
        client.http.clone(),
        client.cache.clone(),
        songbird,
        http_client,
    );
    let sessions = Arc::new(SessionManager::new(SessionContext {
        platform: Arc::new(platform),
        persistence,
        settings: config.session_settings(),
    }));
    {
        let mut data = client.data.write().await;
        data.insert::<SessionManager>(sessions.clone());
    }

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!(
            "⚠️ Señal de shutdown recibida, cerrando {} sesiones...",
            sessions.active_count()
        );
        for snapshot in sessions.snapshots(config.snapshot_limit).await {
            if let Ok(json) = serde_json::to_string(&snapshot) {
                debug!("📸 {}", json);
            }
        }
        sessions.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check() -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new("yt-dlp")
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = async_process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}
