//! # Bot Module
//!
//! Discord front-end for BassBot: slash command registration, interaction
//! dispatch and voice state tracking.
//!
//! Playback itself lives in [`crate::audio`]; this module only translates
//! Discord events into calls on the [`SessionManager`] stored in the client's
//! `TypeMap`.

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod handlers;
pub mod platform;

use crate::{audio::manager::SessionManager, config::Config};

/// Event handler de Discord para BassBot.
///
/// El [`SessionManager`] no vive aquí: necesita el `Http` y la caché del
/// cliente, así que se inserta en `client.data` una vez construido el cliente.
pub struct BassBot {
    /// Configuración cargada desde variables de entorno
    pub config: Arc<Config>,
    /// Cliente HTTP compartido para resolver pistas con yt-dlp
    pub http_client: reqwest::Client,
}

impl BassBot {
    pub fn new(config: Arc<Config>, http_client: reqwest::Client) -> Self {
        Self {
            config,
            http_client,
        }
    }

    /// Registra los comandos slash, por guild si `GUILD_ID` está definido.
    ///
    /// Los comandos de guild se propagan en segundos; los globales pueden
    /// tardar hasta una hora.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

/// Obtiene el registro de sesiones guardado en el `TypeMap` del cliente
pub async fn session_manager(ctx: &Context) -> Result<Arc<SessionManager>> {
    let data = ctx.data.read().await;
    data.get::<SessionManager>()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("SessionManager no inicializado"))
}

#[async_trait]
impl EventHandler for BassBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) = handlers::handle_component(&ctx, component_interaction).await {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Entradas y salidas del canal del bot pueden vaciarlo o volver a
    /// llenarlo; la sesión decide si programa o cancela la desconexión.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id.or_else(|| old.as_ref().and_then(|o| o.guild_id)) else {
            return;
        };
        let old_channel = old.as_ref().and_then(|o| o.channel_id);

        match session_manager(&ctx).await {
            Ok(sessions) => sessions.voice_state_changed(guild_id, old_channel, new.channel_id),
            Err(e) => warn!("Cambio de voz ignorado en guild {}: {}", guild_id, e),
        }
    }
}
