//! # Bot Module
//!
//! Discord side of the jukebox: slash command registration, voice
//! connections and the glue between interactions and the per-guild sessions.
//!
//! The bot is built around the [`JukeboxBot`] struct which implements
//! Serenity's [`EventHandler`] trait. It owns:
//!
//! - The [`SessionRegistry`] with one playback session per guild
//! - The HTTP client shared by every Songbird backend
//!
//! A session is created when the bot joins a voice channel (`/join`, or
//! `/play` from a guild without a session) and destroyed when it leaves,
//! either through `/leave` or because it was disconnected from the channel.

use anyhow::Result;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::sync::Arc;
use tracing::{error, info, warn};

pub mod commands;
pub mod events;
pub mod handlers;

use crate::{
    audio::{player::SessionHandle, registry::SessionRegistry, songbird_backend::SongbirdBackend},
    config::Config,
    sources::YtDlpClient,
};

/// Main Discord bot handler.
pub struct JukeboxBot {
    /// Bot configuration loaded from environment variables
    config: Arc<Config>,
    /// Sesiones de reproducción por guild
    pub registry: Arc<SessionRegistry>,
    /// Cliente HTTP para los streams de audio
    http: reqwest::Client,
}

impl JukeboxBot {
    pub fn new(config: Config, registry: Arc<SessionRegistry>, http: reqwest::Client) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            http,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Registers slash commands with Discord.
    ///
    /// Commands are registered per guild when `guild_id` is configured (fast
    /// propagation, useful for development) and globally otherwise.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);
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
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }

    /// Connects the bot to a voice channel and returns the guild's session.
    ///
    /// The session is created on the first join; its notifications are posted
    /// to `text_channel`.
    pub async fn join_voice_channel(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        channel_id: ChannelId,
        text_channel: ChannelId,
    ) -> Result<SessionHandle> {
        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;

        let call = manager.join(guild_id, channel_id).await.map_err(|e| {
            error!("Error al obtener handler de voz: {:?}", e);
            anyhow::anyhow!("Error al conectar al canal de voz")
        })?;

        info!("🔊 Conectado al canal de voz en guild {}", guild_id);

        let (session, events) = self.registry.get_or_create(guild_id, || {
            SongbirdBackend::new(call, self.http.clone(), self.config.default_volume)
        });

        if let Some(events) = events {
            tokio::spawn(events::forward_events(
                ctx.http.clone(),
                text_channel,
                guild_id,
                events,
            ));
        }

        Ok(session)
    }

    /// Disconnects from voice and destroys the guild's session.
    pub async fn leave_voice_channel(&self, ctx: &Context, guild_id: GuildId) -> Result<()> {
        self.registry.remove(guild_id).await;

        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;

        if manager.get(guild_id).is_some() {
            manager.remove(guild_id).await?;
        }

        info!("👋 Desconectado del canal de voz en guild {}", guild_id);
        Ok(())
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        tokio::spawn(maintenance_tasks());
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Destroys the session when the bot is disconnected from voice.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        if let Some(guild_id) = new.guild_id {
            info!("🔌 Bot desconectado en guild {}", guild_id);

            if let Err(e) = self.leave_voice_channel(&ctx, guild_id).await {
                error!("Error al limpiar la sesión: {:?}", e);
            }
        }
    }
}

/// Actualiza yt-dlp cada hora
async fn maintenance_tasks() {
    let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(3600));
    // El primer tick es inmediato
    interval.tick().await;

    loop {
        interval.tick().await;
        YtDlpClient::update_ytdlp().await;
        info!("🧹 Tareas de mantenimiento completadas");
    }
}
