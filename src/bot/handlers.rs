use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseMessage,
        EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{error, info};

use crate::{
    audio::player::{PlayKind, SessionHandle},
    bot::JukeboxBot,
    error::{BotError, StateError},
    ui::embeds,
};

/// Respuesta de un comando
enum Reply {
    Text(String),
    Embed(CreateEmbed),
    Error(String),
}

impl Reply {
    fn text(content: impl Into<String>) -> Self {
        Reply::Text(content.into())
    }

    fn into_message(self) -> CreateInteractionResponseMessage {
        match self {
            Reply::Text(content) => CreateInteractionResponseMessage::new().content(content),
            Reply::Embed(embed) => CreateInteractionResponseMessage::new().embed(embed),
            Reply::Error(message) => CreateInteractionResponseMessage::new()
                .embed(embeds::create_error_embed("Error", &message))
                .ephemeral(true),
        }
    }

    fn into_edit(self) -> EditInteractionResponse {
        match self {
            Reply::Text(content) => EditInteractionResponse::new().content(content),
            Reply::Embed(embed) => EditInteractionResponse::new().embed(embed),
            Reply::Error(message) => {
                EditInteractionResponse::new().embed(embeds::create_error_embed("Error", &message))
            }
        }
    }
}

/// Mensaje para el usuario; los errores internos no se muestran en detalle
fn user_message(error: &anyhow::Error) -> String {
    match error.downcast_ref::<BotError>() {
        Some(bot_error) => bot_error.to_string(),
        None => "Ocurrió un error inesperado, intenta de nuevo".to_string(),
    }
}

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &JukeboxBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    // Resolver puede tardar más que el límite de 3 segundos de Discord
    let deferred = matches!(command.data.name.as_str(), "play" | "join");
    if deferred {
        command
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
            )
            .await?;
    }

    let result = match command.data.name.as_str() {
        "join" => handle_join(ctx, &command, bot, guild_id).await,
        "play" => handle_play(ctx, &command, bot, guild_id).await,
        "pause" => handle_pause(bot, guild_id).await,
        "resume" => handle_resume(bot, guild_id).await,
        "stop" => handle_stop(bot, guild_id).await,
        "clear" => handle_clear(bot, guild_id).await,
        "skip" => handle_skip(bot, guild_id).await,
        "queue" => handle_queue(bot, guild_id).await,
        "repeat" => handle_repeat(bot, guild_id).await,
        "loop" => handle_loop(bot, guild_id).await,
        "shuffle" => handle_shuffle(bot, guild_id).await,
        "leave" => handle_leave(ctx, bot, guild_id).await,
        _ => Ok(Reply::Error("Comando no reconocido".to_string())),
    };

    let reply = result.unwrap_or_else(|e| {
        error!("❌ Error en /{}: {:?}", command.data.name, e);
        Reply::Error(user_message(&e))
    });

    if deferred {
        command.edit_response(&ctx.http, reply.into_edit()).await?;
    } else {
        command
            .create_response(
                &ctx.http,
                CreateInteractionResponse::Message(reply.into_message()),
            )
            .await?;
    }

    Ok(())
}

/// Sesión activa del guild
fn session(bot: &JukeboxBot, guild_id: GuildId) -> Result<SessionHandle, BotError> {
    bot.registry
        .get(guild_id)
        .ok_or_else(|| StateError::NoSession.into())
}

// Handlers específicos para cada comando

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<Reply> {
    let voice_channel_id = get_user_voice_channel(ctx, guild_id, command.user.id)?;

    bot.join_voice_channel(ctx, guild_id, voice_channel_id, command.channel_id)
        .await?;

    Ok(Reply::text("🔊 Conectado al canal de voz"))
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &JukeboxBot,
    guild_id: GuildId,
) -> Result<Reply> {
    let query = command
        .data
        .options
        .iter()
        .find(|opt| opt.name == "query")
        .and_then(|opt| opt.value.as_str())
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?;

    // Conectar al canal de voz si no hay sesión
    let session = match bot.registry.get(guild_id) {
        Some(session) => session,
        None => {
            let voice_channel_id = get_user_voice_channel(ctx, guild_id, command.user.id)?;
            bot.join_voice_channel(ctx, guild_id, voice_channel_id, command.channel_id)
                .await?
        }
    };

    let outcome = session.play(query, command.user.id).await?;

    let reply = match outcome.kind {
        PlayKind::Track(track) => {
            Reply::Embed(embeds::create_track_added_embed(&track, outcome.started))
        }
        PlayKind::Collection { title, added } => {
            Reply::Embed(embeds::create_playlist_added_embed(&title, added, 0))
        }
        PlayKind::Deferred { title, pending, .. } => {
            Reply::Embed(embeds::create_playlist_added_embed(&title, 1, pending))
        }
        PlayKind::Cancelled => Reply::text("⏹️ La reproducción se detuvo antes de agregar la canción"),
    };

    Ok(reply)
}

async fn handle_pause(bot: &JukeboxBot, guild_id: GuildId) -> Result<Reply> {
    session(bot, guild_id)?.pause().await?;
    Ok(Reply::text("⏸️ Reproducción pausada"))
}

async fn handle_resume(bot: &JukeboxBot, guild_id: GuildId) -> Result<Reply> {
    session(bot, guild_id)?.resume().await?;
    Ok(Reply::text("▶️ Reproducción reanudada"))
}

async fn handle_stop(bot: &JukeboxBot, guild_id: GuildId) -> Result<Reply> {
    if let Some(session) = bot.registry.get(guild_id) {
        session.stop().await?;
    }

    Ok(Reply::text("⏹️ Reproducción detenida y cola limpiada"))
}

async fn handle_clear(bot: &JukeboxBot, guild_id: GuildId) -> Result<Reply> {
    let removed = session(bot, guild_id)?.clear().await?;

    Ok(if removed == 0 {
        Reply::text("📭 No hay canciones en espera")
    } else {
        Reply::text(format!("🗑️ Se quitaron {} canciones de la cola", removed))
    })
}

async fn handle_skip(bot: &JukeboxBot, guild_id: GuildId) -> Result<Reply> {
    let next = session(bot, guild_id)?.skip().await?;

    Ok(match next {
        Some(track) => Reply::text(format!("⏭️ Canción saltada. Ahora: **{}**", track.title())),
        None => Reply::text("⏭️ Canción saltada. No quedan canciones en la cola"),
    })
}

async fn handle_queue(bot: &JukeboxBot, guild_id: GuildId) -> Result<Reply> {
    let Some(session) = bot.registry.get(guild_id) else {
        return Ok(Reply::Embed(embeds::create_info_embed(
            "Cola vacía",
            "💡 Usa `/play <canción>` para agregar música",
        )));
    };

    let snapshot = session.snapshot(bot.config().queue_preview_len).await?;
    Ok(Reply::Embed(embeds::create_queue_embed(&snapshot)))
}

async fn handle_repeat(bot: &JukeboxBot, guild_id: GuildId) -> Result<Reply> {
    let enabled = session(bot, guild_id)?.toggle_repeat().await?;

    Ok(Reply::text(if enabled {
        "🔂 Repetir canción activado"
    } else {
        "➡️ Repetir canción desactivado"
    }))
}

async fn handle_loop(bot: &JukeboxBot, guild_id: GuildId) -> Result<Reply> {
    let enabled = session(bot, guild_id)?.toggle_loop().await?;

    Ok(Reply::text(if enabled {
        "🔁 Repetir cola activado"
    } else {
        "➡️ Repetir cola desactivado"
    }))
}

async fn handle_shuffle(bot: &JukeboxBot, guild_id: GuildId) -> Result<Reply> {
    let pending = session(bot, guild_id)?.shuffle().await?;

    Ok(if pending < 2 {
        Reply::Embed(embeds::create_warning_embed(
            "Nada que mezclar",
            "Se necesitan al menos 2 canciones en espera",
        ))
    } else {
        Reply::text(format!("🔀 Cola mezclada ({} canciones)", pending))
    })
}

async fn handle_leave(ctx: &Context, bot: &JukeboxBot, guild_id: GuildId) -> Result<Reply> {
    bot.leave_voice_channel(ctx, guild_id).await?;
    Ok(Reply::text("👋 Desconectado del canal de voz"))
}

// Funciones auxiliares

fn get_user_voice_channel(
    ctx: &Context,
    guild_id: GuildId,
    user_id: UserId,
) -> Result<ChannelId, BotError> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or(StateError::NotInVoiceChannel)?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or(StateError::NotInVoiceChannel)?;

    Ok(channel_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ResolutionError, SubsystemError};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_bot_errors_reach_the_user() {
        let err = anyhow::Error::from(BotError::from(SubsystemError::NothingPlaying));
        assert_eq!(user_message(&err), "No hay nada reproduciéndose");

        let err = anyhow::Error::from(BotError::from(ResolutionError::Unsupported(
            "ftp://x".to_string(),
        )));
        assert_eq!(user_message(&err), "Fuente de audio no soportada: ftp://x");
    }

    #[test]
    fn test_internal_errors_are_hidden() {
        let err = anyhow::anyhow!("Songbird no inicializado");
        assert_eq!(
            user_message(&err),
            "Ocurrió un error inesperado, intenta de nuevo"
        );
    }
}
