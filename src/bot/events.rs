use serenity::{
    builder::{CreateEmbed, CreateMessage},
    http::Http,
    model::id::{ChannelId, GuildId},
};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error};

use crate::{audio::player::SessionEvent, ui::embeds};

/// Publica las notificaciones de una sesión en el canal de texto donde empezó.
///
/// Termina cuando el actor de la sesión se cierra.
pub async fn forward_events(
    http: Arc<Http>,
    channel_id: ChannelId,
    guild_id: GuildId,
    mut events: UnboundedReceiver<SessionEvent>,
) {
    while let Some(event) = events.recv().await {
        let embed = notification(&event);

        if let Err(e) = channel_id
            .send_message(&http, CreateMessage::new().embed(embed))
            .await
        {
            error!("Error al enviar notificación en guild {}: {:?}", guild_id, e);
        }
    }

    debug!("Notificaciones terminadas para guild {}", guild_id);
}

fn notification(event: &SessionEvent) -> CreateEmbed {
    match event {
        SessionEvent::NowPlaying(track) => embeds::create_now_playing_embed(track),
        SessionEvent::TrackFailed { track, error } => embeds::create_error_embed(
            "No se pudo reproducir",
            &format!("**{}** se saltó: {}", track.title(), error),
        ),
        SessionEvent::LoopRequeueFailed { track, error } => embeds::create_warning_embed(
            "Repetir cola",
            &format!("**{}** no se pudo volver a encolar: {}", track.title(), error),
        ),
        SessionEvent::QueueFinished => embeds::create_info_embed(
            "Cola terminada",
            "📭 No quedan canciones. Usa `/play` para seguir escuchando",
        ),
        SessionEvent::DrainFinished {
            title,
            added,
            failed,
        } => embeds::create_info_embed("Playlist cargada", &drain_summary(title, *added, *failed)),
    }
}

fn drain_summary(title: &str, added: usize, failed: usize) -> String {
    if failed == 0 {
        format!("✅ Se agregaron {} canciones de **{}**", added, title)
    } else {
        format!(
            "✅ Se agregaron {} canciones de **{}** ({} no se encontraron)",
            added, title, failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_drain_summary_mentions_failures() {
        assert_eq!(drain_summary("Mix", 99, 0), "✅ Se agregaron 99 canciones de **Mix**");
        assert_eq!(
            drain_summary("Mix", 97, 2),
            "✅ Se agregaron 97 canciones de **Mix** (2 no se encontraron)"
        );
    }
}
