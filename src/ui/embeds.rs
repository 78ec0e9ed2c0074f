use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use crate::{
    audio::queue::QueueSnapshot,
    sources::{AudioSource, TrackDescriptor},
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const MUSIC_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "🎵 Guild Jukebox";

fn source_label(track: &TrackDescriptor) -> &'static str {
    match track.audio() {
        AudioSource::File(_) => "Archivo local",
        AudioSource::YtDlp(_) => "YouTube",
        AudioSource::Http(_) => "URL directa",
    }
}

/// Sin duración solo es "en vivo" si viene de YouTube; archivos y URLs no la traen
fn duration_label(track: &TrackDescriptor) -> String {
    match (track.duration(), track.audio()) {
        (Some(duration), _) => format_duration(duration),
        (None, AudioSource::YtDlp(_)) => "🔴 En vivo".to_string(),
        (None, _) => "Desconocida".to_string(),
    }
}

/// Campos comunes de una pista: artista, duración, solicitante, fuente
fn track_fields(mut embed: CreateEmbed, track: &TrackDescriptor) -> CreateEmbed {
    embed = embed
        .field("🎤 Artista", track.artist().unwrap_or("Desconocido"), true)
        .field("⏱️ Duración", duration_label(track), true)
        .field("👤 Solicitado por", format!("<@{}>", track.requested_by()), true)
        .field("🔗 Fuente", source_label(track), true);

    if let Some(thumbnail) = track.thumbnail() {
        embed = embed.thumbnail(thumbnail);
    }

    if track.source_uri().starts_with("http") {
        embed = embed.url(track.source_uri());
    }

    embed
}

/// Crea un embed para mostrar la canción actual
pub fn create_now_playing_embed(track: &TrackDescriptor) -> CreateEmbed {
    let embed = CreateEmbed::default()
        .title("🎵 Reproduciendo Ahora")
        .description(format!("**{}**", track.title()))
        .color(colors::SUCCESS_GREEN);

    track_fields(embed, track)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed para mostrar que se agregó una canción
pub fn create_track_added_embed(track: &TrackDescriptor, started: bool) -> CreateEmbed {
    let (title, footer) = if started {
        ("▶️ Reproduciendo", STANDARD_FOOTER)
    } else {
        (
            "✅ Canción Agregada Exitosamente",
            "🎵 Se reproducirá cuando termine la cola actual",
        )
    };

    let embed = CreateEmbed::default()
        .title(title)
        .description(format!(
            "**{}** se ha agregado a la cola de reproducción",
            track.title()
        ))
        .color(colors::SUCCESS_GREEN);

    track_fields(embed, track)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(footer))
}

/// Crea un embed para mostrar que una playlist fue agregada.
///
/// `background` es la cantidad de canciones que se siguen resolviendo después
/// de responder.
pub fn create_playlist_added_embed(title: &str, added: usize, background: usize) -> CreateEmbed {
    let description = if background > 0 {
        format!(
            "Se agregó la primera canción de **{}**; las otras **{}** se irán sumando a la cola",
            title, background
        )
    } else if added == 1 {
        format!("Se agregó **1 canción** de **{}** a la cola de reproducción", title)
    } else {
        format!(
            "Se agregaron **{} canciones** de **{}** a la cola de reproducción",
            added, title
        )
    };

    let mut embed = CreateEmbed::default()
        .title("📋 Playlist Agregada Exitosamente")
        .description(description)
        .color(colors::MUSIC_PURPLE)
        .field("📊 Canciones agregadas", added.to_string(), true);

    if background > 0 {
        embed = embed.field("⏳ Pendientes", background.to_string(), true);
    }

    embed
        .footer(CreateEmbedFooter::new(
            "🎵 La reproducción comenzará automáticamente • Usa /queue para ver todas las canciones",
        ))
        .timestamp(Timestamp::now())
}

/// Crea un embed para mostrar la cola de reproducción
pub fn create_queue_embed(snapshot: &QueueSnapshot) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title("📋 Cola de Reproducción")
        .color(colors::INFO_BLUE);

    if snapshot.is_empty() {
        return embed
            .description("😴 **La cola está vacía**\n\n💡 Usa `/play <canción>` para agregar música")
            .color(colors::NEUTRAL_GRAY)
            .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
            .timestamp(Timestamp::now());
    }

    // Canción actual
    if let Some(current) = &snapshot.current {
        let status = if snapshot.paused {
            "⏸️"
        } else if snapshot.repeat_current {
            "🔂"
        } else if snapshot.loop_queue {
            "🔁"
        } else {
            "▶️"
        };

        embed = embed.field(
            format!("{} Reproduciendo", status),
            format_track_line(&current.track),
            false,
        );
    }

    // Próximas canciones
    if !snapshot.upcoming.is_empty() {
        let mut description = String::new();

        for (i, item) in snapshot.upcoming.iter().enumerate() {
            let duration = item
                .track
                .duration()
                .map(|dur| format!(" `[{}]`", format_duration(dur)))
                .unwrap_or_default();

            description.push_str(&format!(
                "**{}**. {}{}\n",
                i + 1,
                format_track_line(&item.track),
                duration
            ));
        }

        embed = embed.field("Próximas canciones", description, false);
    }

    // Información adicional
    let mut info = format!("**Total:** {} canciones en espera", snapshot.total_pending);

    let hidden = snapshot.total_pending.saturating_sub(snapshot.upcoming.len());
    if hidden > 0 {
        info.push_str(&format!(" • y {} más", hidden));
    }

    if snapshot.repeat_current {
        info.push_str(" • 🔂 **Repetir canción**");
    }

    if snapshot.loop_queue {
        info.push_str(" • 🔁 **Repetir cola**");
    }

    embed
        .field("Información", info, false)
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
        .timestamp(Timestamp::now())
}

fn format_track_line(track: &TrackDescriptor) -> String {
    match track.artist() {
        Some(artist) => format!("**{}** - {}", track.title(), artist),
        None => format!("**{}**", track.title()),
    }
}

/// Crea un embed de error
pub fn create_error_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("❌ {}", title))
        .description(description)
        .color(colors::ERROR_RED)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de advertencia
pub fn create_warning_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("⚠️ {}", title))
        .description(description)
        .color(colors::WARNING_ORANGE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Crea un embed de información
pub fn create_info_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("ℹ️ {}", title))
        .description(description)
        .color(colors::INFO_BLUE)
        .timestamp(Timestamp::now())
        .footer(CreateEmbedFooter::new(STANDARD_FOOTER))
}

/// Formatea una duración en formato legible
pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::track;
    use pretty_assertions::assert_eq;
    use serenity::model::id::UserId;
    use std::path::PathBuf;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(59)), "0:59");
        assert_eq!(format_duration(Duration::from_secs(212)), "3:32");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
    }

    #[test]
    fn test_track_line_includes_artist() {
        let plain = track("intro");
        assert_eq!(format_track_line(&plain), "**intro**");

        let with_artist = track("intro").with_artist("Banda".to_string());
        assert_eq!(format_track_line(&with_artist), "**intro** - Banda");
    }

    #[test]
    fn test_duration_label_by_source() {
        let live = TrackDescriptor::new(
            "radio",
            "https://www.youtube.com/live/abc",
            AudioSource::YtDlp("https://www.youtube.com/live/abc".to_string()),
            UserId::new(1),
        );
        assert_eq!(duration_label(&live), "🔴 En vivo");

        let local = TrackDescriptor::new(
            "tema.mp3",
            "/musica/tema.mp3",
            AudioSource::File(PathBuf::from("/musica/tema.mp3")),
            UserId::new(1),
        );
        assert_eq!(duration_label(&local), "Desconocida");

        assert_eq!(
            duration_label(&track("tema").with_duration(Duration::from_secs(90))),
            "1:30"
        );
    }
}
