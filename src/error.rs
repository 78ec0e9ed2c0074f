//! Error taxonomy for the jukebox engine.
//!
//! Every variant here is recoverable: command handlers convert them into a
//! user-visible message and the session keeps running.

use std::time::Duration;
use thiserror::Error;

/// Fallos al convertir la entrada del usuario en pistas reproducibles
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResolutionError {
    #[error("No se encontraron resultados para `{0}`")]
    NoResults(String),

    #[error("Fuente de audio no soportada: {0}")]
    Unsupported(String),

    #[error("URL mal formada: {0}")]
    MalformedUrl(String),

    #[error("La colección `{0}` no contiene pistas reproducibles")]
    EmptyCollection(String),

    #[error("Límite de peticiones alcanzado en {provider}")]
    RateLimited {
        provider: &'static str,
        retry_after: Option<Duration>,
    },

    #[error("Faltan credenciales para {0}")]
    MissingCredentials(&'static str),

    #[error("Error del proveedor {provider}: {message}")]
    Provider {
        provider: &'static str,
        message: String,
    },
}

impl ResolutionError {
    pub fn provider(provider: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Provider {
            provider,
            message: err.to_string(),
        }
    }
}

/// The audio subsystem could not materialize a handle for a track.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PlaybackOpenError {
    #[error("Archivo local no encontrado: {0}")]
    FileMissing(String),

    #[error("No se pudo abrir el stream `{uri}`: {reason}")]
    Stream { uri: String, reason: String },
}

/// Voice connection missing or broken.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SubsystemError {
    #[error("No hay nada reproduciéndose")]
    NothingPlaying,

    #[error("Error de control de audio: {0}")]
    Control(String),
}

/// Command issued against a session in the wrong state.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StateError {
    #[error("No hay una sesión de voz activa en este servidor")]
    NoSession,

    #[error("Debes estar en un canal de voz")]
    NotInVoiceChannel,

    #[error("La cola está llena (máximo {0} canciones)")]
    QueueFull(usize),

    #[error("La sesión se cerró")]
    SessionClosed,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum BotError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    PlaybackOpen(#[from] PlaybackOpenError),

    #[error(transparent)]
    Subsystem(#[from] SubsystemError),

    #[error(transparent)]
    State(#[from] StateError),
}

pub type Result<T, E = BotError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_user_facing() {
        let err: BotError = ResolutionError::NoResults("lofi".into()).into();
        assert_eq!(err.to_string(), "No se encontraron resultados para `lofi`");

        let err: BotError = StateError::QueueFull(10).into();
        assert!(err.to_string().contains("10"));
    }

    #[test]
    fn test_provider_helper_keeps_message() {
        let err = ResolutionError::provider("yt-dlp", "exit status 1");
        assert_eq!(
            err,
            ResolutionError::Provider {
                provider: "yt-dlp",
                message: "exit status 1".into()
            }
        );
    }
}
