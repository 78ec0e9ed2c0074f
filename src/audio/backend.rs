use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use super::player::SessionCommand;
use crate::{
    error::{PlaybackOpenError, SubsystemError},
    sources::AudioSource,
};

/// Aviso de fin de pista, ligado a un `play_id`.
///
/// Se consume al disparar, así que cada handle avisa como mucho una vez. El
/// aviso viaja como mensaje al actor de la sesión; el backend nunca toca la
/// cola directamente.
#[derive(Debug)]
pub struct CompletionSignal {
    tx: UnboundedSender<SessionCommand>,
    play_id: u64,
    uri: String,
}

impl CompletionSignal {
    pub(crate) fn new(tx: UnboundedSender<SessionCommand>, play_id: u64, uri: impl Into<String>) -> Self {
        Self {
            tx,
            play_id,
            uri: uri.into(),
        }
    }

    /// La pista terminó de sonar
    pub fn fire(self) {
        debug!("🏁 Fin de pista (play_id {})", self.play_id);
        self.send(None);
    }

    /// El stream falló después de empezar (decoder, HTTP, yt-dlp)
    pub fn fail(self, reason: impl Into<String>) {
        let error = PlaybackOpenError::Stream {
            uri: self.uri.clone(),
            reason: reason.into(),
        };
        debug!("💥 Pista fallida (play_id {}): {}", self.play_id, error);
        self.send(Some(error));
    }

    fn send(self, error: Option<PlaybackOpenError>) {
        // Si la sesión ya no existe no hay nadie a quien avisar
        let _ = self.tx.send(SessionCommand::TrackEnded {
            play_id: self.play_id,
            error,
        });
    }
}

/// Audio subsystem of one voice session.
///
/// `open` materializes a fresh playable handle from a track's recipe. It is
/// called right before playback, never at enqueue time. `play` starts the
/// handle and must settle the signal exactly once: [`CompletionSignal::fire`]
/// when the audio ends, [`CompletionSignal::fail`] when the stream breaks.
#[async_trait]
pub trait AudioBackend: Send + Sync + 'static {
    type Handle: Send + 'static;

    async fn open(&self, source: &AudioSource) -> Result<Self::Handle, PlaybackOpenError>;

    async fn play(&self, handle: Self::Handle, completion: CompletionSignal) -> Result<(), SubsystemError>;

    async fn pause(&self) -> Result<(), SubsystemError>;

    async fn resume(&self) -> Result<(), SubsystemError>;

    /// Detiene la pista actual; sin pista activa no hace nada
    async fn stop(&self) -> Result<(), SubsystemError>;
}
