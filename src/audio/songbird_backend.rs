use async_trait::async_trait;
use parking_lot::Mutex as SyncMutex;
use songbird::{
    input::{File, HttpRequest, Input, YoutubeDl},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, TrackEvent,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::backend::{AudioBackend, CompletionSignal};
use crate::{
    error::{PlaybackOpenError, SubsystemError},
    sources::AudioSource,
};

/// Backend de audio sobre una llamada de Songbird
pub struct SongbirdBackend {
    call: Arc<Mutex<Call>>,
    http: reqwest::Client,
    volume: f32,
    current: SyncMutex<Option<TrackHandle>>,
}

impl SongbirdBackend {
    pub fn new(call: Arc<Mutex<Call>>, http: reqwest::Client, volume: f32) -> Self {
        Self {
            call,
            http,
            volume: volume.clamp(0.0, 2.0),
            current: SyncMutex::new(None),
        }
    }

    fn with_current<T>(
        &self,
        f: impl FnOnce(&TrackHandle) -> Result<T, songbird::error::ControlError>,
    ) -> Result<T, SubsystemError> {
        let current = self.current.lock();
        let track = current.as_ref().ok_or(SubsystemError::NothingPlaying)?;
        f(track).map_err(|e| SubsystemError::Control(e.to_string()))
    }
}

#[async_trait]
impl AudioBackend for SongbirdBackend {
    type Handle = Input;

    async fn open(&self, source: &AudioSource) -> Result<Input, PlaybackOpenError> {
        match source {
            AudioSource::File(path) => {
                if !tokio::fs::try_exists(path).await.unwrap_or(false) {
                    return Err(PlaybackOpenError::FileMissing(path.display().to_string()));
                }
                Ok(File::new(path.clone()).into())
            }
            // El stream se pide al reproducir; si falla llega como `TrackEvent::Error`
            AudioSource::YtDlp(url) => Ok(YoutubeDl::new(self.http.clone(), url.clone()).into()),
            AudioSource::Http(url) => Ok(HttpRequest::new(self.http.clone(), url.clone()).into()),
        }
    }

    async fn play(&self, handle: Input, completion: CompletionSignal) -> Result<(), SubsystemError> {
        let track = {
            let mut call = self.call.lock().await;
            call.play_only_input(handle)
        };

        let _ = track.set_volume(self.volume);

        let notifier = TrackEndNotifier {
            signal: Arc::new(SyncMutex::new(Some(completion))),
        };

        for event in [TrackEvent::End, TrackEvent::Error] {
            if let Err(e) = track.add_event(Event::Track(event), notifier.clone()) {
                let _ = track.stop();
                return Err(SubsystemError::Control(format!(
                    "Error al agregar event handler: {}",
                    e
                )));
            }
        }

        *self.current.lock() = Some(track);
        Ok(())
    }

    async fn pause(&self) -> Result<(), SubsystemError> {
        self.with_current(|track| track.pause())?;
        info!("⏸️ Reproducción pausada");
        Ok(())
    }

    async fn resume(&self) -> Result<(), SubsystemError> {
        self.with_current(|track| track.play())?;
        info!("▶️ Reproducción reanudada");
        Ok(())
    }

    async fn stop(&self) -> Result<(), SubsystemError> {
        if let Some(track) = self.current.lock().take() {
            let _ = track.stop();
            debug!("⏹️ Track detenido");
        }
        Ok(())
    }
}

/// Handler para cuando termina (o falla) una canción
#[derive(Clone)]
struct TrackEndNotifier {
    signal: Arc<SyncMutex<Option<CompletionSignal>>>,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let failure = match ctx {
            EventContext::Track(tracks) => tracks.iter().find_map(|(state, _)| match &state.playing {
                PlayMode::Errored(e) => Some(format!("{:?}", e)),
                _ => None,
            }),
            _ => None,
        };

        if let Some(signal) = self.signal.lock().take() {
            match failure {
                Some(reason) => {
                    warn!("❌ Error durante la reproducción: {}", reason);
                    signal.fail(reason);
                }
                None => signal.fire(),
            }
        }

        Some(Event::Cancel)
    }
}
