//! Dobles de prueba compartidos por los tests del crate.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::UserId;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use crate::{
    audio::backend::{AudioBackend, CompletionSignal},
    error::{PlaybackOpenError, ResolutionError, SubsystemError},
    sources::{AudioSource, Resolved, TrackDescriptor, TrackResolver},
};

fn fake_track(name: &str, requested_by: UserId) -> TrackDescriptor {
    TrackDescriptor::new(
        name,
        name,
        AudioSource::Http(format!("fake://{}", name)),
        requested_by,
    )
}

/// Pista de prueba cuyo título y `source_uri` son `name`
pub fn track(name: &str) -> TrackDescriptor {
    fake_track(name, UserId::new(1))
}

fn source_name(source: &AudioSource) -> String {
    match source {
        AudioSource::Http(url) => url.trim_start_matches("fake://").to_string(),
        AudioSource::YtDlp(url) => url.clone(),
        AudioSource::File(path) => path.display().to_string(),
    }
}

#[derive(Default)]
struct BackendState {
    calls: Mutex<Vec<String>>,
    signals: Mutex<Vec<CompletionSignal>>,
    broken: Mutex<HashSet<String>>,
    failing_midway: Mutex<HashSet<String>>,
}

/// Backend de audio en memoria: registra llamadas y guarda los avisos de fin
#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<BackendState>,
}

impl FakeBackend {
    /// Las pistas con este nombre fallan al abrirse
    pub fn broken(self, name: &str) -> Self {
        self.state.broken.lock().insert(name.to_string());
        self
    }

    /// Las pistas con este nombre abren bien pero el stream falla al sonar
    pub fn failing_midway(self, name: &str) -> Self {
        self.state.failing_midway.lock().insert(name.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.calls.lock().clone()
    }

    /// Nombres de las pistas que llegaron a reproducirse
    pub fn played(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| call.strip_prefix("play:").map(str::to_string))
            .collect()
    }

    /// Saca el aviso de la última pista sin dispararlo
    pub fn take_signal(&self) -> Option<CompletionSignal> {
        self.state.signals.lock().pop()
    }

    /// Simula que la última pista terminó de sonar
    pub fn finish_current(&self) -> bool {
        match self.take_signal() {
            Some(signal) => {
                signal.fire();
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl AudioBackend for FakeBackend {
    type Handle = String;

    async fn open(&self, source: &AudioSource) -> Result<String, PlaybackOpenError> {
        let name = source_name(source);
        if self.state.broken.lock().contains(&name) {
            return Err(PlaybackOpenError::Stream {
                uri: name,
                reason: "stream roto".to_string(),
            });
        }
        Ok(name)
    }

    async fn play(&self, handle: String, completion: CompletionSignal) -> Result<(), SubsystemError> {
        self.state.calls.lock().push(format!("play:{}", handle));

        if self.state.failing_midway.lock().contains(&handle) {
            completion.fail("decoder: formato no reconocido");
        } else {
            self.state.signals.lock().push(completion);
        }
        Ok(())
    }

    async fn pause(&self) -> Result<(), SubsystemError> {
        self.state.calls.lock().push("pause".to_string());
        Ok(())
    }

    async fn resume(&self) -> Result<(), SubsystemError> {
        self.state.calls.lock().push("resume".to_string());
        Ok(())
    }

    async fn stop(&self) -> Result<(), SubsystemError> {
        self.state.calls.lock().push("stop".to_string());
        Ok(())
    }
}

/// Resolvedor en memoria: cada consulta se resuelve a una pista con su mismo nombre
#[derive(Default)]
pub struct FakeResolver {
    errors: HashMap<String, ResolutionError>,
    fail_after: HashMap<String, usize>,
    collections: HashMap<String, Resolved>,
    delays: HashMap<String, Duration>,
    calls: Mutex<HashMap<String, usize>>,
}

impl FakeResolver {
    pub fn failing(self, query: &str) -> Self {
        self.with_error(query, ResolutionError::provider("fake", "sin resultados"))
    }

    pub fn with_error(mut self, query: &str, error: ResolutionError) -> Self {
        self.errors.insert(query.to_string(), error);
        self
    }

    /// La consulta funciona `times` veces y después falla
    pub fn failing_after(mut self, query: &str, times: usize) -> Self {
        self.fail_after.insert(query.to_string(), times);
        self
    }

    pub fn with_collection(mut self, input: &str, resolved: Resolved) -> Self {
        self.collections.insert(input.to_string(), resolved);
        self
    }

    pub fn with_delay(mut self, query: &str, delay: Duration) -> Self {
        self.delays.insert(query.to_string(), delay);
        self
    }
}

#[async_trait]
impl TrackResolver for FakeResolver {
    async fn resolve(&self, input: &str, requested_by: UserId) -> Result<Resolved, ResolutionError> {
        if let Some(resolved) = self.collections.get(input) {
            return Ok(resolved.clone());
        }
        self.search(input, requested_by).await.map(Resolved::Track)
    }

    async fn search(&self, query: &str, requested_by: UserId) -> Result<TrackDescriptor, ResolutionError> {
        if let Some(delay) = self.delays.get(query) {
            tokio::time::sleep(*delay).await;
        }

        let calls = {
            let mut calls = self.calls.lock();
            let count = calls.entry(query.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        if let Some(error) = self.errors.get(query) {
            return Err(error.clone());
        }

        if matches!(self.fail_after.get(query), Some(limit) if calls > *limit) {
            return Err(ResolutionError::NoResults(query.to_string()));
        }

        Ok(fake_track(query, requested_by))
    }
}
