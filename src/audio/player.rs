//! Per-guild playback driver.
//!
//! Every voice session runs as one tokio task that owns its [`SessionQueue`]
//! and driver state. Everything that can change that state (slash commands,
//! resolved play requests, drained playlist items, end-of-track signals from
//! the audio backend) arrives as a [`SessionCommand`] over a single channel,
//! so transitions are applied one at a time.
//!
//! Play requests are resolved in spawned tasks so that a slow lookup never
//! holds up `skip` or `pause`. Each request takes a ticket when it is issued
//! and results are applied in ticket order.

use serenity::model::id::{GuildId, UserId};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    backend::{AudioBackend, CompletionSignal},
    queue::{QueueSnapshot, SessionQueue},
};
use crate::{
    error::{BotError, PlaybackOpenError, ResolutionError, Result, StateError, SubsystemError},
    sources::{
        drain::{run_drain, DrainJob, DrainReport},
        Resolved, TrackDescriptor, TrackResolver,
    },
};

type Reply<T> = oneshot::Sender<T>;

/// Mensajes que procesa el actor de una sesión
pub enum SessionCommand {
    Play {
        input: String,
        requested_by: UserId,
        reply: Reply<Result<PlayOutcome>>,
    },
    Resolved {
        ticket: u64,
        result: std::result::Result<Resolved, ResolutionError>,
    },
    TrackEnded {
        play_id: u64,
        error: Option<PlaybackOpenError>,
    },
    LoopRequeued {
        step: u64,
        finished: TrackDescriptor,
        result: std::result::Result<TrackDescriptor, ResolutionError>,
    },
    DrainAppend {
        generation: u64,
        track: TrackDescriptor,
    },
    DrainFinished {
        generation: u64,
        title: String,
        report: DrainReport,
    },
    Pause {
        reply: Reply<Result<()>>,
    },
    Resume {
        reply: Reply<Result<()>>,
    },
    Skip {
        reply: Reply<Result<Option<TrackDescriptor>>>,
    },
    Stop {
        reply: Reply<()>,
    },
    ClearPending {
        reply: Reply<usize>,
    },
    Shuffle {
        reply: Reply<usize>,
    },
    ToggleRepeat {
        reply: Reply<bool>,
    },
    ToggleLoop {
        reply: Reply<bool>,
    },
    Snapshot {
        limit: usize,
        reply: Reply<QueueSnapshot>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

/// Qué agregó un `/play`
#[derive(Debug, Clone, PartialEq)]
pub enum PlayKind {
    Track(TrackDescriptor),
    Collection {
        title: String,
        added: usize,
    },
    Deferred {
        title: String,
        first: TrackDescriptor,
        pending: usize,
    },
    /// Un `/stop` llegó antes de que se resolviera la petición
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayOutcome {
    pub kind: PlayKind,
    /// La reproducción arrancó con esta petición
    pub started: bool,
}

impl PlayOutcome {
    fn cancelled() -> Self {
        Self {
            kind: PlayKind::Cancelled,
            started: false,
        }
    }
}

/// Notificaciones de la sesión para el canal de texto
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    NowPlaying(TrackDescriptor),
    TrackFailed {
        track: TrackDescriptor,
        error: BotError,
    },
    LoopRequeueFailed {
        track: TrackDescriptor,
        error: ResolutionError,
    },
    QueueFinished,
    DrainFinished {
        title: String,
        added: usize,
        failed: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriverState {
    Idle,
    Playing { play_id: u64, paused: bool },
    /// Esperando la re-resolución de la pista terminada (modo loop)
    Requeueing { step: u64 },
}

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub max_queue_size: usize,
    pub drain_concurrency: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_queue_size: 1000,
            drain_concurrency: 4,
        }
    }
}

/// Handle clonable hacia el actor de una sesión
#[derive(Clone)]
pub struct SessionHandle {
    guild_id: GuildId,
    tx: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    /// Arranca el actor de la sesión y devuelve su handle y sus notificaciones
    pub fn spawn<B: AudioBackend>(
        guild_id: GuildId,
        backend: B,
        resolver: Arc<dyn TrackResolver>,
        settings: SessionSettings,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let session = Session {
            guild_id,
            queue: SessionQueue::new(settings.max_queue_size),
            state: DriverState::Idle,
            backend,
            resolver,
            settings,
            tx: tx.clone(),
            events: events_tx,
            next_play_id: 0,
            next_ticket: 0,
            next_apply: 0,
            ready: BTreeMap::new(),
            replies: HashMap::new(),
            drain_token: CancellationToken::new(),
            drain_generation: 0,
            active_drains: 0,
            skip_waiters: Vec::new(),
        };

        tokio::spawn(session.run(rx));

        (Self { guild_id, tx }, events_rx)
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    async fn request<T>(&self, command: impl FnOnce(Reply<T>) -> SessionCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(command(reply))
            .map_err(|_| StateError::SessionClosed)?;
        rx.await.map_err(|_| StateError::SessionClosed.into())
    }

    /// Resuelve y encola; arranca la reproducción si la sesión estaba inactiva
    pub async fn play(&self, input: impl Into<String>, requested_by: UserId) -> Result<PlayOutcome> {
        let input = input.into();
        self.request(|reply| SessionCommand::Play {
            input,
            requested_by,
            reply,
        })
        .await?
    }

    pub async fn pause(&self) -> Result<()> {
        self.request(|reply| SessionCommand::Pause { reply }).await?
    }

    pub async fn resume(&self) -> Result<()> {
        self.request(|reply| SessionCommand::Resume { reply }).await?
    }

    /// Salta la pista actual; devuelve la que empezó a sonar, si hay
    pub async fn skip(&self) -> Result<Option<TrackDescriptor>> {
        self.request(|reply| SessionCommand::Skip { reply }).await?
    }

    pub async fn stop(&self) -> Result<()> {
        self.request(|reply| SessionCommand::Stop { reply }).await
    }

    /// Limpia las pendientes; devuelve cuántas se quitaron
    pub async fn clear(&self) -> Result<usize> {
        self.request(|reply| SessionCommand::ClearPending { reply }).await
    }

    /// Mezcla las pendientes si hay al menos dos; devuelve cuántas hay
    pub async fn shuffle(&self) -> Result<usize> {
        self.request(|reply| SessionCommand::Shuffle { reply }).await
    }

    pub async fn toggle_repeat(&self) -> Result<bool> {
        self.request(|reply| SessionCommand::ToggleRepeat { reply }).await
    }

    pub async fn toggle_loop(&self) -> Result<bool> {
        self.request(|reply| SessionCommand::ToggleLoop { reply }).await
    }

    pub async fn snapshot(&self, limit: usize) -> Result<QueueSnapshot> {
        self.request(|reply| SessionCommand::Snapshot { limit, reply })
            .await
    }

    /// Detiene todo y termina el actor
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| SessionCommand::Shutdown { reply }).await
    }
}

struct Session<B: AudioBackend> {
    guild_id: GuildId,
    queue: SessionQueue,
    state: DriverState,
    backend: B,
    resolver: Arc<dyn TrackResolver>,
    settings: SessionSettings,
    tx: mpsc::UnboundedSender<SessionCommand>,
    events: mpsc::UnboundedSender<SessionEvent>,
    next_play_id: u64,

    // Orden de aplicación de los `/play`
    next_ticket: u64,
    next_apply: u64,
    ready: BTreeMap<u64, std::result::Result<Resolved, ResolutionError>>,
    replies: HashMap<u64, Reply<Result<PlayOutcome>>>,

    // Drenado de colecciones
    drain_token: CancellationToken,
    drain_generation: u64,
    active_drains: usize,

    // `/skip` que esperan a que arranque la siguiente pista
    skip_waiters: Vec<Reply<Result<Option<TrackDescriptor>>>>,
}

impl<B: AudioBackend> Session<B> {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<SessionCommand>) {
        info!("🎧 Sesión iniciada en guild {}", self.guild_id);

        while let Some(command) = rx.recv().await {
            if !self.handle(command).await {
                break;
            }
        }

        info!("👋 Sesión terminada en guild {}", self.guild_id);
    }

    /// Procesa un comando; `false` termina el actor
    async fn handle(&mut self, command: SessionCommand) -> bool {
        match command {
            SessionCommand::Play {
                input,
                requested_by,
                reply,
            } => self.issue_play(input, requested_by, reply),
            SessionCommand::Resolved { ticket, result } => self.on_resolved(ticket, result).await,
            SessionCommand::TrackEnded { play_id, error } => self.on_track_ended(play_id, error).await,
            SessionCommand::LoopRequeued {
                step,
                finished,
                result,
            } => self.on_loop_requeued(step, finished, result).await,
            SessionCommand::DrainAppend { generation, track } => {
                self.on_drain_append(generation, track).await
            }
            SessionCommand::DrainFinished {
                generation,
                title,
                report,
            } => self.on_drain_finished(generation, title, report),
            SessionCommand::Pause { reply } => {
                let _ = reply.send(self.pause().await);
            }
            SessionCommand::Resume { reply } => {
                let _ = reply.send(self.resume().await);
            }
            SessionCommand::Skip { reply } => self.skip(reply).await,
            SessionCommand::Stop { reply } => {
                self.stop().await;
                let _ = reply.send(());
            }
            SessionCommand::ClearPending { reply } => {
                let removed = self.queue.clear_pending();
                info!("🗑️ {} canciones quitadas de la cola", removed);
                let _ = reply.send(removed);
            }
            SessionCommand::Shuffle { reply } => {
                if self.queue.len() >= 2 {
                    self.queue.shuffle();
                }
                let _ = reply.send(self.queue.len());
            }
            SessionCommand::ToggleRepeat { reply } => {
                let _ = reply.send(self.queue.toggle_repeat());
            }
            SessionCommand::ToggleLoop { reply } => {
                let _ = reply.send(self.queue.toggle_loop());
            }
            SessionCommand::Snapshot { limit, reply } => {
                let mut snapshot = self.queue.snapshot(limit);
                snapshot.paused = matches!(self.state, DriverState::Playing { paused: true, .. });
                let _ = reply.send(snapshot);
            }
            SessionCommand::Shutdown { reply } => {
                self.stop().await;
                let _ = reply.send(());
                return false;
            }
        }

        true
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn issue_play(&mut self, input: String, requested_by: UserId, reply: Reply<Result<PlayOutcome>>) {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.replies.insert(ticket, reply);

        debug!("🎫 Ticket {} para '{}'", ticket, input);

        let resolver = Arc::clone(&self.resolver);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = resolver.resolve(&input, requested_by).await;
            let _ = tx.send(SessionCommand::Resolved { ticket, result });
        });
    }

    async fn on_resolved(&mut self, ticket: u64, result: std::result::Result<Resolved, ResolutionError>) {
        if ticket < self.next_apply {
            debug!("Ticket {} descartado por /stop", ticket);
            return;
        }

        self.ready.insert(ticket, result);

        while let Some(result) = self.ready.remove(&self.next_apply) {
            let ticket = self.next_apply;
            self.next_apply += 1;

            let outcome = self.apply(result).await;
            if let Some(reply) = self.replies.remove(&ticket) {
                let _ = reply.send(outcome);
            }
        }
    }

    async fn apply(&mut self, result: std::result::Result<Resolved, ResolutionError>) -> Result<PlayOutcome> {
        let kind = match result? {
            Resolved::Track(track) => {
                self.queue.enqueue(track.clone())?;
                PlayKind::Track(track)
            }
            Resolved::Tracks { title, tracks } => {
                let added = self.queue.enqueue_many(tracks);
                if added == 0 {
                    return Err(StateError::QueueFull(self.settings.max_queue_size).into());
                }
                PlayKind::Collection { title, added }
            }
            Resolved::Deferred(collection) => {
                self.queue.enqueue(collection.first.clone())?;
                let pending = collection.remaining.len();

                if collection.skipped > 0 {
                    warn!(
                        "⏭️ {} elementos de '{}' se saltaron al resolver",
                        collection.skipped, collection.title
                    );
                }

                if pending > 0 {
                    self.start_drain(DrainJob {
                        title: collection.title.clone(),
                        queries: collection.remaining,
                        requested_by: collection.first.requested_by(),
                    });
                }

                PlayKind::Deferred {
                    title: collection.title,
                    first: collection.first,
                    pending,
                }
            }
        };

        let started = self.kick().await;
        Ok(PlayOutcome { kind, started })
    }

    fn start_drain(&mut self, job: DrainJob) {
        self.active_drains += 1;

        let generation = self.drain_generation;
        let resolver = Arc::clone(&self.resolver);
        let token = self.drain_token.clone();
        let concurrency = self.settings.drain_concurrency;
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let title = job.title.clone();
            let append_tx = tx.clone();
            let report = run_drain(resolver, job, concurrency, token, move |track| {
                append_tx
                    .send(SessionCommand::DrainAppend { generation, track })
                    .is_ok()
            })
            .await;

            let _ = tx.send(SessionCommand::DrainFinished {
                generation,
                title,
                report,
            });
        });
    }

    async fn on_drain_append(&mut self, generation: u64, track: TrackDescriptor) {
        if generation != self.drain_generation {
            debug!("Pista de un drenado anterior ignorada: {}", track.title());
            return;
        }

        if let Err(e) = self.queue.enqueue(track) {
            warn!("⚠️ {}; se cancela el drenado", e);
            self.cancel_drains();
            return;
        }

        self.kick().await;
    }

    fn on_drain_finished(&mut self, generation: u64, title: String, report: DrainReport) {
        self.active_drains = self.active_drains.saturating_sub(1);

        if generation != self.drain_generation || report.cancelled {
            return;
        }

        self.emit(SessionEvent::DrainFinished {
            title,
            added: report.added,
            failed: report.failed,
        });

        if self.active_drains == 0 && self.state == DriverState::Idle && self.queue.is_empty() {
            self.emit(SessionEvent::QueueFinished);
        }
    }

    fn cancel_drains(&mut self) {
        self.drain_token.cancel();
        self.drain_token = CancellationToken::new();
        self.drain_generation += 1;
    }

    /// Arranca la reproducción si la sesión está inactiva
    async fn kick(&mut self) -> bool {
        if self.state != DriverState::Idle {
            return false;
        }

        self.advance().await;
        self.state != DriverState::Idle
    }

    async fn on_track_ended(&mut self, play_id: u64, error: Option<PlaybackOpenError>) {
        match self.state {
            DriverState::Playing { play_id: current, .. } if current == play_id => {
                self.state = DriverState::Idle;

                // Una pista rota no vuelve a la cola ni por repeat ni por loop
                if let Some(error) = error {
                    if let Some(track) = self.queue.discard_current() {
                        error!("❌ Falló la reproducción de '{}': {}", track.title(), error);
                        self.emit(SessionEvent::TrackFailed {
                            track,
                            error: error.into(),
                        });
                    }
                }

                self.advance().await;
            }
            _ => debug!("Aviso de fin obsoleto (play_id {})", play_id),
        }
    }

    /// Pasa a la siguiente pista aplicando loop/repeat.
    ///
    /// Con loop activo la pista terminada se re-resuelve en otra tarea y la
    /// sesión queda en `Requeueing` hasta que llega el resultado, así el
    /// re-encolado cae antes de sacar la siguiente y el actor sigue atendiendo
    /// comandos mientras tanto.
    async fn advance(&mut self) {
        if let Some(finished) = self.queue.loop_candidate().cloned() {
            self.next_play_id += 1;
            let step = self.next_play_id;
            self.state = DriverState::Requeueing { step };

            debug!("🔁 Re-resolviendo '{}'", finished.title());
            let resolver = Arc::clone(&self.resolver);
            let tx = self.tx.clone();
            tokio::spawn(async move {
                let result = resolver.reresolve(&finished).await;
                let _ = tx.send(SessionCommand::LoopRequeued {
                    step,
                    finished,
                    result,
                });
            });
            return;
        }

        self.play_next().await;
    }

    async fn on_loop_requeued(
        &mut self,
        step: u64,
        finished: TrackDescriptor,
        result: std::result::Result<TrackDescriptor, ResolutionError>,
    ) {
        if self.state != (DriverState::Requeueing { step }) {
            debug!("Re-resolución obsoleta de '{}'", finished.title());
            return;
        }

        // Los modos pudieron cambiar mientras se resolvía
        if self.queue.loop_candidate().is_some() {
            match result {
                Ok(fresh) => {
                    if let Err(e) = self.queue.enqueue(fresh) {
                        warn!("⚠️ No se pudo re-encolar '{}': {}", finished.title(), e);
                    }
                }
                Err(error) => {
                    warn!("🔁 No se pudo re-resolver '{}': {}", finished.title(), error);
                    self.emit(SessionEvent::LoopRequeueFailed {
                        track: finished,
                        error,
                    });
                }
            }
        }

        self.state = DriverState::Idle;
        self.play_next().await;
    }

    /// Saca pistas hasta que una arranca; las que no abren se descartan
    async fn play_next(&mut self) {
        loop {
            let Some(next) = self.queue.advance() else {
                self.state = DriverState::Idle;
                if self.active_drains == 0 {
                    info!("📭 Cola terminada en guild {}", self.guild_id);
                    self.emit(SessionEvent::QueueFinished);
                }
                break;
            };

            match self.start(&next).await {
                Ok(play_id) => {
                    self.state = DriverState::Playing {
                        play_id,
                        paused: false,
                    };
                    info!("🎵 Reproduciendo: {}", next.title());
                    self.emit(SessionEvent::NowPlaying(next));
                    break;
                }
                Err(error) => {
                    error!("❌ No se pudo reproducir '{}': {}", next.title(), error);
                    self.queue.discard_current();
                    self.emit(SessionEvent::TrackFailed { track: next, error });
                }
            }
        }

        self.answer_skips();
    }

    fn answer_skips(&mut self) {
        let current = self.queue.current().cloned();
        for reply in self.skip_waiters.drain(..) {
            let _ = reply.send(Ok(current.clone()));
        }
    }

    async fn start(&mut self, track: &TrackDescriptor) -> Result<u64> {
        let handle = self.backend.open(track.audio()).await?;

        self.next_play_id += 1;
        let play_id = self.next_play_id;

        self.backend
            .play(
                handle,
                CompletionSignal::new(self.tx.clone(), play_id, track.source_uri()),
            )
            .await?;

        Ok(play_id)
    }

    async fn pause(&mut self) -> Result<()> {
        match self.state {
            DriverState::Idle | DriverState::Requeueing { .. } => {
                Err(SubsystemError::NothingPlaying.into())
            }
            DriverState::Playing { paused: true, .. } => Ok(()),
            DriverState::Playing { play_id, .. } => {
                self.backend.pause().await?;
                self.state = DriverState::Playing {
                    play_id,
                    paused: true,
                };
                Ok(())
            }
        }
    }

    async fn resume(&mut self) -> Result<()> {
        match self.state {
            DriverState::Idle | DriverState::Requeueing { .. } => {
                Err(SubsystemError::NothingPlaying.into())
            }
            DriverState::Playing { paused: false, .. } => Ok(()),
            DriverState::Playing { play_id, .. } => {
                self.backend.resume().await?;
                self.state = DriverState::Playing {
                    play_id,
                    paused: false,
                };
                Ok(())
            }
        }
    }

    /// Corta la pista actual y avanza sin esperar el aviso del backend; ese
    /// aviso llega después con un `play_id` viejo y se ignora. La respuesta
    /// sale cuando ya arrancó la siguiente pista (o no quedó ninguna).
    async fn skip(&mut self, reply: Reply<Result<Option<TrackDescriptor>>>) {
        match self.state {
            DriverState::Idle => {
                let _ = reply.send(Err(SubsystemError::NothingPlaying.into()));
            }
            DriverState::Requeueing { .. } => self.skip_waiters.push(reply),
            DriverState::Playing { .. } => {
                if let Err(e) = self.backend.stop().await {
                    warn!("⚠️ Error al detener la pista: {}", e);
                }

                info!("⏭️ Canción saltada");
                self.state = DriverState::Idle;
                self.skip_waiters.push(reply);
                self.advance().await;
            }
        }
    }

    async fn stop(&mut self) {
        self.cancel_drains();

        for (_, reply) in self.replies.drain() {
            let _ = reply.send(Ok(PlayOutcome::cancelled()));
        }
        self.ready.clear();
        self.next_apply = self.next_ticket;

        self.queue.clear();
        self.queue.set_loop(false);

        if self.state != DriverState::Idle {
            if let Err(e) = self.backend.stop().await {
                warn!("⚠️ Error al detener la pista: {}", e);
            }
            self.state = DriverState::Idle;
        }
        self.answer_skips();

        info!("⏹️ Reproducción detenida en guild {}", self.guild_id);
    }
}
