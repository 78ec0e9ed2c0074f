use chrono::{DateTime, Utc};
use rand::{seq::SliceRandom, Rng};
use std::collections::VecDeque;
use tracing::{debug, info};

use crate::{error::StateError, sources::TrackDescriptor};

/// Entrada de la cola: la pista y el momento en que se agregó
#[derive(Debug, Clone, PartialEq)]
pub struct QueueItem {
    pub track: TrackDescriptor,
    pub enqueued_at: DateTime<Utc>,
}

impl From<TrackDescriptor> for QueueItem {
    fn from(track: TrackDescriptor) -> Self {
        Self {
            track,
            enqueued_at: Utc::now(),
        }
    }
}

/// Cola de reproducción de una sesión de voz.
///
/// `pending` es FIFO; `current` es la pista que suena (o está en pausa).
/// Con `repeat_current` la pista actual vuelve al final de la cola justo antes
/// de ser reemplazada. Con `loop_queue` la pista terminada se vuelve a resolver
/// desde su `source_uri`; eso lo hace el reproductor, la cola solo expone el
/// candidato con [`SessionQueue::loop_candidate`]. Si ambos modos están
/// activos gana `repeat_current`.
#[derive(Debug)]
pub struct SessionQueue {
    pending: VecDeque<QueueItem>,
    current: Option<QueueItem>,
    repeat_current: bool,
    loop_queue: bool,
    max_size: usize,
}

impl SessionQueue {
    pub fn new(max_size: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            current: None,
            repeat_current: false,
            loop_queue: false,
            max_size,
        }
    }

    /// Agrega un track al final de la cola
    pub fn enqueue(&mut self, track: TrackDescriptor) -> Result<(), StateError> {
        if self.pending.len() >= self.max_size {
            return Err(StateError::QueueFull(self.max_size));
        }

        debug!("➕ Agregado a la cola: {}", track.title());
        self.pending.push_back(QueueItem::from(track));
        Ok(())
    }

    /// Agrega múltiples tracks (playlist); devuelve cuántos cupieron
    pub fn enqueue_many(&mut self, tracks: Vec<TrackDescriptor>) -> usize {
        let available_space = self.max_size.saturating_sub(self.pending.len());
        let to_add = tracks.len().min(available_space);

        self.pending
            .extend(tracks.into_iter().take(to_add).map(QueueItem::from));

        info!("➕ Agregadas {} canciones a la cola", to_add);
        to_add
    }

    /// Retira la pista actual y promueve la siguiente (FIFO).
    ///
    /// La regla de repetición se aplica antes de sacar la cabeza: la pista que
    /// está por dejar de ser `current` vuelve al final de `pending`.
    pub fn advance(&mut self) -> Option<TrackDescriptor> {
        if let Some(finished) = self.current.take() {
            if self.repeat_current {
                debug!("🔂 Repitiendo track: {}", finished.track.title());
                self.pending.push_back(finished);
            }
        }

        self.current = self.pending.pop_front();

        match &self.current {
            Some(item) => {
                debug!("➡️ Siguiente en cola: {}", item.track.title());
                Some(item.track.clone())
            }
            None => {
                debug!("📭 Cola vacía, no hay siguiente track");
                None
            }
        }
    }

    /// Pista a re-resolver cuando termina, si el modo loop aplica
    pub fn loop_candidate(&self) -> Option<&TrackDescriptor> {
        if self.loop_queue && !self.repeat_current {
            self.current.as_ref().map(|item| &item.track)
        } else {
            None
        }
    }

    /// Descarta la pista actual sin re-encolarla (su handle no se pudo abrir)
    pub fn discard_current(&mut self) -> Option<TrackDescriptor> {
        self.current.take().map(|item| item.track)
    }

    /// Limpia la cola y la pista actual; los modos no cambian
    pub fn clear(&mut self) {
        self.pending.clear();
        self.current = None;
        info!("🗑️ Cola limpiada");
    }

    /// Limpia solo las pistas pendientes
    pub fn clear_pending(&mut self) -> usize {
        let removed = self.pending.len();
        self.pending.clear();
        removed
    }

    /// Primeras `n` pistas pendientes, en orden de reproducción
    pub fn peek(&self, n: usize) -> Vec<QueueItem> {
        self.pending.iter().take(n).cloned().collect()
    }

    /// Mezcla las pendientes; la pista actual no se mueve
    pub fn shuffle(&mut self) {
        self.shuffle_with(&mut rand::thread_rng());
    }

    /// Fisher-Yates uniforme sobre `pending`
    pub fn shuffle_with<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.pending.make_contiguous().shuffle(rng);
        info!("🔀 Cola mezclada");
    }

    pub fn toggle_repeat(&mut self) -> bool {
        self.repeat_current = !self.repeat_current;
        if self.repeat_current {
            info!("🔂 Repetir canción activado");
        } else {
            info!("➡️ Repetir canción desactivado");
        }
        self.repeat_current
    }

    pub fn toggle_loop(&mut self) -> bool {
        self.set_loop(!self.loop_queue);
        self.loop_queue
    }

    pub fn set_loop(&mut self, enabled: bool) {
        self.loop_queue = enabled;
        if enabled {
            info!("🔁 Repetir cola activado");
        } else {
            info!("➡️ Repetir cola desactivado");
        }
    }

    pub fn current(&self) -> Option<&TrackDescriptor> {
        self.current.as_ref().map(|item| &item.track)
    }

    pub fn repeat_current(&self) -> bool {
        self.repeat_current
    }

    pub fn loop_queue(&self) -> bool {
        self.loop_queue
    }

    /// Cantidad de pistas pendientes
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Obtiene información de la cola para listarla
    pub fn snapshot(&self, limit: usize) -> QueueSnapshot {
        QueueSnapshot {
            current: self.current.clone(),
            upcoming: self.peek(limit),
            total_pending: self.pending.len(),
            repeat_current: self.repeat_current,
            loop_queue: self.loop_queue,
            paused: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueSnapshot {
    pub current: Option<QueueItem>,
    pub upcoming: Vec<QueueItem>,
    pub total_pending: usize,
    pub repeat_current: bool,
    pub loop_queue: bool,
    pub paused: bool,
}

impl QueueSnapshot {
    pub fn is_empty(&self) -> bool {
        self.current.is_none() && self.total_pending == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::track;
    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, SeedableRng};

    fn titles(items: &[QueueItem]) -> Vec<String> {
        items.iter().map(|item| item.track.title().to_string()).collect()
    }

    fn queue_with(names: &[&str]) -> SessionQueue {
        let mut queue = SessionQueue::new(100);
        for name in names {
            queue.enqueue(track(name)).unwrap();
        }
        queue
    }

    #[test]
    fn test_peek_preserves_enqueue_order() {
        let mut queue = queue_with(&["a", "b"]);
        queue.enqueue_many(vec![track("c"), track("d")]);
        queue.enqueue(track("e")).unwrap();

        assert_eq!(titles(&queue.peek(queue.len())), vec!["a", "b", "c", "d", "e"]);
    }

    #[test]
    fn test_advance_on_empty_queue() {
        let mut queue = SessionQueue::new(10);
        assert!(queue.advance().is_none());
        assert!(queue.current().is_none());
    }

    #[test]
    fn test_advance_pops_head_into_current() {
        let mut queue = queue_with(&["a", "b", "c"]);

        assert_eq!(queue.advance().unwrap().title(), "a");
        assert_eq!(queue.current().unwrap().title(), "a");
        assert_eq!(titles(&queue.peek(10)), vec!["b", "c"]);
    }

    #[test]
    fn test_current_cleared_when_queue_runs_out() {
        let mut queue = queue_with(&["a"]);
        queue.advance();
        assert!(queue.advance().is_none());
        assert!(queue.current().is_none());
    }

    #[test]
    fn test_repeat_cycles_single_track() {
        let mut queue = queue_with(&["a"]);
        queue.toggle_repeat();

        for _ in 0..5 {
            assert_eq!(queue.advance().unwrap().title(), "a");
            assert_eq!(queue.current().unwrap().title(), "a");
            assert_eq!(queue.len(), 0);
        }
    }

    #[test]
    fn test_repeat_appends_finished_track_before_popping() {
        let mut queue = queue_with(&["a", "b"]);
        queue.toggle_repeat();

        queue.advance();
        assert_eq!(queue.advance().unwrap().title(), "b");
        assert_eq!(titles(&queue.peek(10)), vec!["a"]);
    }

    #[test]
    fn test_loop_candidate_yields_to_repeat() {
        let mut queue = queue_with(&["a"]);
        queue.advance();
        assert!(queue.loop_candidate().is_none());

        queue.toggle_loop();
        assert_eq!(queue.loop_candidate().unwrap().title(), "a");

        queue.toggle_repeat();
        assert!(queue.loop_candidate().is_none());
    }

    #[test]
    fn test_discarded_track_is_not_repeated() {
        let mut queue = queue_with(&["a", "b"]);
        queue.toggle_repeat();
        queue.advance();
        queue.discard_current();

        assert_eq!(queue.advance().unwrap().title(), "b");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_shuffle_keeps_multiset_and_current() {
        let mut queue = queue_with(&["a", "b", "c", "d", "e", "f"]);
        queue.advance();

        let mut rng = StdRng::seed_from_u64(7);
        queue.shuffle_with(&mut rng);

        assert_eq!(queue.current().unwrap().title(), "a");
        let mut shuffled = titles(&queue.peek(10));
        shuffled.sort();
        assert_eq!(shuffled, vec!["b", "c", "d", "e", "f"]);
    }

    #[test]
    fn test_clear_keeps_modes() {
        let mut queue = queue_with(&["a", "b"]);
        queue.advance();
        queue.toggle_loop();
        queue.clear();

        assert!(queue.current().is_none());
        assert!(queue.is_empty());
        assert!(queue.loop_queue());
    }

    #[test]
    fn test_clear_pending_keeps_current() {
        let mut queue = queue_with(&["a", "b", "c"]);
        queue.advance();

        assert_eq!(queue.clear_pending(), 2);
        assert_eq!(queue.current().unwrap().title(), "a");
    }

    #[test]
    fn test_queue_full() {
        let mut queue = SessionQueue::new(2);
        queue.enqueue(track("a")).unwrap();
        queue.enqueue(track("b")).unwrap();

        assert_eq!(queue.enqueue(track("c")), Err(StateError::QueueFull(2)));
        assert_eq!(queue.enqueue_many(vec![track("d")]), 0);
    }

    #[test]
    fn test_snapshot_limits_upcoming() {
        let mut queue = queue_with(&["a", "b", "c", "d"]);
        queue.advance();

        let snapshot = queue.snapshot(2);
        assert_eq!(snapshot.current.unwrap().track.title(), "a");
        assert_eq!(titles(&snapshot.upcoming), vec!["b", "c"]);
        assert_eq!(snapshot.total_pending, 3);
    }
}
