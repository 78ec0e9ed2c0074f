use dashmap::{mapref::entry::Entry, DashMap};
use serenity::model::id::GuildId;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use super::{
    backend::AudioBackend,
    player::{SessionEvent, SessionHandle, SessionSettings},
};
use crate::sources::TrackResolver;

/// Sesiones de voz activas, una por guild
pub struct SessionRegistry {
    sessions: DashMap<GuildId, SessionHandle>,
    resolver: Arc<dyn TrackResolver>,
    settings: SessionSettings,
}

impl SessionRegistry {
    pub fn new(resolver: Arc<dyn TrackResolver>, settings: SessionSettings) -> Self {
        Self {
            sessions: DashMap::new(),
            resolver,
            settings,
        }
    }

    /// Devuelve la sesión del guild o la crea con el backend que entrega `connect`.
    ///
    /// El receptor de notificaciones solo se entrega cuando la sesión es nueva.
    pub fn get_or_create<B, F>(
        &self,
        guild_id: GuildId,
        connect: F,
    ) -> (SessionHandle, Option<UnboundedReceiver<SessionEvent>>)
    where
        B: AudioBackend,
        F: FnOnce() -> B,
    {
        match self.sessions.entry(guild_id) {
            Entry::Occupied(entry) => (entry.get().clone(), None),
            Entry::Vacant(entry) => {
                let (handle, events) = SessionHandle::spawn(
                    guild_id,
                    connect(),
                    Arc::clone(&self.resolver),
                    self.settings,
                );
                entry.insert(handle.clone());
                info!("🆕 Sesión creada para guild {}", guild_id);
                (handle, Some(events))
            }
        }
    }

    pub fn get(&self, guild_id: GuildId) -> Option<SessionHandle> {
        self.sessions.get(&guild_id).map(|entry| entry.clone())
    }

    /// Cierra la sesión: detiene el audio, cancela drenados y termina el actor
    pub async fn remove(&self, guild_id: GuildId) -> bool {
        let Some((_, handle)) = self.sessions.remove(&guild_id) else {
            return false;
        };

        if let Err(e) = handle.shutdown().await {
            warn!("⚠️ La sesión de guild {} ya estaba cerrada: {}", guild_id, e);
        }

        info!("🗑️ Sesión eliminada para guild {}", guild_id);
        true
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::{BotError, StateError},
        testing::{FakeBackend, FakeResolver},
    };
    use serenity::model::id::UserId;

    fn registry() -> SessionRegistry {
        SessionRegistry::new(Arc::new(FakeResolver::default()), SessionSettings::default())
    }

    #[tokio::test]
    async fn test_get_or_create_reuses_session() {
        let registry = registry();
        let guild = GuildId::new(7);

        let (first, events) = registry.get_or_create(guild, FakeBackend::default);
        assert!(events.is_some());

        let (second, events) = registry.get_or_create(guild, || -> FakeBackend {
            panic!("no debería crear otro backend")
        });
        assert!(events.is_none());
        assert_eq!(first.guild_id(), second.guild_id());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let registry = registry();
        let (a, _) = registry.get_or_create(GuildId::new(1), FakeBackend::default);
        let (b, _) = registry.get_or_create(GuildId::new(2), FakeBackend::default);

        a.play("uno", UserId::new(1)).await.unwrap();
        assert!(b.snapshot(10).await.unwrap().is_empty());
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_remove_shuts_session_down() {
        let registry = registry();
        let guild = GuildId::new(3);
        let (handle, _) = registry.get_or_create(guild, FakeBackend::default);

        assert!(registry.remove(guild).await);
        assert!(registry.get(guild).is_none());
        assert!(registry.is_empty());
        assert!(!registry.remove(guild).await);

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(
            handle.snapshot(10).await.unwrap_err(),
            BotError::State(StateError::SessionClosed)
        );
    }
}
