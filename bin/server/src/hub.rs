//! Live session actors, keyed by session id.
//!
//! Actors are spawned lazily on first access and dropped on delete. The
//! session directory is kept in step for listing.

use crate::error::ApiError;
use parlance_conversation::{
    ConversationOrchestrator, SessionActor, SessionDirectory, SessionInfo, StoreError, TurnError,
};
use parlance_core::SessionId;
use rootcause::Report;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Owns one actor handle per live session.
pub struct SessionHub {
    orchestrator: Arc<ConversationOrchestrator>,
    directory: Arc<dyn SessionDirectory>,
    actors: RwLock<HashMap<SessionId, SessionActor>>,
}

impl SessionHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new(
        orchestrator: Arc<ConversationOrchestrator>,
        directory: Arc<dyn SessionDirectory>,
    ) -> Self {
        Self {
            orchestrator,
            directory,
            actors: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the actor for a session, spawning it if needed.
    pub async fn actor(&self, session_id: &SessionId) -> SessionActor {
        if let Some(actor) = self.actors.read().await.get(session_id) {
            return actor.clone();
        }
        let mut actors = self.actors.write().await;
        actors
            .entry(session_id.clone())
            .or_insert_with(|| {
                debug!(session_id = %session_id, "spawning session actor");
                SessionActor::spawn(session_id.clone(), self.orchestrator.clone())
            })
            .clone()
    }

    /// Records a session in the directory. Known sessions keep their entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory fails.
    pub async fn register(
        &self,
        session_id: SessionId,
        title: String,
    ) -> Result<SessionInfo, Report<StoreError>> {
        self.directory.register(session_id, title).await
    }

    /// Marks activity on a session. Directory failures are only logged.
    pub async fn touch(&self, session_id: &SessionId) {
        if let Err(e) = self.directory.touch(session_id).await {
            warn!(session_id = %session_id, error = %e, "failed to record session activity");
        }
    }

    /// Lists known sessions, most recently active first.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory fails.
    pub async fn list(&self) -> Result<Vec<SessionInfo>, Report<StoreError>> {
        self.directory.list().await
    }

    /// Drops a session's actor and directory entry. Returns whether the
    /// session was known to either.
    ///
    /// The write lock is held across the busy check, so no new handle can be
    /// handed out in between.
    ///
    /// # Errors
    ///
    /// Returns `TurnInProgress` while the session's turn runs, or a store
    /// error if the directory fails.
    pub async fn remove(&self, session_id: &SessionId) -> Result<bool, ApiError> {
        let mut actors = self.actors.write().await;
        if let Some(actor) = actors.get(session_id) {
            // A closed actor has nothing in flight.
            if actor.get_state().await.is_ok_and(|state| state.is_processing) {
                return Err(ApiError::Turn(TurnError::TurnInProgress {
                    session_id: session_id.clone(),
                }));
            }
        }
        let had_actor = actors.remove(session_id).is_some();
        drop(actors);

        let had_entry = self.directory.remove(session_id).await?;
        debug!(session_id = %session_id, had_actor, had_entry, "session removed");
        Ok(had_actor || had_entry)
    }

    /// Drops every session. Returns how many directory entries were removed.
    ///
    /// Turns already running still finish and commit on their dropped actors,
    /// so their replies reach the chat log but no live session.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory fails.
    pub async fn clear(&self) -> Result<usize, Report<StoreError>> {
        self.actors.write().await.clear();
        self.directory.clear().await
    }

    /// Number of live actors.
    pub async fn live_sessions(&self) -> usize {
        self.actors.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{EchoClient, GatedClient, orchestrator};
    use parlance_conversation::InMemorySessionDirectory;

    fn hub() -> SessionHub {
        SessionHub::new(
            orchestrator(Arc::new(EchoClient)),
            Arc::new(InMemorySessionDirectory::new()),
        )
    }

    #[tokio::test]
    async fn actors_are_created_once_per_session() {
        let hub = hub();
        let id: SessionId = "s1".parse().expect("id");

        let first = hub.actor(&id).await;
        first.process_turn("hello", None).await.expect("turn");
        let second = hub.actor(&id).await;

        assert_eq!(hub.live_sessions().await, 1);
        let state = second.get_state().await.expect("state");
        assert_eq!(state.messages.len(), 2);
    }

    #[tokio::test]
    async fn remove_drops_actor_and_entry() {
        let hub = hub();
        let id: SessionId = "s1".parse().expect("id");
        hub.actor(&id).await;
        hub.register(id.clone(), "Title".to_string())
            .await
            .expect("register");

        assert!(hub.remove(&id).await.expect("remove"));
        assert!(!hub.remove(&id).await.expect("remove"));
        assert_eq!(hub.live_sessions().await, 0);
        assert!(hub.list().await.expect("list").is_empty());
    }

    #[tokio::test]
    async fn removed_session_starts_fresh() {
        let hub = hub();
        let id: SessionId = "s1".parse().expect("id");
        hub.actor(&id)
            .await
            .process_turn("hello", None)
            .await
            .expect("turn");
        hub.remove(&id).await.expect("remove");

        let state = hub.actor(&id).await.get_state().await.expect("state");
        assert!(state.messages.is_empty());
    }

    #[tokio::test]
    async fn remove_refuses_while_a_turn_runs() {
        let client = Arc::new(GatedClient::new());
        let gate = client.gate.clone();
        let hub = SessionHub::new(
            orchestrator(client),
            Arc::new(InMemorySessionDirectory::new()),
        );
        let id: SessionId = "s1".parse().expect("id");

        let ticket = hub
            .actor(&id)
            .await
            .start_turn("hello", None, None)
            .await
            .expect("accepted");

        let err = hub.remove(&id).await.unwrap_err();
        assert!(matches!(err, ApiError::Turn(TurnError::TurnInProgress { .. })));
        assert_eq!(err.status(), axum::http::StatusCode::CONFLICT);
        assert_eq!(hub.live_sessions().await, 1);

        gate.add_permits(1);
        let reply = ticket.wait().await.expect("turn");
        assert_eq!(reply.content, "echo: hello");

        assert!(hub.remove(&id).await.expect("remove"));
        let state = hub.actor(&id).await.get_state().await.expect("state");
        assert!(state.messages.is_empty());
    }
}
