//! Session directory: metadata about known sessions.
//!
//! The directory is bookkeeping for listing and deleting sessions. Turn
//! processing never consults it.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parlance_core::SessionId;
use rootcause::Report;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

const TITLE_CHARS: usize = 40;

/// Directory entry for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Session identifier.
    pub id: SessionId,
    /// Display title.
    pub title: String,
    /// When the session was registered.
    pub created_at: DateTime<Utc>,
    /// Last recorded activity.
    pub last_active: DateTime<Utc>,
}

/// Derives a session title.
///
/// An explicit title wins; otherwise the first 40 characters of the first
/// message followed by `...`; otherwise a timestamped default.
#[must_use]
pub fn session_title(title: Option<&str>, first_message: Option<&str>) -> String {
    if let Some(title) = title.map(str::trim).filter(|t| !t.is_empty()) {
        return title.to_string();
    }
    if let Some(first) = first_message.map(str::trim).filter(|m| !m.is_empty()) {
        let head: String = first.chars().take(TITLE_CHARS).collect();
        return format!("{head}...");
    }
    format!("Chat at {}", Utc::now().format("%H:%M:%S"))
}

/// Registry of known sessions.
#[async_trait]
pub trait SessionDirectory: Send + Sync {
    /// Records a session. Registering a known session keeps its entry.
    async fn register(
        &self,
        session_id: SessionId,
        title: String,
    ) -> Result<SessionInfo, Report<StoreError>>;

    /// Marks activity on a session. Unknown sessions are ignored.
    async fn touch(&self, session_id: &SessionId) -> Result<(), Report<StoreError>>;

    /// Forgets a session. Returns whether it was known.
    async fn remove(&self, session_id: &SessionId) -> Result<bool, Report<StoreError>>;

    /// Forgets every session. Returns how many were removed.
    async fn clear(&self) -> Result<usize, Report<StoreError>>;

    /// Lists sessions, most recently active first.
    async fn list(&self) -> Result<Vec<SessionInfo>, Report<StoreError>>;
}

/// In-process session directory.
#[derive(Debug, Default)]
pub struct InMemorySessionDirectory {
    sessions: RwLock<HashMap<SessionId, SessionInfo>>,
}

impl InMemorySessionDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionDirectory for InMemorySessionDirectory {
    async fn register(
        &self,
        session_id: SessionId,
        title: String,
    ) -> Result<SessionInfo, Report<StoreError>> {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let info = sessions
            .entry(session_id.clone())
            .or_insert_with(|| SessionInfo {
                id: session_id,
                title,
                created_at: now,
                last_active: now,
            });
        Ok(info.clone())
    }

    async fn touch(&self, session_id: &SessionId) -> Result<(), Report<StoreError>> {
        if let Some(info) = self.sessions.write().await.get_mut(session_id) {
            info.last_active = Utc::now();
        }
        Ok(())
    }

    async fn remove(&self, session_id: &SessionId) -> Result<bool, Report<StoreError>> {
        Ok(self.sessions.write().await.remove(session_id).is_some())
    }

    async fn clear(&self) -> Result<usize, Report<StoreError>> {
        let mut sessions = self.sessions.write().await;
        let count = sessions.len();
        sessions.clear();
        Ok(count)
    }

    async fn list(&self) -> Result<Vec<SessionInfo>, Report<StoreError>> {
        let mut sessions: Vec<SessionInfo> = self.sessions.read().await.values().cloned().collect();
        sessions.sort_by(|a, b| b.last_active.cmp(&a.last_active));
        Ok(sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> SessionId {
        s.parse().expect("id")
    }

    #[test]
    fn titles() {
        assert_eq!(session_title(Some("Plans"), Some("ignored")), "Plans");
        assert_eq!(session_title(None, Some("  short  ")), "short...");
        let long = "x".repeat(60);
        assert_eq!(session_title(None, Some(&long)), format!("{}...", "x".repeat(40)));
        assert!(session_title(Some(" "), None).starts_with("Chat at "));
    }

    #[tokio::test]
    async fn register_is_idempotent_and_list_is_by_activity() {
        let directory = InMemorySessionDirectory::new();
        directory
            .register(id("a"), "A".to_string())
            .await
            .expect("register");
        directory
            .register(id("b"), "B".to_string())
            .await
            .expect("register");
        let again = directory
            .register(id("a"), "renamed".to_string())
            .await
            .expect("register");
        assert_eq!(again.title, "A");

        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        directory.touch(&id("a")).await.expect("touch");

        let listed = directory.list().await.expect("list");
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, id("a"));
    }

    #[tokio::test]
    async fn remove_and_clear() {
        let directory = InMemorySessionDirectory::new();
        directory
            .register(id("a"), "A".to_string())
            .await
            .expect("register");
        directory
            .register(id("b"), "B".to_string())
            .await
            .expect("register");

        assert!(directory.remove(&id("a")).await.expect("remove"));
        assert!(!directory.remove(&id("a")).await.expect("remove"));
        assert_eq!(directory.clear().await.expect("clear"), 1);
        assert!(directory.list().await.expect("list").is_empty());
    }
}
