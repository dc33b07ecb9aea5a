//! Registry of open channel sessions.

use dashmap::DashMap;
use uuid::Uuid;

use super::controller::{spawn_session, SessionContext, SessionHandle, SessionSnapshot};
use crate::error::{SessionError, SessionResult};
use crate::source::ChannelLocator;

/// Opens, tracks and closes sessions, keyed by a generated UUID.
pub struct SessionManager {
    sessions: DashMap<String, SessionHandle>,
    context: SessionContext,
    max_sessions: usize,
}

impl SessionManager {
    pub fn new(context: SessionContext, max_sessions: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            context,
            max_sessions,
        }
    }

    /// Opens a session for `match_id` and starts playing `start_index`.
    ///
    /// Sessions whose task already exited are pruned before the limit is
    /// checked.
    pub fn open(
        &self,
        match_id: &str,
        channels: Vec<ChannelLocator>,
        start_index: usize,
    ) -> SessionResult<SessionHandle> {
        self.sessions.retain(|_, handle| !handle.is_closed());
        if self.sessions.len() >= self.max_sessions {
            return Err(SessionError::LimitReached(self.max_sessions));
        }

        let id = Uuid::new_v4().to_string();
        let handle = spawn_session(id.clone(), match_id, channels, start_index, &self.context)?;
        self.sessions.insert(id, handle.clone());
        Ok(handle)
    }

    /// Returns the handle for `id`.
    pub fn get(&self, id: &str) -> SessionResult<SessionHandle> {
        self.sessions
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    /// Closes and forgets the session `id`.
    pub async fn close(&self, id: &str) -> SessionResult<()> {
        let (_, handle) = self
            .sessions
            .remove(id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        match handle.close().await {
            Ok(()) | Err(SessionError::Closed) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Closes every session. Returns how many were open.
    pub async fn close_all(&self) -> usize {
        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        let mut closed = 0;
        for id in ids {
            if self.close(&id).await.is_ok() {
                closed += 1;
            }
        }
        closed
    }

    /// Snapshots of every open session.
    pub fn snapshots(&self) -> Vec<SessionSnapshot> {
        self.sessions
            .iter()
            .map(|entry| entry.value().snapshot())
            .collect()
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
    use std::sync::Arc;
    use std::time::Duration;

    use crate::playback::test_fixtures::{Outcome, RecordingEmitter, ScriptedEngine};
    use crate::playback::RenderEngine;
    use crate::runtime::TokioSpawner;
    use crate::source::SourceResolver;
    use crate::state::RetryPolicy;

    fn manager(max_sessions: usize) -> SessionManager {
        let engine = Arc::new(ScriptedEngine::new(Outcome::Play));
        let context = SessionContext {
            resolver: SourceResolver::default(),
            policy: RetryPolicy::default(),
            settle_delay: Duration::from_millis(2000),
            engine_factory: Arc::new(move || engine.clone() as Arc<dyn RenderEngine>),
            emitter: Arc::new(RecordingEmitter::default()),
            spawner: TokioSpawner::current(),
        };
        SessionManager::new(context, max_sessions)
    }

    fn channels() -> Vec<ChannelLocator> {
        vec![ChannelLocator::new(0, "A", "https://a/live.m3u8")]
    }

    #[tokio::test]
    async fn open_get_close_roundtrip() {
        let manager = manager(4);
        let handle = manager.open("match-1", channels(), 0).unwrap();

        let fetched = manager.get(handle.id()).unwrap();
        assert_eq!(fetched.match_id(), "match-1");
        assert_eq!(manager.snapshots().len(), 1);

        manager.close(handle.id()).await.unwrap();
        assert!(manager.is_empty());
        assert_eq!(
            manager.get(handle.id()).err(),
            Some(SessionError::NotFound(handle.id().to_string()))
        );
        assert!(handle.snapshot().closed);
    }

    #[tokio::test]
    async fn limit_is_enforced() {
        let manager = manager(1);
        manager.open("m", channels(), 0).unwrap();
        assert_eq!(
            manager.open("m", channels(), 0).err(),
            Some(SessionError::LimitReached(1))
        );
    }

    #[tokio::test]
    async fn close_all_closes_everything() {
        let manager = manager(4);
        let a = manager.open("m", channels(), 0).unwrap();
        let b = manager.open("m", channels(), 0).unwrap();

        assert_eq!(manager.close_all().await, 2);
        assert!(manager.is_empty());
        assert!(a.snapshot().closed);
        assert!(b.snapshot().closed);
    }

    #[tokio::test]
    async fn closing_unknown_session_is_not_found() {
        let manager = manager(4);
        assert_eq!(
            manager.close("nope").await,
            Err(SessionError::NotFound("nope".into()))
        );
    }
}
