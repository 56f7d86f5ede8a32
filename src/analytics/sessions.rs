use crate::core::error::PromptgenError;
use crate::storage::LocalStore;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use uuid::Uuid;

pub const SESSIONS_KEY: &str = "user_sessions";
const SESSION_CAPACITY: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    pub fn open(started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at,
            ended_at: None,
        }
    }

    pub fn closed(started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> Self {
        Self {
            ended_at: Some(ended_at),
            ..Self::open(started_at)
        }
    }

    /// `None` while the session is still open.
    pub fn duration(&self) -> Option<Duration> {
        self.ended_at.map(|end| end - self.started_at)
    }
}

/// Session timings, persisted under `user_sessions`.
pub struct SessionTracker {
    store: LocalStore,
    sessions: VecDeque<SessionRecord>,
}

impl SessionTracker {
    pub fn open(store: LocalStore) -> Self {
        let sessions: VecDeque<SessionRecord> = store
            .get::<Vec<SessionRecord>>(SESSIONS_KEY)
            .unwrap_or_default()
            .into();
        Self { store, sessions }
    }

    pub fn start(&mut self) -> Result<Uuid, PromptgenError> {
        let record = SessionRecord::open(Utc::now());
        let id = record.id;
        self.sessions.push_back(record);
        while self.sessions.len() > SESSION_CAPACITY {
            self.sessions.pop_front();
        }
        self.store.set(SESSIONS_KEY, &self.sessions)?;
        Ok(id)
    }

    /// Closing an unknown or already closed session is a no-op.
    pub fn end(&mut self, id: Uuid) -> Result<(), PromptgenError> {
        match self
            .sessions
            .iter_mut()
            .find(|s| s.id == id && s.ended_at.is_none())
        {
            Some(session) => {
                session.ended_at = Some(Utc::now());
                self.store.set(SESSIONS_KEY, &self.sessions)
            }
            None => Ok(()),
        }
    }

    pub fn sessions(&self) -> Vec<SessionRecord> {
        self.sessions.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn start_and_end_are_persisted() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        let mut tracker = SessionTracker::open(store.clone());

        let id = tracker.start().unwrap();
        tracker.end(id).unwrap();

        let reopened = SessionTracker::open(store);
        let sessions = reopened.sessions();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, id);
        assert!(sessions[0].duration().is_some());
    }

    #[test]
    fn ending_twice_keeps_first_end_time() {
        let dir = tempdir().unwrap();
        let mut tracker = SessionTracker::open(LocalStore::new(dir.path()));
        let id = tracker.start().unwrap();
        tracker.end(id).unwrap();
        let first_end = tracker.sessions()[0].ended_at;

        tracker.end(id).unwrap();
        tracker.end(Uuid::new_v4()).unwrap();

        assert_eq!(tracker.sessions()[0].ended_at, first_end);
    }

    #[test]
    fn old_sessions_are_dropped_past_capacity() {
        let dir = tempdir().unwrap();
        let mut tracker = SessionTracker::open(LocalStore::new(dir.path()));
        let first = tracker.start().unwrap();
        for _ in 0..SESSION_CAPACITY {
            tracker.start().unwrap();
        }

        let sessions = tracker.sessions();
        assert_eq!(sessions.len(), SESSION_CAPACITY);
        assert!(sessions.iter().all(|s| s.id != first));
    }
}
