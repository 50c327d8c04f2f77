use chrono::{DateTime, Utc};
use classroom_system::uuid::Uuid;
use classroom_system::{Course, SessionId, User};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Binds a connected user to the course they are engaged in.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub user: User,
    pub course: Course,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(user: User, course: Course) -> Self {
        Self {
            id: Uuid::new_v4(),
            user,
            course,
            start_time: Utc::now(),
            end_time: None,
        }
    }
}

/// Active sessions only; ended sessions are not retained.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Session>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn create(&self, user: User, course: Course) -> SessionId {
        let session = Session::new(user, course);
        let session_id = session.id;
        log::info!(
            "Created session {} for user {} on course {}",
            session_id,
            session.user.id,
            session.course.id
        );
        self.sessions.write().await.insert(session_id, session);
        session_id
    }

    pub async fn get(&self, session_id: &SessionId) -> Option<Session> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Removes the session and returns it with its end time set.
    pub async fn end(&self, session_id: &SessionId) -> Option<Session> {
        let mut session = self.sessions.write().await.remove(session_id)?;
        session.end_time = Some(Utc::now());
        log::info!(
            "Ended session {} for user {} on course {}",
            session.id,
            session.user.id,
            session.course.id
        );
        Some(session)
    }

    pub async fn list(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.sessions.read().await.values().cloned().collect();
        sessions.sort_by_key(|s| s.start_time);
        sessions
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
