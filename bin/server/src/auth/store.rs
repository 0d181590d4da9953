//! In-memory session storage keyed by session id.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use groupgate_access::{Session, SessionId};
use tokio::sync::RwLock;

struct StoredSession {
    session: Session,
    expires_at: DateTime<Utc>,
}

impl StoredSession {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Shared store for server-side sessions.
///
/// Each entry carries an absolute expiry set at creation; expired entries
/// are invisible to lookups and removed by [`SessionStore::delete_expired`].
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<SessionId, StoredSession>>>,
}

impl SessionStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a session under a new id and returns the id.
    ///
    /// A lifetime reaching past the representable range never expires.
    pub async fn create(&self, session: Session, lifetime: Duration) -> SessionId {
        let id = generate_session_id();
        let expires_at = Utc::now()
            .checked_add_signed(lifetime)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let stored = StoredSession {
            session,
            expires_at,
        };
        self.sessions.write().await.insert(id.clone(), stored);
        id
    }

    /// Finds a session by id, ignoring expired entries.
    pub async fn find_by_id(&self, id: &SessionId) -> Option<Session> {
        let sessions = self.sessions.read().await;
        sessions
            .get(id)
            .filter(|stored| !stored.is_expired(Utc::now()))
            .map(|stored| stored.session.clone())
    }

    /// Applies `f` to a live session in place.
    ///
    /// Returns `None` if no live session has this id.
    pub async fn update<F, R>(&self, id: &SessionId, f: F) -> Option<R>
    where
        F: FnOnce(&mut Session) -> R,
    {
        let mut sessions = self.sessions.write().await;
        let stored = sessions
            .get_mut(id)
            .filter(|stored| !stored.is_expired(Utc::now()))?;
        Some(f(&mut stored.session))
    }

    /// Deletes a session by id (logout).
    pub async fn delete(&self, id: &SessionId) {
        self.sessions.write().await.remove(id);
    }

    /// Deletes expired sessions and returns how many were removed.
    pub async fn delete_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, stored| !stored.is_expired(now));
        before - sessions.len()
    }
}

/// Generates a unique session ID using ULID.
pub fn generate_session_id() -> SessionId {
    SessionId::new(ulid::Ulid::new().to_string())
}
