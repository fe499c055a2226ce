//! Process-wide session table: access token -> signed-in user.
//!
//! Sign-in and sign-out are broadcast so open WebSocket connections can follow
//! the auth state of their user without polling. Entries expire with the
//! provider's token lifetime; expired entries are evicted on lookup and pruned
//! whenever a new session is stored.

use std::{
  collections::HashMap,
  sync::Arc,
  time::{Duration, Instant},
};

use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info};

use crate::identity::SessionUser;

const EVENT_CAPACITY: usize = 64;

/// Lifetime of a session whose expiry the provider did not report.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(3600);

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    SignedIn { user: SessionUser },
    SignedOut {
        #[serde(rename = "userId")]
        user_id: String,
    },
}

impl SessionEvent {
    pub fn user_id(&self) -> &str {
        match self {
            SessionEvent::SignedIn { user } => &user.id,
            SessionEvent::SignedOut { user_id } => user_id,
        }
    }
}

struct Entry {
    user: SessionUser,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, Entry>>>,
    events: broadcast::Sender<SessionEvent>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { sessions: Arc::new(RwLock::new(HashMap::new())), events }
    }

    pub async fn sign_in(&self, access_token: &str, user: SessionUser, ttl: Duration) {
        self.remember(access_token, user.clone(), ttl).await;
        info!(target: "session", user_id = %user.id, ttl_secs = ttl.as_secs(), "Signed in");
        // No subscribers is fine.
        let _ = self.events.send(SessionEvent::SignedIn { user });
    }

    /// Store a session recovered from the provider without announcing it.
    pub async fn remember(&self, access_token: &str, user: SessionUser, ttl: Duration) {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| entry.is_live(now));
        if sessions.len() < before {
            debug!(target: "session", pruned = before - sessions.len(), "Pruned expired sessions");
        }
        sessions.insert(access_token.to_string(), Entry { user, expires_at: now + ttl });
    }

    /// Drop the session for `access_token`. Returns the user it belonged to.
    pub async fn sign_out(&self, access_token: &str) -> Option<SessionUser> {
        let removed = self.sessions.write().await.remove(access_token).map(|entry| entry.user);
        match &removed {
            Some(user) => {
                info!(target: "session", user_id = %user.id, "Signed out");
                let _ = self.events.send(SessionEvent::SignedOut { user_id: user.id.clone() });
            }
            None => debug!(target: "session", "Sign-out for unknown token"),
        }
        removed
    }

    /// The user behind a live session. An expired entry is evicted and reads as absent.
    pub async fn current(&self, access_token: &str) -> Option<SessionUser> {
        let now = Instant::now();
        {
            let sessions = self.sessions.read().await;
            match sessions.get(access_token) {
                None => return None,
                Some(entry) if entry.is_live(now) => return Some(entry.user.clone()),
                Some(_) => {}
            }
        }
        let mut sessions = self.sessions.write().await;
        if sessions.get(access_token).is_some_and(|entry| !entry.is_live(now)) {
            if let Some(entry) = sessions.remove(access_token) {
                info!(target: "session", user_id = %entry.user.id, "Session expired");
            }
        }
        None
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn stored(store: &SessionStore) -> usize {
        store.sessions.read().await.len()
    }

    fn user(id: &str) -> SessionUser {
        SessionUser { id: id.into(), email: format!("{id}@example.com"), display_name: id.into() }
    }

    #[tokio::test]
    async fn sign_in_then_out_broadcasts_both() {
        let store = SessionStore::new();
        let mut rx = store.subscribe();

        store.sign_in("tok", user("u1"), DEFAULT_SESSION_TTL).await;
        assert_eq!(store.current("tok").await, Some(user("u1")));
        assert_eq!(rx.recv().await.unwrap(), SessionEvent::SignedIn { user: user("u1") });

        assert_eq!(store.sign_out("tok").await, Some(user("u1")));
        assert_eq!(store.current("tok").await, None);
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.user_id(), "u1");
        assert!(matches!(ev, SessionEvent::SignedOut { .. }));
    }

    #[tokio::test]
    async fn unknown_token_sign_out_is_quiet() {
        let store = SessionStore::new();
        let mut rx = store.subscribe();
        assert_eq!(store.sign_out("nope").await, None);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn expired_session_is_evicted() {
        let store = SessionStore::new();
        store.remember("old", user("u1"), Duration::ZERO).await;
        assert_eq!(stored(&store).await, 1);
        assert_eq!(store.current("old").await, None);
        assert_eq!(stored(&store).await, 0);
    }

    #[tokio::test]
    async fn storing_a_session_prunes_expired_ones() {
        let store = SessionStore::new();
        store.remember("a", user("u1"), Duration::ZERO).await;
        store.remember("b", user("u2"), Duration::ZERO).await;
        store.sign_in("c", user("u3"), DEFAULT_SESSION_TTL).await;
        assert_eq!(stored(&store).await, 1);
        assert_eq!(store.current("c").await, Some(user("u3")));
    }

    #[test]
    fn events_serialize_with_tag() {
        let v = serde_json::to_value(SessionEvent::SignedOut { user_id: "u1".into() }).unwrap();
        assert_eq!(v, serde_json::json!({"event": "signed_out", "userId": "u1"}));
    }
}
