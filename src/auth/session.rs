use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand::distr::Alphanumeric;
use tokio::sync::Mutex;
use tracing::{info, instrument};

use crate::models::Request;

use super::Identity;

const TOKEN_LENGTH: usize = 48;

/// Per-login state: the identity plus the batch of requests not yet
/// submitted. Lives only in memory.
#[derive(Debug, Clone)]
pub struct Session {
    pub identity: Identity,
    pub batch: Vec<Request>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_valid(&self) -> bool {
        self.expires_at > Utc::now()
    }
}

pub struct SessionStore {
    ttl: Duration,
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn generate_token() -> String {
        rand::rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LENGTH)
            .map(char::from)
            .collect()
    }

    #[instrument(skip_all, fields(ps_number = %identity.ps_number))]
    pub async fn create(&self, identity: Identity) -> String {
        let token = Self::generate_token();
        let session = Session {
            identity,
            batch: Vec::new(),
            expires_at: Utc::now() + self.ttl,
        };

        self.sessions.lock().await.insert(token.clone(), session);
        info!("Created session");

        token
    }

    /// Returns the identity for a live session. Expired sessions are dropped.
    pub async fn identity(&self, token: &str) -> Option<Identity> {
        let mut sessions = self.sessions.lock().await;

        match sessions.get(token) {
            Some(session) if session.is_valid() => Some(session.identity.clone()),
            Some(_) => {
                sessions.remove(token);
                None
            }
            None => None,
        }
    }

    /// Runs `f` against the session's batch. `None` when the session is gone.
    pub async fn with_batch<R>(
        &self,
        token: &str,
        f: impl FnOnce(&mut Vec<Request>) -> R,
    ) -> Option<R> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .get_mut(token)
            .filter(|session| session.is_valid())
            .map(|session| f(&mut session.batch))
    }

    pub async fn invalidate(&self, token: &str) -> bool {
        self.sessions.lock().await.remove(token).is_some()
    }

    #[instrument(skip(self))]
    pub async fn purge_expired(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, session| session.is_valid());
        let purged = before - sessions.len();

        if purged > 0 {
            info!("Purged {} expired sessions", purged);
        }

        purged
    }

    #[cfg(test)]
    pub async fn insert_for_test(&self, token: &str, session: Session) {
        self.sessions.lock().await.insert(token.to_string(), session);
    }
}
