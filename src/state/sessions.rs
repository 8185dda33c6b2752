use std::time::{Duration, Instant};

use dashmap::DashMap;
use uuid::Uuid;

/// Authenticated login kept until logout or expiry.
#[derive(Debug, Clone)]
struct Session {
    username: String,
    issued_at: Instant,
}

/// In-memory session table correlating opaque tokens with usernames.
pub struct SessionStore {
    sessions: DashMap<String, Session>,
    ttl: Duration,
}

impl SessionStore {
    /// Create an empty store whose sessions expire after `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    /// Issue a fresh token for `username`.
    pub fn open(&self, username: &str) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.sessions.insert(
            token.clone(),
            Session {
                username: username.to_owned(),
                issued_at: Instant::now(),
            },
        );
        token
    }

    /// Username behind `token`, dropping the session if it expired.
    pub fn resolve(&self, token: &str) -> Option<String> {
        let username = {
            let session = self.sessions.get(token)?;
            (session.issued_at.elapsed() <= self.ttl).then(|| session.username.clone())
        };
        if username.is_none() {
            self.sessions.remove(token);
        }
        username
    }

    /// Forget `token`. Returns whether a session existed.
    pub fn close(&self, token: &str) -> bool {
        self.sessions.remove(token).is_some()
    }

    /// Session lifetime.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
