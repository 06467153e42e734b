//! Session identity
//!
//! Hosts hand us a [`SessionId`] per terminal. Notifications travel with a
//! [`SessionToken`] instead: an opaque random id that survives a round
//! trip through a desktop notifier or a deep link and maps back to the
//! session when the user clicks.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Host-side handle for a live terminal session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Allocate a process-unique id
    pub fn next() -> Self {
        Self(NEXT_SESSION.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque session token carried through notifications
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Mint a fresh random (UUID v4) token
    pub fn mint() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for SessionToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Default)]
struct Maps {
    tokens: HashMap<SessionId, SessionToken>,
    sessions: HashMap<SessionToken, SessionId>,
}

/// Bidirectional session <-> token map.
///
/// Every operation takes the lock once, so a lookup-or-insert from one
/// session's task can never race another's.
#[derive(Default)]
pub struct SessionRegistry {
    maps: Mutex<Maps>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Maps> {
        self.maps.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Token for `session`, minted on first use and stable afterwards
    pub fn resolve_token(&self, session: SessionId) -> SessionToken {
        let mut maps = self.lock();
        if let Some(token) = maps.tokens.get(&session) {
            return token.clone();
        }
        let token = SessionToken::mint();
        maps.tokens.insert(session, token.clone());
        maps.sessions.insert(token.clone(), session);
        token
    }

    /// Session a token was minted for, if it is still registered
    pub fn resolve_session(&self, token: &SessionToken) -> Option<SessionId> {
        self.lock().sessions.get(token).copied()
    }

    /// Forget a closed session. Later lookups of its token miss.
    pub fn remove(&self, session: SessionId) -> Option<SessionToken> {
        let mut maps = self.lock();
        let token = maps.tokens.remove(&session)?;
        maps.sessions.remove(&token);
        Some(token)
    }

    pub fn clear(&self) {
        let mut maps = self.lock();
        maps.tokens.clear();
        maps.sessions.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().tokens.len()
    }
}
