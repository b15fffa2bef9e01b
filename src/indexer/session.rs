//! Session state owned by one indexer instance.
//!
//! ```text
//! NoSession -> Authenticating -> Valid -> (Invalidated | Expired) -> Authenticating -> ...
//! ```
//!
//! The store is guarded by an async mutex. Holding a [`SessionGuard`] across a
//! login transaction makes concurrent searches against the same indexer wait for
//! that login instead of starting their own.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NoSession,
    Authenticating,
    Valid,
    Invalidated,
    Expired,
}

/// Cookies and tokens obtained by a login
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub cookies: BTreeMap<String, String>,
    pub token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new(cookies: BTreeMap<String, String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            cookies,
            token: None,
            expires_at,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    /// Overlay cookies refreshed by a later response
    pub fn merge_cookies(&mut self, cookies: &BTreeMap<String, String>) {
        for (name, value) in cookies {
            self.cookies.insert(name.clone(), value.clone());
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("cookies", &self.cookies.keys().collect::<Vec<_>>())
            .field("token", &self.token.as_ref().map(|_| "(removed)"))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Default)]
struct SessionSlot {
    session: Option<Session>,
    invalidated: bool,
    authenticating: bool,
}

impl SessionSlot {
    fn state(&self, now: DateTime<Utc>) -> SessionState {
        if self.authenticating {
            return SessionState::Authenticating;
        }
        match &self.session {
            None => SessionState::NoSession,
            Some(_) if self.invalidated => SessionState::Invalidated,
            Some(s) if s.is_expired(now) => SessionState::Expired,
            Some(_) => SessionState::Valid,
        }
    }
}

#[derive(Debug, Default)]
pub struct SessionStore {
    slot: Mutex<SessionSlot>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclusive access for a load / login / save sequence
    pub async fn lock(&self) -> SessionGuard<'_> {
        SessionGuard {
            slot: self.slot.lock().await,
        }
    }

    pub async fn state(&self, now: DateTime<Utc>) -> SessionState {
        self.lock().await.state(now)
    }

    /// The current session if it is valid
    pub async fn load(&self, now: DateTime<Utc>) -> Option<Session> {
        self.lock().await.load(now).cloned()
    }

    pub async fn save(&self, session: Session) {
        self.lock().await.save(session);
    }

    pub async fn invalidate(&self) {
        self.lock().await.invalidate();
    }

    /// Forget the session entirely (logout)
    pub async fn clear(&self) {
        self.lock().await.clear();
    }
}

pub struct SessionGuard<'a> {
    slot: MutexGuard<'a, SessionSlot>,
}

impl SessionGuard<'_> {
    pub fn state(&self, now: DateTime<Utc>) -> SessionState {
        self.slot.state(now)
    }

    pub fn load(&self, now: DateTime<Utc>) -> Option<&Session> {
        match self.slot.state(now) {
            SessionState::Valid => self.slot.session.as_ref(),
            _ => None,
        }
    }

    /// Mark a login transaction as running
    pub fn begin_login(&mut self) {
        self.slot.authenticating = true;
    }

    /// End a failed login; the previous session stays unusable
    pub fn fail_login(&mut self) {
        self.slot.authenticating = false;
        self.slot.invalidated = self.slot.session.is_some();
    }

    pub fn save(&mut self, session: Session) {
        self.slot.session = Some(session);
        self.slot.invalidated = false;
        self.slot.authenticating = false;
    }

    pub fn invalidate(&mut self) {
        if self.slot.session.is_some() {
            self.slot.invalidated = true;
        }
    }

    pub fn clear(&mut self) {
        *self.slot = SessionSlot::default();
    }

    /// Refresh cookies on a valid session from a response's `Set-Cookie` headers
    pub fn refresh_cookies(&mut self, now: DateTime<Utc>, cookies: &BTreeMap<String, String>) {
        if cookies.is_empty() || self.slot.state(now) != SessionState::Valid {
            return;
        }
        if let Some(session) = self.slot.session.as_mut() {
            session.merge_cookies(cookies);
        }
    }
}
