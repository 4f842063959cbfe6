use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use super::{SessionStore, StorageError};
use crate::models::{Session, User};

/// Session store that lives only as long as the process.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    session: RwLock<Option<Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a session, as if restored from a previous run
    pub fn with_session(session: Session) -> Self {
        Self {
            session: RwLock::new(Some(session)),
        }
    }

    /// Snapshot of the held session
    pub fn session(&self) -> Option<Session> {
        self.read().clone()
    }

    // A panicking writer can only have left a complete value behind,
    // so poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, Option<Session>> {
        self.session.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<Session>> {
        self.session.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl SessionStore for MemorySessionStore {
    fn is_logged_in(&self) -> bool {
        self.read()
            .as_ref()
            .map(|s| !s.token().is_empty())
            .unwrap_or(false)
    }

    fn current_user(&self) -> Option<User> {
        self.read().as_ref().map(|s| s.user().clone())
    }

    fn current_token(&self) -> Option<String> {
        self.read().as_ref().map(|s| s.token().to_string())
    }

    fn last_activity(&self) -> Option<DateTime<Utc>> {
        self.read().as_ref().map(Session::last_activity)
    }

    fn save(&self, session: Session) -> Result<(), StorageError> {
        *self.write() = Some(session);
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        *self.write() = None;
        Ok(())
    }

    fn clear_if_token(&self, token: &str) -> Result<bool, StorageError> {
        let mut guard = self.write();
        if guard.as_ref().is_some_and(|s| s.token() == token) {
            *guard = None;
            return Ok(true);
        }
        Ok(false)
    }

    fn touch_activity(&self, at: DateTime<Utc>) -> Result<(), StorageError> {
        let mut guard = self.write();
        if let Some(touched) = guard.as_ref().map(|s| s.touched(at)) {
            *guard = Some(touched);
        }
        Ok(())
    }
}
