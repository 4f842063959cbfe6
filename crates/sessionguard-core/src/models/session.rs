use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::User;
use crate::store::StorageError;

/// Locally persisted proof of authentication.
///
/// A `Session` always carries a non-empty token and a user; `new` enforces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    token: String,
    user: User,
    last_activity: DateTime<Utc>,
}

impl Session {
    pub fn new(token: impl Into<String>, user: User) -> Result<Self, StorageError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(StorageError::InvalidSession("token is empty".to_string()));
        }
        Ok(Self {
            token,
            user,
            last_activity: Utc::now(),
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    /// Copy of this session with a new activity marker; token and user are kept
    pub fn touched(&self, at: DateTime<Utc>) -> Self {
        Self {
            last_activity: at,
            ..self.clone()
        }
    }

    /// How long the session has gone without activity (zero on clock skew)
    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_activity).max(Duration::zero())
    }

    /// Sessions read back from storage go through the same check as `new`
    pub(crate) fn check(self) -> Result<Self, StorageError> {
        if self.token.trim().is_empty() {
            return Err(StorageError::InvalidSession("token is empty".to_string()));
        }
        Ok(self)
    }
}
