//! Local persistence of the current session.
//!
//! This module provides:
//! - `SessionStore`: the contract the controller depends on
//! - `MemorySessionStore`: process-local store, used in tests and ephemeral runs
//! - `FileSessionStore`: encrypted on-disk store with all-or-nothing writes
//! - `DeviceSecret`: keychain-held secret the file store's key is derived from

pub mod cipher;
pub mod error;
pub mod file;
pub mod keychain;
pub mod memory;

pub use cipher::SessionCipher;
pub use error::StorageError;
pub use file::FileSessionStore;
pub use keychain::DeviceSecret;
pub use memory::MemorySessionStore;

use chrono::{DateTime, Utc};

use crate::models::{Session, User};

/// Persists and retrieves the current session.
///
/// Reads are synchronous and side-effect free. Writes are all-or-nothing: a
/// failed `save` leaves the previously held session fully intact.
pub trait SessionStore: Send + Sync {
    /// True iff a session exists and has a non-empty token
    fn is_logged_in(&self) -> bool;

    fn current_user(&self) -> Option<User>;

    fn current_token(&self) -> Option<String>;

    fn last_activity(&self) -> Option<DateTime<Utc>>;

    /// Replace any existing session
    fn save(&self, session: Session) -> Result<(), StorageError>;

    /// Remove the session. Clearing an empty store is a no-op.
    fn clear(&self) -> Result<(), StorageError>;

    /// Remove the session only if it still holds `token`, checked and cleared
    /// as one step. Returns whether a session was removed.
    fn clear_if_token(&self, token: &str) -> Result<bool, StorageError>;

    /// Update the activity marker without touching token or user.
    /// Does nothing when no session is held.
    fn touch_activity(&self, at: DateTime<Utc>) -> Result<(), StorageError>;
}
