use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::{SessionCipher, SessionStore, StorageError};
use crate::models::{Session, User};

/// Session file name in the data directory
const SESSION_FILE: &str = "session.bin";

/// Staging file; renamed over `SESSION_FILE` once fully written
const SESSION_TMP_FILE: &str = "session.bin.tmp";

/// Encrypted on-disk session store.
///
/// The session is read once at `open` and served from memory afterwards.
/// Every write goes to a staging file that is renamed into place, and the
/// in-memory copy is replaced only after the rename succeeds.
///
/// Writers are serialized by their own lock, so readers only ever wait for
/// the in-memory swap, never for disk I/O.
pub struct FileSessionStore {
    dir: PathBuf,
    cipher: SessionCipher,
    session: RwLock<Option<Session>>,
    writer: Mutex<()>,
}

impl FileSessionStore {
    /// Open the store in `dir`, restoring any readable session.
    ///
    /// A corrupt file, or one sealed under a different device secret, is
    /// treated as "no session" rather than an error.
    pub fn open(dir: impl Into<PathBuf>, cipher: SessionCipher) -> Result<Self, StorageError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let session = match Self::load(&dir.join(SESSION_FILE), &cipher) {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable session file");
                None
            }
        };
        debug!(?dir, restored = session.is_some(), "Session store opened");

        Ok(Self {
            dir,
            cipher,
            session: RwLock::new(session),
            writer: Mutex::new(()),
        })
    }

    fn load(path: &Path, cipher: &SessionCipher) -> Result<Option<Session>, StorageError> {
        let sealed = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        // Left behind by a clear that could only truncate
        if sealed.is_empty() {
            return Ok(None);
        }
        let plaintext = cipher.open(&sealed)?;
        let session: Session = serde_json::from_slice(&plaintext)?;
        Ok(Some(session.check()?))
    }

    fn persist(&self, session: &Session) -> Result<(), StorageError> {
        let plaintext = serde_json::to_vec(session)?;
        let sealed = self.cipher.seal(&plaintext)?;

        let tmp = self.dir.join(SESSION_TMP_FILE);
        if let Err(e) = std::fs::write(&tmp, &sealed) {
            let _ = std::fs::remove_file(&tmp);
            return Err(e.into());
        }
        std::fs::rename(&tmp, self.session_path())?;
        Ok(())
    }

    fn session_path(&self) -> PathBuf {
        self.dir.join(SESSION_FILE)
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<Session>> {
        self.session.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<Session>> {
        self.session.write().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Forget the in-memory session, then delete the file
    fn forget(&self) -> Result<(), StorageError> {
        *self.write() = None;
        discard(&self.session_path(), |path| std::fs::remove_file(path))
    }
}

/// Delete the session file. When deletion fails the file is emptied instead,
/// which `open` reads as "no session".
fn discard<F>(path: &Path, remove: F) -> Result<(), StorageError>
where
    F: FnOnce(&Path) -> std::io::Result<()>,
{
    match remove(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => {
            warn!(error = %e, "Could not delete session file, truncating it");
            OpenOptions::new()
                .write(true)
                .truncate(true)
                .open(path)
                .map(|_| ())
                .map_err(|_| StorageError::from(e))
        }
    }
}

impl SessionStore for FileSessionStore {
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
        let _writer = self.lock_writer();
        self.persist(&session)?;
        *self.write() = Some(session);
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        let _writer = self.lock_writer();
        self.forget()
    }

    fn clear_if_token(&self, token: &str) -> Result<bool, StorageError> {
        let _writer = self.lock_writer();
        if self.current_token().as_deref() != Some(token) {
            return Ok(false);
        }
        self.forget()?;
        Ok(true)
    }

    fn touch_activity(&self, at: DateTime<Utc>) -> Result<(), StorageError> {
        let _writer = self.lock_writer();
        let Some(touched) = self.read().as_ref().map(|s| s.touched(at)) else {
            return Ok(());
        };
        self.persist(&touched)?;
        *self.write() = Some(touched);
        Ok(())
    }
}
