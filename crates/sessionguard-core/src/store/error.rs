use thiserror::Error;

/// Local persistence failure.
///
/// Stores report these without disturbing whatever session was already held.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Session storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session data could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Session encryption failed: {0}")]
    Encryption(String),

    #[error("Keychain access failed: {0}")]
    Keyring(String),

    #[error("Invalid session: {0}")]
    InvalidSession(String),
}

impl From<keyring::Error> for StorageError {
    fn from(e: keyring::Error) -> Self {
        StorageError::Keyring(e.to_string())
    }
}
