use keyring::Entry;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{debug, info};

use super::StorageError;

const SERVICE_NAME: &str = "sessionguard";

/// Keychain account holding the device secret
const SECRET_ACCOUNT: &str = "device-secret";

const SECRET_LEN: usize = 32;

/// Random per-device secret kept in the OS keychain.
///
/// Only this secret lives in the keychain; login passwords are never stored.
pub struct DeviceSecret;

impl DeviceSecret {
    /// Fetch the device secret, generating and storing one on first use
    pub fn load_or_create() -> Result<String, StorageError> {
        let entry = Entry::new(SERVICE_NAME, SECRET_ACCOUNT)?;
        match entry.get_password() {
            Ok(secret) if !secret.is_empty() => {
                debug!("Device secret loaded from keychain");
                Ok(secret)
            }
            Ok(_) | Err(keyring::Error::NoEntry) => {
                let secret = Self::generate();
                entry.set_password(&secret)?;
                info!("Generated new device secret");
                Ok(secret)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the device secret. Any session file sealed with it becomes unreadable.
    pub fn delete() -> Result<(), StorageError> {
        let entry = Entry::new(SERVICE_NAME, SECRET_ACCOUNT)?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn generate() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SECRET_LEN)
            .map(char::from)
            .collect()
    }
}
