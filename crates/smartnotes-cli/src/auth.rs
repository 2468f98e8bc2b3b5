//! Session persistence in the OS keychain.

#[cfg(test)]
use std::collections::HashMap;
use std::sync::Arc;
#[cfg(test)]
use std::sync::{Mutex, OnceLock};

#[cfg(not(test))]
use keyring::Entry;

use smartnotes_core::auth::{AuthError, AuthResult, Session, SessionManager, SessionPersistence};
use smartnotes_core::ClientConfig;

#[cfg(not(test))]
const KEYRING_SERVICE_NAME: &str = "smartnotes-cli";

/// Keychain slot for one server origin.
#[derive(Clone)]
pub struct KeychainSessionStore {
    username: String,
}

impl KeychainSessionStore {
    pub fn for_server(api_base_url: &str) -> Self {
        Self {
            username: format!("session:{}", api_base_url.trim_end_matches('/')),
        }
    }

    #[cfg(test)]
    fn test_store() -> &'static Mutex<HashMap<String, String>> {
        static STORE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
        STORE.get_or_init(|| Mutex::new(HashMap::new()))
    }

    #[cfg(not(test))]
    fn entry(&self) -> AuthResult<Entry> {
        Entry::new(KEYRING_SERVICE_NAME, &self.username)
            .map_err(|error| AuthError::SecureStorage(error.to_string()))
    }
}

impl SessionPersistence for KeychainSessionStore {
    #[cfg(not(test))]
    fn load_session(&self) -> AuthResult<Option<Session>> {
        let entry = self.entry()?;
        match entry.get_password() {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(AuthError::SecureStorage(error.to_string())),
        }
    }

    #[cfg(test)]
    fn load_session(&self) -> AuthResult<Option<Session>> {
        let guard = Self::test_store()
            .lock()
            .map_err(|error| AuthError::SecureStorage(error.to_string()))?;
        guard
            .get(&self.username)
            .map(|raw| serde_json::from_str(raw))
            .transpose()
            .map_err(AuthError::from)
    }

    #[cfg(not(test))]
    fn save_session(&self, session: &Session) -> AuthResult<()> {
        let raw = serde_json::to_string(session)?;
        self.entry()?
            .set_password(&raw)
            .map_err(|error| AuthError::SecureStorage(error.to_string()))
    }

    #[cfg(test)]
    fn save_session(&self, session: &Session) -> AuthResult<()> {
        let raw = serde_json::to_string(session)?;
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| AuthError::SecureStorage(error.to_string()))?;
        guard.insert(self.username.clone(), raw);
        Ok(())
    }

    #[cfg(not(test))]
    fn clear_session(&self) -> AuthResult<()> {
        let entry = self.entry()?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(AuthError::SecureStorage(error.to_string())),
        }
    }

    #[cfg(test)]
    fn clear_session(&self) -> AuthResult<()> {
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| AuthError::SecureStorage(error.to_string()))?;
        guard.remove(&self.username);
        Ok(())
    }
}

/// Session manager backed by the keychain, with any stored session restored.
///
/// A keychain that cannot be read leaves the client signed out; local note
/// commands keep working.
pub fn session_manager(config: &ClientConfig) -> SessionManager {
    let store = KeychainSessionStore::for_server(&config.api_base_url);
    let manager = SessionManager::with_persistence(Arc::new(store));
    if let Err(error) = manager.restore() {
        tracing::warn!("Could not restore stored session: {}", error);
    }
    manager
}

pub fn clear_stored_session(config: &ClientConfig) -> AuthResult<()> {
    KeychainSessionStore::for_server(&config.api_base_url).clear_session()
}
