//! Secure credential storage using the system keyring

use std::collections::HashMap;
use std::sync::Mutex;

use keyring::Entry;
use thiserror::Error;

const SERVICE_NAME: &str = "com.spendbar.app";

#[derive(Error, Debug)]
pub enum KeyringError {
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
    #[error("Credential not found")]
    NotFound,
    #[error("Secret store lock poisoned")]
    Poisoned,
}

/// Key/value secret storage. The keyring is the production backend.
pub trait SecretStore: Send + Sync {
    fn store(&self, key: &str, value: &str) -> Result<(), KeyringError>;

    fn get(&self, key: &str) -> Result<String, KeyringError>;

    fn delete(&self, key: &str) -> Result<(), KeyringError>;
}

/// Secure storage wrapper for the system keyring
pub struct SecureStorage {
    service: &'static str,
}

impl SecureStorage {
    pub fn new() -> Self {
        Self {
            service: SERVICE_NAME,
        }
    }
}

impl SecretStore for SecureStorage {
    fn store(&self, key: &str, value: &str) -> Result<(), KeyringError> {
        let entry = Entry::new(self.service, key)?;
        entry.set_password(value)?;
        tracing::debug!("Stored credential for key: {}", key);
        Ok(())
    }

    fn get(&self, key: &str) -> Result<String, KeyringError> {
        let entry = Entry::new(self.service, key)?;
        match entry.get_password() {
            Ok(password) => Ok(password),
            Err(keyring::Error::NoEntry) => Err(KeyringError::NotFound),
            Err(e) => Err(KeyringError::Keyring(e)),
        }
    }

    fn delete(&self, key: &str) -> Result<(), KeyringError> {
        let entry = Entry::new(self.service, key)?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => {
                tracing::debug!("Deleted credential for key: {}", key);
                Ok(())
            }
            Err(e) => Err(KeyringError::Keyring(e)),
        }
    }
}

impl Default for SecureStorage {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-local secret storage, used by tests and `--ephemeral` runs.
#[derive(Default)]
pub struct MemorySecretStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SecretStore for MemorySecretStore {
    fn store(&self, key: &str, value: &str) -> Result<(), KeyringError> {
        let mut entries = self.entries.lock().map_err(|_| KeyringError::Poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<String, KeyringError> {
        let entries = self.entries.lock().map_err(|_| KeyringError::Poisoned)?;
        entries.get(key).cloned().ok_or(KeyringError::NotFound)
    }

    fn delete(&self, key: &str) -> Result<(), KeyringError> {
        let mut entries = self.entries.lock().map_err(|_| KeyringError::Poisoned)?;
        entries.remove(key);
        Ok(())
    }
}
