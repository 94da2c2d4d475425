//! Session token lifecycle: secret storage plus one-time legacy migration

use anyhow::{Context, Result};
use std::sync::Arc;

use super::keyring::{KeyringError, SecretStore};
use super::settings::SettingsStore;
use crate::debug_settings::redact_secret;

pub const TOKEN_KEY: &str = "cursor_session_token";

/// Owns the single session token for the process
pub struct CredentialStore {
    secrets: Arc<dyn SecretStore>,
    settings: SettingsStore,
}

impl CredentialStore {
    pub fn new(secrets: Arc<dyn SecretStore>, settings: SettingsStore) -> Self {
        Self { secrets, settings }
    }

    /// Stored token, migrating a plaintext settings token into secret storage
    /// the first time one is seen.
    pub fn get(&self) -> Result<Option<String>> {
        if let Some(token) = self.read_secret()? {
            return Ok(Some(token));
        }

        let Some(legacy) = self.settings.legacy_token()? else {
            return Ok(None);
        };

        tracing::info!(
            "Migrating plaintext session token {} into secure storage",
            redact_secret(&legacy)
        );
        self.secrets
            .store(TOKEN_KEY, &legacy)
            .context("Failed to migrate token into secure storage")?;
        self.settings
            .clear_legacy_token()
            .context("Failed to clear plaintext token from settings")?;
        Ok(Some(legacy))
    }

    /// Replace the stored token. The plaintext location is always cleared.
    pub fn set(&self, token: &str) -> Result<()> {
        let token = token.trim();
        self.secrets
            .store(TOKEN_KEY, token)
            .context("Failed to store token in secure storage")?;
        self.settings
            .clear_legacy_token()
            .context("Failed to clear plaintext token from settings")?;
        tracing::info!("Stored session token {}", redact_secret(token));
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        self.secrets
            .delete(TOKEN_KEY)
            .context("Failed to delete token from secure storage")?;
        self.settings.clear_legacy_token()?;
        tracing::info!("Removed stored session token");
        Ok(())
    }

    fn read_secret(&self) -> Result<Option<String>> {
        match self.secrets.get(TOKEN_KEY) {
            Ok(token) if token.trim().is_empty() => Ok(None),
            Ok(token) => Ok(Some(token.trim().to_string())),
            Err(KeyringError::NotFound) => Ok(None),
            Err(err) => Err(err).context("Failed to read token from secure storage"),
        }
    }
}
