//! Storage utilities for credentials and settings

pub mod credentials;
pub mod keyring;
pub mod settings;

// Re-export commonly used items
pub use credentials::CredentialStore;
pub use keyring::{MemorySecretStore, SecretStore, SecureStorage};
pub use settings::{ConfigChange, DisplayMode, EndpointKind, SettingsStore, UsageConfig};
