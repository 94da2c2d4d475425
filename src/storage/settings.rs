//! Persisted user settings (JSON file under the platform config directory)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const APP_DIR_NAME: &str = "SpendBar";
const SETTINGS_FILENAME: &str = "settings.json";
const SETTINGS_PATH_ENV: &str = "SPENDBAR_SETTINGS";
const DEFAULT_REFRESH_INTERVAL_MINUTES: i64 = 5;

/// How the indicator presents the usage figure
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    #[default]
    Money,
    Percent,
}

/// Which dashboard endpoint the usage comes from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EndpointKind {
    /// POST get-team-spend, needs a team id and the member email
    #[default]
    TeamSpend,
    /// GET usage-summary for the signed-in account
    UsageSummary,
}

impl EndpointKind {
    pub fn needs_team_identity(&self) -> bool {
        matches!(self, EndpointKind::TeamSpend)
    }
}

/// Settings snapshot used for one refresh cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsageConfig {
    pub refresh_interval_minutes: i64,
    pub display_mode: DisplayMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit_path: Option<String>,
    pub endpoint: EndpointKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,
    pub debug_file_logging: bool,
}

impl Default for UsageConfig {
    fn default() -> Self {
        Self {
            refresh_interval_minutes: DEFAULT_REFRESH_INTERVAL_MINUTES,
            display_mode: DisplayMode::Money,
            email: None,
            team_id: None,
            used_path: None,
            limit_path: None,
            endpoint: EndpointKind::TeamSpend,
            endpoint_url: None,
            debug_file_logging: false,
        }
    }
}

/// What a settings change requires from the orchestrator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigChange {
    pub interval: bool,
    pub request: bool,
    pub presentation: bool,
}

impl ConfigChange {
    pub fn is_empty(&self) -> bool {
        !self.interval && !self.request && !self.presentation
    }
}

impl UsageConfig {
    /// Email, trimmed, or `None` when blank
    pub fn account_email(&self) -> Option<&str> {
        non_blank(self.email.as_deref())
    }

    pub fn team_id(&self) -> Option<&str> {
        non_blank(self.team_id.as_deref())
    }

    pub fn used_path(&self) -> Option<&str> {
        non_blank(self.used_path.as_deref())
    }

    pub fn limit_path(&self) -> Option<&str> {
        non_blank(self.limit_path.as_deref())
    }

    pub fn timer_enabled(&self) -> bool {
        self.refresh_interval_minutes > 0
    }

    /// Classify the difference between two snapshots. Extraction inputs
    /// (email, explicit paths) count as presentation: they only need the
    /// cached response re-read, not a new request.
    pub fn diff(&self, next: &UsageConfig) -> ConfigChange {
        ConfigChange {
            interval: self.refresh_interval_minutes != next.refresh_interval_minutes,
            request: self.endpoint != next.endpoint
                || self.endpoint_url != next.endpoint_url
                || self.team_id() != next.team_id(),
            presentation: self.display_mode != next.display_mode
                || self.account_email() != next.account_email()
                || self.used_path() != next.used_path()
                || self.limit_path() != next.limit_path(),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// On-disk layout: the config plus the legacy plaintext token field
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(flatten)]
    config: UsageConfig,
    #[serde(rename = "token", default, skip_serializing_if = "Option::is_none")]
    legacy_token: Option<String>,
}

/// Reads and writes the settings file
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Settings at `$SPENDBAR_SETTINGS` or `<config dir>/SpendBar/settings.json`
    pub fn default_location() -> Result<Self> {
        if let Ok(path) = std::env::var(SETTINGS_PATH_ENV) {
            let trimmed = path.trim();
            if !trimmed.is_empty() {
                return Ok(Self::new(trimmed));
            }
        }
        let config_dir = dirs::config_dir().context("Could not determine config directory")?;
        Ok(Self::new(
            config_dir.join(APP_DIR_NAME).join(SETTINGS_FILENAME),
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<UsageConfig> {
        Ok(self.read_file()?.config)
    }

    pub fn save(&self, config: &UsageConfig) -> Result<()> {
        let mut file = self.read_file()?;
        file.config = config.clone();
        self.write_file(&file)
    }

    pub fn update<F>(&self, f: F) -> Result<UsageConfig>
    where
        F: FnOnce(&mut UsageConfig),
    {
        let mut file = self.read_file()?;
        f(&mut file.config);
        self.write_file(&file)?;
        Ok(file.config)
    }

    /// Plaintext token left behind by older versions
    pub fn legacy_token(&self) -> Result<Option<String>> {
        Ok(self
            .read_file()?
            .legacy_token
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty()))
    }

    pub fn clear_legacy_token(&self) -> Result<()> {
        let mut file = self.read_file()?;
        if file.legacy_token.is_none() {
            return Ok(());
        }
        file.legacy_token = None;
        self.write_file(&file)
    }

    #[cfg(test)]
    pub(crate) fn set_legacy_token(&self, token: &str) -> Result<()> {
        let mut file = self.read_file()?;
        file.legacy_token = Some(token.to_string());
        self.write_file(&file)
    }

    /// Raw file contents, for the `settings` command
    pub fn read_raw(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        fs::read_to_string(&self.path)
            .map(Some)
            .with_context(|| format!("Failed to read {}", self.path.display()))
    }

    fn read_file(&self) -> Result<SettingsFile> {
        let Some(contents) = self.read_raw()? else {
            return Ok(SettingsFile::default());
        };
        if contents.trim().is_empty() {
            return Ok(SettingsFile::default());
        }
        serde_json::from_str(&contents)
            .with_context(|| format!("Invalid settings file {}", self.path.display()))
    }

    fn write_file(&self, file: &SettingsFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).context("Failed to create settings directory")?;
        }
        let payload = serde_json::to_string_pretty(file).context("Failed to serialize settings")?;
        fs::write(&self.path, payload)
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        tracing::debug!("Saved settings to {:?}", self.path);
        Ok(())
    }
}
