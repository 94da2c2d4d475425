//! Host commands: what a menu item, hotkey or stdin line can trigger

use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;

use crate::refresh::{RefreshOrchestrator, RefreshOutcome};

/// Host-side settings editor
pub trait SettingsUi: Send + Sync {
    fn open_settings(&self, settings_path: &Path);
}

/// Result reported back to whoever issued the command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub success: bool,
    pub message: String,
}

impl CommandResult {
    fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostCommand {
    Refresh,
    UpdateToken,
    OpenSettings,
}

impl FromStr for HostCommand {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "refresh" | "r" => Ok(Self::Refresh),
            "token" | "update-token" | "update_token" => Ok(Self::UpdateToken),
            "settings" | "open-settings" | "open_settings" => Ok(Self::OpenSettings),
            other => Err(format!("Unknown command: {}", other)),
        }
    }
}

/// Run a usage cycle now
pub async fn refresh(orchestrator: &RefreshOrchestrator) -> CommandResult {
    tracing::debug!("Manual refresh requested");
    describe(orchestrator.refresh().await)
}

/// Prompt for a new session token, store it, then refresh
pub async fn update_token(orchestrator: &RefreshOrchestrator) -> CommandResult {
    match orchestrator.prompt_and_store_token().await {
        Ok(true) => {
            tracing::info!("Session token updated");
            let outcome = describe(orchestrator.refresh().await);
            CommandResult {
                message: format!("Token saved. {}", outcome.message),
                ..outcome
            }
        }
        Ok(false) => CommandResult::failed("Token update cancelled"),
        Err(e) => CommandResult::failed(format!("Failed to save token: {:#}", e)),
    }
}

pub fn open_settings(orchestrator: &RefreshOrchestrator) -> CommandResult {
    let path = orchestrator.settings().path();
    orchestrator.settings_ui().open_settings(path);
    CommandResult::ok(format!("Settings: {}", path.display()))
}

pub async fn dispatch(orchestrator: &Arc<RefreshOrchestrator>, command: HostCommand) -> CommandResult {
    match command {
        HostCommand::Refresh => refresh(orchestrator).await,
        HostCommand::UpdateToken => update_token(orchestrator).await,
        HostCommand::OpenSettings => open_settings(orchestrator),
    }
}

fn describe(outcome: RefreshOutcome) -> CommandResult {
    match outcome {
        RefreshOutcome::Skipped => CommandResult::ok("Refresh already in progress"),
        RefreshOutcome::MissingSettings => {
            CommandResult::failed("Session token or team settings missing")
        }
        RefreshOutcome::Rendered(result) if result.has_data() => CommandResult::ok("Usage updated"),
        RefreshOutcome::Rendered(_) => CommandResult::ok("No usage figure in response"),
        RefreshOutcome::AuthRecovery(_) => CommandResult::failed("Session token was rejected"),
        RefreshOutcome::Failed(message) => CommandResult::failed(message),
    }
}
