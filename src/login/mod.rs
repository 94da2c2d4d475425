//! Interactive credential acquisition
//!
//! The session token (and, for team spend, the account email and team id)
//! come from user prompts. A cancelled or blank answer is not an error: the
//! caller gets `None` and renders the "missing settings" state.

use anyhow::Result;
use async_trait::async_trait;

use crate::storage::{CredentialStore, SettingsStore, UsageConfig};

pub const UPDATE_TOKEN_OPTION: &str = "Update Token";
pub const OPEN_SETTINGS_OPTION: &str = "Open Settings";

/// Text or secret input request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptRequest {
    pub prompt: String,
    pub placeholder: String,
    pub secret: bool,
}

impl PromptRequest {
    pub fn text(prompt: &str, placeholder: &str) -> Self {
        Self {
            prompt: prompt.to_string(),
            placeholder: placeholder.to_string(),
            secret: false,
        }
    }

    pub fn secret(prompt: &str, placeholder: &str) -> Self {
        Self {
            secret: true,
            ..Self::text(prompt, placeholder)
        }
    }
}

/// Host-side prompts. Both calls suspend until the user answers.
#[async_trait]
pub trait Prompter: Send + Sync {
    /// Trimmed answer, or `None` when cancelled
    async fn input(&self, request: PromptRequest) -> Option<String>;

    /// Index into `options`, or `None` when dismissed
    async fn choose(&self, message: &str, options: &[&str]) -> Option<usize>;
}

/// Token plus the settings it was validated against
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub token: String,
    pub config: UsageConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryChoice {
    UpdateToken,
    OpenSettings,
    Dismissed,
}

pub async fn prompt_token(prompter: &dyn Prompter) -> Option<String> {
    ask(
        prompter,
        PromptRequest::secret(
            "Paste your Cursor session token (WorkosCursorSessionToken cookie value)",
            "user_01...%3A%3AeyJ...",
        ),
    )
    .await
}

/// Make sure a token (and team identity where needed) exists, prompting for
/// whatever is missing. Answers to email/team prompts are persisted.
pub async fn ensure_credentials(
    credentials: &CredentialStore,
    settings: &SettingsStore,
    mut config: UsageConfig,
    prompter: &dyn Prompter,
) -> Result<Option<Session>> {
    let token = match credentials.get()? {
        Some(token) => token,
        None => {
            tracing::info!("No session token stored, prompting");
            let Some(token) = prompt_token(prompter).await else {
                tracing::info!("Token prompt cancelled");
                return Ok(None);
            };
            credentials.set(&token)?;
            token
        }
    };

    if config.endpoint.needs_team_identity() {
        if config.account_email().is_none() {
            let Some(email) = ask(
                prompter,
                PromptRequest::text("Cursor account email", "you@company.com"),
            )
            .await
            else {
                return Ok(None);
            };
            config = settings.update(|c| c.email = Some(email))?;
        }
        if config.team_id().is_none() {
            let Some(team_id) = ask(
                prompter,
                PromptRequest::text("Cursor team ID (number from the dashboard URL)", "12345"),
            )
            .await
            else {
                return Ok(None);
            };
            config = settings.update(|c| c.team_id = Some(team_id))?;
        }
    }

    Ok(Some(Session { token, config }))
}

/// Offer the auth-failure recovery options
pub async fn ask_recovery(prompter: &dyn Prompter, detail: &str) -> RecoveryChoice {
    let message = format!("Cursor session token was rejected ({}).", detail);
    match prompter
        .choose(&message, &[UPDATE_TOKEN_OPTION, OPEN_SETTINGS_OPTION])
        .await
    {
        Some(0) => RecoveryChoice::UpdateToken,
        Some(1) => RecoveryChoice::OpenSettings,
        _ => RecoveryChoice::Dismissed,
    }
}

async fn ask(prompter: &dyn Prompter, request: PromptRequest) -> Option<String> {
    prompter
        .input(request)
        .await
        .map(|answer| answer.trim().to_string())
        .filter(|answer| !answer.is_empty())
}
