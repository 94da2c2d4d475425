//! Scripted collaborators for driving the orchestrator in tests

use super::*;
use crate::login::testing::ScriptedPrompter;
use crate::providers::UsageRequest;
use crate::storage::{EndpointKind, MemorySecretStore};
use async_trait::async_trait;
use serde_json::json;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicUsize;
use tempfile::{tempdir, TempDir};
use tokio::sync::Notify;

#[derive(Default)]
pub struct FakeTransport {
    responses: Mutex<VecDeque<Result<Value, FetchError>>>,
    calls: AtomicUsize,
    pub tokens: Mutex<Vec<String>>,
    pub requests: Mutex<Vec<UsageRequest>>,
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
}

impl FakeTransport {
    pub fn replying(responses: Vec<Result<Value, FetchError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    /// Signals `started` once a request arrives, then holds it until `release`
    pub fn gated(
        responses: Vec<Result<Value, FetchError>>,
        started: Arc<Notify>,
        release: Arc<Notify>,
    ) -> Self {
        Self {
            gate: Some((started, release)),
            ..Self::replying(responses)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UsageTransport for FakeTransport {
    async fn request(&self, request: &UsageRequest, token: &str) -> Result<Value, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tokens.lock().unwrap().push(token.to_string());
        self.requests.lock().unwrap().push(request.clone());
        if let Some((started, release)) = &self.gate {
            started.notify_one();
            release.notified().await;
        }
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(json!({})))
    }
}

#[derive(Default)]
pub struct RecordingIndicator {
    pub views: Mutex<Vec<IndicatorView>>,
    pub notifications: Mutex<Vec<String>>,
}

impl RecordingIndicator {
    pub fn last(&self) -> IndicatorView {
        self.views.lock().unwrap().last().cloned().expect("a view was shown")
    }
}

impl StatusIndicator for RecordingIndicator {
    fn show(&self, view: &IndicatorView) {
        self.views.lock().unwrap().push(view.clone());
    }

    fn notify(&self, message: &str) {
        self.notifications.lock().unwrap().push(message.to_string());
    }
}

#[derive(Default)]
pub struct RecordingSettingsUi {
    pub opened: Mutex<Vec<PathBuf>>,
}

impl SettingsUi for RecordingSettingsUi {
    fn open_settings(&self, settings_path: &Path) {
        self.opened.lock().unwrap().push(settings_path.to_path_buf());
    }
}

pub struct Harness {
    _dir: TempDir,
    pub settings: SettingsStore,
    pub transport: Arc<FakeTransport>,
    pub indicator: Arc<RecordingIndicator>,
    pub prompter: Arc<ScriptedPrompter>,
    pub settings_ui: Arc<RecordingSettingsUi>,
    pub orchestrator: Arc<RefreshOrchestrator>,
}

pub fn team_config() -> UsageConfig {
    UsageConfig {
        email: Some("a@x.com".to_string()),
        team_id: Some("42".to_string()),
        ..UsageConfig::default()
    }
}

pub fn summary_config() -> UsageConfig {
    UsageConfig {
        endpoint: EndpointKind::UsageSummary,
        ..UsageConfig::default()
    }
}

pub fn harness(
    config: UsageConfig,
    token: Option<&str>,
    transport: FakeTransport,
    prompter: ScriptedPrompter,
) -> Harness {
    let dir = tempdir().expect("tempdir");
    let settings = SettingsStore::new(dir.path().join("settings.json"));
    settings.save(&config).expect("save settings");

    let credentials = CredentialStore::new(Arc::new(MemorySecretStore::new()), settings.clone());
    if let Some(token) = token {
        credentials.set(token).expect("store token");
    }

    let transport = Arc::new(transport);
    let indicator = Arc::new(RecordingIndicator::default());
    let prompter = Arc::new(prompter);
    let settings_ui = Arc::new(RecordingSettingsUi::default());
    let orchestrator = RefreshOrchestrator::new(
        credentials,
        settings.clone(),
        transport.clone(),
        HostBindings {
            indicator: indicator.clone(),
            prompter: prompter.clone(),
            settings_ui: settings_ui.clone(),
        },
    );

    Harness {
        _dir: dir,
        settings,
        transport,
        indicator,
        prompter,
        settings_ui,
        orchestrator,
    }
}
