//! Refresh orchestrator: the usage cycle state machine, its timer, and the
//! last-known response used for presentation-only re-renders.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::Local;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::commands::SettingsUi;
use crate::debug_settings;
use crate::login::{self, Prompter, RecoveryChoice, Session};
use crate::providers::{
    cursor, detect_auth_issue, extract_usage, FetchError, ResponseInfo, UsageResult,
    UsageTransport,
};
use crate::storage::{ConfigChange, CredentialStore, SettingsStore, UsageConfig};
use crate::tray::{self, IndicatorView, StatusIndicator};

/// Longest timer period: one year
const MAX_INTERVAL_MINUTES: i64 = 365 * 24 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    Idle,
    EnsuringCredentials,
    Fetching,
    Extracting,
    Rendered,
    MissingSettings,
    AuthRecovery,
    Failed,
}

/// How a refresh request ended
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// Another cycle was already running; nothing happened
    Skipped,
    MissingSettings,
    Rendered(UsageResult),
    AuthRecovery(RecoveryChoice),
    Failed(String),
}

/// Host collaborators the orchestrator drives
#[derive(Clone)]
pub struct HostBindings {
    pub indicator: Arc<dyn StatusIndicator>,
    pub prompter: Arc<dyn Prompter>,
    pub settings_ui: Arc<dyn SettingsUi>,
}

pub struct RefreshOrchestrator {
    credentials: CredentialStore,
    settings: SettingsStore,
    transport: Arc<dyn UsageTransport>,
    host: HostBindings,
    in_flight: AtomicBool,
    state: RwLock<CycleState>,
    applied: RwLock<UsageConfig>,
    last_response: RwLock<Option<Value>>,
    last_view: RwLock<IndicatorView>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

/// Holds the single-cycle flag; released on drop
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl RefreshOrchestrator {
    pub fn new(
        credentials: CredentialStore,
        settings: SettingsStore,
        transport: Arc<dyn UsageTransport>,
        host: HostBindings,
    ) -> Arc<Self> {
        let applied = settings.load().unwrap_or_else(|err| {
            tracing::warn!("Failed to load settings, using defaults: {:#}", err);
            UsageConfig::default()
        });
        Arc::new(Self {
            credentials,
            settings,
            transport,
            host,
            in_flight: AtomicBool::new(false),
            state: RwLock::new(CycleState::Idle),
            applied: RwLock::new(applied),
            last_response: RwLock::new(None),
            last_view: RwLock::new(tray::placeholder_view()),
            timer: Mutex::new(None),
        })
    }

    /// Show the placeholder, arm the timer and run the first cycle
    pub async fn start(self: &Arc<Self>) -> RefreshOutcome {
        self.show(tray::placeholder_view());
        let config = self.applied_config();
        debug_settings::set_file_logging(config.debug_file_logging);
        self.schedule(config.refresh_interval_minutes);
        if config.timer_enabled() {
            tracing::info!(
                "Usage tracking started ({:?}, every {} min)",
                config.endpoint,
                config.refresh_interval_minutes
            );
        } else {
            tracing::info!("Usage tracking started ({:?}, manual refresh only)", config.endpoint);
        }
        self.refresh().await
    }

    /// Cancel the timer. An in-flight cycle still runs to completion.
    pub fn shutdown(&self) {
        if let Some(handle) = lock(&self.timer).take() {
            handle.abort();
            tracing::info!("Refresh timer stopped");
        }
    }

    pub fn state(&self) -> CycleState {
        *read(&self.state)
    }

    pub fn current_view(&self) -> IndicatorView {
        read(&self.last_view).clone()
    }

    pub fn applied_config(&self) -> UsageConfig {
        read(&self.applied).clone()
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn settings_ui(&self) -> &dyn SettingsUi {
        self.host.settings_ui.as_ref()
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn timer_active(&self) -> bool {
        lock(&self.timer)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Run one usage cycle unless one is already running
    pub async fn refresh(&self) -> RefreshOutcome {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            tracing::debug!("Refresh already in flight, dropping trigger");
            return RefreshOutcome::Skipped;
        };

        let outcome = self.run_cycle().await;
        self.set_state(CycleState::Idle);
        outcome
    }

    async fn run_cycle(&self) -> RefreshOutcome {
        self.set_state(CycleState::EnsuringCredentials);
        let config = match self.settings.load() {
            Ok(config) => config,
            Err(err) => return self.fail(format!("Failed to load settings: {:#}", err)),
        };

        let session = match login::ensure_credentials(
            &self.credentials,
            &self.settings,
            config,
            self.host.prompter.as_ref(),
        )
        .await
        {
            Ok(Some(session)) => session,
            Ok(None) => {
                self.set_state(CycleState::MissingSettings);
                self.show(tray::missing_settings_view());
                return RefreshOutcome::MissingSettings;
            }
            Err(err) => return self.fail(format!("{:#}", err)),
        };
        self.record_applied(&session.config);

        self.set_state(CycleState::Fetching);
        let body = match self.fetch(&session).await {
            Ok(body) => body,
            Err(err) if err.is_auth() => return self.recover(err).await,
            Err(err) => return self.fail(err.to_string()),
        };

        self.set_state(CycleState::Extracting);
        let result = extract_usage(&body, &session.config);
        if !result.has_data() {
            tracing::warn!("No usage figure found in response");
        }
        *write(&self.last_response) = Some(body);

        self.set_state(CycleState::Rendered);
        self.show(tray::render_usage(
            &result,
            session.config.display_mode,
            Local::now(),
        ));
        RefreshOutcome::Rendered(result)
    }

    async fn fetch(&self, session: &Session) -> Result<Value, FetchError> {
        let request = cursor::usage_request(&session.config)?;
        tracing::debug!("Fetching usage via {} transport", self.transport.name());
        let body = self.transport.request(&request, &session.token).await?;
        if let Some(detail) = detect_auth_issue(&body) {
            tracing::warn!("Usage response reports an auth problem: {}", detail);
            return Err(FetchError::Auth(ResponseInfo::new(200, body.to_string())));
        }
        Ok(body)
    }

    async fn recover(&self, err: FetchError) -> RefreshOutcome {
        self.set_state(CycleState::AuthRecovery);
        tracing::warn!("Authentication failed: {}", err);
        if let Some(info) = err.response() {
            tracing::debug!("Rejected response body: {}", info.snippet());
        }
        write(&self.last_response).take();
        self.show(tray::auth_expired_view(&err.to_string()));
        self.host
            .indicator
            .notify("Cursor session token expired. Update it to resume usage tracking.");

        let choice = login::ask_recovery(self.host.prompter.as_ref(), &err.to_string()).await;
        match choice {
            RecoveryChoice::UpdateToken => {
                // Stored for the next tick or manual refresh; no retry here
                if let Err(err) = self.prompt_and_store_token().await {
                    tracing::error!("Failed to store new token: {:#}", err);
                }
            }
            RecoveryChoice::OpenSettings => {
                self.host.settings_ui.open_settings(self.settings.path());
            }
            RecoveryChoice::Dismissed => {
                tracing::debug!("Auth recovery dismissed");
            }
        }
        RefreshOutcome::AuthRecovery(choice)
    }

    fn fail(&self, message: String) -> RefreshOutcome {
        self.set_state(CycleState::Failed);
        tracing::error!("Usage refresh failed: {}", message);
        write(&self.last_response).take();
        self.show(tray::error_view(&message));
        self.host.indicator.notify(&message);
        RefreshOutcome::Failed(message)
    }

    /// Ask for a token and store it. `Ok(false)` when the prompt was cancelled.
    pub async fn prompt_and_store_token(&self) -> anyhow::Result<bool> {
        let Some(token) = login::prompt_token(self.host.prompter.as_ref()).await else {
            return Ok(false);
        };
        self.credentials.set(&token)?;
        Ok(true)
    }

    /// Re-extract and re-render the cached response. Returns false when
    /// nothing is cached.
    pub fn rerender(&self) -> bool {
        let guard = read(&self.last_response);
        let Some(body) = guard.as_ref() else {
            return false;
        };
        let config = self.applied_config();
        let result = extract_usage(body, &config);
        drop(guard);

        tracing::debug!("Re-rendering cached usage ({:?})", config.display_mode);
        self.show(tray::render_usage(&result, config.display_mode, Local::now()));
        true
    }

    /// React to a settings change: reschedule, refetch, or re-render.
    pub async fn apply_settings(self: &Arc<Self>, next: UsageConfig) -> ConfigChange {
        let change = {
            let mut applied = write(&self.applied);
            let change = applied.diff(&next);
            *applied = next.clone();
            change
        };
        if debug_settings::file_logging_enabled() != next.debug_file_logging {
            tracing::info!("Debug file logging {}", if next.debug_file_logging { "on" } else { "off" });
            debug_settings::set_file_logging(next.debug_file_logging);
        }

        if change.interval {
            self.schedule(next.refresh_interval_minutes);
        }
        if change.request {
            self.refresh().await;
        } else if change.presentation && !self.rerender() {
            self.refresh().await;
        }
        change
    }

    /// Reload the settings file and apply it
    pub async fn reload_settings(self: &Arc<Self>) -> anyhow::Result<ConfigChange> {
        let next = self.settings.load()?;
        Ok(self.apply_settings(next).await)
    }

    /// (Re)arm the refresh timer; zero or negative minutes disables it
    pub fn schedule(self: &Arc<Self>, minutes: i64) {
        let mut timer = lock(&self.timer);
        if let Some(handle) = timer.take() {
            handle.abort();
        }
        if minutes <= 0 {
            tracing::info!("Refresh timer disabled");
            return;
        }

        let minutes = if minutes > MAX_INTERVAL_MINUTES {
            tracing::warn!(
                "Refresh interval of {} min is out of range, using {} min",
                minutes,
                MAX_INTERVAL_MINUTES
            );
            MAX_INTERVAL_MINUTES
        } else {
            minutes
        };
        let period = Duration::from_secs(minutes.unsigned_abs() * 60);
        let weak = Arc::downgrade(self);
        *timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(this) = weak.upgrade() else {
                    break;
                };
                // Own task so rescheduling never cancels a running cycle
                tokio::spawn(async move {
                    this.refresh().await;
                });
            }
        }));
        tracing::debug!("Refresh timer armed every {} min", minutes);
    }

    fn record_applied(&self, used: &UsageConfig) {
        let mut applied = write(&self.applied);
        // Interval changes belong to apply_settings, which also reschedules
        let interval = applied.refresh_interval_minutes;
        *applied = used.clone();
        applied.refresh_interval_minutes = interval;
    }

    fn set_state(&self, next: CycleState) {
        let mut state = write(&self.state);
        if *state != next {
            tracing::debug!("Refresh state {:?} -> {:?}", *state, next);
            *state = next;
        }
    }

    fn show(&self, view: IndicatorView) {
        self.host.indicator.show(&view);
        *write(&self.last_view) = view;
    }
}

impl Drop for RefreshOrchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
pub(crate) mod testing;

#[cfg(test)]
mod tests;
