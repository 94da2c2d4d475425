//! Terminal host: prints the indicator, asks questions on stdin
//!
//! Prompts and watch-mode commands share one stdin. A [`LineRouter`] task
//! owns the reader. A waiting prompt gets the next line first; any other line
//! is queued until a prompt or the command loop takes it, so input typed
//! ahead of a prompt is not lost.

use std::collections::VecDeque;
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Local;
use once_cell::sync::OnceCell;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::{oneshot, Notify};

use crate::commands::SettingsUi;
use crate::login::{PromptRequest, Prompter};
use crate::tray::{IndicatorView, StatusIndicator};

#[derive(Default)]
struct RouterState {
    pending: Option<oneshot::Sender<String>>,
    backlog: VecDeque<String>,
    closed: bool,
}

#[derive(Clone)]
pub struct LineRouter {
    state: Arc<Mutex<RouterState>>,
    arrived: Arc<Notify>,
}

impl LineRouter {
    /// Route lines from the process stdin
    pub fn stdin() -> Self {
        Self::spawn(BufReader::new(tokio::io::stdin()))
    }

    /// Start routing lines from `reader` until it ends
    pub fn spawn<R>(reader: R) -> Self
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let router = Self {
            state: Arc::new(Mutex::new(RouterState::default())),
            arrived: Arc::new(Notify::new()),
        };

        let task = router.clone();
        tokio::spawn(async move {
            let mut lines = reader.lines();
            loop {
                let line = match lines.next_line().await {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(err) => {
                        tracing::warn!("Failed to read stdin: {}", err);
                        break;
                    }
                };
                task.deliver(line);
            }

            let mut state = task.lock();
            state.closed = true;
            state.pending.take();
            drop(state);
            task.arrived.notify_waiters();
        });

        router
    }

    fn deliver(&self, line: String) {
        let mut state = self.lock();
        let line = match state.pending.take() {
            Some(answer) => match answer.send(line) {
                Ok(()) => return,
                // Prompt went away before the line arrived
                Err(line) => line,
            },
            None => line,
        };
        state.backlog.push_back(line);
        drop(state);
        self.arrived.notify_waiters();
    }

    /// Next line for a prompt: queued input first, otherwise the next line
    /// read. `None` once input has ended.
    pub async fn next_answer(&self) -> Option<String> {
        let (sender, receiver) = oneshot::channel();
        {
            let mut state = self.lock();
            if let Some(line) = state.backlog.pop_front() {
                return Some(line);
            }
            if state.closed {
                return None;
            }
            state.pending = Some(sender);
        }
        receiver.await.ok()
    }

    /// Next line nobody prompted for. Cancel-safe: dropping the future
    /// leaves the line queued.
    pub async fn next_command(&self) -> Option<String> {
        loop {
            let arrived = self.arrived.notified();
            {
                let mut state = self.lock();
                if let Some(line) = state.backlog.pop_front() {
                    return Some(line);
                }
                if state.closed {
                    return None;
                }
            }
            arrived.await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, RouterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct TerminalPrompter {
    router: OnceCell<LineRouter>,
}

impl TerminalPrompter {
    /// Prompts on stdin; the reader starts with the first prompt
    pub fn stdin() -> Self {
        Self {
            router: OnceCell::new(),
        }
    }

    /// Prompts through a router shared with a command loop
    pub fn new(router: LineRouter) -> Self {
        Self {
            router: OnceCell::with_value(router),
        }
    }

    fn router(&self) -> &LineRouter {
        self.router.get_or_init(LineRouter::stdin)
    }
}

#[async_trait]
impl Prompter for TerminalPrompter {
    async fn input(&self, request: PromptRequest) -> Option<String> {
        let mut prompt = format!("{} [{}]", request.prompt, request.placeholder);
        if request.secret {
            prompt.push_str(" (input is echoed)");
        }
        eprint!("{}: ", prompt);
        let _ = std::io::stderr().flush();

        self.router()
            .next_answer()
            .await
            .map(|answer| answer.trim().to_string())
    }

    async fn choose(&self, message: &str, options: &[&str]) -> Option<usize> {
        eprintln!("{}", message);
        for (index, option) in options.iter().enumerate() {
            eprintln!("  {}) {}", index + 1, option);
        }
        eprint!("Choose 1-{} (empty to dismiss): ", options.len());
        let _ = std::io::stderr().flush();

        let answer = self.router().next_answer().await?;
        parse_choice(&answer, options.len())
    }
}

fn parse_choice(answer: &str, count: usize) -> Option<usize> {
    let number: usize = answer.trim().parse().ok()?;
    (1..=count).contains(&number).then(|| number - 1)
}

/// Prints every indicator update to stdout
pub struct TerminalIndicator {
    echo: bool,
    verbose: bool,
}

impl TerminalIndicator {
    /// `echo` off keeps stdout free for a final report (the `status` command)
    pub fn new(echo: bool, verbose: bool) -> Self {
        Self { echo, verbose }
    }
}

impl StatusIndicator for TerminalIndicator {
    fn show(&self, view: &IndicatorView) {
        tracing::debug!("Indicator: {} ({:?})", view.text, view.status);
        if !self.echo {
            return;
        }
        println!("[{}] {}", Local::now().format("%H:%M:%S"), view.text);
        if self.verbose {
            for line in view.tooltip.lines() {
                println!("    {}", line);
            }
        }
    }

    fn notify(&self, message: &str) {
        eprintln!("! {}", message);
    }
}

/// Shows where the settings live and what they contain
pub struct TerminalSettingsUi;

impl SettingsUi for TerminalSettingsUi {
    fn open_settings(&self, settings_path: &Path) {
        println!("{}", describe_settings(settings_path));
    }
}

pub fn describe_settings(settings_path: &Path) -> String {
    let contents = match std::fs::read_to_string(settings_path) {
        Ok(contents) if !contents.trim().is_empty() => contents,
        Ok(_) => "(empty, defaults apply)".to_string(),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            "(not created yet, defaults apply)".to_string()
        }
        Err(err) => format!("(unreadable: {})", err),
    };
    format!("Settings file: {}\n{}", settings_path.display(), contents.trim_end())
}
