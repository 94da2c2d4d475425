use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use spendbar_lib::commands::{self, HostCommand};
use spendbar_lib::debug_settings;
use spendbar_lib::login::{self, Prompter};
use spendbar_lib::providers::HttpFetcher;
use spendbar_lib::refresh::{HostBindings, RefreshOrchestrator, RefreshOutcome};
use spendbar_lib::storage::{
    CredentialStore, MemorySecretStore, SecretStore, SecureStorage, SettingsStore,
};
use spendbar_lib::terminal::{
    describe_settings, LineRouter, TerminalIndicator, TerminalPrompter, TerminalSettingsUi,
};
use spendbar_lib::tray::IndicatorView;

const SETTINGS_POLL: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug)]
struct CliArgs {
    command: String,
    format: OutputFormat,
    pretty: bool,
    verbose: bool,
    ephemeral: bool,
    token: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusPayload {
    #[serde(flatten)]
    view: IndicatorView,
    #[serde(skip_serializing_if = "Option::is_none")]
    used: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    used_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit_path: Option<String>,
    updated_at: String,
}

#[tokio::main]
async fn main() {
    let args = parse_args(std::env::args().skip(1).collect());
    if args.command == "--help" || args.command == "-h" {
        print_help();
        return;
    }
    if args.command == "--version" || args.command == "-V" {
        println!("spendbar {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    spendbar_lib::init_logging();

    let result = match args.command.as_str() {
        "status" => run_status(args).await,
        "watch" => run_watch(args).await,
        "set-token" => run_set_token(args).await,
        "logout" => run_logout(args),
        "settings" => run_settings(),
        _ => Err(format!(
            "Unknown command: {}. Use --help for usage.",
            args.command
        )),
    };

    let code = match result {
        Ok(()) => 0,
        Err(message) => {
            eprintln!("{message}");
            1
        }
    };
    let _ = std::io::stdout().flush();
    // A stdin read still blocked on its thread would stall runtime shutdown
    std::process::exit(code);
}

fn parse_args(mut argv: Vec<String>) -> CliArgs {
    let mut format = OutputFormat::Text;
    let mut pretty = false;
    let mut verbose = false;
    let mut ephemeral = false;
    let mut token = None;
    let mut command = String::new();

    if let Some(first) = argv.first() {
        if !first.starts_with('-') {
            command = argv.remove(0);
        }
    }

    if command.is_empty() {
        command = "status".to_string();
    }

    let mut iter = argv.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--format" => {
                if let Some(value) = iter.next() {
                    if value == "json" {
                        format = OutputFormat::Json;
                    } else if value == "text" {
                        format = OutputFormat::Text;
                    }
                }
            }
            "--json" => format = OutputFormat::Json,
            "--pretty" => pretty = true,
            "--verbose" | "-v" => verbose = true,
            "--ephemeral" => ephemeral = true,
            "--help" | "-h" | "--version" | "-V" => {
                command = arg;
                break;
            }
            value if !value.starts_with('-') && token.is_none() => {
                token = Some(value.to_string());
            }
            _ => {}
        }
    }

    CliArgs {
        command,
        format,
        pretty,
        verbose,
        ephemeral,
        token,
    }
}

fn settings_store() -> Result<SettingsStore, String> {
    SettingsStore::default_location().map_err(|err| format!("{err:#}"))
}

fn credential_store(args: &CliArgs, settings: &SettingsStore) -> CredentialStore {
    let secrets: Arc<dyn SecretStore> = if args.ephemeral {
        Arc::new(MemorySecretStore::new())
    } else {
        Arc::new(SecureStorage::new())
    };
    CredentialStore::new(secrets, settings.clone())
}

fn build_orchestrator(
    args: &CliArgs,
    prompter: TerminalPrompter,
    echo: bool,
) -> Result<Arc<RefreshOrchestrator>, String> {
    let settings = settings_store()?;
    let credentials = credential_store(args, &settings);
    let host = HostBindings {
        indicator: Arc::new(TerminalIndicator::new(echo, args.verbose)),
        prompter: Arc::new(prompter),
        settings_ui: Arc::new(TerminalSettingsUi),
    };
    Ok(RefreshOrchestrator::new(
        credentials,
        settings,
        Arc::new(HttpFetcher::try_new().map_err(|err| err.to_string())?),
        host,
    ))
}

async fn run_status(args: CliArgs) -> Result<(), String> {
    let orchestrator = build_orchestrator(&args, TerminalPrompter::stdin(), false)?;
    debug_settings::set_file_logging(orchestrator.applied_config().debug_file_logging);

    let outcome = orchestrator.refresh().await;
    let view = orchestrator.current_view();
    let result = match &outcome {
        RefreshOutcome::Rendered(result) => Some(result.clone()),
        _ => None,
    };

    match args.format {
        OutputFormat::Text => {
            println!("{}", view.text);
            if args.verbose || result.is_some() {
                println!("{}", view.tooltip);
            }
        }
        OutputFormat::Json => {
            let result = result.unwrap_or_default();
            let payload = StatusPayload {
                view,
                used: result.used,
                limit: result.limit,
                percent: result.percent,
                used_path: result.used_path,
                limit_path: result.limit_path,
                updated_at: chrono::Utc::now().to_rfc3339(),
            };
            print_json(&payload, args.pretty)?;
        }
    }

    match outcome {
        RefreshOutcome::Rendered(_) => Ok(()),
        RefreshOutcome::MissingSettings => {
            Err("Session token missing. Run `spendbar set-token`.".to_string())
        }
        RefreshOutcome::AuthRecovery(_) => {
            Err("Session token rejected. Run `spendbar set-token`.".to_string())
        }
        RefreshOutcome::Failed(message) => Err(message),
        RefreshOutcome::Skipped => Ok(()),
    }
}

async fn run_watch(args: CliArgs) -> Result<(), String> {
    let router = LineRouter::stdin();
    let orchestrator = build_orchestrator(&args, TerminalPrompter::new(router.clone()), true)?;
    let settings_path = orchestrator.settings().path().to_path_buf();

    eprintln!("Watching Cursor usage. Commands: refresh, token, settings, quit");
    orchestrator.start().await;

    let mut poll = tokio::time::interval(SETTINGS_POLL);
    let mut stamp = modified_at(&settings_path);

    loop {
        tokio::select! {
            line = router.next_command() => {
                let Some(line) = line else {
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if matches!(line, "quit" | "q" | "exit") {
                    break;
                }
                match line.parse::<HostCommand>() {
                    Ok(command) => {
                        let result = commands::dispatch(&orchestrator, command).await;
                        if !result.success {
                            eprintln!("{}", result.message);
                        }
                    }
                    Err(message) => eprintln!("{message}"),
                }
            }
            _ = poll.tick() => {
                let current = modified_at(&settings_path);
                if current != stamp {
                    stamp = current;
                    match orchestrator.reload_settings().await {
                        Ok(change) if !change.is_empty() => {
                            tracing::info!("Settings changed: {:?}", change);
                        }
                        Ok(_) => {}
                        Err(err) => eprintln!("Ignoring settings change: {err:#}"),
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    orchestrator.shutdown();
    Ok(())
}

async fn run_set_token(args: CliArgs) -> Result<(), String> {
    let settings = settings_store()?;
    let credentials = credential_store(&args, &settings);

    let token = match args.token.clone() {
        Some(token) => Some(token),
        None => {
            let prompter = TerminalPrompter::stdin();
            login::prompt_token(&prompter as &dyn Prompter).await
        }
    };
    let token = token
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .ok_or_else(|| "No token given".to_string())?;

    credentials.set(&token).map_err(|err| format!("{err:#}"))?;
    println!(
        "Session token saved ({})",
        debug_settings::redact_secret(&token)
    );
    Ok(())
}

fn run_logout(args: CliArgs) -> Result<(), String> {
    let settings = settings_store()?;
    credential_store(&args, &settings)
        .clear()
        .map_err(|err| format!("{err:#}"))?;
    println!("Session token removed");
    Ok(())
}

fn run_settings() -> Result<(), String> {
    let settings = settings_store()?;
    println!("{}", describe_settings(settings.path()));
    Ok(())
}

fn modified_at(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

fn print_json<T: Serialize>(payload: &T, pretty: bool) -> Result<(), String> {
    let output = if pretty {
        serde_json::to_string_pretty(payload)
    } else {
        serde_json::to_string(payload)
    }
    .map_err(|err| err.to_string())?;
    println!("{output}");
    Ok(())
}

fn print_help() {
    println!(
        "spendbar {}\n\nUsage:\n  spendbar status [--format text|json] [--pretty] [--verbose]\n  spendbar watch [--verbose]\n  spendbar set-token [TOKEN]\n  spendbar logout\n  spendbar settings\n\nCommands:\n  status     Fetch usage once and print it\n  watch      Keep refreshing; type refresh, token, settings or quit\n  set-token  Store the Cursor session token (prompts when omitted)\n  logout     Remove the stored session token\n  settings   Print the settings file location and contents\n\nFlags:\n  --format <text|json>  Output format\n  --json               Shortcut for --format json\n  --pretty             Pretty-print JSON output\n  -v, --verbose        Print tooltip details\n  --ephemeral          Keep the token in memory only\n  -h, --help           Show help\n  -V, --version        Show version\n\nEnvironment:\n  SPENDBAR_SETTINGS    Settings file path override\n  RUST_LOG             Log filter (default spendbar=info)",
        env!("CARGO_PKG_VERSION")
    );
}
