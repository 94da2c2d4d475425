//! Status indicator: the text/tooltip pair shown to the user

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::providers::UsageResult;
use crate::storage::DisplayMode;

const LABEL: &str = "Cursor";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndicatorStatus {
    Loading,
    Ok,
    NoData,
    MissingSettings,
    AuthExpired,
    Error,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorView {
    pub status: IndicatorStatus,
    pub text: String,
    pub tooltip: String,
}

/// Host-side widget that displays the indicator
pub trait StatusIndicator: Send + Sync {
    fn show(&self, view: &IndicatorView);

    /// One-shot message, e.g. a desktop notification
    fn notify(&self, message: &str);
}

pub fn placeholder_view() -> IndicatorView {
    IndicatorView {
        status: IndicatorStatus::Loading,
        text: format!("{}: …", LABEL),
        tooltip: "Waiting for the first usage refresh".to_string(),
    }
}

pub fn missing_settings_view() -> IndicatorView {
    IndicatorView {
        status: IndicatorStatus::MissingSettings,
        text: format!("{}: set token", LABEL),
        tooltip: "Session token or team settings missing. Run the update token command."
            .to_string(),
    }
}

pub fn auth_expired_view(detail: &str) -> IndicatorView {
    IndicatorView {
        status: IndicatorStatus::AuthExpired,
        text: format!("{}: token expired", LABEL),
        tooltip: format!("Session token was rejected: {}\nUpdate the token to resume.", detail),
    }
}

pub fn error_view(message: &str) -> IndicatorView {
    IndicatorView {
        status: IndicatorStatus::Error,
        text: format!("{}: error", LABEL),
        tooltip: message.to_string(),
    }
}

/// Render a successful extraction
pub fn render_usage(
    result: &UsageResult,
    mode: DisplayMode,
    updated_at: DateTime<Local>,
) -> IndicatorView {
    let Some(used) = result.used else {
        return IndicatorView {
            status: IndicatorStatus::NoData,
            text: format!("{}: no data", LABEL),
            tooltip: format!(
                "No usage figure found in the response\nUpdated: {}",
                updated_at.format("%H:%M:%S")
            ),
        };
    };

    let text = match (mode, result.percent) {
        (DisplayMode::Percent, Some(percent)) => format!("{} {:.0}%", LABEL, percent),
        _ => match result.limit {
            Some(limit) => format!("{} {} / {}", LABEL, format_usd(used), format_usd(limit)),
            None => format!("{} {}", LABEL, format_usd(used)),
        },
    };

    let mut lines = vec![format!("{} usage", LABEL)];
    lines.push(format!(
        "Used: {}{}",
        format_usd(used),
        provenance(result.used_path.as_deref())
    ));
    lines.push(match result.limit {
        Some(limit) => format!(
            "Limit: {}{}",
            format_usd(limit),
            provenance(result.limit_path.as_deref())
        ),
        None => "Limit: not reported".to_string(),
    });
    if let Some(percent) = result.percent {
        lines.push(format!("Usage: {:.1}%", percent));
    }
    lines.push(format!("Updated: {}", updated_at.format("%H:%M:%S")));

    IndicatorView {
        status: IndicatorStatus::Ok,
        text,
        tooltip: lines.join("\n"),
    }
}

/// Amounts come back in cents
pub fn format_usd(cents: f64) -> String {
    format!("${:.2}", cents / 100.0)
}

fn provenance(path: Option<&str>) -> String {
    path.map(|p| format!(" ({})", p)).unwrap_or_default()
}
