//! Cursor dashboard endpoints
//!
//! Uses cookie-based authentication with the WorkOS session token.
//! Endpoints:
//! - /api/dashboard/get-team-spend - Per-member team spend (POST, teamId body)
//! - /api/usage-summary - Individual plan usage (GET)

use std::collections::BTreeMap;

use super::{FetchError, HttpMethod, UsageRequest};
use crate::storage::{EndpointKind, UsageConfig};

pub const SESSION_COOKIE_NAME: &str = "WorkosCursorSessionToken";

const TEAM_SPEND_URL: &str = "https://cursor.com/api/dashboard/get-team-spend";
const USAGE_SUMMARY_URL: &str = "https://cursor.com/api/usage-summary";
const ORIGIN: &str = "https://cursor.com";
const REFERER: &str = "https://cursor.com/dashboard";
const USER_AGENT: &str = concat!("SpendBar/", env!("CARGO_PKG_VERSION"));

/// Build the request descriptor for the configured endpoint
pub fn usage_request(config: &UsageConfig) -> Result<UsageRequest, FetchError> {
    let url = resolve_url(config)?;
    match config.endpoint {
        EndpointKind::TeamSpend => {
            let team_id = parse_team_id(config.team_id())?;
            let mut headers = base_headers();
            headers.insert("Content-Type".to_string(), "application/json".to_string());
            Ok(UsageRequest {
                method: HttpMethod::Post,
                url,
                headers,
                body: Some(serde_json::json!({ "teamId": team_id })),
            })
        }
        EndpointKind::UsageSummary => Ok(UsageRequest {
            method: HttpMethod::Get,
            url,
            headers: base_headers(),
            body: None,
        }),
    }
}

/// Cookie header value for a stored token. A token pasted as a whole cookie
/// pair is sent as-is.
pub fn cookie_header(token: &str) -> String {
    let token = token.trim();
    if token
        .to_ascii_lowercase()
        .contains(&SESSION_COOKIE_NAME.to_ascii_lowercase())
    {
        return token.to_string();
    }
    cookie::Cookie::new(SESSION_COOKIE_NAME, token).to_string()
}

fn parse_team_id(team_id: Option<&str>) -> Result<i64, FetchError> {
    let raw = team_id.ok_or_else(|| FetchError::Validation("Team ID is not set".to_string()))?;
    raw.parse::<i64>()
        .map_err(|_| FetchError::Validation(format!("Team ID must be a number, got \"{}\"", raw)))
}

fn resolve_url(config: &UsageConfig) -> Result<String, FetchError> {
    let Some(custom) = config
        .endpoint_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
    else {
        return Ok(match config.endpoint {
            EndpointKind::TeamSpend => TEAM_SPEND_URL.to_string(),
            EndpointKind::UsageSummary => USAGE_SUMMARY_URL.to_string(),
        });
    };

    let parsed = url::Url::parse(custom)
        .map_err(|e| FetchError::Validation(format!("Invalid endpoint URL \"{}\": {}", custom, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(FetchError::Validation(format!(
            "Endpoint URL must use http or https, got \"{}\"",
            parsed.scheme()
        )));
    }
    Ok(parsed.to_string())
}

fn base_headers() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("Accept".to_string(), "application/json".to_string()),
        ("User-Agent".to_string(), USER_AGENT.to_string()),
        ("Origin".to_string(), ORIGIN.to_string()),
        ("Referer".to_string(), REFERER.to_string()),
    ])
}
