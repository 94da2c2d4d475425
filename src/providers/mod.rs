//! Usage fetching: request descriptors, transport, response classification
//! and field extraction.

mod traits;
pub mod auth_check;
pub mod cursor;
pub mod extract;
pub mod http;

pub use traits::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub use auth_check::detect_auth_issue;
pub use extract::{extract_usage, UsageResult};
pub use http::HttpFetcher;

const BODY_SNIPPET_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

/// Everything needed to issue the usage request except the token
#[derive(Debug, Clone, PartialEq)]
pub struct UsageRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<serde_json::Value>,
}

/// Status and raw body of a rejected response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseInfo {
    pub status: u16,
    pub body: String,
}

impl ResponseInfo {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn snippet(&self) -> String {
        let trimmed = self.body.trim();
        if trimmed.chars().count() <= BODY_SNIPPET_CHARS {
            return trimmed.to_string();
        }
        let head: String = trimmed.chars().take(BODY_SNIPPET_CHARS).collect();
        format!("{}…", head)
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    /// 401/403, or a 2xx body that reports an auth failure
    #[error("Session token rejected (HTTP {})", .0.status)]
    Auth(ResponseInfo),
    #[error("Usage API returned HTTP {}: {}", .0.status, .0.snippet())]
    Request(ResponseInfo),
    #[error("Usage API returned invalid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Usage request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("{0}")]
    Validation(String),
}

impl FetchError {
    pub fn is_auth(&self) -> bool {
        matches!(self, FetchError::Auth(_))
    }

    pub fn response(&self) -> Option<&ResponseInfo> {
        match self {
            FetchError::Auth(info) | FetchError::Request(info) => Some(info),
            _ => None,
        }
    }
}
