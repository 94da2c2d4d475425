//! reqwest-backed transport

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use super::cursor::cookie_header;
use super::{FetchError, HttpMethod, ResponseInfo, UsageRequest, UsageTransport};
use crate::debug_settings;

pub struct HttpFetcher {
    client: reqwest::Client,
}

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

impl HttpFetcher {
    /// Client with the standard request timeout
    pub fn try_new() -> Result<Self, FetchError> {
        Self::with_timeout(REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Like [`HttpFetcher::try_new`], falling back to a client without a
    /// timeout if the builder fails
    pub fn new() -> Self {
        Self::try_new().unwrap_or_else(|err| {
            tracing::warn!("HTTP client setup failed, requests have no timeout: {}", err);
            Self {
                client: reqwest::Client::new(),
            }
        })
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a status and body to the parsed JSON document or a classified error
pub fn classify_response(status: u16, body: &str) -> Result<serde_json::Value, FetchError> {
    if status == StatusCode::UNAUTHORIZED.as_u16() || status == StatusCode::FORBIDDEN.as_u16() {
        return Err(FetchError::Auth(ResponseInfo::new(status, body)));
    }
    if !(200..300).contains(&status) {
        return Err(FetchError::Request(ResponseInfo::new(status, body)));
    }
    Ok(serde_json::from_str(body)?)
}

#[async_trait]
impl UsageTransport for HttpFetcher {
    async fn request(
        &self,
        request: &UsageRequest,
        token: &str,
    ) -> Result<serde_json::Value, FetchError> {
        let mut builder = match request.method {
            HttpMethod::Get => self.client.get(&request.url),
            HttpMethod::Post => self.client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = builder.header("Cookie", cookie_header(token));
        if let Some(body) = &request.body {
            builder = builder.body(serde_json::to_vec(body)?);
        }

        tracing::debug!(
            "{:?} {} with token {}",
            request.method,
            request.url,
            debug_settings::redact_secret(token)
        );

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        tracing::debug!("Usage API responded HTTP {} ({} bytes)", status, body.len());

        classify_response(status, &body)
    }

    fn name(&self) -> &'static str {
        "cursor-http"
    }
}
