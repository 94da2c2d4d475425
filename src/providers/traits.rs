//! Transport trait definition

use async_trait::async_trait;
use super::{FetchError, UsageRequest};

/// Issues the usage request and returns the parsed body of a 2xx response
#[async_trait]
pub trait UsageTransport: Send + Sync {
    /// Send `request` authenticated with `token`; one attempt, no retry
    async fn request(
        &self,
        request: &UsageRequest,
        token: &str,
    ) -> Result<serde_json::Value, FetchError>;

    /// Transport name for logs
    fn name(&self) -> &'static str {
        "http"
    }
}
