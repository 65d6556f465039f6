use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::time::Duration;

/// Status and body of a completed HTTP exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_transient(&self) -> bool {
        is_transient_status(self.status)
    }
}

/// Statuses worth another attempt later: rate limiting and server errors.
pub fn is_transient_status(status: u16) -> bool {
    status == 429 || status >= 500
}

/// HTTP abstraction (so stages can be driven by fakes in tests).
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Issue a GET with exactly the given headers and return status and body.
    async fn get(&self, url: &str, headers: &BTreeMap<String, String>) -> Result<HttpResponse>;
}

/// [`HttpClient`] backed by a shared `reqwest::Client`.
///
/// Every request is bounded by the client-wide timeout; an elapsed timeout
/// surfaces as [`PipelineError::Timeout`] instead of hanging the stage.
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestClient {
    /// Creates a client whose requests are bounded by `timeout`.
    ///
    /// # Errors
    /// Returns an error if the TLS backend cannot be initialised
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::ApiUnavailable(format!("cannot build HTTP client: {e}")))?;

        Ok(Self { client, timeout })
    }

    fn transport_error(&self, err: reqwest::Error) -> PipelineError {
        if err.is_timeout() {
            PipelineError::Timeout {
                op: "http get",
                after: self.timeout,
            }
        } else {
            PipelineError::ApiUnavailable(err.to_string())
        }
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str, headers: &BTreeMap<String, String>) -> Result<HttpResponse> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        Ok(HttpResponse { status, body })
    }
}
