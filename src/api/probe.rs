use super::client::HttpClient;
use crate::config::ApiConnection;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// Result of one availability check.
///
/// `url` is always the resolved query URL so the caller can hand it to the
/// fetch stage once `done` is true.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeOutcome {
    pub done: bool,
    pub url: String,
}

/// Checks whether the market-data API answers before prices are fetched.
///
/// Never fails: anything short of a JSON object coming back is reported as
/// `done == false` so the caller can poll again.
pub struct AvailabilityProbe {
    connection: ApiConnection,
    client: Arc<dyn HttpClient>,
}

impl AvailabilityProbe {
    pub fn new(connection: ApiConnection, client: Arc<dyn HttpClient>) -> Self {
        Self { connection, client }
    }

    /// Issues one request to `host + endpoint` with the connection's headers.
    pub async fn poke(&self) -> ProbeOutcome {
        let url = self.connection.query_url();

        let done = match self.client.get(&url, &self.connection.headers).await {
            Ok(response) => {
                let structured = serde_json::from_str::<Value>(&response.body)
                    .map(|body| body.is_object())
                    .unwrap_or(false);
                if !structured {
                    warn!(%url, status = response.status, "API answered without a JSON object");
                }
                structured
            }
            Err(err) => {
                warn!(%url, error = %err, "API not reachable");
                false
            }
        };

        if done {
            info!(%url, "API available");
        }
        ProbeOutcome { done, url }
    }
}
