use super::client::HttpClient;
use crate::error::{PipelineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// One symbol's chart result, as returned in `chart.result[0]`.
///
/// The fields the pipeline relies on are typed; everything else the API sends
/// is kept in the flattened `extra` maps so a serialize/deserialize cycle does
/// not drop data.
///
/// # Fields
/// * `meta`: Instrument metadata, always carrying `symbol`
/// * `timestamp`: Session timestamps in Unix seconds
/// * `indicators`: Price series aligned with `timestamp`
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct StockRecord {
    pub meta: RecordMeta,
    #[serde(default)]
    pub timestamp: Vec<i64>,
    #[serde(default)]
    pub indicators: Indicators,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RecordMeta {
    pub symbol: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Indicators {
    #[serde(default)]
    pub quote: Vec<QuoteSeries>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Open/close series; entries are `None` where the API reports `null`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct QuoteSeries {
    #[serde(default)]
    pub close: Vec<Option<f64>>,
    #[serde(default)]
    pub open: Vec<Option<f64>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StockRecord {
    /// Session timestamps as UTC datetimes, skipping values out of chrono's range.
    pub fn sessions(&self) -> Vec<DateTime<Utc>> {
        self.timestamp
            .iter()
            .filter_map(|ts| DateTime::from_timestamp(*ts, 0))
            .collect()
    }
}

/// Fetches daily prices for a symbol from the chart API.
///
/// Performs one request per call. Transient failures are reported as
/// retryable errors and never retried here.
pub struct PriceFetcher {
    client: Arc<dyn HttpClient>,
    headers: BTreeMap<String, String>,
    interval: String,
    range: String,
}

impl PriceFetcher {
    /// Creates a fetcher sending `headers` with every request, asking for
    /// daily bars over one year.
    pub fn new(client: Arc<dyn HttpClient>, headers: BTreeMap<String, String>) -> Self {
        Self {
            client,
            headers,
            interval: "1d".to_string(),
            range: "1y".to_string(),
        }
    }

    /// Overrides the chart `interval` and `range` query parameters.
    pub fn with_window(mut self, interval: impl Into<String>, range: impl Into<String>) -> Self {
        self.interval = interval.into();
        self.range = range.into();
        self
    }

    /// Request URL for `symbol` under the resolved query URL.
    pub fn chart_url(&self, url: &str, symbol: &str) -> String {
        format!("{url}{symbol}?interval={}&range={}", self.interval, self.range)
    }

    /// Fetches the chart for `symbol` and returns `chart.result[0]` as JSON.
    ///
    /// # Arguments
    /// * `url`: Query URL produced by the availability probe
    /// * `symbol`: Ticker to fetch (e.g., "NVDA")
    ///
    /// # Errors
    /// Returns an error if:
    /// - The API is unreachable, times out, or answers 429/5xx
    /// - The body is not valid JSON or the result lacks `meta.symbol`
    /// - `chart.result` is missing or empty
    ///
    /// # Returns
    /// The extracted record serialized as a JSON string
    pub async fn fetch(&self, url: &str, symbol: &str) -> Result<String> {
        if symbol.trim().is_empty() {
            return Err(PipelineError::InvalidRecord("empty symbol".into()));
        }

        let request_url = self.chart_url(url, symbol);
        debug!(url = %request_url, "requesting chart");

        let response = self.client.get(&request_url, &self.headers).await?;
        if response.is_transient() {
            return Err(PipelineError::ApiUnavailable(format!(
                "chart request for {symbol} answered {}",
                response.status
            )));
        }

        let record = parse_chart(symbol, &response.body)?;
        let sessions = record.sessions();
        info!(
            symbol = %record.meta.symbol,
            sessions = sessions.len(),
            first = ?sessions.first(),
            last = ?sessions.last(),
            "fetched prices"
        );

        serde_json::to_string(&record)
            .map_err(|e| PipelineError::Parse(format!("cannot serialize {symbol} record: {e}")))
    }
}

/// Extracts `chart.result[0]` from a chart API body.
///
/// # Errors
/// Returns [`PipelineError::Parse`] for invalid JSON or a result without
/// `meta.symbol`, and [`PipelineError::DataUnavailable`] when the result list
/// is missing, null, or empty
pub fn parse_chart(symbol: &str, body: &str) -> Result<StockRecord> {
    let payload: Value = serde_json::from_str(body)
        .map_err(|e| PipelineError::Parse(format!("chart response for {symbol}: {e}")))?;

    let first = match payload.pointer("/chart/result/0") {
        Some(first) => first.clone(),
        None => {
            let reason = payload
                .pointer("/chart/error/description")
                .and_then(Value::as_str)
                .unwrap_or("empty chart result");
            return Err(PipelineError::DataUnavailable {
                symbol: symbol.to_string(),
                reason: reason.to_string(),
            });
        }
    };

    serde_json::from_value(first)
        .map_err(|e| PipelineError::Parse(format!("chart result for {symbol}: {e}")))
}
