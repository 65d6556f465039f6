use crate::format_job::FormatJob;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

pub const DEFAULT_API_HOST: &str = "https://query1.finance.yahoo.com/";
pub const DEFAULT_API_ENDPOINT: &str = "/v8/finance/chart/";
pub const DEFAULT_BUCKET: &str = "stock-market";

/// Connection descriptor for the market-data API.
///
/// # Fields
/// * `host`: Scheme and host, e.g. `https://query1.finance.yahoo.com/`
/// * `endpoint`: Path of the chart endpoint, appended to `host` as-is
/// * `headers`: Request headers sent verbatim with every call
#[derive(Debug, Clone, PartialEq)]
pub struct ApiConnection {
    pub host: String,
    pub endpoint: String,
    pub headers: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct ApiExtra {
    endpoint: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
}

impl ApiConnection {
    /// Builds a connection from a host and the JSON "extra" blob
    /// (`{"endpoint": "...", "headers": {...}}`) the connection store keeps.
    ///
    /// # Errors
    /// Returns an error if the blob is not valid JSON or lacks `endpoint`
    pub fn from_extra(host: impl Into<String>, extra: &str) -> Result<Self> {
        let extra: ApiExtra =
            serde_json::from_str(extra).context("invalid API connection extra")?;
        Ok(Self {
            host: host.into(),
            endpoint: extra.endpoint,
            headers: extra.headers,
        })
    }

    /// The query URL handed to the fetch stage.
    ///
    /// Host and endpoint are concatenated without touching slashes, so
    /// `https://h/` + `/v8/` yields `https://h//v8/`.
    pub fn query_url(&self) -> String {
        format!("{}{}", self.host, self.endpoint)
    }
}

impl Default for ApiConnection {
    fn default() -> Self {
        let headers = [
            ("Content-Type", "application/json"),
            ("User-Agent", "Mozilla/5.0"),
            ("Accept", "application/json"),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .collect();

        Self {
            host: DEFAULT_API_HOST.to_string(),
            endpoint: DEFAULT_API_ENDPOINT.to_string(),
            headers,
        }
    }
}

/// Credentials and endpoint of the S3-compatible object store.
#[derive(Clone, PartialEq)]
pub struct StorageConnection {
    pub access_key: String,
    pub secret_key: String,
    pub endpoint_url: String,
    pub region: String,
}

// Keep the secret out of logs.
impl std::fmt::Debug for StorageConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConnection")
            .field("access_key", &self.access_key)
            .field("secret_key", &"***")
            .field("endpoint_url", &self.endpoint_url)
            .field("region", &self.region)
            .finish()
    }
}

/// Runtime settings for one pipeline run.
///
/// Resolves both connection descriptors plus the timeouts and poll policy
/// the runner needs. Stages never read the environment themselves; they get
/// their descriptors from here.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api: ApiConnection,
    pub storage: StorageConnection,
    pub symbol: String,
    pub interval: String,
    pub range: String,
    pub bucket: String,
    pub http_timeout: Duration,
    pub storage_timeout: Duration,
    pub poke_interval: Duration,
    pub probe_timeout: Duration,
    pub format_job: Option<FormatJob>,
}

impl Settings {
    /// Loads settings from the process environment, after reading `.env` if present.
    ///
    /// # Errors
    /// Returns an error if a required variable is missing or a value does not parse
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup.
    ///
    /// # Arguments
    /// * `lookup`: Returns the raw value for a variable name, or `None` when unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let required = |key: &str| lookup(key).ok_or_else(|| anyhow!("{key} must be set"));
        let secs = |key: &str, default: u64| -> Result<Duration> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .with_context(|| format!("{key} must be a whole number of seconds")),
                None => Ok(Duration::from_secs(default)),
            }
        };

        let host = get("STOCK_API_HOST", DEFAULT_API_HOST);
        let api = match lookup("STOCK_API_EXTRA") {
            Some(extra) => ApiConnection::from_extra(host, &extra)?,
            None => ApiConnection {
                host,
                ..ApiConnection::default()
            },
        };

        let storage = StorageConnection {
            access_key: required("MINIO_LOGIN")?,
            secret_key: required("MINIO_PASSWORD")?,
            endpoint_url: get("MINIO_ENDPOINT_URL", "http://minio:9000"),
            region: get("MINIO_REGION", "us-east-1"),
        };

        let format_job = match lookup("FORMAT_JOB_IMAGE") {
            Some(image) => Some(FormatJob {
                image,
                container_name: get("FORMAT_JOB_CONTAINER", "format_prices"),
                docker_host: lookup("FORMAT_JOB_DOCKER_HOST"),
                network: lookup("FORMAT_JOB_NETWORK"),
                timeout: secs("FORMAT_JOB_TIMEOUT_SECS", 600)?,
            }),
            None => None,
        };

        Ok(Self {
            api,
            storage,
            symbol: get("STOCK_SYMBOL", "NVDA"),
            interval: get("STOCK_INTERVAL", "1d"),
            range: get("STOCK_RANGE", "1y"),
            bucket: get("STOCK_BUCKET", DEFAULT_BUCKET),
            http_timeout: secs("HTTP_TIMEOUT_SECS", 30)?,
            storage_timeout: secs("STORAGE_TIMEOUT_SECS", 30)?,
            poke_interval: secs("PROBE_POKE_INTERVAL_SECS", 30)?,
            probe_timeout: secs("PROBE_TIMEOUT_SECS", 300)?,
            format_job,
        })
    }
}
