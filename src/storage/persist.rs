use super::{ObjectStore, StoragePath};
use crate::error::{PipelineError, Result};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Name of the raw-record object under each symbol's prefix.
pub const RAW_OBJECT_NAME: &str = "prices.json";

#[derive(Deserialize)]
struct RecordHeader {
    meta: RecordHeaderMeta,
}

#[derive(Deserialize)]
struct RecordHeaderMeta {
    symbol: String,
}

/// Writes serialized stock records into the object store.
///
/// The target bucket is created on first use. Creation is check-then-act;
/// an "already exists" answer from a concurrent creator is treated as success.
pub struct PricePersister {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl PricePersister {
    /// Creates a persister writing into `bucket`.
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    /// Persists one serialized record and returns its storage path.
    ///
    /// The record bytes are written verbatim to `<symbol>/prices.json`.
    ///
    /// # Arguments
    /// * `record`: JSON produced by the fetch stage; only `meta.symbol` is read
    ///
    /// # Errors
    /// Returns an error if:
    /// - The record is not JSON or has no usable `meta.symbol`
    /// - The object store is unreachable or rejects a call
    ///
    /// # Returns
    /// The storage path `<bucket>/<symbol>`
    pub async fn store_prices(&self, record: &str) -> Result<String> {
        let symbol = record_symbol(record)?;

        self.ensure_bucket().await?;

        let key = raw_object_key(&symbol);
        let stored = self
            .store
            .put_object(
                &self.bucket,
                &key,
                record.as_bytes().to_vec(),
                "application/json",
            )
            .await?;

        let path = StoragePath::new(stored.bucket, symbol);
        info!(%path, key = %stored.key, etag = ?stored.etag, bytes = record.len(), "stored prices");
        Ok(path.to_string())
    }

    async fn ensure_bucket(&self) -> Result<()> {
        if self.store.bucket_exists(&self.bucket).await? {
            return Ok(());
        }

        match self.store.create_bucket(&self.bucket).await {
            Ok(()) => {
                info!(bucket = %self.bucket, "created bucket");
                Ok(())
            }
            Err(PipelineError::BucketAlreadyExists(_)) => {
                debug!(bucket = %self.bucket, "bucket created concurrently");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}

/// Object key of the raw record for `symbol`.
pub fn raw_object_key(symbol: &str) -> String {
    format!("{symbol}/{RAW_OBJECT_NAME}")
}

fn record_symbol(record: &str) -> Result<String> {
    let header: RecordHeader = serde_json::from_str(record)
        .map_err(|e| PipelineError::InvalidRecord(format!("missing meta.symbol: {e}")))?;
    let symbol = header.meta.symbol.trim().to_string();

    if symbol.is_empty() || symbol.contains('/') {
        return Err(PipelineError::InvalidRecord(format!(
            "unusable symbol {:?}",
            header.meta.symbol
        )));
    }

    Ok(symbol)
}
