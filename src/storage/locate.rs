use super::{ObjectStore, StoragePath};
use crate::error::{PipelineError, Result};
use std::sync::Arc;
use tracing::{debug, info};

/// Directory under each symbol's prefix where the formatting job writes its output.
pub const FORMATTED_DIR: &str = "formatted_prices";

/// Finds the CSV the formatting job produced for a stored record.
pub struct ArtifactLocator {
    store: Arc<dyn ObjectStore>,
}

impl ArtifactLocator {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Returns the key of the formatted CSV for `path`.
    ///
    /// Lists `<symbol>/formatted_prices/` in the path's bucket and keeps keys
    /// ending in `.csv`, so marker files such as `_SUCCESS` are ignored. When
    /// several CSVs match, the lexicographically smallest key wins regardless
    /// of listing order.
    ///
    /// # Errors
    /// Returns an error if `path` is not `<bucket>/<symbol>`, the listing
    /// fails, or no CSV exists yet
    pub async fn formatted_csv(&self, path: &str) -> Result<String> {
        let path: StoragePath = path.parse()?;
        let prefix = format!("{}/{FORMATTED_DIR}/", path.symbol);

        let objects = self.store.list_objects(&path.bucket, &prefix).await?;
        debug!(%path, %prefix, candidates = objects.len(), "listed formatted output");

        let csv = objects
            .into_iter()
            .filter(|object| object.key.starts_with(&prefix) && object.key.ends_with(".csv"))
            .min_by(|a, b| a.key.cmp(&b.key))
            .ok_or_else(|| PipelineError::ArtifactNotFound {
                bucket: path.bucket.clone(),
                prefix,
            })?;

        info!(%path, key = %csv.key, bytes = csv.size, "found formatted csv");
        Ok(csv.key)
    }
}
