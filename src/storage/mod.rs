pub mod locate;
pub mod persist;
pub mod store;

pub use locate::ArtifactLocator;
pub use persist::PricePersister;
pub use store::{ObjectStore, S3ObjectStore};

#[cfg(test)]
pub use store::{ObjectSummary, StoredObject};

use crate::error::PipelineError;
use std::fmt;
use std::str::FromStr;

/// Handle of one persisted raw record, rendered as `<bucket>/<symbol>`.
///
/// This is the string the formatting job receives and the locator parses back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePath {
    pub bucket: String,
    pub symbol: String,
}

impl StoragePath {
    pub fn new(bucket: impl Into<String>, symbol: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            symbol: symbol.into(),
        }
    }
}

impl fmt::Display for StoragePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.symbol)
    }
}

impl FromStr for StoragePath {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((bucket, symbol))
                if !bucket.is_empty() && !symbol.is_empty() && !symbol.contains('/') =>
            {
                Ok(Self::new(bucket, symbol))
            }
            _ => Err(PipelineError::InvalidPath(s.to_string())),
        }
    }
}
