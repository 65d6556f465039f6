use crate::api::client::is_transient_status;
use crate::config::StorageConnection;
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{http::HttpResponse, retry::RetryConfig, BehaviorVersion, Credentials, Region},
    error::{DisplayErrorContext, SdkError},
    primitives::ByteStream,
    Client,
};
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Acknowledgement of a completed object write.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub bucket: String,
    pub key: String,
    pub etag: Option<String>,
}

/// One entry of a prefix listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: i64,
}

/// Object-store abstraction over the four calls the pipeline makes.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Whether `bucket` exists.
    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    /// Create `bucket`. Fails with [`PipelineError::BucketAlreadyExists`]
    /// when someone else created it first.
    async fn create_bucket(&self, bucket: &str) -> Result<()>;

    /// Write `content` under `key`, replacing any previous object.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject>;

    /// All objects in `bucket` whose key starts with `prefix`, at any depth.
    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectSummary>>;
}

/// [`ObjectStore`] speaking the S3 protocol (MinIO or AWS).
///
/// Uses path-style addressing so bucket names never need DNS entries, and
/// bounds every call with `timeout`. SDK retries are off: each call is a
/// single attempt.
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    timeout: Duration,
}

impl S3ObjectStore {
    pub fn new(connection: &StorageConnection, timeout: Duration) -> Self {
        let credentials = Credentials::new(
            connection.access_key.clone(),
            connection.secret_key.clone(),
            None,
            None,
            "stock-market",
        );
        let s3_cfg = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .force_path_style(true)
            .endpoint_url(connection.endpoint_url.clone())
            .region(Region::new(connection.region.clone()))
            .credentials_provider(credentials)
            .retry_config(RetryConfig::disabled())
            .build();

        Self {
            client: Client::from_conf(s3_cfg),
            timeout,
        }
    }

    async fn bounded<T, F>(&self, op: &'static str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| PipelineError::Timeout {
                op,
                after: self.timeout,
            })?
    }
}

fn sdk_error<E>(op: &'static str, err: SdkError<E, HttpResponse>) -> PipelineError
where
    E: std::error::Error + 'static,
{
    let status = err.raw_response().map(|raw| raw.status().as_u16());
    let msg = DisplayErrorContext(&err).to_string();
    match err {
        SdkError::ServiceError(_) if !status.is_some_and(is_transient_status) => {
            PipelineError::Storage { op, msg }
        }
        _ => PipelineError::StorageUnavailable(format!("{op}: {msg}")),
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        self.bounded("head bucket", async {
            match self.client.head_bucket().bucket(bucket).send().await {
                Ok(_) => Ok(true),
                Err(err) => {
                    // MinIO answers a bare 404 that does not always decode as NotFound.
                    let missing = err.as_service_error().is_some_and(|e| e.is_not_found())
                        || err
                            .raw_response()
                            .is_some_and(|raw| raw.status().as_u16() == 404);
                    if missing {
                        Ok(false)
                    } else {
                        Err(sdk_error("head bucket", err))
                    }
                }
            }
        })
        .await
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        self.bounded("create bucket", async {
            match self.client.create_bucket().bucket(bucket).send().await {
                Ok(_) => Ok(()),
                Err(err) => {
                    let exists = err.as_service_error().is_some_and(|e| {
                        e.is_bucket_already_owned_by_you() || e.is_bucket_already_exists()
                    });
                    if exists {
                        Err(PipelineError::BucketAlreadyExists(bucket.to_string()))
                    } else {
                        Err(sdk_error("create bucket", err))
                    }
                }
            }
        })
        .await
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject> {
        let length = content.len() as i64;
        self.bounded("put object", async move {
            let output = self
                .client
                .put_object()
                .bucket(bucket)
                .key(key)
                .content_type(content_type)
                .content_length(length)
                .body(ByteStream::from(content))
                .send()
                .await
                .map_err(|e| sdk_error("put object", e))?;

            Ok(StoredObject {
                bucket: bucket.to_string(),
                key: key.to_string(),
                etag: output.e_tag().map(str::to_string),
            })
        })
        .await
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectSummary>> {
        self.bounded("list objects", async {
            let mut objects = Vec::new();
            let mut token: Option<String> = None;

            loop {
                let page = self
                    .client
                    .list_objects_v2()
                    .bucket(bucket)
                    .prefix(prefix)
                    .set_continuation_token(token.take())
                    .send()
                    .await
                    .map_err(|e| sdk_error("list objects", e))?;

                objects.extend(page.contents().iter().filter_map(|object| {
                    object.key().map(|key| ObjectSummary {
                        key: key.to_string(),
                        size: object.size().unwrap_or_default(),
                    })
                }));

                match page.next_continuation_token() {
                    Some(next) if page.is_truncated().unwrap_or(false) => {
                        token = Some(next.to_string())
                    }
                    _ => break,
                }
            }

            debug!(bucket, prefix, count = objects.len(), "listed objects");
            Ok(objects)
        })
        .await
    }
}
