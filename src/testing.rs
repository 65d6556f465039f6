//! Recording fakes for the HTTP and object-store seams, plus a canned local
//! HTTP server for exercising the real clients.

use crate::api::client::{HttpClient, HttpResponse};
use crate::error::{PipelineError, Result};
use crate::storage::{ObjectStore, ObjectSummary, StoredObject};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Answers every GET with the same canned response and records the calls.
pub struct StubHttp {
    reply: Option<HttpResponse>,
    calls: Mutex<Vec<(String, BTreeMap<String, String>)>>,
}

impl StubHttp {
    pub fn ok(body: impl Into<String>) -> Self {
        Self::with_status(200, body)
    }

    pub fn with_status(status: u16, body: impl Into<String>) -> Self {
        Self {
            reply: Some(HttpResponse {
                status,
                body: body.into(),
            }),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Fails every call as if the host refused the connection.
    pub fn unreachable() -> Self {
        Self {
            reply: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, BTreeMap<String, String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClient for StubHttp {
    async fn get(&self, url: &str, headers: &BTreeMap<String, String>) -> Result<HttpResponse> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), headers.clone()));
        self.reply
            .clone()
            .ok_or_else(|| PipelineError::ApiUnavailable("connection refused".into()))
    }
}

#[derive(Default)]
struct MemoryState {
    buckets: BTreeSet<String>,
    objects: BTreeMap<(String, String), Vec<u8>>,
    exists_calls: usize,
    create_calls: usize,
    put_calls: usize,
}

/// In-memory object store with call counters.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
    lose_create_race: bool,
    reverse_listing: bool,
    offline: bool,
}

impl MemoryStore {
    pub fn with_bucket(bucket: &str) -> Self {
        let store = Self::default();
        store
            .state
            .lock()
            .unwrap()
            .buckets
            .insert(bucket.to_string());
        store
    }

    /// Fails bucket creation with `BucketAlreadyExists`, as when a concurrent
    /// run creates the bucket between our check and our create.
    pub fn losing_create_race() -> Self {
        Self {
            lose_create_race: true,
            ..Self::default()
        }
    }

    /// Serves listings in reverse key order.
    pub fn with_reversed_listing() -> Self {
        Self {
            reverse_listing: true,
            ..Self::default()
        }
    }

    /// Fails every call as if the endpoint were down.
    pub fn offline() -> Self {
        Self {
            offline: true,
            ..Self::default()
        }
    }

    pub fn insert(&self, bucket: &str, key: &str, content: &[u8]) {
        let mut state = self.state.lock().unwrap();
        state.buckets.insert(bucket.to_string());
        state
            .objects
            .insert((bucket.to_string(), key.to_string()), content.to_vec());
    }

    pub fn object(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    pub fn has_bucket(&self, bucket: &str) -> bool {
        self.state.lock().unwrap().buckets.contains(bucket)
    }

    pub fn exists_calls(&self) -> usize {
        self.state.lock().unwrap().exists_calls
    }

    pub fn create_calls(&self) -> usize {
        self.state.lock().unwrap().create_calls
    }

    pub fn put_calls(&self) -> usize {
        self.state.lock().unwrap().put_calls
    }

    fn check_online(&self) -> Result<()> {
        if self.offline {
            Err(PipelineError::StorageUnavailable(
                "connection refused".into(),
            ))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        self.check_online()?;
        let mut state = self.state.lock().unwrap();
        state.exists_calls += 1;
        Ok(state.buckets.contains(bucket))
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        self.check_online()?;
        let mut state = self.state.lock().unwrap();
        state.create_calls += 1;
        let created = state.buckets.insert(bucket.to_string());
        if self.lose_create_race || !created {
            return Err(PipelineError::BucketAlreadyExists(bucket.to_string()));
        }
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content: Vec<u8>,
        _content_type: &str,
    ) -> Result<StoredObject> {
        self.check_online()?;
        let mut state = self.state.lock().unwrap();
        state.put_calls += 1;
        if !state.buckets.contains(bucket) {
            return Err(PipelineError::Storage {
                op: "put object",
                msg: format!("NoSuchBucket: {bucket}"),
            });
        }
        state
            .objects
            .insert((bucket.to_string(), key.to_string()), content);
        Ok(StoredObject {
            bucket: bucket.to_string(),
            key: key.to_string(),
            etag: None,
        })
    }

    async fn list_objects(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectSummary>> {
        self.check_online()?;
        let state = self.state.lock().unwrap();
        let mut listing: Vec<ObjectSummary> = state
            .objects
            .iter()
            .filter(|((b, key), _)| b == bucket && key.starts_with(prefix))
            .map(|((_, key), content)| ObjectSummary {
                key: key.clone(),
                size: content.len() as i64,
            })
            .collect();
        if self.reverse_listing {
            listing.reverse();
        }
        Ok(listing)
    }
}

/// Local HTTP endpoint that answers every request with one canned response,
/// or reads requests and never answers.
pub struct CannedServer {
    addr: SocketAddr,
    requests: Arc<AtomicUsize>,
    accept: JoinHandle<()>,
}

impl CannedServer {
    /// Answers each request with `status_line` (e.g. `503 Service Unavailable`)
    /// and `body`, then closes the connection.
    pub async fn replying(status_line: &str, body: &str) -> Self {
        let response = format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: application/xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        Self::start(Some(response)).await
    }

    /// Accepts connections and reads requests but never writes a byte back.
    pub async fn silent() -> Self {
        Self::start(None).await
    }

    async fn start(response: Option<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(AtomicUsize::new(0));

        let counter = requests.clone();
        let accept = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                tokio::spawn(serve(socket, response.clone(), counter.clone()));
            }
        });

        Self {
            addr,
            requests,
            accept,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Requests whose headers were fully received so far.
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Drop for CannedServer {
    fn drop(&mut self) {
        self.accept.abort();
    }
}

async fn serve(mut socket: TcpStream, response: Option<String>, requests: Arc<AtomicUsize>) {
    let mut received = Vec::new();
    let mut buf = [0u8; 4096];
    while !received.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => received.extend_from_slice(&buf[..n]),
        }
    }
    requests.fetch_add(1, Ordering::SeqCst);

    match response {
        Some(response) => {
            if socket.write_all(response.as_bytes()).await.is_err() {
                return;
            }
            // Drain the rest of the request until the client hangs up.
            while let Ok(n) = socket.read(&mut buf).await {
                if n == 0 {
                    break;
                }
            }
        }
        None => tokio::time::sleep(Duration::from_secs(3600)).await,
    }
}

/// A port on localhost with nothing listening.
pub async fn refused_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}
