//! Raw JSON access to upstream sources.
//!
//! [`HttpTransport`] owns the transport details only: URL building, API key
//! header, timeout and HTTP status mapping. Typed parsing and validation live
//! in the source clients.

use super::config::SourceConfig;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::{Client, header};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use url::Url;

const MAX_ERROR_BODY_CHARS: usize = 256;
const API_KEY_HEADER: &str = "X-Api-Key";

#[async_trait]
pub trait SourceTransport: Send + Sync {
    /// GET `path` relative to the source's base URL and decode the JSON body
    async fn get_json(&self, path: &str) -> SyncResult<Value>;
}

/// Reqwest-backed transport for one upstream API
pub struct HttpTransport {
    source_name: &'static str,
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpTransport {
    pub fn new(source_name: &'static str, config: &SourceConfig, timeout: Duration) -> SyncResult<Self> {
        let base_url = config.url()?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::transport(source_name, e))?;
        Ok(Self {
            source_name,
            client,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    fn endpoint(&self, path: &str) -> SyncResult<Url> {
        let joined = format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        Url::parse(&joined).map_err(|e| SyncError::transport(self.source_name, e))
    }
}

#[async_trait]
impl SourceTransport for HttpTransport {
    async fn get_json(&self, path: &str) -> SyncResult<Value> {
        let url = self.endpoint(path)?;
        let mut request = self.client.get(url).header(header::ACCEPT, "application/json");
        if let Some(api_key) = &self.api_key {
            request = request.header(API_KEY_HEADER, api_key.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| SyncError::transport(self.source_name, e))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| SyncError::transport(self.source_name, e))?;

        if !status.is_success() {
            let body: String = String::from_utf8_lossy(&body).chars().take(MAX_ERROR_BODY_CHARS).collect();
            return Err(SyncError::UpstreamStatus {
                source_name: self.source_name.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_slice(&body).map_err(|e| SyncError::decode(self.source_name, e))
    }
}

/// In-process transport serving canned JSON by path.
///
/// Unknown paths answer HTTP 404. Paths registered through
/// [`StaticTransport::fail_next`] fail with a transport error that many times
/// before serving their response.
pub struct StaticTransport {
    source_name: &'static str,
    responses: DashMap<String, Value>,
    pending_failures: DashMap<String, usize>,
    calls: DashMap<String, usize>,
    total_calls: AtomicUsize,
}

impl StaticTransport {
    pub fn new(source_name: &'static str) -> Self {
        Self {
            source_name,
            responses: DashMap::new(),
            pending_failures: DashMap::new(),
            calls: DashMap::new(),
            total_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_response(self, path: &str, body: Value) -> Self {
        self.respond(path, body);
        self
    }

    pub fn respond(&self, path: &str, body: Value) {
        self.responses.insert(path.to_string(), body);
    }

    pub fn fail_next(&self, path: &str, times: usize) {
        self.pending_failures.insert(path.to_string(), times);
    }

    pub fn calls(&self, path: &str) -> usize {
        self.calls.get(path).map(|count| *count).unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SourceTransport for StaticTransport {
    async fn get_json(&self, path: &str) -> SyncResult<Value> {
        self.total_calls.fetch_add(1, Ordering::Relaxed);
        *self.calls.entry(path.to_string()).or_insert(0) += 1;

        if let Some(mut remaining) = self.pending_failures.get_mut(path) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(SyncError::transport(self.source_name, "connection reset"));
            }
        }

        self.responses
            .get(path)
            .map(|body| body.value().clone())
            .ok_or_else(|| SyncError::UpstreamStatus {
                source_name: self.source_name.to_string(),
                status: 404,
                body: format!("no such resource: {}", path),
            })
    }
}
