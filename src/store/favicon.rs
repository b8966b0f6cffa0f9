//! Favicon blobs, kept next to the database as one file per asset.
//!
//! Assets are named by a random 64-char hex id which visit-history entries
//! reference. Nothing ties the two together: a file can outlive every entry
//! pointing at it and an entry can point at a file that was never written.
//! Every operation is best effort and reports failure as `None`/`false`.

use futures_util::future::BoxFuture;
use futures_util::StreamExt;
use rand::Rng;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub const ID_LEN: usize = 64;
const MAX_FAVICON_BYTES: usize = 1024 * 1024;
const FETCH_TIMEOUT_SECS: u64 = 10;

/// Source of favicon bytes. The default goes over HTTP; tests plug in a map.
pub trait FaviconFetcher: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, String>>;
}

/// Streams the body and gives up as soon as it passes `max_bytes`, either by
/// the declared `Content-Length` or by what has actually arrived.
pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self { client, max_bytes: MAX_FAVICON_BYTES }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl FaviconFetcher for HttpFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Result<Vec<u8>, String>> {
        Box::pin(async move {
            let parsed = url::Url::parse(url).map_err(|e| format!("parse url: {}", e))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(format!("unsupported scheme: {}", parsed.scheme()));
            }
            let resp = self
                .client
                .get(parsed)
                .send()
                .await
                .map_err(|e| format!("request: {}", e))?
                .error_for_status()
                .map_err(|e| format!("status: {}", e))?;
            if let Some(len) = resp.content_length() {
                if len > self.max_bytes as u64 {
                    return Err(format!("declared {} bytes, limit {}", len, self.max_bytes));
                }
            }

            let mut body = Vec::new();
            let mut stream = resp.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| format!("body: {}", e))?;
                if body.len() + chunk.len() > self.max_bytes {
                    return Err(format!("body over {} bytes", self.max_bytes));
                }
                body.extend_from_slice(&chunk);
            }
            Ok(body)
        })
    }
}

pub struct FaviconStore {
    dir: PathBuf,
    fetcher: Arc<dyn FaviconFetcher>,
}

impl FaviconStore {
    pub fn new(dir: impl Into<PathBuf>, fetcher: Arc<dyn FaviconFetcher>) -> Self {
        Self { dir: dir.into(), fetcher }
    }

    pub fn with_http(dir: impl Into<PathBuf>) -> Self {
        Self::new(dir, Arc::new(HttpFetcher::new()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Fetch `source_url` and store the bytes under a fresh id.
    /// Does not touch the document store, so no lock is held while fetching.
    pub async fn save(&self, source_url: &str) -> Option<String> {
        let bytes = match self.fetcher.fetch(source_url).await {
            Ok(b) => b,
            Err(e) => {
                tracing::debug!(url = source_url, error = %e, "favicon fetch failed");
                return None;
            }
        };
        if bytes.is_empty() || bytes.len() > MAX_FAVICON_BYTES {
            tracing::debug!(url = source_url, len = bytes.len(), "favicon size rejected");
            return None;
        }

        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            tracing::warn!(dir = %self.dir.display(), error = %e, "favicon dir unavailable");
            return None;
        }
        let id = generate_id();
        match tokio::fs::write(self.dir.join(&id), &bytes).await {
            Ok(()) => Some(id),
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "favicon write failed");
                None
            }
        }
    }

    pub async fn load(&self, id: &str) -> Option<Vec<u8>> {
        if !is_valid_id(id) {
            return None;
        }
        match tokio::fs::read(self.dir.join(id)).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                tracing::debug!(id, error = %e, "favicon not loaded");
                None
            }
        }
    }

    pub async fn remove(&self, id: &str) -> bool {
        is_valid_id(id) && tokio::fs::remove_file(self.dir.join(id)).await.is_ok()
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// 32 random bytes → 64 lowercase hex chars
pub fn generate_id() -> String {
    let mut bytes = [0u8; ID_LEN / 2];
    rand::thread_rng().fill(&mut bytes);
    hex_encode(&bytes)
}

/// Only ids of this exact shape ever become a path under the asset dir.
pub fn is_valid_id(id: &str) -> bool {
    id.len() == ID_LEN && id.bytes().all(|b| b.is_ascii_hexdigit())
}
