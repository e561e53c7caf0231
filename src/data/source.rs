use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use flate2::read::GzDecoder;
use reqwest::Client;
use serde_json::Value;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Where widgets fetch their backing data files from.
///
/// Paths are relative names such as `"hm_80202_5.json"`; each source
/// decides how they are resolved. Files ending in `.gz` are decompressed
/// transparently.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Short name used in logs (e.g. "fs", "http")
    fn name(&self) -> &str;

    /// Fetch a data file as text
    async fn fetch(&self, path: &str) -> Result<String>;

    /// Fetch and parse a JSON data file
    async fn fetch_json(&self, path: &str) -> Result<Value> {
        let text = self.fetch(path).await?;
        serde_json::from_str(&text).with_context(|| format!("Failed to parse JSON in {}", path))
    }
}

fn is_compressed(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext == "gz")
        .unwrap_or(false)
}

fn decompress(bytes: &[u8], path: &str) -> Result<String> {
    let mut decoder = GzDecoder::new(bytes);
    let mut text = String::new();
    decoder
        .read_to_string(&mut text)
        .with_context(|| format!("Failed to decompress {}", path))?;
    Ok(text)
}

/// Data files under a local directory
#[derive(Debug, Clone)]
pub struct FsDataSource {
    root: PathBuf,
}

impl FsDataSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl DataSource for FsDataSource {
    fn name(&self) -> &str {
        "fs"
    }

    async fn fetch(&self, path: &str) -> Result<String> {
        let full_path = self.root.join(path);
        debug!(path = %full_path.display(), "Reading data file");

        if is_compressed(path) {
            let bytes = tokio::fs::read(&full_path)
                .await
                .with_context(|| format!("Failed to open data file {}", full_path.display()))?;
            decompress(&bytes, path)
        } else {
            tokio::fs::read_to_string(&full_path)
                .await
                .with_context(|| format!("Failed to read data file {}", full_path.display()))
        }
    }
}

/// Data files served over HTTP as static files
#[derive(Debug, Clone)]
pub struct HttpDataSource {
    http_client: Client,
    base_url: String,
}

impl HttpDataSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl DataSource for HttpDataSource {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, path: &str) -> Result<String> {
        let url = self.url(path);
        debug!(url = %url, "Fetching data file");

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("Failed to send request for {}", url))?;

        let status = response.status();
        if !status.is_success() {
            return Err(anyhow!("Data file request for {} failed: {}", url, status));
        }

        if is_compressed(path) {
            let bytes = response
                .bytes()
                .await
                .with_context(|| format!("Failed to read response body of {}", url))?;
            decompress(&bytes, path)
        } else {
            response
                .text()
                .await
                .with_context(|| format!("Failed to read response body of {}", url))
        }
    }
}

/// In-memory data files, for headless runs and tests
#[derive(Debug, Default)]
pub struct MemoryDataSource {
    files: DashMap<String, String>,
}

impl MemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<String>, contents: impl Into<String>) {
        self.files.insert(path.into(), contents.into());
    }

    pub fn with_file(self, path: impl Into<String>, contents: impl Into<String>) -> Self {
        self.insert(path, contents);
        self
    }
}

#[async_trait]
impl DataSource for MemoryDataSource {
    fn name(&self) -> &str {
        "memory"
    }

    async fn fetch(&self, path: &str) -> Result<String> {
        self.files
            .get(path)
            .map(|contents| contents.value().clone())
            .ok_or_else(|| anyhow!("No data file named {}", path))
    }
}
