//! Durable object storage backends.
//!
//! Writes never overwrite: an existing object at the target path is reported
//! as [`StorageWriteError::AlreadyExists`].

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::error::StorageWriteError;
use crate::types::StoredObjectReference;

/// A bucketed object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    fn name(&self) -> &str;

    /// Write a new object. Fails if one already exists at `reference`.
    async fn put(
        &self,
        reference: &StoredObjectReference,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageWriteError>;

    /// Public URL for an object.
    fn public_url(&self, reference: &StoredObjectReference) -> String;

    /// Cheap reachability check.
    async fn probe(&self) -> Result<(), String>;
}

/// Object store laid out as `{root}/{bucket}/{path}` on local disk.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn object_path(&self, reference: &StoredObjectReference) -> PathBuf {
        self.root.join(&reference.bucket).join(&reference.path)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn put(
        &self,
        reference: &StoredObjectReference,
        bytes: Vec<u8>,
        _content_type: &str,
    ) -> Result<(), StorageWriteError> {
        let path = self.object_path(reference);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StorageWriteError::AlreadyExists {
                    bucket: reference.bucket.clone(),
                    path: reference.path.clone(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = file.write_all(&bytes).await {
            drop(file);
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e.into());
        }
        file.flush().await?;
        Ok(())
    }

    fn public_url(&self, reference: &StoredObjectReference) -> String {
        let path = self.object_path(reference);
        let absolute = std::path::absolute(&path).unwrap_or(path);
        format!("file://{}", absolute.display())
    }

    async fn probe(&self) -> Result<(), String> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| format!("{}: {e}", self.root.display()))
    }
}

/// Supabase-style storage REST API.
pub struct HttpObjectStore {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpObjectStore {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client: reqwest::Client::new(),
            timeout,
        }
    }

    fn object_url(&self, reference: &StoredObjectReference) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url, reference.bucket, reference.path
        )
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    fn name(&self) -> &str {
        "http"
    }

    async fn put(
        &self,
        reference: &StoredObjectReference,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageWriteError> {
        let resp = self
            .client
            .post(self.object_url(reference))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("apikey", &self.api_key)
            .header("Content-Type", content_type)
            .header("x-upsert", "false")
            .body(bytes)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| StorageWriteError::Request {
                message: format!("{e}"),
                status_code: None,
            })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        if status.as_u16() == 409 || body.contains("Duplicate") {
            return Err(StorageWriteError::AlreadyExists {
                bucket: reference.bucket.clone(),
                path: reference.path.clone(),
            });
        }
        Err(StorageWriteError::Request {
            message: format!("HTTP {status}: {body}"),
            status_code: Some(status.as_u16()),
        })
    }

    fn public_url(&self, reference: &StoredObjectReference) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, reference.bucket, reference.path
        )
    }

    async fn probe(&self) -> Result<(), String> {
        let resp = self
            .client
            .get(format!("{}/storage/v1/bucket", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("apikey", &self.api_key)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| format!("{e}"))?;

        // Any answer short of a server error means storage is reachable
        if resp.status().is_server_error() {
            return Err(format!("HTTP {}", resp.status()));
        }
        Ok(())
    }
}
