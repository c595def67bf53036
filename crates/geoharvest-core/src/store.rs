// crates/geoharvest-core/src/store.rs

use std::path::Path;

use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::config::Config;

/// Only files with this suffix are considered managed snapshots; anything
/// else living in the bucket is left alone.
pub const MANAGED_SUFFIX: &str = ".csv";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage endpoint misconfigured: {message}")]
    Configuration { message: String },

    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("storage {operation} of '{name}' returned status {status}")]
    UnexpectedStatus {
        operation: &'static str,
        name: String,
        status: u16,
    },

    #[error("failed to read snapshot '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// Configuration faults are caller bugs and must surface immediately;
    /// everything else is treated as transient.
    pub fn is_configuration(&self) -> bool {
        matches!(self, StoreError::Configuration { .. })
    }
}

#[derive(Debug, Deserialize)]
struct ObjectEntry {
    name: String,
}

/// Client for a Supabase-style storage bucket holding at most
/// `max_objects` snapshots, oldest-first eviction by object name.
pub struct StorageClient {
    http: Client,
    endpoint: String,
    api_key: String,
    bucket: String,
    max_objects: usize,
}

impl StorageClient {
    pub fn new(config: &Config) -> Result<Self, StoreError> {
        let http = Client::builder().timeout(config.http_timeout).build()?;
        Ok(Self {
            http,
            endpoint: config.supabase_url.trim_end_matches('/').to_string(),
            api_key: config.supabase_key.clone(),
            bucket: config.supabase_bucket.clone(),
            max_objects: config.max_bucket_files,
        })
    }

    pub fn max_objects(&self) -> usize {
        self.max_objects
    }

    /// Names of managed snapshots currently in the bucket, unsorted.
    pub async fn list_snapshots(&self) -> Result<Vec<String>, StoreError> {
        self.ensure_http_endpoint()?;

        let response = self
            .http
            .get(self.list_url())
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::UnexpectedStatus {
                operation: "listing",
                name: self.bucket.clone(),
                status: status.as_u16(),
            });
        }

        let entries: Vec<ObjectEntry> = response.json().await?;
        Ok(entries
            .into_iter()
            .map(|entry| entry.name)
            .filter(|name| name.ends_with(MANAGED_SUFFIX))
            .collect())
    }

    /// Deletes oldest snapshots until fewer than `max_objects` remain, so the
    /// upload that follows lands within the retention bound.
    ///
    /// Best effort by design: a failed listing is treated as an empty bucket
    /// (retention must never block an upload), and a failed delete moves on
    /// to the next-oldest name. Only a configuration fault is returned.
    pub async fn evict_to_capacity(&self) -> Result<Vec<String>, StoreError> {
        self.ensure_http_endpoint()?;

        let mut names = match self.list_snapshots().await {
            Ok(names) => names,
            Err(err) if err.is_configuration() => return Err(err),
            Err(err) => {
                warn!("bucket listing failed, skipping eviction this cycle: {err}");
                return Ok(Vec::new());
            }
        };
        names.sort();

        let mut evicted = Vec::new();
        while !names.is_empty() && names.len() >= self.max_objects {
            let oldest = names.remove(0);
            match self.delete_object(&oldest).await {
                Ok(()) => {
                    info!(object = %oldest, "Evicted snapshot to respect the retention bound");
                    evicted.push(oldest);
                }
                Err(err) if err.is_configuration() => return Err(err),
                Err(err) => {
                    warn!(object = %oldest, "eviction delete failed, moving to next oldest: {err}");
                }
            }
        }

        Ok(evicted)
    }

    /// Uploads a local snapshot under its file name, upserting on collision.
    /// On success the local file is removed and the object name returned; on
    /// failure the local file stays on disk for the operator.
    pub async fn upload_snapshot(&self, path: &Path) -> Result<String, StoreError> {
        self.ensure_http_endpoint()?;

        let Some(name) = path.file_name().and_then(|name| name.to_str()) else {
            return Err(StoreError::Io {
                path: path.display().to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "snapshot path has no utf-8 file name",
                ),
            });
        };
        let body = tokio::fs::read(path).await.map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let response = self
            .http
            .post(self.object_url(name))
            .bearer_auth(&self.api_key)
            .header("x-upsert", "true")
            .header(CONTENT_TYPE, "text/csv")
            .body(body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::UnexpectedStatus {
                operation: "upload",
                name: name.to_string(),
                status: status.as_u16(),
            });
        }

        // The remote copy is authoritative once the upload succeeds.
        if let Err(err) = tokio::fs::remove_file(path).await {
            warn!(path = %path.display(), "could not remove uploaded snapshot: {err}");
        }

        Ok(name.to_string())
    }

    pub async fn delete_object(&self, name: &str) -> Result<(), StoreError> {
        self.ensure_http_endpoint()?;

        let response = self
            .http
            .delete(self.object_url(name))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::UnexpectedStatus {
                operation: "delete",
                name: name.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    fn ensure_http_endpoint(&self) -> Result<(), StoreError> {
        let lower = self.endpoint.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Ok(());
        }
        Err(StoreError::Configuration {
            message: format!(
                "'{}' is not an http(s) url; the storage API needs the project \
                 REST endpoint, not a database connection string",
                self.endpoint
            ),
        })
    }

    fn object_url(&self, name: &str) -> String {
        format!("{}/storage/v1/object/{}/{}", self.endpoint, self.bucket, name)
    }

    fn list_url(&self) -> String {
        format!("{}/storage/v1/object/list/{}", self.endpoint, self.bucket)
    }
}
