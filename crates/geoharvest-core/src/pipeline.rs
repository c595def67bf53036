use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use geoharvest_parser::{extract_table, HarvestBatch};

use crate::config::Config;
use crate::fetch::PageFetcher;
use crate::snapshot::write_snapshot;
use crate::store::{StorageClient, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleStatus {
    /// Nothing to upload this cycle: the fetch failed or the page had no
    /// extractable rows.
    Skipped,
    Uploaded,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub status: CycleStatus,
    pub records: usize,
    pub dropped_rows: usize,
    pub artifact: Option<String>,
    pub evicted: Vec<String>,
    pub error: Option<String>,
}

impl CycleReport {
    fn skipped(dropped_rows: usize, error: Option<String>) -> Self {
        Self {
            status: CycleStatus::Skipped,
            records: 0,
            dropped_rows,
            artifact: None,
            evicted: Vec::new(),
            error,
        }
    }

    fn failed(batch: &HarvestBatch, evicted: Vec<String>, error: String) -> Self {
        Self {
            status: CycleStatus::Failed,
            records: batch.len(),
            dropped_rows: batch.dropped_rows(),
            artifact: None,
            evicted,
            error: Some(error),
        }
    }
}

/// One harvest pipeline wired to a page source and a storage bucket. The
/// scheduler owns the cadence; this type owns a single cycle.
pub struct Pipeline {
    fetcher: Box<dyn PageFetcher>,
    store: StorageClient,
    source_url: String,
    render_timeout: Duration,
    snapshot_dir: PathBuf,
}

impl Pipeline {
    pub fn new(config: &Config, fetcher: Box<dyn PageFetcher>) -> Result<Self, StoreError> {
        Ok(Self {
            fetcher,
            store: StorageClient::new(config)?,
            source_url: config.source_url.clone(),
            render_timeout: config.render_timeout,
            snapshot_dir: config.snapshot_dir.clone(),
        })
    }

    /// Runs one fetch → extract → serialize → evict → upload cycle.
    ///
    /// Never panics and never returns an error: every failure is absorbed
    /// into the report, so one bad cycle cannot take the schedule down.
    pub async fn run_cycle(&self) -> CycleReport {
        let html = match self
            .fetcher
            .fetch(&self.source_url, self.render_timeout)
            .await
        {
            Ok(html) => html,
            Err(err) => {
                warn!("page fetch failed, skipping this cycle: {err}");
                return CycleReport::skipped(0, Some(err.to_string()));
            }
        };

        let batch = extract_table(&html);
        if batch.dropped_rows() > 0 {
            warn!(
                dropped = batch.dropped_rows(),
                "Dropped malformed rows during extraction"
            );
        }
        if batch.is_empty() {
            info!("Extraction produced no records, nothing to upload");
            return CycleReport::skipped(batch.dropped_rows(), None);
        }

        let path = match write_snapshot(&self.snapshot_dir, &batch) {
            Ok(path) => path,
            Err(err) => {
                warn!("snapshot serialization failed: {err}");
                return CycleReport::failed(&batch, Vec::new(), err.to_string());
            }
        };

        let evicted = match self.store.evict_to_capacity().await {
            Ok(evicted) => evicted,
            Err(err) => {
                warn!("eviction aborted: {err}");
                return CycleReport::failed(&batch, Vec::new(), err.to_string());
            }
        };

        match self.store.upload_snapshot(&path).await {
            Ok(artifact) => {
                info!(
                    artifact = %artifact,
                    records = batch.len(),
                    evicted = evicted.len(),
                    "Snapshot uploaded"
                );
                CycleReport {
                    status: CycleStatus::Uploaded,
                    records: batch.len(),
                    dropped_rows: batch.dropped_rows(),
                    artifact: Some(artifact),
                    evicted,
                    error: None,
                }
            }
            Err(err) => {
                warn!(path = %path.display(), "upload failed, keeping the local snapshot: {err}");
                CycleReport::failed(&batch, evicted, err.to_string())
            }
        }
    }
}
