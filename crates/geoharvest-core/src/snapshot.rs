use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use thiserror::Error;

use geoharvest_parser::HarvestBatch;

pub const SNAPSHOT_PREFIX: &str = "country_data";
pub const SNAPSHOT_SUFFIX: &str = ".csv";

const NAME_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const HEADER: [&str; 7] = [
    "internal_id",
    "country",
    "region",
    "population_millions",
    "population",
    "collected_at",
    "unit",
];

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("CSV encoding error: {0}")]
    Csv(#[from] csv::Error),

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Artifact name for a snapshot taken at `stamp`. Every field is fixed-width
/// and zero-padded, so names sort lexicographically in creation order; the
/// retention policy relies on exactly that.
pub fn snapshot_file_name(stamp: &NaiveDateTime) -> String {
    format!(
        "{SNAPSHOT_PREFIX}_{}{SNAPSHOT_SUFFIX}",
        stamp.format(NAME_TIMESTAMP_FORMAT)
    )
}

/// Serializes a batch into a timestamped CSV under `dir` and returns the full
/// path. The header row is always written, even for an empty batch, and the
/// writer is flushed before the path is handed out.
pub fn write_snapshot(dir: &Path, batch: &HarvestBatch) -> Result<PathBuf, SnapshotError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(snapshot_file_name(&Local::now().naive_local()));
    let mut writer = csv::Writer::from_path(&path)?;

    writer.write_record(HEADER)?;
    for record in &batch.records {
        let millions = record.population_millions.to_string();
        let population = record.population.to_string();
        writer.write_record([
            record.internal_id.as_str(),
            record.country.as_str(),
            record.region.as_str(),
            millions.as_str(),
            population.as_str(),
            record.collected_at.as_str(),
            record.unit.as_str(),
        ])?;
    }
    writer.flush()?;

    Ok(path)
}
