use serde::Serialize;

use crate::errors::RowError;

/// Unit label attached to every record of a harvest.
pub const POPULATION_UNIT: &str = "People";

/// Region value used when the source row carries no region cell.
pub const UNKNOWN_REGION: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountryRecord {
    pub internal_id: String,
    pub country: String,
    pub region: String,
    pub population: i64,
    pub population_millions: f64,
    pub collected_at: String,
    pub unit: String,
}

/// One extraction pass over a rendered page: the records that survived, in
/// document order, plus the per-row failures that were dropped on the way.
/// An empty batch is a normal outcome, not an error.
#[derive(Debug, Clone, Default)]
pub struct HarvestBatch {
    pub records: Vec<CountryRecord>,
    pub dropped: Vec<RowError>,
}

impl HarvestBatch {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn dropped_rows(&self) -> usize {
        self.dropped.len()
    }
}
