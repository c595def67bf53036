pub mod errors;
pub mod extract;
pub mod model;

pub use errors::RowError;
pub use extract::{extract_table, TIMESTAMP_FORMAT};
pub use model::{CountryRecord, HarvestBatch, POPULATION_UNIT, UNKNOWN_REGION};
