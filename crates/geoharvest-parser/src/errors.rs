use thiserror::Error;

/// Why a single table row was dropped from a harvest. Row errors never abort
/// the batch; they are collected alongside it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    #[error("data row {row_index} has {cells} cells, expected at least 3")]
    TooFewCells { row_index: usize, cells: usize },
}

impl RowError {
    /// 1-based position of the offending row among the data rows.
    pub fn row_index(&self) -> usize {
        match self {
            RowError::TooFewCells { row_index, .. } => *row_index,
        }
    }
}
