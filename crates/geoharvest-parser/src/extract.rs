use chrono::Local;
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

use crate::errors::RowError;
use crate::model::{CountryRecord, HarvestBatch, POPULATION_UNIT, UNKNOWN_REGION};

/// Format of `CountryRecord::collected_at`, captured once per batch.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const ID_PREFIX: &str = "CSV_";
const ID_SUFFIX: &str = "_00";
const ID_NAME_MAX_CHARS: usize = 20;

static TABLE: Lazy<Selector> = Lazy::new(|| Selector::parse("table").unwrap());
static ROW: Lazy<Selector> = Lazy::new(|| Selector::parse("tr").unwrap());
static CELL: Lazy<Selector> = Lazy::new(|| Selector::parse("td, th").unwrap());
static LINK: Lazy<Selector> = Lazy::new(|| Selector::parse("a").unwrap());

/// Extracts country records from the first table of a rendered page.
///
/// Total over arbitrary input: a missing table yields an empty batch, a
/// malformed row is dropped and recorded, and nothing here returns an error.
/// The first row of the table is always treated as a header and skipped.
/// Ordinals are 1-based positions among the data rows; a dropped row still
/// consumes its position, so its neighbours keep stable ids across harvests.
pub fn extract_table(html: &str) -> HarvestBatch {
    let document = Html::parse_document(html);
    let Some(table) = document.select(&TABLE).next() else {
        return HarvestBatch::default();
    };

    let collected_at = Local::now().format(TIMESTAMP_FORMAT).to_string();
    let mut batch = HarvestBatch::default();

    for (position, row) in table.select(&ROW).skip(1).enumerate() {
        match extract_row(row, position + 1, &collected_at) {
            Ok(record) => batch.records.push(record),
            Err(err) => batch.dropped.push(err),
        }
    }

    batch
}

fn extract_row(
    row: ElementRef<'_>,
    ordinal: usize,
    collected_at: &str,
) -> Result<CountryRecord, RowError> {
    let cells: Vec<ElementRef<'_>> = row.select(&CELL).collect();
    if cells.len() < 3 {
        return Err(RowError::TooFewCells {
            row_index: ordinal,
            cells: cells.len(),
        });
    }

    // Positional layout of the source table: cell 0 is the rank, cell 1 the
    // country, cell 2 the population, cell 3 (when present) the region.
    let country = linked_text(cells[1]);
    let population = parse_population(&cell_text(cells[2]));
    let region = if cells.len() > 3 {
        linked_text(cells[3])
    } else {
        UNKNOWN_REGION.to_string()
    };

    Ok(CountryRecord {
        internal_id: internal_id(&country, ordinal),
        country,
        region,
        population,
        population_millions: population as f64 / 1_000_000.0,
        collected_at: collected_at.to_string(),
        unit: POPULATION_UNIT.to_string(),
    })
}

/// Builds the stable per-row id: `CSV_<NAME>_<NNN>_00`, where the name is
/// uppercased, space-to-underscore, and capped at 20 characters.
pub(crate) fn internal_id(name: &str, ordinal: usize) -> String {
    let base: String = name
        .to_uppercase()
        .replace(' ', "_")
        .chars()
        .take(ID_NAME_MAX_CHARS)
        .collect();
    format!("{ID_PREFIX}{base}_{ordinal:03}{ID_SUFFIX}")
}

/// Total population parse: keeps ASCII digits, drops grouping separators and
/// any other junk. Empty or overflowing input collapses to zero.
pub(crate) fn parse_population(raw: &str) -> i64 {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    digits.parse().unwrap_or(0)
}

/// Text of a cell, preferring the first embedded hyperlink when one exists.
fn linked_text(cell: ElementRef<'_>) -> String {
    match cell.select(&LINK).next() {
        Some(link) => normalize_text(link.text()),
        None => cell_text(cell),
    }
}

fn cell_text(cell: ElementRef<'_>) -> String {
    normalize_text(cell.text())
}

/// Joins text nodes with internal whitespace collapsed to single spaces and
/// the ends trimmed.
fn normalize_text<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    let mut out = String::new();
    for part in parts {
        for word in part.split_whitespace() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(word);
        }
    }
    out
}
