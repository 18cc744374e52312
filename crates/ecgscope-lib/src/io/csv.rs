use anyhow::{Context, Result};
use csv::ReaderBuilder;
use std::path::Path;

/// Load one numeric column (matched case-insensitively, quotes ignored) from
/// a headed CSV export such as `'sample #','MLII','V5'`.
pub fn read_csv_column(path: &Path, column: &str) -> Result<Vec<f64>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let headers = reader.headers()?.clone();
    let idx = headers
        .iter()
        .position(|h| h.trim_matches('\'').eq_ignore_ascii_case(column))
        .with_context(|| format!("missing column '{column}' in {}", path.display()))?;
    let mut values = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("reading row {}", row + 1))?;
        let cell = record
            .get(idx)
            .with_context(|| format!("row {} has no column '{column}'", row + 1))?;
        let value = cell
            .parse::<f64>()
            .with_context(|| format!("row {}: '{cell}' is not a number", row + 1))?;
        values.push(value);
    }
    Ok(values)
}
