use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::Path;

/// Load classification entries from a saved response object
/// (`{"beatsPrediction": [...]}`) or a bare array of entries.
pub fn read_predictions(path: &Path) -> Result<Vec<Value>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let value: Value = serde_json::from_str(&text)
        .with_context(|| format!("{} is not JSON", path.display()))?;
    match value {
        Value::Array(entries) => Ok(entries),
        Value::Object(mut map) => match map.remove("beatsPrediction") {
            Some(Value::Array(entries)) => Ok(entries),
            _ => bail!("{} has no beatsPrediction array", path.display()),
        },
        _ => bail!("{} holds neither an object nor an array", path.display()),
    }
}
