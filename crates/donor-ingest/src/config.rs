//! Pipeline configuration files.
//!
//! Two external inputs steer the derivation: the outlier range JSON and the
//! contraindication code CSV. Both are read once at startup and fail fast
//! with the offending path in the error.

use std::path::Path;

use anyhow::{Context, Result};

use donor_model::{ContraindicationList, OutlierConfig};

/// Column holding the codes in the contraindication CSV.
const ICD_CODE_COLUMN: &str = "ICD-10-CM";

/// Load the outlier range configuration from JSON.
pub fn load_outlier_config(path: &Path) -> Result<OutlierConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read outlier config: {}", path.display()))?;
    let config: OutlierConfig = serde_json::from_str(&text)
        .with_context(|| format!("invalid outlier config: {}", path.display()))?;
    tracing::debug!(
        path = %path.display(),
        tables = config.tables.len(),
        "loaded outlier config"
    );
    Ok(config)
}

/// Load the contraindication code list from its curated CSV.
///
/// The file must carry an `ICD-10-CM` column; codes are normalized on load.
pub fn load_contraindications(path: &Path) -> Result<ContraindicationList> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("failed to read contraindication list: {}", path.display()))?;

    let headers = reader.headers()?.clone();
    let code_idx = headers
        .iter()
        .position(|h| h.trim() == ICD_CODE_COLUMN)
        .with_context(|| {
            format!(
                "contraindication list {} has no {ICD_CODE_COLUMN:?} column",
                path.display()
            )
        })?;

    let mut codes = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(code) = record.get(code_idx) {
            codes.push(code.to_string());
        }
    }

    let list = ContraindicationList::from_raw_codes(codes);
    if list.is_empty() {
        tracing::warn!(path = %path.display(), "contraindication list is empty");
    } else {
        tracing::debug!(path = %path.display(), codes = list.len(), "loaded contraindication list");
    }
    Ok(list)
}
