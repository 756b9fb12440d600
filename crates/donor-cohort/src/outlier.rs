//! Range-based outlier handling.
//!
//! Values outside their configured `[min, max]` range are set to null before
//! any derivation runs. Rows are never dropped and in-range values are never
//! touched, so applying the same configuration twice is a no-op.

use anyhow::{Context, Result};
use polars::prelude::*;

use donor_model::outlier::ColumnRanges;
use donor_model::tables::col as c;
use donor_model::{OutlierConfig, Range, SourceTable};

/// Category column that scopes per-category ranges for a table.
fn category_column(table: SourceTable) -> Option<&'static str> {
    match table {
        SourceTable::Vitals => Some(c::VITAL_CATEGORY),
        SourceTable::Labs => Some(c::LAB_CATEGORY),
        SourceTable::PatientAssessments => Some(c::ASSESSMENT_CATEGORY),
        _ => None,
    }
}

fn out_of_range(value: Expr, range: Range) -> Expr {
    value
        .clone()
        .lt(lit(range.min))
        .or(value.gt(lit(range.max)))
}

/// Null out-of-range values in `df` per the configuration for `table`.
///
/// Columns named in the configuration but absent from the data are skipped
/// with a debug log; unknown tables pass through untouched.
pub fn apply_outlier_ranges(
    df: DataFrame,
    table: SourceTable,
    config: &OutlierConfig,
) -> Result<DataFrame> {
    let Some(columns) = config.table(table.name()) else {
        return Ok(df);
    };

    let mut exprs: Vec<Expr> = Vec::new();
    for (column, ranges) in columns {
        if df.column(column).is_err() {
            tracing::debug!(table = %table, column, "outlier column not in data, skipping");
            continue;
        }
        let value = col(column.as_str()).cast(DataType::Float64);
        let expr = match ranges {
            ColumnRanges::Flat(range) => when(out_of_range(value.clone(), *range))
                .then(lit(NULL))
                .otherwise(value),
            ColumnRanges::ByCategory(by_category) => {
                let Some(category) = category_column(table) else {
                    anyhow::bail!(
                        "outlier config for {table}.{column} is category-scoped but {table} has no category column"
                    );
                };
                let category = col(category).str().to_lowercase();
                let mut acc = value.clone();
                for (name, range) in by_category {
                    let hit = category
                        .clone()
                        .eq(lit(name.to_lowercase()))
                        .and(out_of_range(value.clone(), *range));
                    acc = when(hit).then(lit(NULL)).otherwise(acc);
                }
                acc
            }
            ColumnRanges::ByDoseUnit(by_drug) => {
                let drug = col(c::MED_CATEGORY).str().to_lowercase();
                let unit = col(c::MED_DOSE_UNIT).str().to_lowercase();
                let mut acc = value.clone();
                for (drug_name, by_unit) in by_drug {
                    for (unit_name, range) in by_unit {
                        let hit = drug
                            .clone()
                            .eq(lit(drug_name.to_lowercase()))
                            .and(unit.clone().eq(lit(unit_name.to_lowercase())))
                            .and(out_of_range(value.clone(), *range));
                        acc = when(hit).then(lit(NULL)).otherwise(acc);
                    }
                }
                acc
            }
        };
        exprs.push(expr.alias(column.as_str()));
    }

    if exprs.is_empty() {
        return Ok(df);
    }
    df.lazy()
        .with_columns(exprs)
        .collect()
        .with_context(|| format!("outlier handling failed for {table}"))
}
