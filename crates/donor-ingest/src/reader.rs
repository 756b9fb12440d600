//! CLIF table readers.
//!
//! Tables live under a site directory as `clif_<table>.<ext>` and are read
//! eagerly into DataFrames. Readers validate that the columns the pipeline
//! depends on are present and fail with the full missing list rather than
//! erroring later inside a query plan.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use polars::prelude::*;

use donor_model::SourceTable;

use crate::format::TableFormat;

/// Path of a table file under the site tables directory.
pub fn table_path(tables_dir: &Path, table: SourceTable, format: TableFormat) -> PathBuf {
    tables_dir.join(format!("{}.{}", table.file_stem(), format.extension()))
}

/// Read one CLIF table, verifying its required columns.
pub fn read_table(tables_dir: &Path, table: SourceTable, format: TableFormat) -> Result<DataFrame> {
    let path = table_path(tables_dir, table, format);
    if !path.exists() {
        anyhow::bail!("table file not found: {}", path.display());
    }

    let df = match format {
        TableFormat::Csv => CsvReadOptions::default()
            .with_has_header(true)
            .with_parse_options(CsvParseOptions::default().with_try_parse_dates(true))
            .try_into_reader_with_file_path(Some(path.clone()))
            .with_context(|| format!("failed to open CSV: {}", path.display()))?
            .finish()
            .with_context(|| format!("failed to read CSV: {}", path.display()))?,
        TableFormat::Parquet => {
            let file =
                File::open(&path).with_context(|| format!("failed to open: {}", path.display()))?;
            ParquetReader::new(file)
                .finish()
                .with_context(|| format!("failed to read Parquet: {}", path.display()))?
        }
    };

    ensure_required_columns(&df, table)?;
    tracing::debug!(table = %table, rows = df.height(), "loaded table");
    Ok(df)
}

/// Read a table and keep only rows whose `id_column` is in `ids`.
///
/// Event tables are large; filtering to the decedent spine right after the
/// read keeps everything downstream small.
pub fn read_table_filtered(
    tables_dir: &Path,
    table: SourceTable,
    format: TableFormat,
    id_column: &str,
    ids: &[String],
) -> Result<DataFrame> {
    let df = read_table(tables_dir, table, format)?;
    let before = df.height();
    let ids = Series::new("ids".into(), ids);
    let filtered = df
        .lazy()
        .filter(col(id_column).is_in(lit(ids).implode(), false))
        .collect()
        .with_context(|| format!("failed to filter {table} by {id_column}"))?;
    tracing::debug!(
        table = %table,
        rows_before = before,
        rows_after = filtered.height(),
        "filtered table to cohort ids"
    );
    Ok(filtered)
}

fn ensure_required_columns(df: &DataFrame, table: SourceTable) -> Result<()> {
    let missing: Vec<&str> = table
        .required_columns()
        .iter()
        .copied()
        .filter(|name| df.column(name).is_err())
        .collect();
    if !missing.is_empty() {
        anyhow::bail!("table {table} is missing required columns: {missing:?}");
    }
    Ok(())
}

/// Coerce the named columns to naive millisecond datetimes.
///
/// CSV sources may surface timestamps as strings; Parquet sources may carry
/// other time units or a timezone. Every table enters the pipeline with one
/// datetime representation.
pub fn ensure_datetime(df: DataFrame, columns: &[&str]) -> Result<DataFrame> {
    let target = DataType::Datetime(TimeUnit::Milliseconds, None);
    let mut exprs = Vec::new();
    for &name in columns {
        let Ok(column) = df.column(name) else {
            continue;
        };
        let expr = match column.dtype() {
            DataType::String => col(name)
                .str()
                .to_datetime(
                    Some(TimeUnit::Milliseconds),
                    None,
                    StrptimeOptions {
                        strict: false,
                        ..Default::default()
                    },
                    lit("raise"),
                )
                .alias(name),
            DataType::Datetime(TimeUnit::Milliseconds, None) => continue,
            DataType::Date | DataType::Datetime(_, _) => col(name).cast(target.clone()).alias(name),
            other => {
                anyhow::bail!("column {name:?} has non-datetime dtype {other:?}");
            }
        };
        exprs.push(expr);
    }
    if exprs.is_empty() {
        return Ok(df);
    }
    df.lazy()
        .with_columns(exprs)
        .collect()
        .context("datetime coercion failed")
}

/// Warn when `columns` does not uniquely key `df`.
///
/// Duplicate keys are tolerated (dedup happens at finalization) but always
/// reported with a count and a sample so sites can fix their extracts.
pub fn check_unique_key(df: &DataFrame, columns: &[&str], table_name: &str) -> Result<usize> {
    let keys: Vec<Expr> = columns.iter().map(|c| col(*c)).collect();
    let dupes = df
        .clone()
        .lazy()
        .group_by(keys)
        .agg([len().alias("row_count")])
        .filter(col("row_count").gt(lit(1u32)))
        .collect()
        .with_context(|| format!("uniqueness check failed for {table_name}"))?;

    let duplicate_keys = dupes.height();
    if duplicate_keys > 0 {
        tracing::warn!(
            table = table_name,
            key = ?columns,
            duplicate_keys,
            sample = %dupes.head(Some(5)),
            "key is not unique"
        );
    }
    Ok(duplicate_keys)
}
