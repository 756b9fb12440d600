//! Input layer for the donor-cohort pipeline.
//!
//! Reads CLIF tables (CSV or Parquet) into Polars DataFrames, coerces
//! timestamps to one representation, checks declared key uniqueness, and
//! loads the outlier and contraindication configuration files.

#![deny(unsafe_code)]

pub mod config;
pub mod format;
pub mod polars_utils;
pub mod reader;

pub use config::{load_contraindications, load_outlier_config};
pub use format::TableFormat;
pub use reader::{check_unique_key, ensure_datetime, read_table, read_table_filtered, table_path};
