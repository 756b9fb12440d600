//! Reporting for the donor cohort: attrition tables, strobe counts, and the
//! final output files.

#![deny(unsafe_code)]

pub mod attrition;
pub mod strobe;
pub mod writer;

pub use attrition::{AttritionTable, StageCount, calc_attrition, clif_attrition};
pub use strobe::StrobeCounts;
pub use writer::{cohort_frame, write_attrition_csv, write_cohort_parquet};
