//! Core domain types for the organ-donor cohort pipeline.
//!
//! Pure data definitions shared by every other crate: identifiers, the CLIF
//! table catalogue, outlier range configuration, the contraindication code
//! list, and the finalized patient cohort. No I/O and no DataFrame types
//! live here.

#![deny(unsafe_code)]

pub mod cohort;
pub mod contra;
pub mod error;
pub mod ids;
pub mod outlier;
pub mod tables;

pub use cohort::{DonorFlags, DonorRecord, PatientCohort};
pub use contra::{ContraindicationList, normalize_icd_code};
pub use error::{ModelError, Result};
pub use ids::{EncounterBlock, HospitalizationId, PatientId};
pub use outlier::{ColumnRanges, OutlierConfig, Range};
pub use tables::{ELIGIBLE_LOCATIONS, SourceTable};
