//! Cohort derivation for potential organ donors.
//!
//! The derivation runs in stages over Polars DataFrames: outlier handling,
//! encounter stitching, the decedent spine, one flag deriver per event
//! table, then finalization into the typed patient-keyed cohort and the
//! pure eligibility classification.

#![deny(unsafe_code)]

pub mod eligibility;
pub mod finalize;
pub mod flags;
pub mod outlier;
pub mod spine;
pub mod stitch;
pub mod temporal;

pub use eligibility::{calc_flag, classify, clif_eligible_donors};
pub use finalize::finalize;
pub use flags::FlagDeriver;
pub use outlier::apply_outlier_ranges;
pub use stitch::{DEFAULT_GAP_HOURS, EncounterMap, stitch_encounters};
pub use temporal::{EventLookup, SelectRule};
