//! Per-patient flag derivers.
//!
//! Each deriver consumes the spine plus one event table and returns the
//! spine with its flag columns attached. Derivers only read the spine's
//! identity and death-time columns and only add their declared columns, so
//! derivers over different sources can run in any order.

use anyhow::Result;
use polars::prelude::DataFrame;

use donor_model::SourceTable;

pub mod causes;
pub mod crrt;
pub mod imv;
pub mod micro;
pub mod neuro;
pub mod organ;

pub use causes::CauseOfDeathFlags;
pub use crrt::CrrtFlag;
pub use imv::{ImvStats, ImvWindowFlag};
pub use micro::BloodCultureScreen;
pub use neuro::BedsideAssessments;
pub use organ::{OrganLabValues, apply_organ_criteria};

/// A derivation step that attaches flag or covariate columns to the spine.
pub trait FlagDeriver {
    fn name(&self) -> &'static str;

    /// Event table this deriver reads.
    fn source(&self) -> SourceTable;

    /// Columns this deriver adds to the spine.
    fn adds(&self) -> &'static [&'static str];

    /// Attach the declared columns. `events` is the source table, already
    /// outlier-handled, time-coerced, and filtered to the cohort.
    fn derive(&self, spine: DataFrame, events: &DataFrame) -> Result<DataFrame>;
}
