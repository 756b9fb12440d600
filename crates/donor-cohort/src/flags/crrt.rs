//! CRRT exposure in the 48 hours before death.
//!
//! Any continuous renal replacement therapy record in `[death - 48h, death]`
//! marks the hospitalization; the flag later disqualifies the kidney.

use anyhow::{Context, Result};
use polars::prelude::*;

use donor_model::tables::col as c;
use donor_model::SourceTable;

use super::FlagDeriver;

const ADDS: [&str; 1] = [c::ON_CRRT_48H_BEFORE_DEATH];

#[derive(Debug, Clone, Copy, Default)]
pub struct CrrtFlag;

impl FlagDeriver for CrrtFlag {
    fn name(&self) -> &'static str {
        "crrt_before_death"
    }

    fn source(&self) -> SourceTable {
        SourceTable::CrrtTherapy
    }

    fn adds(&self) -> &'static [&'static str] {
        &ADDS
    }

    fn derive(&self, spine: DataFrame, events: &DataFrame) -> Result<DataFrame> {
        let flagged = events
            .clone()
            .lazy()
            .select([col(c::HOSPITALIZATION_ID), col(c::RECORDED_DTTM)])
            .join(
                spine
                    .clone()
                    .lazy()
                    .select([col(c::HOSPITALIZATION_ID), col(c::FINAL_DEATH_DTTM)]),
                [col(c::HOSPITALIZATION_ID)],
                [col(c::HOSPITALIZATION_ID)],
                JoinArgs::new(JoinType::Inner),
            )
            .with_column(
                ((col(c::FINAL_DEATH_DTTM) - col(c::RECORDED_DTTM))
                    .dt()
                    .total_seconds()
                    .cast(DataType::Float64)
                    / lit(3600.0))
                .alias("hrs_before_death"),
            )
            .filter(
                col("hrs_before_death")
                    .gt_eq(lit(0.0))
                    .and(col("hrs_before_death").lt_eq(lit(48.0))),
            )
            .group_by_stable([col(c::HOSPITALIZATION_ID)])
            .agg([lit(true).alias(c::ON_CRRT_48H_BEFORE_DEATH)]);

        spine
            .lazy()
            .join(
                flagged,
                [col(c::HOSPITALIZATION_ID)],
                [col(c::HOSPITALIZATION_ID)],
                JoinArgs::new(JoinType::Left),
            )
            .with_column(col(c::ON_CRRT_48H_BEFORE_DEATH).fill_null(lit(false)))
            .collect()
            .context("failed to derive CRRT flag")
    }
}
