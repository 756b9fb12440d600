//! Invasive mechanical ventilation window flag.
//!
//! A patient qualifies when their last IMV observation falls within the
//! window around death: up to 24 hours after the recorded death (device
//! charting may trail the death note) and up to 48 hours before it. The
//! signed hours-to-death of that last observation is kept as a covariate.

use anyhow::{Context, Result};
use polars::prelude::*;

use donor_model::tables::{category, col as c};
use donor_model::SourceTable;

use super::FlagDeriver;

/// Window bounds in hours relative to death, inclusive.
const WINDOW_MIN_HOURS: f64 = -24.0;
const WINDOW_MAX_HOURS: f64 = 48.0;

const ADDS: [&str; 2] = [c::IMV_48HR_EXPIRE, c::HR_2DEATH_LAST_IMV];

/// Patient counts along the IMV funnel, for the strobe summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImvStats {
    /// Decedents ever on IMV during a cohort hospitalization.
    pub ever_on_imv: usize,
    /// Of those, patients whose last IMV observation was at or before death.
    pub imv_at_or_after_death: usize,
    /// Of those, patients inside the qualifying window.
    pub within_window: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImvWindowFlag;

impl ImvWindowFlag {
    /// Derive and also report the funnel counts.
    pub fn derive_with_stats(
        &self,
        spine: DataFrame,
        events: &DataFrame,
    ) -> Result<(DataFrame, ImvStats)> {
        let imv_rows = events
            .clone()
            .lazy()
            .filter(
                col(c::DEVICE_CATEGORY)
                    .str()
                    .to_lowercase()
                    .eq(lit(category::IMV)),
            )
            .select([col(c::HOSPITALIZATION_ID), col(c::RECORDED_DTTM)]);

        // Last IMV observation per patient across all cohort
        // hospitalizations, then its signed distance to death.
        let last_imv = spine
            .clone()
            .lazy()
            .select([
                col(c::HOSPITALIZATION_ID),
                col(c::PATIENT_ID),
                col(c::FINAL_DEATH_DTTM),
            ])
            .join(
                imv_rows,
                [col(c::HOSPITALIZATION_ID)],
                [col(c::HOSPITALIZATION_ID)],
                JoinArgs::new(JoinType::Inner),
            )
            .sort([c::RECORDED_DTTM], SortMultipleOptions::default())
            .group_by_stable([col(c::PATIENT_ID)])
            .agg([
                col(c::RECORDED_DTTM).last(),
                col(c::FINAL_DEATH_DTTM).last(),
            ])
            .with_column(
                ((col(c::FINAL_DEATH_DTTM) - col(c::RECORDED_DTTM))
                    .dt()
                    .total_seconds()
                    .cast(DataType::Float64)
                    / lit(3600.0))
                .alias(c::HR_2DEATH_LAST_IMV),
            )
            .with_column(
                col(c::HR_2DEATH_LAST_IMV)
                    .gt_eq(lit(WINDOW_MIN_HOURS))
                    .and(col(c::HR_2DEATH_LAST_IMV).lt_eq(lit(WINDOW_MAX_HOURS)))
                    .fill_null(lit(false))
                    .alias(c::IMV_48HR_EXPIRE),
            )
            .collect()
            .context("failed to locate last IMV observations")?;

        let hours = last_imv.column(c::HR_2DEATH_LAST_IMV)?.f64()?;
        let window = last_imv.column(c::IMV_48HR_EXPIRE)?.bool()?;
        let stats = ImvStats {
            ever_on_imv: last_imv.height(),
            imv_at_or_after_death: hours.into_iter().flatten().filter(|h| *h <= 0.0).count(),
            within_window: window.into_iter().flatten().filter(|q| *q).count(),
        };
        tracing::debug!(
            ever_on_imv = stats.ever_on_imv,
            within_window = stats.within_window,
            "derived IMV window flag"
        );

        let out = spine
            .lazy()
            .join(
                last_imv
                    .lazy()
                    .select([
                        col(c::PATIENT_ID),
                        col(c::HR_2DEATH_LAST_IMV),
                        col(c::IMV_48HR_EXPIRE),
                    ]),
                [col(c::PATIENT_ID)],
                [col(c::PATIENT_ID)],
                JoinArgs::new(JoinType::Left),
            )
            .with_column(col(c::IMV_48HR_EXPIRE).fill_null(lit(false)))
            .collect()
            .context("failed to attach IMV flag")?;
        Ok((out, stats))
    }
}

impl FlagDeriver for ImvWindowFlag {
    fn name(&self) -> &'static str {
        "imv_window"
    }

    fn source(&self) -> SourceTable {
        SourceTable::RespiratorySupport
    }

    fn adds(&self) -> &'static [&'static str] {
        &ADDS
    }

    fn derive(&self, spine: DataFrame, events: &DataFrame) -> Result<DataFrame> {
        self.derive_with_stats(spine, events).map(|(df, _)| df)
    }
}
