//! Bedside neurological assessments closest to death.
//!
//! Attaches the GCS total and RASS values recorded closest to the resolved
//! time of death, on either side of it. These are descriptive covariates,
//! not eligibility criteria.

use anyhow::{Context, Result};
use polars::prelude::*;

use donor_model::tables::{category, col as c};
use donor_model::SourceTable;

use crate::temporal::{EventLookup, SelectRule};

use super::FlagDeriver;

const ADDS: [&str; 2] = [c::GCS_TOTAL_VALUE, c::RASS_VALUE];

const ASSESSMENT_OUTPUTS: [(&str, &str); 2] = [
    (category::GCS_TOTAL, c::GCS_TOTAL_VALUE),
    (category::RASS, c::RASS_VALUE),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct BedsideAssessments;

impl FlagDeriver for BedsideAssessments {
    fn name(&self) -> &'static str {
        "bedside_assessments"
    }

    fn source(&self) -> SourceTable {
        SourceTable::PatientAssessments
    }

    fn adds(&self) -> &'static [&'static str] {
        &ADDS
    }

    fn derive(&self, spine: DataFrame, events: &DataFrame) -> Result<DataFrame> {
        let prepped = events
            .clone()
            .lazy()
            .with_column(
                col(c::ASSESSMENT_CATEGORY)
                    .str()
                    .to_lowercase()
                    .alias(c::ASSESSMENT_CATEGORY),
            )
            .filter(col(c::NUMERICAL_VALUE).is_not_null())
            .collect()
            .context("failed to prepare assessments")?;

        let mut out = spine;
        for (assessment, output) in ASSESSMENT_OUTPUTS {
            let relevant = prepped
                .clone()
                .lazy()
                .filter(col(c::ASSESSMENT_CATEGORY).eq(lit(assessment)))
                .collect()
                .with_context(|| format!("failed to restrict assessments to {assessment}"))?;
            let lookup = EventLookup::new(
                c::RECORDED_DTTM,
                c::NUMERICAL_VALUE,
                SelectRule::ClosestTo,
                output,
            );
            let picked = lookup.apply(relevant, &out)?;
            out = out
                .lazy()
                .join(
                    picked
                        .lazy()
                        .select([col(c::HOSPITALIZATION_ID), col(output)]),
                    [col(c::HOSPITALIZATION_ID)],
                    [col(c::HOSPITALIZATION_ID)],
                    JoinArgs::new(JoinType::Left),
                )
                .collect()
                .with_context(|| format!("failed to attach {output}"))?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR_MS: i64 = 3_600_000;
    const DEATH_MS: i64 = 1_000 * HOUR_MS;

    fn to_dt(df: DataFrame, name: &str) -> DataFrame {
        df.lazy()
            .with_column(col(name).cast(DataType::Datetime(TimeUnit::Milliseconds, None)))
            .collect()
            .unwrap()
    }

    fn spine() -> DataFrame {
        to_dt(
            df![
                c::PATIENT_ID => ["p1"],
                c::HOSPITALIZATION_ID => ["h1"],
                c::FINAL_DEATH_DTTM => [DEATH_MS],
            ]
            .unwrap(),
            c::FINAL_DEATH_DTTM,
        )
    }

    #[test]
    fn closest_assessment_to_death_wins_even_after_death() {
        let events = to_dt(
            df![
                c::HOSPITALIZATION_ID => ["h1", "h1", "h1"],
                c::RECORDED_DTTM => [
                    DEATH_MS - 10 * HOUR_MS,
                    DEATH_MS + HOUR_MS,
                    DEATH_MS - 2 * HOUR_MS,
                ],
                c::ASSESSMENT_CATEGORY => ["GCS_total", "gcs_total", "RASS"],
                c::NUMERICAL_VALUE => [Some(7.0), Some(3.0), Some(-4.0)],
            ]
            .unwrap(),
            c::RECORDED_DTTM,
        );
        let out = BedsideAssessments.derive(spine(), &events).unwrap();
        let gcs = out
            .column(c::GCS_TOTAL_VALUE)
            .unwrap()
            .f64()
            .unwrap()
            .get(0);
        let rass = out.column(c::RASS_VALUE).unwrap().f64().unwrap().get(0);
        assert_eq!(gcs, Some(3.0));
        assert_eq!(rass, Some(-4.0));
    }

    #[test]
    fn missing_assessments_stay_null() {
        let events = to_dt(
            df![
                c::HOSPITALIZATION_ID => ["h1"],
                c::RECORDED_DTTM => [DEATH_MS],
                c::ASSESSMENT_CATEGORY => ["gcs_total"],
                c::NUMERICAL_VALUE => [None::<f64>],
            ]
            .unwrap(),
            c::RECORDED_DTTM,
        );
        let out = BedsideAssessments.derive(spine(), &events).unwrap();
        assert!(out.column(c::GCS_TOTAL_VALUE).unwrap().f64().unwrap().get(0).is_none());
        assert!(out.column(c::RASS_VALUE).unwrap().f64().unwrap().get(0).is_none());
    }
}
