//! Blood culture screen.
//!
//! Looks at blood cultures collected in the 48 hours before death. A
//! culture is negative when its organism is null, blank, or contains
//! `no_growth`; anything else marks the hospitalization as having a
//! positive culture. Hospitalizations with no blood cultures in the window
//! pass the screen.

use anyhow::{Context, Result};
use polars::prelude::*;

use donor_model::tables::{category, col as c};
use donor_model::SourceTable;

use crate::spine::column_values;

use super::FlagDeriver;

const ADDS: [&str; 1] = [c::NO_POSITIVE_CULTURE_48HRS];

#[derive(Debug, Clone, Copy, Default)]
pub struct BloodCultureScreen;

impl FlagDeriver for BloodCultureScreen {
    fn name(&self) -> &'static str {
        "blood_culture_screen"
    }

    fn source(&self) -> SourceTable {
        SourceTable::MicrobiologyCulture
    }

    fn adds(&self) -> &'static [&'static str] {
        &ADDS
    }

    fn derive(&self, spine: DataFrame, events: &DataFrame) -> Result<DataFrame> {
        let organism = col(c::ORGANISM_CATEGORY);
        let is_negative = organism
            .clone()
            .str()
            .to_lowercase()
            .str()
            .contains_literal(lit(category::NO_GROWTH))
            .or(organism.clone().is_null())
            .or(organism.str().to_lowercase().eq(lit("")));

        let positives = events
            .clone()
            .lazy()
            .filter(
                col(c::FLUID_CATEGORY)
                    .str()
                    .to_lowercase()
                    .eq(lit(category::BLOOD))
                    .and(
                        col(c::METHOD_CATEGORY)
                            .str()
                            .to_lowercase()
                            .eq(lit(category::CULTURE)),
                    ),
            )
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
                ((col(c::FINAL_DEATH_DTTM) - col(c::COLLECT_DTTM))
                    .dt()
                    .total_seconds()
                    .cast(DataType::Float64)
                    / lit(3600.0))
                .alias("hrs_before_death"),
            )
            .filter(
                col(c::COLLECT_DTTM)
                    .is_not_null()
                    .and(col("hrs_before_death").gt_eq(lit(0.0)))
                    .and(col("hrs_before_death").lt_eq(lit(48.0)))
                    .and(is_negative.not()),
            )
            .group_by_stable([col(c::HOSPITALIZATION_ID)])
            .agg([len().alias("positive_cultures")])
            .collect()
            .context("failed to locate positive blood cultures")?;

        let positive_ids = column_values(&positives, c::HOSPITALIZATION_ID)?;
        if !positive_ids.is_empty() {
            tracing::debug!(
                hospitalizations = positive_ids.len(),
                "positive blood cultures within 48h of death"
            );
        }
        let positive_ids = Series::new("positive_ids".into(), positive_ids);

        spine
            .lazy()
            .with_column(
                col(c::HOSPITALIZATION_ID)
                    .is_in(lit(positive_ids).implode(), false)
                    .not()
                    .alias(c::NO_POSITIVE_CULTURE_48HRS),
            )
            .collect()
            .context("failed to attach blood culture screen")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR_MS: i64 = 3_600_000;
    const DEATH_MS: i64 = 1_000 * HOUR_MS;

    fn spine() -> DataFrame {
        df![
            c::PATIENT_ID => ["p1", "p2"],
            c::HOSPITALIZATION_ID => ["h1", "h2"],
            c::FINAL_DEATH_DTTM => [DEATH_MS, DEATH_MS],
        ]
        .unwrap()
        .lazy()
        .with_column(col(c::FINAL_DEATH_DTTM).cast(DataType::Datetime(TimeUnit::Milliseconds, None)))
        .collect()
        .unwrap()
    }

    fn cultures(rows: &[(&str, i64, Option<&str>, &str, &str)]) -> DataFrame {
        df![
            c::HOSPITALIZATION_ID => rows.iter().map(|r| r.0).collect::<Vec<_>>(),
            c::COLLECT_DTTM => rows.iter().map(|r| r.1).collect::<Vec<_>>(),
            c::ORGANISM_CATEGORY => rows.iter().map(|r| r.2).collect::<Vec<_>>(),
            c::FLUID_CATEGORY => rows.iter().map(|r| r.3).collect::<Vec<_>>(),
            c::METHOD_CATEGORY => rows.iter().map(|r| r.4).collect::<Vec<_>>(),
        ]
        .unwrap()
        .lazy()
        .with_column(col(c::COLLECT_DTTM).cast(DataType::Datetime(TimeUnit::Milliseconds, None)))
        .collect()
        .unwrap()
    }

    fn screen(events: DataFrame) -> Vec<bool> {
        let out = BloodCultureScreen.derive(spine(), &events).unwrap();
        out.column(c::NO_POSITIVE_CULTURE_48HRS)
            .unwrap()
            .bool()
            .unwrap()
            .into_no_null_iter()
            .collect()
    }

    #[test]
    fn growth_within_window_fails_the_screen() {
        let flags = screen(cultures(&[(
            "h1",
            DEATH_MS - 10 * HOUR_MS,
            Some("staph_aureus"),
            "blood",
            "culture",
        )]));
        assert_eq!(flags, vec![false, true]);
    }

    #[test]
    fn no_growth_null_and_blank_are_negative() {
        let flags = screen(cultures(&[
            ("h1", DEATH_MS - 10 * HOUR_MS, Some("no_growth"), "blood", "culture"),
            ("h1", DEATH_MS - 11 * HOUR_MS, None, "blood", "culture"),
            ("h1", DEATH_MS - 12 * HOUR_MS, Some(""), "blood", "culture"),
        ]));
        assert_eq!(flags, vec![true, true]);
    }

    #[test]
    fn growth_outside_window_or_other_fluids_is_ignored() {
        let flags = screen(cultures(&[
            // 49h before death: outside the window.
            ("h1", DEATH_MS - 49 * HOUR_MS, Some("e_coli"), "blood", "culture"),
            // After death.
            ("h1", DEATH_MS + HOUR_MS, Some("e_coli"), "blood", "culture"),
            // Not a blood culture.
            ("h2", DEATH_MS - HOUR_MS, Some("e_coli"), "urine", "culture"),
        ]));
        assert_eq!(flags, vec![true, true]);
    }

    #[test]
    fn no_cultures_at_all_passes_by_default() {
        let flags = screen(cultures(&[]));
        assert_eq!(flags, vec![true, true]);
    }
}
