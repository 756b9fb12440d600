//! Death-anchored event selection.
//!
//! Several derivers need "one value per hospitalization, picked relative to
//! the time of death": the last creatinine at or before death, the GCS
//! closest to death, the last weight ever recorded. [`EventLookup`] is that
//! selection, parameterized by column names and a [`SelectRule`], so each
//! deriver states its rule instead of re-implementing the sort/group dance.

use anyhow::{Context, Result};
use polars::prelude::*;

use donor_model::tables::col as c;

const ABS_SECONDS: &str = "__abs_seconds_to_death";

/// How to pick one event among a hospitalization's candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectRule {
    /// Latest event with timestamp <= final_death_dttm.
    LastAtOrBefore,
    /// Event with the smallest |timestamp - final_death_dttm|.
    ClosestTo,
    /// Latest event regardless of the death time.
    LastRecorded,
}

/// One parameterized per-hospitalization event selection.
#[derive(Debug, Clone)]
pub struct EventLookup {
    time_column: &'static str,
    value_column: &'static str,
    rule: SelectRule,
    output: String,
}

impl EventLookup {
    pub fn new(
        time_column: &'static str,
        value_column: &'static str,
        rule: SelectRule,
        output: impl Into<String>,
    ) -> Self {
        Self {
            time_column,
            value_column,
            rule,
            output: output.into(),
        }
    }

    /// Name of the produced value column.
    pub fn output_column(&self) -> &str {
        &self.output
    }

    /// Name of the produced timestamp column.
    pub fn output_time_column(&self) -> String {
        format!("{}_dttm", self.output)
    }

    /// Select one event per hospitalization.
    ///
    /// `anchors` must carry `hospitalization_id` and `final_death_dttm`;
    /// events with a null value are ignored. The result has one row per
    /// hospitalization that had a qualifying event, with the value and its
    /// timestamp under the configured output names.
    pub fn apply(&self, events: DataFrame, anchors: &DataFrame) -> Result<DataFrame> {
        let out_time = self.output_time_column();
        let keyed = events
            .lazy()
            .join(
                anchors
                    .clone()
                    .lazy()
                    .select([col(c::HOSPITALIZATION_ID), col(c::FINAL_DEATH_DTTM)]),
                [col(c::HOSPITALIZATION_ID)],
                [col(c::HOSPITALIZATION_ID)],
                JoinArgs::new(JoinType::Inner),
            )
            .filter(col(self.value_column).is_not_null());

        let picked = match self.rule {
            SelectRule::LastAtOrBefore => keyed
                .filter(col(self.time_column).lt_eq(col(c::FINAL_DEATH_DTTM)))
                .sort([self.time_column], SortMultipleOptions::default())
                .group_by_stable([col(c::HOSPITALIZATION_ID)])
                .agg([
                    col(self.value_column).last().alias(self.output.as_str()),
                    col(self.time_column).last().alias(out_time.as_str()),
                ]),
            SelectRule::LastRecorded => keyed
                .sort([self.time_column], SortMultipleOptions::default())
                .group_by_stable([col(c::HOSPITALIZATION_ID)])
                .agg([
                    col(self.value_column).last().alias(self.output.as_str()),
                    col(self.time_column).last().alias(out_time.as_str()),
                ]),
            SelectRule::ClosestTo => keyed
                .with_column(
                    (col(c::FINAL_DEATH_DTTM) - col(self.time_column))
                        .dt()
                        .total_seconds()
                        .abs()
                        .alias(ABS_SECONDS),
                )
                .sort([ABS_SECONDS], SortMultipleOptions::default())
                .group_by_stable([col(c::HOSPITALIZATION_ID)])
                .agg([
                    col(self.value_column).first().alias(self.output.as_str()),
                    col(self.time_column).first().alias(out_time.as_str()),
                ]),
        };

        picked
            .collect()
            .with_context(|| format!("event lookup failed for {}", self.output))
    }
}
