//! Organ quality assessment.
//!
//! [`OrganLabValues`] attaches the last pre-death creatinine, total
//! bilirubin, AST, and ALT per hospitalization. [`apply_organ_criteria`]
//! then evaluates the CMS-style thresholds:
//!
//! * kidney: creatinine recorded and < 4, and no CRRT in the 48h before death
//! * liver: bilirubin, AST, and ALT all recorded, with bilirubin < 4 and
//!   AST/ALT < 700
//! * BMI <= 50, from the last recorded weight and height
//!
//! `organ_check_pass` is (kidney OR liver) AND BMI. Note the asymmetry:
//! liver requires all three labs present, while BMI rests on whatever
//! anthropometrics were last charted.

use anyhow::{Context, Result};
use polars::prelude::*;

use donor_model::tables::{category, col as c};
use donor_model::SourceTable;

use crate::temporal::{EventLookup, SelectRule};

use super::FlagDeriver;

const ADDS: [&str; 4] = [
    c::CREATININE_VALUE,
    c::BILIRUBIN_TOTAL_VALUE,
    c::AST_VALUE,
    c::ALT_VALUE,
];

const LAB_OUTPUTS: [(&str, &str); 4] = [
    (category::CREATININE, c::CREATININE_VALUE),
    (category::BILIRUBIN_TOTAL, c::BILIRUBIN_TOTAL_VALUE),
    (category::AST, c::AST_VALUE),
    (category::ALT, c::ALT_VALUE),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct OrganLabValues;

impl FlagDeriver for OrganLabValues {
    fn name(&self) -> &'static str {
        "organ_lab_values"
    }

    fn source(&self) -> SourceTable {
        SourceTable::Labs
    }

    fn adds(&self) -> &'static [&'static str] {
        &ADDS
    }

    fn derive(&self, spine: DataFrame, events: &DataFrame) -> Result<DataFrame> {
        let mut out = spine;
        for (lab_category, output) in LAB_OUTPUTS {
            let category_events = events
                .clone()
                .lazy()
                .filter(col(c::LAB_CATEGORY).eq(lit(lab_category)))
                .collect()
                .with_context(|| format!("failed to restrict labs to {lab_category}"))?;
            let lookup = EventLookup::new(
                c::LAB_COLLECT_DTTM,
                c::LAB_VALUE_NUMERIC,
                SelectRule::LastAtOrBefore,
                output,
            );
            let picked = lookup.apply(category_events, &out)?;
            out = out
                .lazy()
                .join(
                    picked.lazy().select([
                        col(c::HOSPITALIZATION_ID),
                        col(output),
                        col(lookup.output_time_column().as_str()),
                    ]),
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

/// Evaluate kidney, liver, BMI, and overall organ eligibility.
///
/// Requires the lab value columns, `on_crrt_48h_before_death`, and `bmi` to
/// be present on the spine.
pub fn apply_organ_criteria(spine: DataFrame) -> Result<DataFrame> {
    spine
        .lazy()
        .with_columns([
            col(c::CREATININE_VALUE)
                .is_not_null()
                .and(col(c::CREATININE_VALUE).lt(lit(4.0)))
                .and(col(c::ON_CRRT_48H_BEFORE_DEATH).not())
                .alias(c::KIDNEY_ELIGIBLE),
            col(c::BILIRUBIN_TOTAL_VALUE)
                .is_not_null()
                .and(col(c::AST_VALUE).is_not_null())
                .and(col(c::ALT_VALUE).is_not_null())
                .and(col(c::BILIRUBIN_TOTAL_VALUE).lt(lit(4.0)))
                .and(col(c::AST_VALUE).lt(lit(700.0)))
                .and(col(c::ALT_VALUE).lt(lit(700.0)))
                .alias(c::LIVER_ELIGIBLE),
            col(c::BMI)
                .is_not_null()
                .and(col(c::BMI).lt_eq(lit(50.0)))
                .alias(c::BMI_ELIGIBLE),
        ])
        .with_column(
            col(c::KIDNEY_ELIGIBLE)
                .or(col(c::LIVER_ELIGIBLE))
                .and(col(c::BMI_ELIGIBLE))
                .alias(c::ORGAN_CHECK_PASS),
        )
        .collect()
        .context("failed to evaluate organ criteria")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spine_row(
        creatinine: Option<f64>,
        bilirubin: Option<f64>,
        ast: Option<f64>,
        alt: Option<f64>,
        crrt: bool,
        bmi: Option<f64>,
    ) -> DataFrame {
        df![
            c::PATIENT_ID => ["p1"],
            c::CREATININE_VALUE => [creatinine],
            c::BILIRUBIN_TOTAL_VALUE => [bilirubin],
            c::AST_VALUE => [ast],
            c::ALT_VALUE => [alt],
            c::ON_CRRT_48H_BEFORE_DEATH => [crrt],
            c::BMI => [bmi],
        ]
        .unwrap()
    }

    fn flag(df: &DataFrame, name: &str) -> bool {
        df.column(name).unwrap().bool().unwrap().get(0).unwrap()
    }

    #[test]
    fn kidney_requires_creatinine_and_no_crrt() {
        let ok = apply_organ_criteria(spine_row(Some(2.0), None, None, None, false, Some(25.0)))
            .unwrap();
        assert!(flag(&ok, c::KIDNEY_ELIGIBLE));
        assert!(flag(&ok, c::ORGAN_CHECK_PASS));

        let crrt = apply_organ_criteria(spine_row(Some(2.0), None, None, None, true, Some(25.0)))
            .unwrap();
        assert!(!flag(&crrt, c::KIDNEY_ELIGIBLE));

        let missing =
            apply_organ_criteria(spine_row(None, None, None, None, false, Some(25.0))).unwrap();
        assert!(!flag(&missing, c::KIDNEY_ELIGIBLE));

        let high = apply_organ_criteria(spine_row(Some(4.0), None, None, None, false, Some(25.0)))
            .unwrap();
        assert!(!flag(&high, c::KIDNEY_ELIGIBLE));
    }

    #[test]
    fn liver_requires_all_three_labs_present() {
        let missing_alt = apply_organ_criteria(spine_row(
            None,
            Some(1.0),
            Some(100.0),
            None,
            false,
            Some(25.0),
        ))
        .unwrap();
        assert!(!flag(&missing_alt, c::LIVER_ELIGIBLE));

        let ok = apply_organ_criteria(spine_row(
            None,
            Some(1.0),
            Some(100.0),
            Some(100.0),
            false,
            Some(25.0),
        ))
        .unwrap();
        assert!(flag(&ok, c::LIVER_ELIGIBLE));
        assert!(flag(&ok, c::ORGAN_CHECK_PASS));

        let ast_high = apply_organ_criteria(spine_row(
            None,
            Some(1.0),
            Some(700.0),
            Some(100.0),
            false,
            Some(25.0),
        ))
        .unwrap();
        assert!(!flag(&ast_high, c::LIVER_ELIGIBLE));
    }

    #[test]
    fn bmi_gates_the_overall_check() {
        // Kidney passes but BMI is missing: overall fails.
        let no_bmi =
            apply_organ_criteria(spine_row(Some(2.0), None, None, None, false, None)).unwrap();
        assert!(flag(&no_bmi, c::KIDNEY_ELIGIBLE));
        assert!(!flag(&no_bmi, c::ORGAN_CHECK_PASS));

        // BMI exactly 50 is still eligible.
        let at_limit =
            apply_organ_criteria(spine_row(Some(2.0), None, None, None, false, Some(50.0)))
                .unwrap();
        assert!(flag(&at_limit, c::ORGAN_CHECK_PASS));

        let over =
            apply_organ_criteria(spine_row(Some(2.0), None, None, None, false, Some(50.1)))
                .unwrap();
        assert!(!flag(&over, c::BMI_ELIGIBLE));
        assert!(!flag(&over, c::ORGAN_CHECK_PASS));
    }

    #[test]
    fn lab_lookup_takes_last_value_at_or_before_death() {
        let dtype = DataType::Datetime(TimeUnit::Milliseconds, None);
        let spine = df![
            c::PATIENT_ID => ["p1"],
            c::HOSPITALIZATION_ID => ["h1"],
            c::FINAL_DEATH_DTTM => [100_000_000i64],
        ]
        .unwrap()
        .lazy()
        .with_column(col(c::FINAL_DEATH_DTTM).cast(dtype.clone()))
        .collect()
        .unwrap();
        let labs = df![
            c::HOSPITALIZATION_ID => ["h1", "h1", "h1"],
            c::LAB_COLLECT_DTTM => [10_000_000i64, 90_000_000, 150_000_000],
            c::LAB_CATEGORY => ["creatinine", "creatinine", "creatinine"],
            c::LAB_VALUE_NUMERIC => [1.0, 3.5, 9.0],
        ]
        .unwrap()
        .lazy()
        .with_column(col(c::LAB_COLLECT_DTTM).cast(dtype))
        .collect()
        .unwrap();

        let out = OrganLabValues.derive(spine, &labs).unwrap();
        let creatinine = out
            .column(c::CREATININE_VALUE)
            .unwrap()
            .f64()
            .unwrap()
            .get(0)
            .unwrap();
        assert_eq!(creatinine, 3.5);
        assert!(out.column(c::BILIRUBIN_TOTAL_VALUE).unwrap().f64().unwrap().get(0).is_none());
    }
}
