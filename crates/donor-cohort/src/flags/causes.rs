//! Cause-of-death and contraindication flags from hospital diagnoses.
//!
//! ICD-10-CM inclusion ranges follow the CMS CALC definition:
//! I20-I25 ischemic heart disease, I60-I69 cerebrovascular disease, and
//! V01-Y89 external causes (Y90+ excluded). Codes on the curated
//! contraindication list set `icd10_contraindication`. Flags collapse to the
//! patient with any-semantics across all of the patient's diagnoses.

use anyhow::{Context, Result};
use polars::prelude::*;

use donor_model::tables::col as c;
use donor_model::{ContraindicationList, SourceTable};

use super::FlagDeriver;

const ISCHEMIC_PATTERN: &str = r"^i2[0-5]\w*$";
const CEREBRO_PATTERN: &str = r"^i6[0-9]\w*$";
const EXTERNAL_PATTERN: &str = r"^(v0[1-9]|v[1-9]\d|w\d{2}|x\d{2}|y[0-8]\d)\w*$";

const ADDS: [&str; 4] = [
    c::ICD10_ISCHEMIC,
    c::ICD10_CEREBRO,
    c::ICD10_EXTERNAL,
    c::ICD10_CONTRAINDICATION,
];

pub struct CauseOfDeathFlags<'a> {
    contraindications: &'a ContraindicationList,
}

impl<'a> CauseOfDeathFlags<'a> {
    pub fn new(contraindications: &'a ContraindicationList) -> Self {
        Self { contraindications }
    }
}

/// Non-ICD-10 code systems never contribute to any flag.
fn icd10_gated(inner: Expr, name: &str) -> Expr {
    let formats = Series::new("formats".into(), &["icd10", "icd10cm"]);
    when(col("sys").is_in(lit(formats).implode(), false))
        .then(inner)
        .otherwise(lit(false))
        .alias(name)
}

fn cause_flag(pattern: &str, name: &str) -> Expr {
    icd10_gated(col("dx_norm").str().contains(lit(pattern), false), name)
}

impl FlagDeriver for CauseOfDeathFlags<'_> {
    fn name(&self) -> &'static str {
        "cause_of_death"
    }

    fn source(&self) -> SourceTable {
        SourceTable::HospitalDiagnosis
    }

    fn adds(&self) -> &'static [&'static str] {
        &ADDS
    }

    fn derive(&self, spine: DataFrame, events: &DataFrame) -> Result<DataFrame> {
        let codes = Series::new(
            "contraindication_codes".into(),
            self.contraindications
                .iter()
                .map(str::to_string)
                .collect::<Vec<_>>(),
        );

        let per_diagnosis = events
            .clone()
            .lazy()
            .with_columns([
                col(c::DIAGNOSIS_CODE)
                    .cast(DataType::String)
                    .str()
                    .to_lowercase()
                    .str()
                    .replace_all(lit(r"[.\s]"), lit(""), false)
                    .alias("dx_norm"),
                col(c::DIAGNOSIS_CODE_FORMAT)
                    .cast(DataType::String)
                    .str()
                    .to_lowercase()
                    .alias("sys"),
            ])
            .with_columns([
                cause_flag(ISCHEMIC_PATTERN, c::ICD10_ISCHEMIC),
                cause_flag(CEREBRO_PATTERN, c::ICD10_CEREBRO),
                cause_flag(EXTERNAL_PATTERN, c::ICD10_EXTERNAL),
                icd10_gated(
                    col("dx_norm").is_in(lit(codes).implode(), false),
                    c::ICD10_CONTRAINDICATION,
                ),
            ]);

        let per_patient = per_diagnosis
            .join(
                spine
                    .clone()
                    .lazy()
                    .select([col(c::HOSPITALIZATION_ID), col(c::PATIENT_ID)]),
                [col(c::HOSPITALIZATION_ID)],
                [col(c::HOSPITALIZATION_ID)],
                JoinArgs::new(JoinType::Inner),
            )
            .group_by_stable([col(c::PATIENT_ID)])
            .agg(
                ADDS.iter()
                    .map(|name| col(*name).any(true).alias(*name))
                    .collect::<Vec<_>>(),
            );

        spine
            .lazy()
            .join(
                per_patient,
                [col(c::PATIENT_ID)],
                [col(c::PATIENT_ID)],
                JoinArgs::new(JoinType::Left),
            )
            .with_columns(
                ADDS.iter()
                    .map(|name| col(*name).fill_null(lit(false)))
                    .collect::<Vec<_>>(),
            )
            .collect()
            .context("failed to derive cause-of-death flags")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spine() -> DataFrame {
        df![
            c::PATIENT_ID => ["p1", "p2", "p3", "p4", "p5"],
            c::HOSPITALIZATION_ID => ["h1", "h2", "h3", "h4", "h5"],
        ]
        .unwrap()
    }

    fn derive(diagnoses: DataFrame) -> DataFrame {
        let contra = ContraindicationList::from_raw_codes(["C78.00"]);
        CauseOfDeathFlags::new(&contra)
            .derive(spine(), &diagnoses)
            .unwrap()
    }

    fn flag(df: &DataFrame, name: &str, idx: usize) -> bool {
        df.column(name).unwrap().bool().unwrap().get(idx).unwrap()
    }

    #[test]
    fn range_boundaries_classify_exactly() {
        let diagnoses = df![
            c::HOSPITALIZATION_ID => ["h1", "h2", "h3", "h4", "h5"],
            c::DIAGNOSIS_CODE => ["I25.9", "I26", "Y89.9", "Y90.1", "I60"],
            c::DIAGNOSIS_CODE_FORMAT => ["ICD10CM", "ICD10CM", "ICD10CM", "ICD10CM", "ICD10CM"],
        ]
        .unwrap();
        let out = derive(diagnoses);

        // I25.9 is in range, I26 is one past it.
        assert!(flag(&out, c::ICD10_ISCHEMIC, 0));
        assert!(!flag(&out, c::ICD10_ISCHEMIC, 1));
        // Y89.x is the last external block, Y90.x is excluded.
        assert!(flag(&out, c::ICD10_EXTERNAL, 2));
        assert!(!flag(&out, c::ICD10_EXTERNAL, 3));
        assert!(flag(&out, c::ICD10_CEREBRO, 4));
    }

    #[test]
    fn non_icd10_codes_never_set_flags() {
        let diagnoses = df![
            c::HOSPITALIZATION_ID => ["h1"],
            c::DIAGNOSIS_CODE => ["I21.0"],
            c::DIAGNOSIS_CODE_FORMAT => ["ICD9"],
        ]
        .unwrap();
        let out = derive(diagnoses);
        assert!(!flag(&out, c::ICD10_ISCHEMIC, 0));
    }

    #[test]
    fn contraindication_matches_normalized_codes() {
        let diagnoses = df![
            c::HOSPITALIZATION_ID => ["h1", "h2"],
            c::DIAGNOSIS_CODE => ["C78.00", "C79.00"],
            c::DIAGNOSIS_CODE_FORMAT => ["ICD10CM", "ICD10CM"],
        ]
        .unwrap();
        let out = derive(diagnoses);
        assert!(flag(&out, c::ICD10_CONTRAINDICATION, 0));
        assert!(!flag(&out, c::ICD10_CONTRAINDICATION, 1));
    }

    #[test]
    fn patients_without_diagnoses_default_to_false() {
        let diagnoses = df![
            c::HOSPITALIZATION_ID => ["h1"],
            c::DIAGNOSIS_CODE => ["I21.0"],
            c::DIAGNOSIS_CODE_FORMAT => ["ICD10CM"],
        ]
        .unwrap();
        let out = derive(diagnoses);
        for idx in 1..5 {
            for name in ADDS {
                assert!(!flag(&out, name, idx), "{name} should be false for row {idx}");
            }
        }
    }
}
