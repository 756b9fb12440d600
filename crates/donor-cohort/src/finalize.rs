//! Finalization: encounter grain to patient grain.
//!
//! Lifts the fully-derived spine into a [`PatientCohort`], the typed map
//! keyed by patient id. Encounter identifiers are left behind here; when a
//! patient still has several rows, the later row wins, and the map makes
//! any remaining duplication impossible rather than merely checked.

use anyhow::{Context, Result};
use polars::prelude::*;

use donor_ingest::polars_utils::{
    any_to_bool, any_to_f64, any_to_i64, any_to_naive_datetime, any_to_string_non_empty,
};
use donor_model::tables::col as c;
use donor_model::{DonorFlags, DonorRecord, ModelError, PatientCohort, PatientId};

use crate::spine::n_unique_patients;

fn value_at<'a>(df: &'a DataFrame, name: &str, idx: usize) -> AnyValue<'a> {
    df.column(name)
        .ok()
        .and_then(|column| column.get(idx).ok())
        .unwrap_or(AnyValue::Null)
}

fn bool_at(df: &DataFrame, name: &str, idx: usize, default: bool) -> bool {
    any_to_bool(&value_at(df, name, idx)).unwrap_or(default)
}

/// Convert the derived spine into the patient-keyed cohort.
pub fn finalize(spine: &DataFrame) -> Result<PatientCohort> {
    let rows = spine.height();
    let patients = n_unique_patients(spine)?;
    if rows != patients {
        tracing::warn!(
            rows,
            patients,
            "spine still carries duplicate patients, keeping the last row per patient"
        );
    }

    let mut cohort = PatientCohort::new();
    let mut replaced = 0usize;
    for idx in 0..rows {
        let patient_id = any_to_string_non_empty(&value_at(spine, c::PATIENT_ID, idx))
            .with_context(|| format!("spine row {idx} has no patient_id"))?;
        let patient_id = PatientId::new(patient_id)?;

        let mut record = DonorRecord::new(patient_id);
        record.final_death_dttm = any_to_naive_datetime(&value_at(spine, c::FINAL_DEATH_DTTM, idx));
        record.age_at_death = any_to_f64(&value_at(spine, c::AGE_AT_DEATH, idx));
        record.sex_category = any_to_string_non_empty(&value_at(spine, c::SEX_CATEGORY, idx));
        record.race_category = any_to_string_non_empty(&value_at(spine, c::RACE_CATEGORY, idx));
        record.ethnicity_category =
            any_to_string_non_empty(&value_at(spine, c::ETHNICITY_CATEGORY, idx));
        record.first_admission_location =
            any_to_string_non_empty(&value_at(spine, c::FIRST_ADMISSION_LOCATION, idx));
        record.last_location_category =
            any_to_string_non_empty(&value_at(spine, c::LAST_LOCATION_CATEGORY, idx));
        record.hospital_length_of_stay_days =
            any_to_i64(&value_at(spine, c::HOSPITAL_LOS_DAYS, idx));
        record.first_icu_los_days = any_to_f64(&value_at(spine, c::FIRST_ICU_LOS_DAYS, idx));
        record.bmi = any_to_f64(&value_at(spine, c::BMI, idx));
        record.creatinine_value = any_to_f64(&value_at(spine, c::CREATININE_VALUE, idx));
        record.bilirubin_total_value =
            any_to_f64(&value_at(spine, c::BILIRUBIN_TOTAL_VALUE, idx));
        record.ast_value = any_to_f64(&value_at(spine, c::AST_VALUE, idx));
        record.alt_value = any_to_f64(&value_at(spine, c::ALT_VALUE, idx));
        record.hr_2death_last_imv = any_to_f64(&value_at(spine, c::HR_2DEATH_LAST_IMV, idx));
        record.gcs_total_value = any_to_f64(&value_at(spine, c::GCS_TOTAL_VALUE, idx));
        record.rass_value = any_to_f64(&value_at(spine, c::RASS_VALUE, idx));
        record.flags = DonorFlags {
            age_75_less: bool_at(spine, c::AGE_75_LESS, idx, false),
            icd10_ischemic: bool_at(spine, c::ICD10_ISCHEMIC, idx, false),
            icd10_cerebro: bool_at(spine, c::ICD10_CEREBRO, idx, false),
            icd10_external: bool_at(spine, c::ICD10_EXTERNAL, idx, false),
            icd10_contraindication: bool_at(spine, c::ICD10_CONTRAINDICATION, idx, false),
            imv_48hr_expire: bool_at(spine, c::IMV_48HR_EXPIRE, idx, false),
            on_crrt_48h_before_death: bool_at(spine, c::ON_CRRT_48H_BEFORE_DEATH, idx, false),
            kidney_eligible: bool_at(spine, c::KIDNEY_ELIGIBLE, idx, false),
            liver_eligible: bool_at(spine, c::LIVER_ELIGIBLE, idx, false),
            bmi_eligible: bool_at(spine, c::BMI_ELIGIBLE, idx, false),
            organ_check_pass: bool_at(spine, c::ORGAN_CHECK_PASS, idx, false),
            no_positive_culture_48hrs: bool_at(spine, c::NO_POSITIVE_CULTURE_48HRS, idx, true),
        };

        if cohort.insert(record).is_some() {
            replaced += 1;
        }
    }

    if replaced > 0 {
        tracing::warn!(replaced, "dropped earlier rows for duplicated patients");
    }
    if cohort.len() != patients {
        return Err(ModelError::CardinalityViolation {
            rows: cohort.len(),
            patients,
        }
        .into());
    }
    tracing::info!(patients = cohort.len(), "finalized patient cohort");
    Ok(cohort)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spine() -> DataFrame {
        df![
            c::PATIENT_ID => ["p1", "p2", "p2"],
            c::HOSPITALIZATION_ID => ["h1", "h2", "h3"],
            c::AGE_75_LESS => [true, false, true],
            c::ORGAN_CHECK_PASS => [true, false, false],
            c::BMI => [Some(24.0), None, Some(31.0)],
            c::SEX_CATEGORY => [Some("female"), Some("male"), Some("male")],
        ]
        .unwrap()
    }

    #[test]
    fn duplicate_patients_collapse_to_the_last_row() {
        let cohort = finalize(&spine()).unwrap();
        assert_eq!(cohort.len(), 2);
        let p2 = cohort.get(&PatientId::new("p2").unwrap()).unwrap();
        assert!(p2.flags.age_75_less);
        assert_eq!(p2.bmi, Some(31.0));
    }

    #[test]
    fn missing_flag_columns_fall_back_to_documented_defaults() {
        let cohort = finalize(&spine()).unwrap();
        let p1 = cohort.get(&PatientId::new("p1").unwrap()).unwrap();
        assert!(!p1.flags.imv_48hr_expire);
        assert!(p1.flags.no_positive_culture_48hrs);
        assert!(p1.flags.organ_check_pass);
        assert_eq!(p1.sex_category.as_deref(), Some("female"));
    }

    #[test]
    fn blank_patient_id_is_an_error() {
        let bad = df![
            c::PATIENT_ID => [" "],
        ]
        .unwrap();
        assert!(finalize(&bad).is_err());
    }
}
