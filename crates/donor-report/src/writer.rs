//! Output writers: final cohort Parquet and attrition CSVs.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use polars::prelude::*;

use donor_model::tables::col as c;
use donor_model::{DonorRecord, PatientCohort};

use crate::attrition::AttritionTable;

/// Flatten the typed cohort back into a one-row-per-patient DataFrame.
pub fn cohort_frame(cohort: &PatientCohort) -> Result<DataFrame> {
    let records: Vec<&DonorRecord> = cohort.records().collect();

    let death_ms: Vec<Option<i64>> = records
        .iter()
        .map(|r| r.final_death_dttm.map(|dt| dt.and_utc().timestamp_millis()))
        .collect();

    let df = df![
        c::PATIENT_ID => records.iter().map(|r| r.patient_id.as_str()).collect::<Vec<_>>(),
        c::FINAL_DEATH_DTTM => death_ms,
        c::AGE_AT_DEATH => records.iter().map(|r| r.age_at_death).collect::<Vec<_>>(),
        c::SEX_CATEGORY => records.iter().map(|r| r.sex_category.clone()).collect::<Vec<_>>(),
        c::RACE_CATEGORY => records.iter().map(|r| r.race_category.clone()).collect::<Vec<_>>(),
        c::ETHNICITY_CATEGORY => records.iter().map(|r| r.ethnicity_category.clone()).collect::<Vec<_>>(),
        c::FIRST_ADMISSION_LOCATION => records.iter().map(|r| r.first_admission_location.clone()).collect::<Vec<_>>(),
        c::LAST_LOCATION_CATEGORY => records.iter().map(|r| r.last_location_category.clone()).collect::<Vec<_>>(),
        c::HOSPITAL_LOS_DAYS => records.iter().map(|r| r.hospital_length_of_stay_days).collect::<Vec<_>>(),
        c::FIRST_ICU_LOS_DAYS => records.iter().map(|r| r.first_icu_los_days).collect::<Vec<_>>(),
        c::BMI => records.iter().map(|r| r.bmi).collect::<Vec<_>>(),
        c::CREATININE_VALUE => records.iter().map(|r| r.creatinine_value).collect::<Vec<_>>(),
        c::BILIRUBIN_TOTAL_VALUE => records.iter().map(|r| r.bilirubin_total_value).collect::<Vec<_>>(),
        c::AST_VALUE => records.iter().map(|r| r.ast_value).collect::<Vec<_>>(),
        c::ALT_VALUE => records.iter().map(|r| r.alt_value).collect::<Vec<_>>(),
        c::HR_2DEATH_LAST_IMV => records.iter().map(|r| r.hr_2death_last_imv).collect::<Vec<_>>(),
        c::GCS_TOTAL_VALUE => records.iter().map(|r| r.gcs_total_value).collect::<Vec<_>>(),
        c::RASS_VALUE => records.iter().map(|r| r.rass_value).collect::<Vec<_>>(),
        c::AGE_75_LESS => records.iter().map(|r| r.flags.age_75_less).collect::<Vec<_>>(),
        c::ICD10_ISCHEMIC => records.iter().map(|r| r.flags.icd10_ischemic).collect::<Vec<_>>(),
        c::ICD10_CEREBRO => records.iter().map(|r| r.flags.icd10_cerebro).collect::<Vec<_>>(),
        c::ICD10_EXTERNAL => records.iter().map(|r| r.flags.icd10_external).collect::<Vec<_>>(),
        c::ICD10_CONTRAINDICATION => records.iter().map(|r| r.flags.icd10_contraindication).collect::<Vec<_>>(),
        c::IMV_48HR_EXPIRE => records.iter().map(|r| r.flags.imv_48hr_expire).collect::<Vec<_>>(),
        c::ON_CRRT_48H_BEFORE_DEATH => records.iter().map(|r| r.flags.on_crrt_48h_before_death).collect::<Vec<_>>(),
        c::KIDNEY_ELIGIBLE => records.iter().map(|r| r.flags.kidney_eligible).collect::<Vec<_>>(),
        c::LIVER_ELIGIBLE => records.iter().map(|r| r.flags.liver_eligible).collect::<Vec<_>>(),
        c::BMI_ELIGIBLE => records.iter().map(|r| r.flags.bmi_eligible).collect::<Vec<_>>(),
        c::ORGAN_CHECK_PASS => records.iter().map(|r| r.flags.organ_check_pass).collect::<Vec<_>>(),
        c::NO_POSITIVE_CULTURE_48HRS => records.iter().map(|r| r.flags.no_positive_culture_48hrs).collect::<Vec<_>>(),
        c::CALC_FLAG => records.iter().map(|r| r.calc_flag).collect::<Vec<_>>(),
        c::CLIF_ELIGIBLE_DONORS => records.iter().map(|r| r.clif_eligible_donors).collect::<Vec<_>>(),
    ]
    .context("failed to build cohort frame")?;

    df.lazy()
        .with_column(
            col(c::FINAL_DEATH_DTTM).cast(DataType::Datetime(TimeUnit::Milliseconds, None)),
        )
        .collect()
        .context("failed to type cohort frame")
}

/// Write the final cohort as Parquet.
pub fn write_cohort_parquet(cohort: &PatientCohort, path: &Path) -> Result<()> {
    let mut df = cohort_frame(cohort)?;
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    ParquetWriter::new(file)
        .finish(&mut df)
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), patients = cohort.len(), "wrote final cohort");
    Ok(())
}

fn format_sub_reasons(sub_reasons: &[(String, usize)]) -> String {
    sub_reasons
        .iter()
        .map(|(name, n)| format!("{name}={n}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Write one definition's attrition table as CSV.
pub fn write_attrition_csv(table: &AttritionTable, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    writer.write_record([
        "Definition",
        "Stage",
        "Filter_Description",
        "Retained",
        "Excluded",
        "Pct_Of_Previous",
        "Pct_Of_Initial",
        "Sub_Reasons",
    ])?;
    for stage in &table.stages {
        writer.write_record([
            table.definition.as_str(),
            stage.stage.as_str(),
            stage.description.as_str(),
            &stage.retained.to_string(),
            &stage.excluded.to_string(),
            &format!("{:.1}", stage.pct_of_previous),
            &format!("{:.1}", stage.pct_of_initial),
            &format_sub_reasons(&stage.sub_reasons),
        ])?;
    }
    writer
        .flush()
        .with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), definition = %table.definition, "wrote attrition table");
    Ok(())
}
