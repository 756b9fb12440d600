//! Finalized patient-level cohort.
//!
//! The derivation pipeline works on encounter-grain DataFrames; once
//! finalized, rows are converted into [`DonorRecord`]s held in a
//! [`PatientCohort`] keyed by patient. Keying the map by [`PatientId`]
//! makes the one-row-per-patient invariant structural: a duplicate patient
//! cannot be represented, it can only replace its earlier entry.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::PatientId;

/// Boolean eligibility components derived per patient.
///
/// Defaults are the documented missing-data values: every criterion false
/// except `no_positive_culture_48hrs`, which is true in the absence of a
/// positive culture (absence of a positive result, not absence of data, is
/// what the screen tests).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DonorFlags {
    /// Age at death <= 75 for any qualifying encounter.
    pub age_75_less: bool,
    /// Any ICD-10-CM code in I20-I25.
    pub icd10_ischemic: bool,
    /// Any ICD-10-CM code in I60-I69.
    pub icd10_cerebro: bool,
    /// Any ICD-10-CM external-cause code in V01-Y89.
    pub icd10_external: bool,
    /// Any code on the curated contraindication list.
    pub icd10_contraindication: bool,
    /// Last IMV observation within [-24, 48] hours of death.
    pub imv_48hr_expire: bool,
    /// Any CRRT record in the 48 hours before death.
    pub on_crrt_48h_before_death: bool,
    /// Last pre-death creatinine < 4 and no recent CRRT.
    pub kidney_eligible: bool,
    /// Last pre-death bilirubin/AST/ALT all present and within limits.
    pub liver_eligible: bool,
    /// BMI from last recorded weight/height <= 50.
    pub bmi_eligible: bool,
    /// (kidney OR liver) AND BMI.
    pub organ_check_pass: bool,
    /// No positive blood culture in the 48 hours before death.
    pub no_positive_culture_48hrs: bool,
}

impl Default for DonorFlags {
    fn default() -> Self {
        Self {
            age_75_less: false,
            icd10_ischemic: false,
            icd10_cerebro: false,
            icd10_external: false,
            icd10_contraindication: false,
            imv_48hr_expire: false,
            on_crrt_48h_before_death: false,
            kidney_eligible: false,
            liver_eligible: false,
            bmi_eligible: false,
            organ_check_pass: false,
            no_positive_culture_48hrs: true,
        }
    }
}

impl DonorFlags {
    /// Any CALC-qualifying cause of death.
    pub fn has_calc_cause(&self) -> bool {
        self.icd10_ischemic || self.icd10_cerebro || self.icd10_external
    }
}

/// One finalized patient: identity, covariates, and derived flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DonorRecord {
    pub patient_id: PatientId,
    pub final_death_dttm: Option<NaiveDateTime>,
    pub age_at_death: Option<f64>,
    pub sex_category: Option<String>,
    pub race_category: Option<String>,
    pub ethnicity_category: Option<String>,
    pub first_admission_location: Option<String>,
    pub last_location_category: Option<String>,
    pub hospital_length_of_stay_days: Option<i64>,
    pub first_icu_los_days: Option<f64>,
    pub bmi: Option<f64>,
    pub creatinine_value: Option<f64>,
    pub bilirubin_total_value: Option<f64>,
    pub ast_value: Option<f64>,
    pub alt_value: Option<f64>,
    pub hr_2death_last_imv: Option<f64>,
    pub gcs_total_value: Option<f64>,
    pub rass_value: Option<f64>,
    pub flags: DonorFlags,
    /// Age/cause/no-contraindication definition (CMS CALC).
    pub calc_flag: bool,
    /// Stricter CLIF-eligible-donors definition.
    pub clif_eligible_donors: bool,
}

impl DonorRecord {
    /// New record with default flags and empty covariates.
    pub fn new(patient_id: PatientId) -> Self {
        Self {
            patient_id,
            final_death_dttm: None,
            age_at_death: None,
            sex_category: None,
            race_category: None,
            ethnicity_category: None,
            first_admission_location: None,
            last_location_category: None,
            hospital_length_of_stay_days: None,
            first_icu_los_days: None,
            bmi: None,
            creatinine_value: None,
            bilirubin_total_value: None,
            ast_value: None,
            alt_value: None,
            hr_2death_last_imv: None,
            gcs_total_value: None,
            rass_value: None,
            flags: DonorFlags::default(),
            calc_flag: false,
            clif_eligible_donors: false,
        }
    }
}

/// Patient-keyed cohort: exactly one record per patient by construction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientCohort {
    records: BTreeMap<PatientId, DonorRecord>,
}

impl PatientCohort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, replacing any earlier record for the same patient.
    /// Returns the displaced record when replacement happened.
    pub fn insert(&mut self, record: DonorRecord) -> Option<DonorRecord> {
        self.records.insert(record.patient_id.clone(), record)
    }

    pub fn get(&self, patient_id: &PatientId) -> Option<&DonorRecord> {
        self.records.get(patient_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in patient-id order.
    pub fn records(&self) -> impl Iterator<Item = &DonorRecord> {
        self.records.values()
    }

    pub fn records_mut(&mut self) -> impl Iterator<Item = &mut DonorRecord> {
        self.records.values_mut()
    }

    /// Count records satisfying a predicate.
    pub fn count_where(&self, predicate: impl Fn(&DonorRecord) -> bool) -> usize {
        self.records.values().filter(|r| predicate(r)).count()
    }
}
