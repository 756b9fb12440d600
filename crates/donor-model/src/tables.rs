//! CLIF source-table catalogue.
//!
//! Names the input tables the pipeline reads and the columns it relies on,
//! so the loader and the derivers agree on one vocabulary. Source files are
//! expected as `clif_<table>.<ext>` under the site's tables directory.

use std::fmt;

/// Column names shared across tables.
pub mod col {
    pub const PATIENT_ID: &str = "patient_id";
    pub const HOSPITALIZATION_ID: &str = "hospitalization_id";
    pub const ENCOUNTER_BLOCK: &str = "encounter_block";

    // patient
    pub const BIRTH_DATE: &str = "birth_date";
    pub const DEATH_DTTM: &str = "death_dttm";
    pub const RACE_CATEGORY: &str = "race_category";
    pub const SEX_CATEGORY: &str = "sex_category";
    pub const ETHNICITY_CATEGORY: &str = "ethnicity_category";

    // hospitalization
    pub const ADMISSION_DTTM: &str = "admission_dttm";
    pub const DISCHARGE_DTTM: &str = "discharge_dttm";
    pub const DISCHARGE_CATEGORY: &str = "discharge_category";
    pub const ADMISSION_TYPE_CATEGORY: &str = "admission_type_category";
    pub const AGE_AT_ADMISSION: &str = "age_at_admission";

    // adt
    pub const IN_DTTM: &str = "in_dttm";
    pub const OUT_DTTM: &str = "out_dttm";
    pub const LOCATION_CATEGORY: &str = "location_category";
    pub const LOCATION_NAME: &str = "location_name";

    // vitals
    pub const RECORDED_DTTM: &str = "recorded_dttm";
    pub const VITAL_CATEGORY: &str = "vital_category";
    pub const VITAL_VALUE: &str = "vital_value";

    // labs
    pub const LAB_COLLECT_DTTM: &str = "lab_collect_dttm";
    pub const LAB_CATEGORY: &str = "lab_category";
    pub const LAB_VALUE_NUMERIC: &str = "lab_value_numeric";

    // respiratory support
    pub const DEVICE_CATEGORY: &str = "device_category";

    // hospital diagnosis
    pub const DIAGNOSIS_CODE: &str = "diagnosis_code";
    pub const DIAGNOSIS_CODE_FORMAT: &str = "diagnosis_code_format";

    // microbiology culture
    pub const COLLECT_DTTM: &str = "collect_dttm";
    pub const FLUID_CATEGORY: &str = "fluid_category";
    pub const METHOD_CATEGORY: &str = "method_category";
    pub const ORGANISM_CATEGORY: &str = "organism_category";

    // patient assessments
    pub const ASSESSMENT_CATEGORY: &str = "assessment_category";
    pub const NUMERICAL_VALUE: &str = "numerical_value";

    // medication administration (outlier handling only)
    pub const MED_CATEGORY: &str = "med_category";
    pub const MED_DOSE: &str = "med_dose";
    pub const MED_DOSE_UNIT: &str = "med_dose_unit";

    // derived by the pipeline
    pub const ADJUSTED_DEATH_DTTM: &str = "adjusted_death_dttm";
    pub const FINAL_DEATH_DTTM: &str = "final_death_dttm";
    pub const FIRST_RECORDED_VITAL_DTTM: &str = "first_recorded_vital_dttm";
    pub const LAST_RECORDED_VITAL_DTTM: &str = "last_recorded_vital_dttm";
    pub const LAST_WEIGHT_KG: &str = "last_weight_kg";
    pub const LAST_HEIGHT_CM: &str = "last_height_cm";
    pub const BMI: &str = "bmi";
    pub const LAST_LOCATION_CATEGORY: &str = "last_location_category";
    pub const FIRST_ADMISSION_LOCATION: &str = "first_admission_location";
    pub const HOSPITAL_LOS_DAYS: &str = "hospital_length_of_stay_days";
    pub const FIRST_ICU_LOS_DAYS: &str = "first_icu_los_days";
    pub const AGE_AT_DEATH: &str = "age_at_death";
    pub const AGE_75_LESS: &str = "age_75_less";
    pub const ICD10_ISCHEMIC: &str = "icd10_ischemic";
    pub const ICD10_CEREBRO: &str = "icd10_cerebro";
    pub const ICD10_EXTERNAL: &str = "icd10_external";
    pub const ICD10_CONTRAINDICATION: &str = "icd10_contraindication";
    pub const IMV_48HR_EXPIRE: &str = "imv_48hr_expire";
    pub const HR_2DEATH_LAST_IMV: &str = "hr_2death_last_imv";
    pub const ON_CRRT_48H_BEFORE_DEATH: &str = "on_crrt_48h_before_death";
    pub const CREATININE_VALUE: &str = "creatinine_value";
    pub const BILIRUBIN_TOTAL_VALUE: &str = "bilirubin_total_value";
    pub const AST_VALUE: &str = "ast_value";
    pub const ALT_VALUE: &str = "alt_value";
    pub const KIDNEY_ELIGIBLE: &str = "kidney_eligible";
    pub const LIVER_ELIGIBLE: &str = "liver_eligible";
    pub const BMI_ELIGIBLE: &str = "bmi_eligible";
    pub const ORGAN_CHECK_PASS: &str = "organ_check_pass";
    pub const NO_POSITIVE_CULTURE_48HRS: &str = "no_positive_culture_48hrs";
    pub const GCS_TOTAL_VALUE: &str = "gcs_total_value";
    pub const RASS_VALUE: &str = "rass_value";
    pub const CALC_FLAG: &str = "calc_flag";
    pub const CLIF_ELIGIBLE_DONORS: &str = "clif_eligible_donors";
}

/// Category values the derivers match against (after lowercasing).
pub mod category {
    pub const EXPIRED: &str = "expired";
    pub const IMV: &str = "imv";
    pub const ICU: &str = "icu";
    pub const WARD: &str = "ward";
    pub const ED: &str = "ed";
    pub const STEPDOWN: &str = "stepdown";
    pub const WEIGHT_KG: &str = "weight_kg";
    pub const HEIGHT_CM: &str = "height_cm";
    pub const CREATININE: &str = "creatinine";
    pub const BILIRUBIN_TOTAL: &str = "bilirubin_total";
    pub const AST: &str = "ast";
    pub const ALT: &str = "alt";
    pub const BLOOD: &str = "blood";
    pub const CULTURE: &str = "culture";
    pub const NO_GROWTH: &str = "no_growth";
    pub const GCS_TOTAL: &str = "gcs_total";
    pub const RASS: &str = "rass";
}

/// Inpatient location categories that qualify a decedent for the cohort.
pub const ELIGIBLE_LOCATIONS: [&str; 4] = [
    category::ED,
    category::WARD,
    category::STEPDOWN,
    category::ICU,
];

/// Source tables read by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceTable {
    Patient,
    Hospitalization,
    Adt,
    Vitals,
    Labs,
    RespiratorySupport,
    HospitalDiagnosis,
    CrrtTherapy,
    MicrobiologyCulture,
    PatientAssessments,
}

impl SourceTable {
    pub const ALL: [SourceTable; 10] = [
        SourceTable::Patient,
        SourceTable::Hospitalization,
        SourceTable::Adt,
        SourceTable::Vitals,
        SourceTable::Labs,
        SourceTable::RespiratorySupport,
        SourceTable::HospitalDiagnosis,
        SourceTable::CrrtTherapy,
        SourceTable::MicrobiologyCulture,
        SourceTable::PatientAssessments,
    ];

    /// Bare table name, as used in file names and the outlier configuration.
    pub fn name(self) -> &'static str {
        match self {
            SourceTable::Patient => "patient",
            SourceTable::Hospitalization => "hospitalization",
            SourceTable::Adt => "adt",
            SourceTable::Vitals => "vitals",
            SourceTable::Labs => "labs",
            SourceTable::RespiratorySupport => "respiratory_support",
            SourceTable::HospitalDiagnosis => "hospital_diagnosis",
            SourceTable::CrrtTherapy => "crrt_therapy",
            SourceTable::MicrobiologyCulture => "microbiology_culture",
            SourceTable::PatientAssessments => "patient_assessments",
        }
    }

    /// File stem under the site tables directory (`clif_<table>`).
    pub fn file_stem(self) -> String {
        format!("clif_{}", self.name())
    }

    /// Columns the pipeline requires from this table.
    pub fn required_columns(self) -> &'static [&'static str] {
        match self {
            SourceTable::Patient => &[col::PATIENT_ID, col::BIRTH_DATE, col::DEATH_DTTM],
            SourceTable::Hospitalization => &[
                col::PATIENT_ID,
                col::HOSPITALIZATION_ID,
                col::ADMISSION_DTTM,
                col::DISCHARGE_DTTM,
                col::DISCHARGE_CATEGORY,
            ],
            SourceTable::Adt => &[
                col::HOSPITALIZATION_ID,
                col::IN_DTTM,
                col::OUT_DTTM,
                col::LOCATION_CATEGORY,
            ],
            SourceTable::Vitals => &[
                col::HOSPITALIZATION_ID,
                col::RECORDED_DTTM,
                col::VITAL_CATEGORY,
                col::VITAL_VALUE,
            ],
            SourceTable::Labs => &[
                col::HOSPITALIZATION_ID,
                col::LAB_COLLECT_DTTM,
                col::LAB_CATEGORY,
                col::LAB_VALUE_NUMERIC,
            ],
            SourceTable::RespiratorySupport => &[
                col::HOSPITALIZATION_ID,
                col::RECORDED_DTTM,
                col::DEVICE_CATEGORY,
            ],
            SourceTable::HospitalDiagnosis => &[
                col::HOSPITALIZATION_ID,
                col::DIAGNOSIS_CODE,
                col::DIAGNOSIS_CODE_FORMAT,
            ],
            SourceTable::CrrtTherapy => &[col::HOSPITALIZATION_ID, col::RECORDED_DTTM],
            SourceTable::MicrobiologyCulture => &[
                col::HOSPITALIZATION_ID,
                col::COLLECT_DTTM,
                col::FLUID_CATEGORY,
                col::METHOD_CATEGORY,
                col::ORGANISM_CATEGORY,
            ],
            SourceTable::PatientAssessments => &[
                col::HOSPITALIZATION_ID,
                col::RECORDED_DTTM,
                col::ASSESSMENT_CATEGORY,
                col::NUMERICAL_VALUE,
            ],
        }
    }
}

impl fmt::Display for SourceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
