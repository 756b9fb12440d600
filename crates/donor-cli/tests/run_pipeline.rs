//! End-to-end derivation over a small CSV site.
//!
//! Two decedents: one eligible donor and one excluded on age, blood
//! culture, and CRRT.

use std::path::Path;

use donor_cli::pipeline::{self, RunConfig};
use donor_ingest::TableFormat;
use donor_model::PatientId;

fn write_site_tables(dir: &Path) {
    let tables: &[(&str, &str)] = &[
        (
            "clif_patient.csv",
            "patient_id,birth_date,death_dttm,race_category,sex_category,ethnicity_category\n\
             p1,1970-01-01,2023-03-10 12:00:00,white,female,non-hispanic\n\
             p2,1940-01-01,2023-03-11 09:00:00,black,male,non-hispanic\n",
        ),
        // h3 is a later expired hospitalization for p1 with no ADT rows; it
        // must not displace h1 as p1's death hospitalization.
        (
            "clif_hospitalization.csv",
            "patient_id,hospitalization_id,admission_dttm,discharge_dttm,discharge_category,age_at_admission,admission_type_category\n\
             p1,h1,2023-03-01 00:00:00,2023-03-10 12:00:00,Expired,53.0,Emergency\n\
             p1,h3,2023-03-20 00:00:00,2023-03-21 00:00:00,Expired,53.0,Emergency\n\
             p2,h2,2023-03-05 00:00:00,2023-03-11 09:00:00,Expired,83.0,Emergency\n",
        ),
        (
            "clif_adt.csv",
            "hospitalization_id,in_dttm,out_dttm,location_category\n\
             h1,2023-03-01 00:00:00,2023-03-10 12:00:00,ICU\n\
             h2,2023-03-05 00:00:00,2023-03-11 09:00:00,Ward\n",
        ),
        (
            "clif_vitals.csv",
            "hospitalization_id,recorded_dttm,vital_category,vital_value\n\
             h1,2023-03-01 01:00:00,weight_kg,70.0\n\
             h1,2023-03-01 01:00:00,height_cm,170.0\n\
             h2,2023-03-05 01:00:00,weight_kg,80.0\n\
             h2,2023-03-05 01:00:00,height_cm,160.0\n",
        ),
        (
            "clif_labs.csv",
            "hospitalization_id,lab_collect_dttm,lab_category,lab_value_numeric\n\
             h1,2023-03-10 09:00:00,creatinine,1.2\n\
             h1,2023-03-10 09:00:00,bilirubin_total,0.8\n\
             h1,2023-03-10 09:00:00,ast,50.0\n\
             h1,2023-03-10 09:00:00,alt,40.0\n\
             h2,2023-03-11 07:00:00,creatinine,2.0\n",
        ),
        (
            "clif_respiratory_support.csv",
            "hospitalization_id,recorded_dttm,device_category\n\
             h1,2023-03-10 10:00:00,IMV\n\
             h2,2023-03-11 07:00:00,IMV\n",
        ),
        (
            "clif_hospital_diagnosis.csv",
            "hospitalization_id,diagnosis_code,diagnosis_code_format\n\
             h1,I21.0,ICD10CM\n\
             h2,I60.1,ICD10CM\n",
        ),
        (
            "clif_crrt_therapy.csv",
            "hospitalization_id,recorded_dttm\n\
             h2,2023-03-10 00:00:00\n",
        ),
        (
            "clif_microbiology_culture.csv",
            "hospitalization_id,collect_dttm,fluid_category,method_category,organism_category\n\
             h1,2023-03-01 12:00:00,blood,culture,no_growth\n\
             h2,2023-03-10 00:00:00,blood,culture,staph_aureus\n",
        ),
        (
            "clif_patient_assessments.csv",
            "hospitalization_id,recorded_dttm,assessment_category,numerical_value\n\
             h1,2023-03-10 11:00:00,gcs_total,3.0\n\
             h1,2023-03-10 11:00:00,rass,-5.0\n",
        ),
    ];
    for (name, content) in tables {
        std::fs::write(dir.join(name), content).unwrap();
    }
}

fn run_config(dir: &Path, dry_run: bool) -> RunConfig {
    RunConfig {
        tables_dir: dir.to_path_buf(),
        format: TableFormat::Csv,
        site: Some("test-site".to_string()),
        output_dir: None,
        outlier_config: None,
        contraindications: None,
        gap_hours: 12,
        dry_run,
    }
}

#[test]
fn derives_the_cohort_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    write_site_tables(dir.path());

    let result = pipeline::run(&run_config(dir.path(), false)).unwrap();

    assert_eq!(result.total_patients, 2);
    assert_eq!(result.cohort.len(), 2);
    assert_eq!(result.strobe.get("0_all_patients"), Some(2));
    assert_eq!(result.strobe.get("1_decedents_df_n"), Some(2));
    assert_eq!(result.strobe.get("2_inpatient_decedents"), Some(2));
    assert_eq!(result.strobe.get("3_age_relevant_cohort_n"), Some(1));
    assert_eq!(result.strobe.get("6_imv_48hr_expire"), Some(2));
    assert_eq!(result.strobe.get("positive_culture_48hrs"), Some(1));
    assert_eq!(result.strobe.get("clif_eligible_donors"), Some(1));

    let p1 = result.cohort.get(&PatientId::new("p1").unwrap()).unwrap();
    assert!(p1.flags.age_75_less);
    assert!(p1.flags.icd10_ischemic);
    assert!(p1.flags.imv_48hr_expire);
    assert_eq!(p1.hr_2death_last_imv, Some(2.0));
    assert!(p1.flags.kidney_eligible);
    assert!(p1.flags.liver_eligible);
    assert!(p1.flags.organ_check_pass);
    assert!(p1.calc_flag);
    assert!(p1.clif_eligible_donors);
    assert_eq!(p1.gcs_total_value, Some(3.0));
    assert_eq!(p1.rass_value, Some(-5.0));

    let p2 = result.cohort.get(&PatientId::new("p2").unwrap()).unwrap();
    assert!(!p2.flags.age_75_less);
    assert!(p2.flags.icd10_cerebro);
    assert!(p2.flags.on_crrt_48h_before_death);
    assert!(!p2.flags.kidney_eligible);
    assert!(!p2.flags.no_positive_culture_48hrs);
    assert!(!p2.calc_flag);
    assert!(!p2.clif_eligible_donors);

    assert_eq!(result.calc.final_retained(), 1);
    assert_eq!(result.clif.final_retained(), 1);

    let outputs = result.outputs.expect("outputs written");
    assert!(outputs.cohort_parquet.exists());
    assert!(outputs.calc_attrition.exists());
    assert!(outputs.clif_attrition.exists());
    assert!(outputs.strobe_counts.exists());
}

#[test]
fn dry_run_writes_no_files() {
    let dir = tempfile::tempdir().unwrap();
    write_site_tables(dir.path());

    let result = pipeline::run(&run_config(dir.path(), true)).unwrap();

    assert!(result.outputs.is_none());
    assert!(!dir.path().join("output").exists());
    assert_eq!(result.strobe.get("clif_eligible_donors"), Some(1));
}
