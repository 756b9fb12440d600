//! Derivation across stitched encounters.
//!
//! One patient readmitted within the gap: the two hospitalizations form one
//! encounter block, the stay summaries span both, and the missing death
//! timestamp falls back to the last recorded vital sign.

use polars::prelude::*;

use donor_cohort::flags::{CauseOfDeathFlags, ImvWindowFlag};
use donor_cohort::spine::{
    attach_age, attach_stay_summaries, build_spine, inpatient_filter, resolve_death_time,
    vitals_summary,
};
use donor_cohort::{FlagDeriver, classify, finalize, stitch_encounters};
use donor_model::tables::col as c;
use donor_model::{ContraindicationList, PatientId};

const HOUR_MS: i64 = 3_600_000;

fn dt(df: DataFrame, columns: &[&str]) -> DataFrame {
    df.lazy()
        .with_columns(
            columns
                .iter()
                .map(|name| col(*name).cast(DataType::Datetime(TimeUnit::Milliseconds, None)))
                .collect::<Vec<_>>(),
        )
        .collect()
        .unwrap()
}

#[test]
fn readmission_within_gap_derives_one_spanning_encounter() {
    let patient = dt(
        df![
            c::PATIENT_ID => ["p1"],
            c::BIRTH_DATE => [-300_000 * HOUR_MS],
            c::DEATH_DTTM => [None::<i64>],
            c::RACE_CATEGORY => ["white"],
            c::SEX_CATEGORY => ["female"],
            c::ETHNICITY_CATEGORY => ["non-hispanic"],
        ]
        .unwrap(),
        &[c::BIRTH_DATE, c::DEATH_DTTM],
    );
    // Discharged alive, readmitted six hours later, died during the second
    // hospitalization.
    let hosp = dt(
        df![
            c::PATIENT_ID => ["p1", "p1"],
            c::HOSPITALIZATION_ID => ["h1", "h2"],
            c::ADMISSION_DTTM => [0i64, 46 * HOUR_MS],
            c::DISCHARGE_DTTM => [40 * HOUR_MS, 100 * HOUR_MS],
            c::DISCHARGE_CATEGORY => ["home", "Expired"],
            c::AGE_AT_ADMISSION => [34.0, 34.0],
            c::ADMISSION_TYPE_CATEGORY => ["Emergency", "Emergency"],
        ]
        .unwrap(),
        &[c::ADMISSION_DTTM, c::DISCHARGE_DTTM],
    );
    let adt = dt(
        df![
            c::HOSPITALIZATION_ID => ["h1", "h2"],
            c::IN_DTTM => [0i64, 46 * HOUR_MS],
            c::OUT_DTTM => [40 * HOUR_MS, 100 * HOUR_MS],
            c::LOCATION_CATEGORY => ["ICU", "Ward"],
        ]
        .unwrap(),
        &[c::IN_DTTM, c::OUT_DTTM],
    );
    let vitals = dt(
        df![
            c::HOSPITALIZATION_ID => ["h2", "h2", "h2"],
            c::RECORDED_DTTM => [50 * HOUR_MS, 50 * HOUR_MS, 99 * HOUR_MS],
            c::VITAL_CATEGORY => ["weight_kg", "height_cm", "heart_rate"],
            c::VITAL_VALUE => [70.0, 175.0, 80.0],
        ]
        .unwrap(),
        &[c::RECORDED_DTTM],
    );

    let map = stitch_encounters(&hosp, 12).unwrap();
    assert_eq!(map.block_count(), 1);
    let hosp = map.attach(hosp).unwrap();
    let adt = map.attach(adt).unwrap();

    let spine = build_spine(&hosp, &patient).unwrap();
    assert_eq!(spine.height(), 1);

    let spine = resolve_death_time(spine, &vitals_summary(vitals).unwrap()).unwrap();
    let final_death: Option<i64> = spine
        .column(c::FINAL_DEATH_DTTM)
        .unwrap()
        .datetime()
        .unwrap()
        .phys
        .get(0);
    assert_eq!(final_death, Some(99 * HOUR_MS));

    let spine = inpatient_filter(spine, &adt).unwrap();
    assert_eq!(spine.height(), 1);
    let spine = attach_stay_summaries(spine, &adt).unwrap();
    let spine = attach_age(spine, &patient).unwrap();

    // Last IMV observation one hour before the resolved death.
    let resp = dt(
        df![
            c::HOSPITALIZATION_ID => ["h2"],
            c::RECORDED_DTTM => [98 * HOUR_MS],
            c::DEVICE_CATEGORY => ["IMV"],
        ]
        .unwrap(),
        &[c::RECORDED_DTTM],
    );
    let dx = df![
        c::HOSPITALIZATION_ID => ["h2"],
        c::DIAGNOSIS_CODE => ["I25.9"],
        c::DIAGNOSIS_CODE_FORMAT => ["ICD10CM"],
    ]
    .unwrap();

    let contraindications = ContraindicationList::from_raw_codes(Vec::<String>::new());
    let spine = CauseOfDeathFlags::new(&contraindications)
        .derive(spine, &dx)
        .unwrap();
    let spine = ImvWindowFlag.derive(spine, &resp).unwrap();

    let mut cohort = finalize(&spine).unwrap();
    classify(&mut cohort);
    assert_eq!(cohort.len(), 1);

    let record = cohort.get(&PatientId::new("p1").unwrap()).unwrap();
    // The stitched block spans both hospitalizations: 100 hours, 4 whole days.
    assert_eq!(record.hospital_length_of_stay_days, Some(4));
    let icu_days = record.first_icu_los_days.unwrap();
    assert!((icu_days - 40.0 / 24.0).abs() < 1e-9);
    assert_eq!(record.first_admission_location.as_deref(), Some("icu"));
    assert!(record.flags.age_75_less);
    assert!(record.flags.icd10_ischemic);
    assert!(record.flags.imv_48hr_expire);
    assert_eq!(record.hr_2death_last_imv, Some(1.0));
    // Qualifying cause with no contraindication: CALC qualifies, but the
    // organ checks never ran so the CLIF definition does not.
    assert!(record.calc_flag);
    assert!(!record.clif_eligible_donors);
}
