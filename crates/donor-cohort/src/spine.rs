//! Decedent spine construction.
//!
//! The spine is the encounter-grain frame every flag deriver joins onto:
//! expired hospitalizations, one death encounter per patient, a resolved
//! time of death, and the inpatient-location gate applied.

use anyhow::{Context, Result};
use polars::prelude::*;

use donor_model::tables::{category, col as c};
use donor_model::{ELIGIBLE_LOCATIONS, SourceTable};

fn datetime_ms() -> DataType {
    DataType::Datetime(TimeUnit::Milliseconds, None)
}

/// Distinct patients in a frame.
pub fn n_unique_patients(df: &DataFrame) -> Result<usize> {
    let n = df
        .column(c::PATIENT_ID)
        .context("frame lacks patient_id")?
        .as_materialized_series()
        .n_unique()?;
    Ok(n)
}

/// String values of a column, nulls dropped.
pub fn column_values(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let values = df
        .column(name)
        .with_context(|| format!("frame lacks column {name:?}"))?
        .str()
        .with_context(|| format!("column {name:?} is not a string column"))?
        .into_iter()
        .flatten()
        .map(str::to_string)
        .collect();
    Ok(values)
}

/// Drop hospitalizations with no ADT rows.
///
/// The spine deduplication must only choose among hospitalizations that can
/// pass the inpatient gate; a death hospitalization absent from ADT would
/// otherwise shadow an earlier one that has location data.
pub fn restrict_to_adt(hosp: DataFrame, adt: &DataFrame) -> Result<DataFrame> {
    let covered: std::collections::BTreeSet<String> =
        column_values(adt, c::HOSPITALIZATION_ID)?.into_iter().collect();
    let hosp_ids = column_values(&hosp, c::HOSPITALIZATION_ID)?;
    let missing: Vec<&String> = hosp_ids.iter().filter(|id| !covered.contains(*id)).collect();
    if let Some(sample) = missing.first() {
        tracing::warn!(
            missing = missing.len(),
            sample = %sample,
            "decedent hospitalizations missing from ADT, dropping them"
        );
    }
    let ids = Series::new(
        "ids".into(),
        covered.into_iter().collect::<Vec<String>>(),
    );
    hosp.lazy()
        .filter(col(c::HOSPITALIZATION_ID).is_in(lit(ids).implode(), false))
        .collect()
        .context("failed to restrict hospitalizations to ADT coverage")
}

/// Hospitalizations whose discharge category is `expired`.
pub fn expired_hospitalizations(hospitalization: &DataFrame) -> Result<DataFrame> {
    hospitalization
        .clone()
        .lazy()
        .filter(
            col(c::DISCHARGE_CATEGORY)
                .str()
                .to_lowercase()
                .eq(lit(category::EXPIRED)),
        )
        .collect()
        .context("failed to filter expired hospitalizations")
}

/// Build the spine from stitched expired hospitalizations and demographics.
///
/// Keeps one death encounter per patient: when a patient carries several
/// expired hospitalizations (resuscitation, data quality), the one with the
/// latest discharge wins.
pub fn build_spine(hosp_stitched: &DataFrame, patient: &DataFrame) -> Result<DataFrame> {
    let decedents = expired_hospitalizations(hosp_stitched)?;
    let spine = decedents
        .lazy()
        .select([
            col(c::PATIENT_ID),
            col(c::HOSPITALIZATION_ID),
            col(c::ENCOUNTER_BLOCK),
            col(c::ADMISSION_DTTM),
            col(c::DISCHARGE_DTTM),
            col(c::AGE_AT_ADMISSION),
            col(c::DISCHARGE_CATEGORY).str().to_lowercase(),
            col(c::ADMISSION_TYPE_CATEGORY).str().to_lowercase(),
        ])
        .join(
            patient
                .clone()
                .lazy()
                .select([
                    col(c::PATIENT_ID),
                    col(c::DEATH_DTTM),
                    col(c::RACE_CATEGORY),
                    col(c::SEX_CATEGORY),
                    col(c::ETHNICITY_CATEGORY),
                ]),
            [col(c::PATIENT_ID)],
            [col(c::PATIENT_ID)],
            JoinArgs::new(JoinType::Left),
        )
        .collect()
        .context("failed to assemble decedent spine")?;

    let patients = n_unique_patients(&spine)?;
    if spine.height() != patients {
        let mut ids = column_values(&spine, c::PATIENT_ID)?;
        ids.sort_unstable();
        let sample = ids
            .windows(2)
            .find(|pair| pair[0] == pair[1])
            .map(|pair| pair[0].clone())
            .unwrap_or_default();
        tracing::warn!(
            rows = spine.height(),
            patients,
            sample = %sample,
            "patients with multiple death hospitalizations, keeping the latest discharge"
        );
    }
    let spine = spine
        .lazy()
        .sort(
            [c::PATIENT_ID, c::DISCHARGE_DTTM],
            SortMultipleOptions::default(),
        )
        .group_by_stable([col(c::PATIENT_ID)])
        .agg([col("*").last()])
        .collect()
        .context("failed to deduplicate death hospitalizations")?;

    tracing::info!(decedents = spine.height(), "built decedent spine");
    Ok(spine)
}

/// Per-hospitalization vitals summary: observation span, last weight and
/// height ever recorded, and the BMI computed from them.
///
/// Weight and height are deliberately taken from the whole record rather
/// than the pre-death window, matching the donor-assessment convention of
/// using the most recent anthropometrics on file.
pub fn vitals_summary(vitals: DataFrame) -> Result<DataFrame> {
    let height_m = col(c::LAST_HEIGHT_CM) / lit(100.0);
    vitals
        .lazy()
        .sort(
            [c::HOSPITALIZATION_ID, c::RECORDED_DTTM],
            SortMultipleOptions::default(),
        )
        .group_by_stable([col(c::HOSPITALIZATION_ID)])
        .agg([
            col(c::RECORDED_DTTM)
                .min()
                .alias(c::FIRST_RECORDED_VITAL_DTTM),
            col(c::RECORDED_DTTM)
                .max()
                .alias(c::LAST_RECORDED_VITAL_DTTM),
            col(c::VITAL_VALUE)
                .filter(col(c::VITAL_CATEGORY).eq(lit(category::WEIGHT_KG)))
                .last()
                .alias(c::LAST_WEIGHT_KG),
            col(c::VITAL_VALUE)
                .filter(col(c::VITAL_CATEGORY).eq(lit(category::HEIGHT_CM)))
                .last()
                .alias(c::LAST_HEIGHT_CM),
        ])
        .with_column((col(c::LAST_WEIGHT_KG) / (height_m.clone() * height_m)).alias(c::BMI))
        .collect()
        .context("failed to summarize vitals")
}

/// Resolve each decedent's time of death.
///
/// A death timestamp after discharge is clamped to discharge; a missing one
/// falls back to the last recorded vital sign.
pub fn resolve_death_time(spine: DataFrame, vitals_summary: &DataFrame) -> Result<DataFrame> {
    let resolved = spine
        .lazy()
        .join(
            vitals_summary.clone().lazy(),
            [col(c::HOSPITALIZATION_ID)],
            [col(c::HOSPITALIZATION_ID)],
            JoinArgs::new(JoinType::Left),
        )
        .with_column(
            when(
                col(c::DEATH_DTTM)
                    .is_not_null()
                    .and(col(c::DISCHARGE_DTTM).is_not_null())
                    .and(col(c::DEATH_DTTM).gt(col(c::DISCHARGE_DTTM))),
            )
            .then(col(c::DISCHARGE_DTTM))
            .otherwise(col(c::DEATH_DTTM))
            .alias(c::ADJUSTED_DEATH_DTTM),
        )
        .with_column(
            when(col(c::ADJUSTED_DEATH_DTTM).is_not_null())
                .then(col(c::ADJUSTED_DEATH_DTTM))
                .otherwise(col(c::LAST_RECORDED_VITAL_DTTM))
                .alias(c::FINAL_DEATH_DTTM),
        )
        .collect()
        .context("failed to resolve death times")?;

    let unresolved = resolved
        .column(c::FINAL_DEATH_DTTM)?
        .null_count();
    if unresolved > 0 {
        tracing::warn!(unresolved, "decedents with no resolvable time of death");
    }
    Ok(resolved)
}

fn ever_column(location: &str) -> String {
    format!("ever_{location}")
}

/// Apply the inpatient-location gate.
///
/// Joins the per-hospitalization last location and `ever_<location>` flags
/// from ADT, then keeps decedents seen in at least one eligible inpatient
/// location. Decedents with no ADT rows fail the gate.
pub fn inpatient_filter(spine: DataFrame, adt: &DataFrame) -> Result<DataFrame> {
    let mut aggs = vec![
        col(c::LOCATION_CATEGORY)
            .first()
            .alias(c::LAST_LOCATION_CATEGORY),
        col(c::OUT_DTTM).first().alias("last_location_out_dttm"),
    ];
    for location in ELIGIBLE_LOCATIONS {
        aggs.push(
            col(c::LOCATION_CATEGORY)
                .str()
                .to_lowercase()
                .eq(lit(location))
                .any(true)
                .alias(ever_column(location).as_str()),
        );
    }
    let last_location = adt
        .clone()
        .lazy()
        .sort(
            [c::OUT_DTTM],
            SortMultipleOptions::default().with_order_descending(true),
        )
        .group_by_stable([col(c::HOSPITALIZATION_ID)])
        .agg(aggs)
        .collect()
        .context("failed to summarize ADT locations")?;

    let joined = spine
        .lazy()
        .join(
            last_location.lazy(),
            [col(c::HOSPITALIZATION_ID)],
            [col(c::HOSPITALIZATION_ID)],
            JoinArgs::new(JoinType::Left),
        )
        .collect()
        .context("failed to join ADT locations onto spine")?;

    let any_eligible = ELIGIBLE_LOCATIONS
        .iter()
        .map(|location| col(ever_column(location).as_str()).fill_null(lit(false)))
        .reduce(Expr::or)
        .expect("eligible location list is non-empty");

    let before = joined.height();
    let gated = joined
        .lazy()
        .filter(any_eligible)
        .collect()
        .context("failed to apply inpatient gate")?;
    let excluded = before - gated.height();
    if excluded > 0 {
        tracing::info!(excluded, "decedents never seen in an eligible inpatient location");
    }
    Ok(gated)
}

/// Attach per-encounter stay summaries: hospital length of stay, first
/// admission location, and first ICU stay length.
pub fn attach_stay_summaries(spine: DataFrame, adt_stitched: &DataFrame) -> Result<DataFrame> {
    let adt = adt_stitched
        .clone()
        .lazy()
        .with_column(
            col(c::LOCATION_CATEGORY)
                .str()
                .to_lowercase()
                .alias(c::LOCATION_CATEGORY),
        )
        .sort([c::IN_DTTM], SortMultipleOptions::default())
        .collect()
        .context("failed to prepare stitched ADT")?;

    let hosp_summary = adt
        .clone()
        .lazy()
        .group_by_stable([col(c::ENCOUNTER_BLOCK)])
        .agg([
            col(c::IN_DTTM).min().alias("min_in_dttm"),
            col(c::OUT_DTTM).max().alias("max_out_dttm"),
            col(c::LOCATION_CATEGORY)
                .first()
                .alias(c::FIRST_ADMISSION_LOCATION),
        ])
        .with_column(
            (col("max_out_dttm") - col("min_in_dttm"))
                .dt()
                .total_days()
                .alias(c::HOSPITAL_LOS_DAYS),
        )
        .select([
            col(c::ENCOUNTER_BLOCK),
            col(c::FIRST_ADMISSION_LOCATION),
            col(c::HOSPITAL_LOS_DAYS),
        ]);

    let icu = adt
        .lazy()
        .filter(col(c::LOCATION_CATEGORY).eq(lit(category::ICU)))
        .collect()
        .context("failed to restrict ADT to ICU stays")?;
    let first_icu_in = icu
        .clone()
        .lazy()
        .group_by_stable([col(c::ENCOUNTER_BLOCK)])
        .agg([col(c::IN_DTTM).min().alias("first_icu_in_dttm")]);
    let icu_summary = first_icu_in
        .join(
            icu.lazy().select([
                col(c::ENCOUNTER_BLOCK),
                col(c::IN_DTTM),
                col(c::OUT_DTTM),
            ]),
            [col(c::ENCOUNTER_BLOCK), col("first_icu_in_dttm")],
            [col(c::ENCOUNTER_BLOCK), col(c::IN_DTTM)],
            JoinArgs::new(JoinType::Left),
        )
        .with_column(
            ((col(c::OUT_DTTM) - col("first_icu_in_dttm"))
                .dt()
                .total_seconds()
                .cast(DataType::Float64)
                / lit(86_400.0))
            .alias(c::FIRST_ICU_LOS_DAYS),
        )
        // Two ICU rows can share the first in_dttm; keep one.
        .group_by_stable([col(c::ENCOUNTER_BLOCK)])
        .agg([col(c::FIRST_ICU_LOS_DAYS).first()]);

    spine
        .lazy()
        .join(
            hosp_summary,
            [col(c::ENCOUNTER_BLOCK)],
            [col(c::ENCOUNTER_BLOCK)],
            JoinArgs::new(JoinType::Left),
        )
        .join(
            icu_summary,
            [col(c::ENCOUNTER_BLOCK)],
            [col(c::ENCOUNTER_BLOCK)],
            JoinArgs::new(JoinType::Left),
        )
        .collect()
        .context("failed to attach stay summaries")
}

/// Compute age at death and the patient-level `age_75_less` flag.
pub fn attach_age(spine: DataFrame, patient: &DataFrame) -> Result<DataFrame> {
    let with_age = spine
        .lazy()
        .join(
            patient
                .clone()
                .lazy()
                .select([col(c::PATIENT_ID), col(c::BIRTH_DATE)]),
            [col(c::PATIENT_ID)],
            [col(c::PATIENT_ID)],
            JoinArgs::new(JoinType::Left),
        )
        .with_column(
            ((col(c::FINAL_DEATH_DTTM) - col(c::BIRTH_DATE).cast(datetime_ms()))
                .dt()
                .total_days()
                .cast(DataType::Float64)
                / lit(365.25))
            .alias(c::AGE_AT_DEATH),
        )
        .collect()
        .context("failed to compute age at death")?;

    let age_flags = with_age
        .clone()
        .lazy()
        .group_by_stable([col(c::PATIENT_ID)])
        .agg([col(c::AGE_AT_DEATH)
            .lt_eq(lit(75.0))
            .any(true)
            .alias(c::AGE_75_LESS)]);

    with_age
        .lazy()
        .join(
            age_flags,
            [col(c::PATIENT_ID)],
            [col(c::PATIENT_ID)],
            JoinArgs::new(JoinType::Left),
        )
        .with_column(col(c::AGE_75_LESS).fill_null(lit(false)))
        .collect()
        .context("failed to attach age flag")
}

/// Source tables whose timestamps the spine depends on, with the columns to
/// coerce before derivation.
pub fn datetime_columns(table: SourceTable) -> &'static [&'static str] {
    match table {
        SourceTable::Patient => &[c::BIRTH_DATE, c::DEATH_DTTM],
        SourceTable::Hospitalization => &[c::ADMISSION_DTTM, c::DISCHARGE_DTTM],
        SourceTable::Adt => &[c::IN_DTTM, c::OUT_DTTM],
        SourceTable::Vitals
        | SourceTable::RespiratorySupport
        | SourceTable::CrrtTherapy
        | SourceTable::PatientAssessments => &[c::RECORDED_DTTM],
        SourceTable::Labs => &[c::LAB_COLLECT_DTTM],
        SourceTable::MicrobiologyCulture => &[c::COLLECT_DTTM],
        SourceTable::HospitalDiagnosis => &[],
    }
}
