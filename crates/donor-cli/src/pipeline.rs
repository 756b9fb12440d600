//! Cohort derivation pipeline with explicit stages.
//!
//! The pipeline follows these stages in order:
//! 1. **Ingest**: read the patient, hospitalization, and ADT tables
//! 2. **Decedents**: restrict to patients with an expired hospitalization
//! 3. **Stitch**: link hospitalizations within the readmission gap into
//!    encounter blocks
//! 4. **Spine**: one death hospitalization per patient, death time resolved,
//!    inpatient gate applied, stay summaries and age attached
//! 5. **Flags**: one deriver per event table
//! 6. **Finalize**: collapse to the typed patient-keyed cohort, classify,
//!    and write the outputs
//!
//! Strobe counts are recorded as each stage lands so the written
//! `strobe_counts.csv` follows pipeline order.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use polars::prelude::*;
use tracing::{debug, info, info_span, warn};

use donor_cohort::flags::{
    BedsideAssessments, BloodCultureScreen, CauseOfDeathFlags, CrrtFlag, ImvWindowFlag,
    OrganLabValues, apply_organ_criteria,
};
use donor_cohort::spine::{
    attach_age, attach_stay_summaries, build_spine, column_values, datetime_columns,
    expired_hospitalizations, inpatient_filter, n_unique_patients, resolve_death_time,
    restrict_to_adt, vitals_summary,
};
use donor_cohort::{FlagDeriver, apply_outlier_ranges, classify, finalize, stitch_encounters};
use donor_ingest::{
    TableFormat, check_unique_key, ensure_datetime, load_contraindications, load_outlier_config,
    read_table, read_table_filtered,
};
use donor_model::tables::col as c;
use donor_model::{ContraindicationList, OutlierConfig, PatientCohort, SourceTable};
use donor_report::{
    AttritionTable, StrobeCounts, calc_attrition, clif_attrition, write_attrition_csv,
    write_cohort_parquet,
};

use crate::logging::redact_value;

/// Inputs for one derivation run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Directory holding the site's `clif_<table>` files.
    pub tables_dir: PathBuf,
    pub format: TableFormat,
    /// Site label for logs and the summary (defaults to the directory name).
    pub site: Option<String>,
    /// Output directory (defaults to `<tables_dir>/output`).
    pub output_dir: Option<PathBuf>,
    pub outlier_config: Option<PathBuf>,
    pub contraindications: Option<PathBuf>,
    /// Readmission gap in hours for encounter stitching.
    pub gap_hours: i64,
    /// Derive and report without writing output files.
    pub dry_run: bool,
}

/// Paths of the files a non-dry run wrote.
#[derive(Debug, Clone)]
pub struct RunOutputs {
    pub cohort_parquet: PathBuf,
    pub calc_attrition: PathBuf,
    pub clif_attrition: PathBuf,
    pub strobe_counts: PathBuf,
}

/// Result of a derivation run.
#[derive(Debug)]
pub struct RunResult {
    pub site: String,
    pub output_dir: PathBuf,
    pub total_patients: usize,
    pub cohort: PatientCohort,
    pub calc: AttritionTable,
    pub clif: AttritionTable,
    pub strobe: StrobeCounts,
    /// None on a dry run.
    pub outputs: Option<RunOutputs>,
}

/// Run the full derivation for one site.
pub fn run(config: &RunConfig) -> Result<RunResult> {
    let site = config
        .site
        .clone()
        .unwrap_or_else(|| derive_site_name(&config.tables_dir));
    let run_span = info_span!("derive", site = %site);
    let _run_guard = run_span.enter();
    let output_dir = config
        .output_dir
        .clone()
        .unwrap_or_else(|| config.tables_dir.join("output"));

    let outliers = config
        .outlier_config
        .as_deref()
        .map(load_outlier_config)
        .transpose()?;
    if outliers.is_none() {
        warn!("no outlier configuration supplied, raw values pass through");
    }
    let contraindications = match &config.contraindications {
        Some(path) => load_contraindications(path)?,
        None => {
            warn!("no contraindication list supplied, contraindication flags stay false");
            ContraindicationList::from_raw_codes(Vec::<String>::new())
        }
    };

    // =========================================================================
    // Stage 1: Ingest base tables
    // =========================================================================
    let ingest_span = info_span!("ingest", tables_dir = %config.tables_dir.display());
    let ingest_start = Instant::now();
    let (patient, hosp, adt) = ingest_span.in_scope(|| -> Result<_> {
        let patient = load_table(config, SourceTable::Patient)?;
        check_unique_key(&patient, &[c::PATIENT_ID], SourceTable::Patient.name())?;
        let hosp = load_table(config, SourceTable::Hospitalization)?;
        check_unique_key(
            &hosp,
            &[c::HOSPITALIZATION_ID],
            SourceTable::Hospitalization.name(),
        )?;
        let adt = load_table(config, SourceTable::Adt)?;
        check_unique_key(
            &adt,
            &[c::HOSPITALIZATION_ID, c::IN_DTTM],
            SourceTable::Adt.name(),
        )?;
        Ok((patient, hosp, adt))
    })?;
    debug!(
        duration_ms = ingest_start.elapsed().as_millis() as u64,
        "base tables loaded"
    );

    let mut strobe = StrobeCounts::new();
    let total_patients = n_unique_patients(&patient)?;
    strobe.record("0_all_patients", total_patients);

    // =========================================================================
    // Stage 2: Restrict to decedent patients
    // =========================================================================
    let expired = expired_hospitalizations(&hosp)?;
    let decedent_patient_ids = unique_values(&expired, c::PATIENT_ID)?;
    if let Some(sample) = decedent_patient_ids.first() {
        debug!(
            patients = decedent_patient_ids.len(),
            sample = %redact_value(sample),
            "decedent patients identified"
        );
    }
    let hosp = filter_by_ids(hosp, c::PATIENT_ID, &decedent_patient_ids)?;
    let decedent_hosp_ids = unique_values(&hosp, c::HOSPITALIZATION_ID)?;
    let adt = filter_by_ids(adt, c::HOSPITALIZATION_ID, &decedent_hosp_ids)?;

    // =========================================================================
    // Stage 3: Stitch encounters
    // =========================================================================
    let stitch_span = info_span!("stitch", gap_hours = config.gap_hours);
    let (hosp, adt) = stitch_span.in_scope(|| -> Result<_> {
        let map = stitch_encounters(&hosp, config.gap_hours)?;
        info!(blocks = map.block_count(), "stitched encounter blocks");
        Ok((map.attach(hosp)?, map.attach(adt)?))
    })?;

    // =========================================================================
    // Stage 4: Build the decedent spine
    // =========================================================================
    let spine_span = info_span!("spine");
    let spine_guard = spine_span.enter();
    let hosp = restrict_to_adt(hosp, &adt)?;
    let mut spine = build_spine(&hosp, &patient)?;
    strobe.record("1_decedents_df_n", spine.height());

    let cohort_hosp_ids = unique_values(&spine, c::HOSPITALIZATION_ID)?;
    let vitals = load_events(config, SourceTable::Vitals, &cohort_hosp_ids, outliers.as_ref())?;
    let vitals = vitals_summary(vitals)?;
    spine = resolve_death_time(spine, &vitals)?;

    spine = inpatient_filter(spine, &adt)?;
    strobe.record("2_inpatient_decedents", spine.height());

    spine = attach_stay_summaries(spine, &adt)?;
    spine = attach_age(spine, &patient)?;
    strobe.record("3_age_relevant_cohort_n", count_true(&spine, c::AGE_75_LESS)?);
    drop(spine_guard);

    // The inpatient gate shrank the spine; event tables only need the
    // surviving death hospitalizations.
    let cohort_hosp_ids = unique_values(&spine, c::HOSPITALIZATION_ID)?;

    // =========================================================================
    // Stage 5: Flag derivers, one event table each
    // =========================================================================
    let dx = load_events(
        config,
        SourceTable::HospitalDiagnosis,
        &cohort_hosp_ids,
        outliers.as_ref(),
    )?;
    let dx_hosp_ids = unique_values(&dx, c::HOSPITALIZATION_ID)?;
    strobe.record(
        "5_present_inpatient_hospitalization_ids_in_hospital_dx",
        dx_hosp_ids.len(),
    );
    let with_dx = filter_by_ids(spine.clone(), c::HOSPITALIZATION_ID, &dx_hosp_ids)?;
    strobe.record("5_age_relevant_in_hospital_dx", count_true(&with_dx, c::AGE_75_LESS)?);
    let causes = CauseOfDeathFlags::new(&contraindications);
    spine = run_deriver(&causes, spine, &dx)?;

    let resp = load_events(
        config,
        SourceTable::RespiratorySupport,
        &cohort_hosp_ids,
        outliers.as_ref(),
    )?;
    let imv = ImvWindowFlag;
    let (with_imv, imv_stats) = imv.derive_with_stats(spine, &resp)?;
    spine = with_imv;
    strobe.record("6_imv_expired_patients", imv_stats.ever_on_imv);
    strobe.record("6_imv_after_expire", imv_stats.imv_at_or_after_death);
    strobe.record("6_imv_48hr_expire", imv_stats.within_window);

    let crrt = load_events(
        config,
        SourceTable::CrrtTherapy,
        &cohort_hosp_ids,
        outliers.as_ref(),
    )?;
    spine = run_deriver(&CrrtFlag, spine, &crrt)?;

    let labs = load_events(config, SourceTable::Labs, &cohort_hosp_ids, outliers.as_ref())?;
    spine = run_deriver(&OrganLabValues, spine, &labs)?;
    spine = apply_organ_criteria(spine)?;

    let micro = load_events(
        config,
        SourceTable::MicrobiologyCulture,
        &cohort_hosp_ids,
        outliers.as_ref(),
    )?;
    spine = run_deriver(&BloodCultureScreen, spine, &micro)?;

    let assessments = load_events(
        config,
        SourceTable::PatientAssessments,
        &cohort_hosp_ids,
        outliers.as_ref(),
    )?;
    spine = run_deriver(&BedsideAssessments, spine, &assessments)?;

    // =========================================================================
    // Stage 6: Finalize, classify, report
    // =========================================================================
    let mut cohort = finalize(&spine)?;
    classify(&mut cohort);

    strobe.record(
        "organ_kidney_eligible",
        cohort.count_where(|r| r.flags.kidney_eligible),
    );
    strobe.record(
        "organ_liver_eligible",
        cohort.count_where(|r| r.flags.liver_eligible),
    );
    strobe.record(
        "organ_bmi_eligible",
        cohort.count_where(|r| r.flags.bmi_eligible),
    );
    strobe.record(
        "organ_check_pass",
        cohort.count_where(|r| r.flags.organ_check_pass),
    );
    strobe.record(
        "no_positive_culture_48hrs",
        cohort.count_where(|r| r.flags.no_positive_culture_48hrs),
    );
    strobe.record(
        "positive_culture_48hrs",
        cohort.count_where(|r| !r.flags.no_positive_culture_48hrs),
    );
    strobe.record(
        "calc_cause",
        cohort.count_where(|r| r.flags.age_75_less && r.flags.has_calc_cause()),
    );
    strobe.record(
        "calc_cause_no_contraindication",
        cohort.count_where(|r| {
            r.flags.age_75_less && r.flags.has_calc_cause() && !r.flags.icd10_contraindication
        }),
    );
    strobe.record("calc_qualified", cohort.count_where(|r| r.calc_flag));
    strobe.record(
        "clif_eligible_donors",
        cohort.count_where(|r| r.clif_eligible_donors),
    );

    let calc = calc_attrition(&cohort);
    let clif = clif_attrition(&cohort);

    let outputs = if config.dry_run {
        info!("dry run, skipping output files");
        None
    } else {
        std::fs::create_dir_all(&output_dir)
            .with_context(|| format!("failed to create {}", output_dir.display()))?;
        let cohort_parquet = output_dir.join("final_cohort.parquet");
        write_cohort_parquet(&cohort, &cohort_parquet)?;
        let calc_attrition_path = output_dir.join("calc_attrition.csv");
        write_attrition_csv(&calc, &calc_attrition_path)?;
        let clif_attrition_path = output_dir.join("clif_attrition.csv");
        write_attrition_csv(&clif, &clif_attrition_path)?;
        let strobe_path = output_dir.join("strobe_counts.csv");
        strobe.write_csv(&strobe_path)?;
        Some(RunOutputs {
            cohort_parquet,
            calc_attrition: calc_attrition_path,
            clif_attrition: clif_attrition_path,
            strobe_counts: strobe_path,
        })
    };

    info!(
        patients = cohort.len(),
        calc_qualified = calc.final_retained(),
        clif_eligible = clif.final_retained(),
        "derivation complete"
    );

    Ok(RunResult {
        site,
        output_dir,
        total_patients,
        cohort,
        calc,
        clif,
        strobe,
        outputs,
    })
}

fn derive_site_name(tables_dir: &Path) -> String {
    tables_dir
        .file_name()
        .and_then(|name| name.to_str())
        .map_or_else(|| "site".to_string(), str::to_string)
}

/// Read a base table and coerce its timestamp columns.
fn load_table(config: &RunConfig, table: SourceTable) -> Result<DataFrame> {
    let df = read_table(&config.tables_dir, table, config.format)?;
    ensure_datetime(df, datetime_columns(table))
}

/// Read an event table filtered to the cohort, outlier-handled and
/// time-coerced.
fn load_events(
    config: &RunConfig,
    table: SourceTable,
    hosp_ids: &[String],
    outliers: Option<&OutlierConfig>,
) -> Result<DataFrame> {
    let df = read_table_filtered(
        &config.tables_dir,
        table,
        config.format,
        c::HOSPITALIZATION_ID,
        hosp_ids,
    )?;
    let df = match outliers {
        Some(outlier_config) => apply_outlier_ranges(df, table, outlier_config)?,
        None => df,
    };
    ensure_datetime(df, datetime_columns(table))
}

fn run_deriver<D: FlagDeriver>(deriver: &D, spine: DataFrame, events: &DataFrame) -> Result<DataFrame> {
    let span = info_span!("derive_flags", deriver = deriver.name(), source = %deriver.source());
    let started = Instant::now();
    let spine = span.in_scope(|| deriver.derive(spine, events))?;
    debug!(
        deriver = deriver.name(),
        duration_ms = started.elapsed().as_millis() as u64,
        "derived flag columns"
    );
    Ok(spine)
}

fn unique_values(df: &DataFrame, name: &str) -> Result<Vec<String>> {
    let mut values = column_values(df, name)?;
    values.sort_unstable();
    values.dedup();
    Ok(values)
}

fn filter_by_ids(df: DataFrame, id_column: &str, ids: &[String]) -> Result<DataFrame> {
    let ids = Series::new("ids".into(), ids);
    df.lazy()
        .filter(col(id_column).is_in(lit(ids).implode(), false))
        .collect()
        .with_context(|| format!("failed to filter by {id_column}"))
}

fn count_true(df: &DataFrame, name: &str) -> Result<usize> {
    let n = df
        .column(name)
        .with_context(|| format!("frame lacks column {name:?}"))?
        .bool()
        .with_context(|| format!("column {name:?} is not boolean"))?
        .into_iter()
        .flatten()
        .filter(|value| *value)
        .count();
    Ok(n)
}
