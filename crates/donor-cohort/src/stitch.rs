//! Encounter stitching.
//!
//! Hospitalizations of the same patient separated by no more than the
//! configured gap are grouped under one encounter block, so an ED-to-ICU
//! transfer billed as two hospitalizations counts as one encounter. Blocks
//! are numbered sequentially across the whole input.

use anyhow::{Context, Result};
use polars::prelude::*;

use donor_model::tables::col as c;

/// Default stitching gap in hours.
pub const DEFAULT_GAP_HOURS: i64 = 12;

#[derive(Debug, Clone)]
struct Stay {
    patient_id: String,
    hospitalization_id: String,
    admission_ms: Option<i64>,
    discharge_ms: Option<i64>,
}

/// Hospitalization-to-block assignment produced by [`stitch_encounters`].
#[derive(Debug, Clone)]
pub struct EncounterMap {
    mapping: DataFrame,
    blocks: usize,
}

impl EncounterMap {
    /// Number of distinct encounter blocks.
    pub fn block_count(&self) -> usize {
        self.blocks
    }

    /// The `hospitalization_id -> encounter_block` mapping frame.
    pub fn mapping(&self) -> &DataFrame {
        &self.mapping
    }

    /// Attach `encounter_block` to a table keyed by `hospitalization_id`.
    ///
    /// Rows referencing a hospitalization absent from the mapping are
    /// dropped with a warning; they cannot belong to any encounter.
    pub fn attach(&self, df: DataFrame) -> Result<DataFrame> {
        let before = df.height();
        let joined = df
            .lazy()
            .join(
                self.mapping.clone().lazy(),
                [col(c::HOSPITALIZATION_ID)],
                [col(c::HOSPITALIZATION_ID)],
                JoinArgs::new(JoinType::Left),
            )
            .filter(col(c::ENCOUNTER_BLOCK).is_not_null())
            .collect()
            .context("failed to attach encounter blocks")?;
        let dropped = before - joined.height();
        if dropped > 0 {
            tracing::warn!(dropped, "rows reference hospitalizations outside the stitched set");
        }
        Ok(joined)
    }
}

/// Assign encounter blocks to a hospitalization table.
///
/// Stays are ordered per patient by admission time; a stay joins the current
/// block when its admission is within `gap_hours` of the latest discharge
/// seen in that block, otherwise it opens a new one. Stays with no admission
/// timestamp always open a new block.
pub fn stitch_encounters(hospitalization: &DataFrame, gap_hours: i64) -> Result<EncounterMap> {
    anyhow::ensure!(gap_hours >= 0, "stitching gap must be non-negative, got {gap_hours}");
    let mut stays = extract_stays(hospitalization)?;
    stays.sort_by(|a, b| {
        a.patient_id
            .cmp(&b.patient_id)
            .then(match (a.admission_ms, b.admission_ms) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => std::cmp::Ordering::Less,
                (None, Some(_)) => std::cmp::Ordering::Greater,
                (None, None) => std::cmp::Ordering::Equal,
            })
    });

    let gap_ms = gap_hours * 3_600_000;
    let mut hosp_ids = Vec::with_capacity(stays.len());
    let mut blocks = Vec::with_capacity(stays.len());
    let mut next_block: i32 = 0;
    let mut current_patient: Option<&str> = None;
    // Latest discharge seen in the open block; overlapping stays extend it.
    let mut block_end_ms: Option<i64> = None;

    for stay in &stays {
        let same_patient = current_patient == Some(stay.patient_id.as_str());
        let within_gap = match (stay.admission_ms, block_end_ms) {
            (Some(admission), Some(end)) => admission - end <= gap_ms,
            _ => false,
        };
        if !(same_patient && within_gap) {
            next_block += 1;
            block_end_ms = None;
        }
        block_end_ms = match (block_end_ms, stay.discharge_ms) {
            (Some(end), Some(discharge)) => Some(end.max(discharge)),
            (None, discharge) => discharge,
            (end, None) => end,
        };
        current_patient = Some(stay.patient_id.as_str());
        hosp_ids.push(stay.hospitalization_id.clone());
        blocks.push(next_block);
    }

    let mapping = df![
        c::HOSPITALIZATION_ID => hosp_ids,
        c::ENCOUNTER_BLOCK => blocks,
    ]
    .context("failed to build encounter mapping frame")?;

    tracing::debug!(
        hospitalizations = stays.len(),
        blocks = next_block,
        gap_hours,
        "stitched encounters"
    );
    Ok(EncounterMap {
        mapping,
        blocks: next_block as usize,
    })
}

fn extract_stays(hospitalization: &DataFrame) -> Result<Vec<Stay>> {
    let patient = hospitalization
        .column(c::PATIENT_ID)
        .context("hospitalization table lacks patient_id")?
        .str()
        .context("patient_id must be a string column")?;
    let hosp = hospitalization
        .column(c::HOSPITALIZATION_ID)
        .context("hospitalization table lacks hospitalization_id")?
        .str()
        .context("hospitalization_id must be a string column")?;
    let admission = hospitalization
        .column(c::ADMISSION_DTTM)
        .context("hospitalization table lacks admission_dttm")?
        .datetime()
        .context("admission_dttm must be a datetime column")?;
    let discharge = hospitalization
        .column(c::DISCHARGE_DTTM)
        .context("hospitalization table lacks discharge_dttm")?
        .datetime()
        .context("discharge_dttm must be a datetime column")?;

    let mut stays = Vec::with_capacity(hospitalization.height());
    let mut missing_admission = 0usize;
    for idx in 0..hospitalization.height() {
        let (Some(patient_id), Some(hospitalization_id)) = (patient.get(idx), hosp.get(idx)) else {
            anyhow::bail!("hospitalization row {idx} has a null identifier");
        };
        let admission_ms = admission.phys.get(idx);
        if admission_ms.is_none() {
            missing_admission += 1;
        }
        stays.push(Stay {
            patient_id: patient_id.to_string(),
            hospitalization_id: hospitalization_id.to_string(),
            admission_ms,
            discharge_ms: discharge.phys.get(idx),
        });
    }
    if missing_admission > 0 {
        tracing::warn!(missing_admission, "stays without admission_dttm get their own blocks");
    }
    Ok(stays)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(hours: i64) -> i64 {
        hours * 3_600_000
    }

    fn hosp_df(rows: &[(&str, &str, Option<i64>, Option<i64>)]) -> DataFrame {
        let dtype = DataType::Datetime(TimeUnit::Milliseconds, None);
        df![
            c::PATIENT_ID => rows.iter().map(|r| r.0).collect::<Vec<_>>(),
            c::HOSPITALIZATION_ID => rows.iter().map(|r| r.1).collect::<Vec<_>>(),
            c::ADMISSION_DTTM => rows.iter().map(|r| r.2).collect::<Vec<_>>(),
            c::DISCHARGE_DTTM => rows.iter().map(|r| r.3).collect::<Vec<_>>(),
        ]
        .unwrap()
        .lazy()
        .with_columns([
            col(c::ADMISSION_DTTM).cast(dtype.clone()),
            col(c::DISCHARGE_DTTM).cast(dtype),
        ])
        .collect()
        .unwrap()
    }

    fn blocks_of(map: &EncounterMap) -> Vec<i32> {
        map.mapping()
            .column(c::ENCOUNTER_BLOCK)
            .unwrap()
            .i32()
            .unwrap()
            .into_no_null_iter()
            .collect()
    }

    #[test]
    fn readmission_within_gap_shares_a_block() {
        let df = hosp_df(&[
            ("p1", "h1", Some(ms(0)), Some(ms(24))),
            ("p1", "h2", Some(ms(30)), Some(ms(48))), // 6h gap
        ]);
        let map = stitch_encounters(&df, DEFAULT_GAP_HOURS).unwrap();
        assert_eq!(blocks_of(&map), vec![1, 1]);
        assert_eq!(map.block_count(), 1);
    }

    #[test]
    fn readmission_beyond_gap_opens_a_new_block() {
        let df = hosp_df(&[
            ("p1", "h1", Some(ms(0)), Some(ms(24))),
            ("p1", "h2", Some(ms(37)), Some(ms(48))), // 13h gap
        ]);
        let map = stitch_encounters(&df, DEFAULT_GAP_HOURS).unwrap();
        assert_eq!(blocks_of(&map), vec![1, 2]);
    }

    #[test]
    fn blocks_never_cross_patients() {
        let df = hosp_df(&[
            ("p1", "h1", Some(ms(0)), Some(ms(24))),
            ("p2", "h2", Some(ms(25)), Some(ms(48))),
        ]);
        let map = stitch_encounters(&df, DEFAULT_GAP_HOURS).unwrap();
        assert_eq!(blocks_of(&map), vec![1, 2]);
    }

    #[test]
    fn overlapping_stays_extend_the_block_window() {
        // h2 ends before h1; h3 starts 6h after h1's end, within gap of the
        // block's latest discharge.
        let df = hosp_df(&[
            ("p1", "h1", Some(ms(0)), Some(ms(50))),
            ("p1", "h2", Some(ms(10)), Some(ms(20))),
            ("p1", "h3", Some(ms(56)), Some(ms(60))),
        ]);
        let map = stitch_encounters(&df, DEFAULT_GAP_HOURS).unwrap();
        assert_eq!(blocks_of(&map), vec![1, 1, 1]);
    }

    #[test]
    fn attach_drops_rows_for_unknown_hospitalizations() {
        let hosp = hosp_df(&[("p1", "h1", Some(ms(0)), Some(ms(24)))]);
        let map = stitch_encounters(&hosp, DEFAULT_GAP_HOURS).unwrap();
        let adt = df![
            c::HOSPITALIZATION_ID => ["h1", "h9"],
            c::LOCATION_CATEGORY => ["icu", "ward"],
        ]
        .unwrap();
        let joined = map.attach(adt).unwrap();
        assert_eq!(joined.height(), 1);
    }
}
