//! Attrition tables for the two donor definitions.
//!
//! Stages apply cumulatively in a fixed order, so each retained count is
//! computed over the survivors of the previous stage and the sequence is
//! non-increasing by construction. Sub-reasons are counted independently
//! against the pre-stage population: a patient failing a combined stage for
//! two reasons appears under both, so sub-reasons can exceed the stage's
//! excluded count.

use donor_model::{DonorFlags, DonorRecord, PatientCohort};

/// One attrition stage: what it filtered and what survived.
#[derive(Debug, Clone, PartialEq)]
pub struct StageCount {
    pub stage: String,
    pub description: String,
    pub retained: usize,
    pub excluded: usize,
    /// Share of the previous stage's survivors that remain.
    pub pct_of_previous: f64,
    /// Share of the initial cohort that remains.
    pub pct_of_initial: f64,
    /// Independent exclusion reasons, counted against the pre-stage
    /// population.
    pub sub_reasons: Vec<(String, usize)>,
}

/// Ordered attrition for one definition.
#[derive(Debug, Clone, PartialEq)]
pub struct AttritionTable {
    pub definition: String,
    pub stages: Vec<StageCount>,
}

impl AttritionTable {
    /// Final retained count (the definition's qualifying patients).
    pub fn final_retained(&self) -> usize {
        self.stages.last().map_or(0, |stage| stage.retained)
    }
}

struct Stage {
    name: &'static str,
    description: &'static str,
    keep: fn(&DonorFlags) -> bool,
    sub_reasons: Vec<(&'static str, fn(&DonorFlags) -> bool)>,
}

fn pct(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        100.0 * part as f64 / whole as f64
    }
}

fn run_stages(definition: &str, cohort: &PatientCohort, stages: Vec<Stage>) -> AttritionTable {
    let initial = cohort.len();
    let mut survivors: Vec<&DonorRecord> = cohort.records().collect();
    let mut out = Vec::with_capacity(stages.len() + 1);
    out.push(StageCount {
        stage: "inpatient_decedents".to_string(),
        description: "decedents who died in an eligible inpatient location".to_string(),
        retained: initial,
        excluded: 0,
        pct_of_previous: 100.0,
        pct_of_initial: 100.0,
        sub_reasons: Vec::new(),
    });

    for stage in stages {
        let before = survivors.len();
        let sub_reasons = stage
            .sub_reasons
            .iter()
            .map(|(name, fails)| {
                let n = survivors.iter().filter(|r| fails(&r.flags)).count();
                ((*name).to_string(), n)
            })
            .collect();
        survivors.retain(|record| (stage.keep)(&record.flags));
        out.push(StageCount {
            stage: stage.name.to_string(),
            description: stage.description.to_string(),
            retained: survivors.len(),
            excluded: before - survivors.len(),
            pct_of_previous: pct(survivors.len(), before),
            pct_of_initial: pct(survivors.len(), initial),
            sub_reasons,
        });
    }

    AttritionTable {
        definition: definition.to_string(),
        stages: out,
    }
}

/// Attrition under the CMS CALC definition.
pub fn calc_attrition(cohort: &PatientCohort) -> AttritionTable {
    run_stages(
        "CALC",
        cohort,
        vec![
            Stage {
                name: "age_75_less",
                description: "age at death 75 or less",
                keep: |f| f.age_75_less,
                sub_reasons: Vec::new(),
            },
            Stage {
                name: "calc_cause",
                description: "qualifying cause of death (I20-I25, I60-I69, V01-Y89)",
                keep: DonorFlags::has_calc_cause,
                sub_reasons: Vec::new(),
            },
            Stage {
                name: "no_contraindication",
                description: "no cancer or severe sepsis contraindication",
                keep: |f| !f.icd10_contraindication,
                sub_reasons: Vec::new(),
            },
        ],
    )
}

/// Attrition under the CLIF-eligible-donors definition.
pub fn clif_attrition(cohort: &PatientCohort) -> AttritionTable {
    run_stages(
        "CLIF",
        cohort,
        vec![
            Stage {
                name: "age_75_less",
                description: "age at death 75 or less",
                keep: |f| f.age_75_less,
                sub_reasons: Vec::new(),
            },
            Stage {
                name: "imv_48hr_expire",
                description: "last IMV observation within the window around death",
                keep: |f| f.imv_48hr_expire,
                sub_reasons: Vec::new(),
            },
            Stage {
                name: "no_infection_or_contraindication",
                description: "no positive blood culture within 48h and no contraindication",
                keep: |f| f.no_positive_culture_48hrs && !f.icd10_contraindication,
                sub_reasons: vec![
                    ("positive_blood_culture", |f: &DonorFlags| {
                        !f.no_positive_culture_48hrs
                    }),
                    ("icd10_contraindication", |f: &DonorFlags| {
                        f.icd10_contraindication
                    }),
                ],
            },
            Stage {
                name: "organ_check_pass",
                description: "organ quality check: (kidney or liver) and BMI",
                keep: |f| f.organ_check_pass,
                sub_reasons: vec![
                    ("kidney_ineligible", |f: &DonorFlags| !f.kidney_eligible),
                    ("liver_ineligible", |f: &DonorFlags| !f.liver_eligible),
                    ("bmi_ineligible", |f: &DonorFlags| !f.bmi_eligible),
                ],
            },
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use donor_model::{DonorRecord, PatientId};

    fn cohort_with(flags: Vec<DonorFlags>) -> PatientCohort {
        let mut cohort = PatientCohort::new();
        for (idx, f) in flags.into_iter().enumerate() {
            let mut record = DonorRecord::new(PatientId::new(format!("p{idx}")).unwrap());
            record.flags = f;
            cohort.insert(record);
        }
        cohort
    }

    fn eligible_clif_flags() -> DonorFlags {
        DonorFlags {
            age_75_less: true,
            imv_48hr_expire: true,
            kidney_eligible: true,
            bmi_eligible: true,
            organ_check_pass: true,
            ..DonorFlags::default()
        }
    }

    #[test]
    fn stages_are_monotonically_non_increasing() {
        let mut flags = vec![eligible_clif_flags(); 4];
        flags[1].imv_48hr_expire = false;
        flags[2].no_positive_culture_48hrs = false;
        flags[3].age_75_less = false;
        let cohort = cohort_with(flags);

        for table in [calc_attrition(&cohort), clif_attrition(&cohort)] {
            let retained: Vec<usize> = table.stages.iter().map(|s| s.retained).collect();
            assert!(
                retained.windows(2).all(|w| w[1] <= w[0]),
                "{}: {retained:?}",
                table.definition
            );
            assert_eq!(table.stages[0].retained, cohort.len());
        }
    }

    #[test]
    fn clif_final_stage_matches_the_eligibility_definition() {
        let mut flags = vec![eligible_clif_flags(); 3];
        flags[2].organ_check_pass = false;
        let cohort = cohort_with(flags);

        let table = clif_attrition(&cohort);
        assert_eq!(table.final_retained(), 2);
        let organ_stage = table.stages.last().unwrap();
        assert_eq!(organ_stage.stage, "organ_check_pass");
        assert_eq!(organ_stage.excluded, 1);
    }

    #[test]
    fn sub_reasons_count_independently_and_can_overlap() {
        let mut flags = vec![eligible_clif_flags(); 2];
        // One patient fails the combined stage for both reasons.
        flags[1].no_positive_culture_48hrs = false;
        flags[1].icd10_contraindication = true;
        let cohort = cohort_with(flags);

        let table = clif_attrition(&cohort);
        let stage = table
            .stages
            .iter()
            .find(|s| s.stage == "no_infection_or_contraindication")
            .unwrap();
        assert_eq!(stage.excluded, 1);
        let total_sub: usize = stage.sub_reasons.iter().map(|(_, n)| n).sum();
        assert_eq!(total_sub, 2);
    }

    #[test]
    fn calc_final_stage_equals_calc_flag_count() {
        let mut flags = vec![
            DonorFlags {
                age_75_less: true,
                icd10_ischemic: true,
                ..DonorFlags::default()
            };
            3
        ];
        flags[1].icd10_contraindication = true;
        flags[2].icd10_ischemic = false;
        let cohort = cohort_with(flags);

        let table = calc_attrition(&cohort);
        assert_eq!(table.final_retained(), 1);
        assert_eq!(table.stages.len(), 4);
    }
}
