//! Donor eligibility definitions.
//!
//! Both definitions are pure functions over [`DonorFlags`] so their logic is
//! testable without any DataFrame in sight.
//!
//! * CALC: the CMS cause/age/location method. Location is already enforced
//!   by cohort membership, so here it is age, a qualifying cause, and no
//!   contraindication.
//! * CLIF-eligible-donors: age, IMV near death, no contraindication, a
//!   clean blood culture screen, and a passing organ quality check.

use donor_model::{DonorFlags, PatientCohort};

/// CMS CALC definition.
pub fn calc_flag(flags: &DonorFlags) -> bool {
    flags.age_75_less && flags.has_calc_cause() && !flags.icd10_contraindication
}

/// CLIF-eligible-donors definition.
pub fn clif_eligible_donors(flags: &DonorFlags) -> bool {
    flags.age_75_less
        && flags.imv_48hr_expire
        && !flags.icd10_contraindication
        && flags.no_positive_culture_48hrs
        && flags.organ_check_pass
}

/// Evaluate both definitions for every patient in the cohort.
pub fn classify(cohort: &mut PatientCohort) {
    let mut calc = 0usize;
    let mut clif = 0usize;
    for record in cohort.records_mut() {
        record.calc_flag = calc_flag(&record.flags);
        record.clif_eligible_donors = clif_eligible_donors(&record.flags);
        calc += usize::from(record.calc_flag);
        clif += usize::from(record.clif_eligible_donors);
    }
    tracing::info!(calc, clif, "classified donor eligibility");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qualifying_calc() -> DonorFlags {
        DonorFlags {
            age_75_less: true,
            icd10_external: true,
            ..DonorFlags::default()
        }
    }

    fn qualifying_clif() -> DonorFlags {
        DonorFlags {
            age_75_less: true,
            imv_48hr_expire: true,
            organ_check_pass: true,
            ..DonorFlags::default()
        }
    }

    #[test]
    fn calc_needs_age_cause_and_no_contraindication() {
        assert!(calc_flag(&qualifying_calc()));
        assert!(!calc_flag(&DonorFlags {
            age_75_less: false,
            ..qualifying_calc()
        }));
        assert!(!calc_flag(&DonorFlags {
            icd10_external: false,
            ..qualifying_calc()
        }));
        assert!(!calc_flag(&DonorFlags {
            icd10_contraindication: true,
            ..qualifying_calc()
        }));
    }

    #[test]
    fn any_single_cause_satisfies_calc() {
        for flags in [
            DonorFlags {
                icd10_external: false,
                icd10_ischemic: true,
                ..qualifying_calc()
            },
            DonorFlags {
                icd10_external: false,
                icd10_cerebro: true,
                ..qualifying_calc()
            },
        ] {
            assert!(calc_flag(&flags));
        }
    }

    #[test]
    fn clif_requires_every_criterion() {
        assert!(clif_eligible_donors(&qualifying_clif()));
        assert!(!clif_eligible_donors(&DonorFlags {
            imv_48hr_expire: false,
            ..qualifying_clif()
        }));
        assert!(!clif_eligible_donors(&DonorFlags {
            no_positive_culture_48hrs: false,
            ..qualifying_clif()
        }));
        assert!(!clif_eligible_donors(&DonorFlags {
            organ_check_pass: false,
            ..qualifying_clif()
        }));
        assert!(!clif_eligible_donors(&DonorFlags {
            icd10_contraindication: true,
            ..qualifying_clif()
        }));
    }

    #[test]
    fn clif_does_not_require_a_calc_cause() {
        // A qualifying CLIF donor with no cause-of-death flag at all.
        let flags = qualifying_clif();
        assert!(!flags.has_calc_cause());
        assert!(clif_eligible_donors(&flags));
    }
}
