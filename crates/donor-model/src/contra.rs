//! Contraindication code list.
//!
//! Externally curated ICD-10-CM codes (cancer, severe sepsis) whose presence
//! anywhere in a patient's diagnoses disqualifies them from both
//! definitions. Codes are stored normalized so membership checks are exact.

use std::collections::BTreeSet;

/// Normalize an ICD-10-CM code for matching: lowercase, periods and
/// whitespace stripped.
pub fn normalize_icd_code(raw: &str) -> String {
    raw.chars()
        .filter(|ch| *ch != '.' && !ch.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Flat set of normalized contraindication codes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContraindicationList {
    codes: BTreeSet<String>,
}

impl ContraindicationList {
    /// Build from raw codes, normalizing each entry. Empty entries are
    /// dropped.
    pub fn from_raw_codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let codes = codes
            .into_iter()
            .map(|code| normalize_icd_code(code.as_ref()))
            .filter(|code| !code.is_empty())
            .collect();
        Self { codes }
    }

    /// Membership test against an already-normalized code.
    pub fn contains(&self, normalized_code: &str) -> bool {
        self.codes.contains(normalized_code)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    /// Iterate normalized codes in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.codes.iter().map(String::as_str)
    }
}
