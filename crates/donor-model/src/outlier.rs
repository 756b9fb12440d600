//! Outlier range specification.
//!
//! Declarative `table -> column -> range` configuration consumed by the
//! outlier normalizer. Values outside `[min, max]` are nulled; everything
//! else passes through untouched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Inclusive acceptance range for a clinical value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub min: f64,
    pub max: f64,
}

impl Range {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// True when the value lies outside the configured range.
    pub fn is_outlier(&self, value: f64) -> bool {
        value < self.min || value > self.max
    }
}

/// Range specification for one column.
///
/// The JSON shape decides the variant: a `{min, max}` object is a flat
/// range, a map of `{min, max}` objects is category-keyed, and a map of
/// maps is the compound drug-by-unit form used for medication doses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnRanges {
    /// Single range applied to every row of the column.
    Flat(Range),
    /// Range per category value, matched against the row's own category.
    ByCategory(BTreeMap<String, Range>),
    /// Range per (drug category, dose unit) pair.
    ByDoseUnit(BTreeMap<String, BTreeMap<String, Range>>),
}

/// Full outlier configuration: table name -> column name -> ranges.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutlierConfig {
    #[serde(default)]
    pub tables: BTreeMap<String, BTreeMap<String, ColumnRanges>>,
}

impl OutlierConfig {
    /// Ranges configured for a table, if any.
    pub fn table(&self, name: &str) -> Option<&BTreeMap<String, ColumnRanges>> {
        self.tables.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_bounds_are_inclusive() {
        let range = Range::new(20.0, 400.0);
        assert!(!range.is_outlier(20.0));
        assert!(!range.is_outlier(400.0));
        assert!(range.is_outlier(19.9));
        assert!(range.is_outlier(400.1));
    }

    #[test]
    fn config_deserializes_all_three_shapes() {
        let json = r#"{
            "tables": {
                "vitals": {
                    "vital_value": {
                        "weight_kg": {"min": 20, "max": 400},
                        "height_cm": {"min": 50, "max": 250}
                    }
                },
                "labs": {
                    "lab_value_numeric": {
                        "creatinine": {"min": 0.1, "max": 30}
                    }
                },
                "medication_admin_continuous": {
                    "med_dose": {
                        "norepinephrine": {"mcg/kg/min": {"min": 0, "max": 3}}
                    }
                },
                "adt": {
                    "bed_count": {"min": 0, "max": 500}
                }
            }
        }"#;
        let config: OutlierConfig = serde_json::from_str(json).expect("parse config");

        let vitals = config.table("vitals").expect("vitals configured");
        assert!(matches!(
            vitals.get("vital_value"),
            Some(ColumnRanges::ByCategory(_))
        ));
        assert!(matches!(
            config.table("medication_admin_continuous").unwrap().get("med_dose"),
            Some(ColumnRanges::ByDoseUnit(_))
        ));
        assert!(matches!(
            config.table("adt").unwrap().get("bed_count"),
            Some(ColumnRanges::Flat(_))
        ));
        assert!(config.table("respiratory_support").is_none());
    }
}
