//! Running strobe counts.
//!
//! Named patient counts collected as the pipeline progresses, written as a
//! single-row CSV in insertion order for the site's consort diagram.

use std::path::Path;

use anyhow::{Context, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrobeCounts {
    entries: Vec<(String, usize)>,
}

impl StrobeCounts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a count; re-recording a key overwrites it in place.
    pub fn record(&mut self, key: impl Into<String>, count: usize) {
        let key = key.into();
        tracing::debug!(key = %key, count, "strobe count");
        if let Some(entry) = self.entries.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = count;
        } else {
            self.entries.push((key, count));
        }
    }

    pub fn get(&self, key: &str) -> Option<usize> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, n)| *n)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.entries.iter().map(|(k, n)| (k.as_str(), *n))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the counts as one CSV row, keys as the header.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        writer.write_record(self.entries.iter().map(|(k, _)| k.as_str()))?;
        writer.write_record(self.entries.iter().map(|(_, n)| n.to_string()))?;
        writer
            .flush()
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_in_insertion_order_and_overwrites() {
        let mut counts = StrobeCounts::new();
        counts.record("0_all_patients", 100);
        counts.record("1_decedents", 40);
        counts.record("0_all_patients", 99);

        let keys: Vec<&str> = counts.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["0_all_patients", "1_decedents"]);
        assert_eq!(counts.get("0_all_patients"), Some(99));
    }

    #[test]
    fn writes_a_single_row_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("strobe_counts.csv");
        let mut counts = StrobeCounts::new();
        counts.record("0_all_patients", 100);
        counts.record("1_decedents", 40);
        counts.write_csv(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec!["0_all_patients,1_decedents", "100,40"]);
    }
}
