//! Append-only daily price log (`data/price_history.csv`).
//!
//! One row per trading date. Rows are only added, except that the row of
//! the current day may be replaced when forced.

use chrono::NaiveDate;
use kb_core::{KbError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::knowledge_base::read_optional;

/// File name of the price log inside a company's `data/` directory.
pub const PRICE_HISTORY_FILE: &str = "price_history.csv";

/// One day of prices.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PriceRow {
    /// Trading date.
    pub date: NaiveDate,
    /// Close (or last) price.
    pub close: f64,
    /// Open price.
    pub open: Option<f64>,
    /// Session high.
    pub high: Option<f64>,
    /// Session low.
    pub low: Option<f64>,
    /// Traded value in rubles.
    pub volume_rub: Option<f64>,
    /// Market capitalization in billions of rubles.
    pub market_cap_bln: Option<f64>,
}

/// A company's price log, ordered by date.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PriceHistory {
    rows: BTreeMap<NaiveDate, PriceRow>,
}

impl PriceHistory {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a log; a missing file yields an empty log.
    ///
    /// # Errors
    ///
    /// Returns [`KbError::Csv`] if the file is not a valid price log.
    pub fn load(path: &Path) -> Result<Self> {
        let Some(content) = read_optional(path)? else {
            return Ok(Self::new());
        };
        let mut reader = csv::Reader::from_reader(content.as_bytes());
        let mut rows = BTreeMap::new();
        for record in reader.deserialize::<PriceRow>() {
            let row = record.map_err(|e| KbError::Csv(format!("{}: {e}", path.display())))?;
            rows.insert(row.date, row);
        }
        Ok(Self { rows })
    }

    /// Writes the log, sorted by date.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        if self.rows.is_empty() {
            writer
                .write_record([
                    "date",
                    "close",
                    "open",
                    "high",
                    "low",
                    "volume_rub",
                    "market_cap_bln",
                ])
                .map_err(|e| KbError::Csv(e.to_string()))?;
        }
        for row in self.rows.values() {
            writer.serialize(row).map_err(|e| KbError::Csv(e.to_string()))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| KbError::Csv(e.to_string()))?;
        crate::knowledge_base::write_file(path, bytes)
    }

    /// Records the row of one day.
    ///
    /// An existing row for the same date is kept unless `force` is set.
    /// Returns true if the log changed.
    pub fn record(&mut self, row: PriceRow, force: bool) -> bool {
        if !force && self.rows.contains_key(&row.date) {
            return false;
        }
        self.rows.insert(row.date, row);
        true
    }

    /// Merges historical rows without touching dates already present.
    ///
    /// Returns the number of rows added.
    pub fn merge(&mut self, rows: impl IntoIterator<Item = PriceRow>) -> usize {
        let mut added = 0;
        for row in rows {
            if let std::collections::btree_map::Entry::Vacant(slot) = self.rows.entry(row.date) {
                slot.insert(row);
                added += 1;
            }
        }
        added
    }

    /// Most recent row.
    #[must_use]
    pub fn latest(&self) -> Option<&PriceRow> {
        self.rows.values().next_back()
    }

    /// Earliest recorded date.
    #[must_use]
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.rows.keys().next().copied()
    }

    /// Returns true if a row exists for `date`.
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.rows.contains_key(&date)
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the log has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Iterates rows by ascending date.
    pub fn iter(&self) -> impl Iterator<Item = &PriceRow> {
        self.rows.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_core::testing::ScratchDir;

    fn row(day: u32, close: f64) -> PriceRow {
        PriceRow {
            date: NaiveDate::from_ymd_opt(2026, 1, day).unwrap(),
            close,
            open: Some(close - 1.0),
            high: None,
            low: None,
            volume_rub: Some(1.5e9),
            market_cap_bln: Some(6500.25),
        }
    }

    #[test]
    fn test_record_keeps_existing_day_unless_forced() {
        let mut history = PriceHistory::new();
        assert!(history.record(row(15, 300.0), false));
        assert!(!history.record(row(15, 310.0), false));
        assert_eq!(history.latest().unwrap().close, 300.0);
        assert!(history.record(row(15, 310.0), true));
        assert_eq!(history.latest().unwrap().close, 310.0);
    }

    #[test]
    fn test_merge_does_not_overwrite() {
        let mut history = PriceHistory::new();
        history.record(row(10, 100.0), false);
        let added = history.merge(vec![row(9, 90.0), row(10, 999.0), row(8, 80.0)]);
        assert_eq!(added, 2);
        assert_eq!(history.len(), 3);
        assert_eq!(history.first_date(), NaiveDate::from_ymd_opt(2026, 1, 8));
        assert_eq!(history.latest().unwrap().close, 100.0);
    }

    #[test]
    fn test_save_and_load_sorted() {
        let dir = ScratchDir::new("kb-prices").unwrap();
        let path = dir.path().join("data").join(PRICE_HISTORY_FILE);

        let mut history = PriceHistory::new();
        history.record(row(12, 120.0), false);
        history.record(row(11, 110.0), false);
        history.save(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("date,close,open,high,low,volume_rub,market_cap_bln")
        );
        assert!(lines.next().unwrap().starts_with("2026-01-11,110"));

        let loaded = PriceHistory::load(&path).unwrap();
        assert_eq!(loaded, history);
        assert!(PriceHistory::load(&dir.path().join("missing.csv")).unwrap().is_empty());
    }
}
