//! Reporting period definitions.
//!
//! This module defines [`PeriodType`] for financial statement exports and
//! [`PeriodLabel`] for the column headers found in them.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Period type for financial statement data.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    /// Annual reporting period.
    #[default]
    Yearly,
    /// Quarterly reporting period.
    Quarterly,
}

impl PeriodType {
    /// Both period types, yearly first.
    pub const ALL: [Self; 2] = [Self::Yearly, Self::Quarterly];

    /// Returns the lowercase name used in file names (`yearly`, `quarterly`).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Yearly => "yearly",
            Self::Quarterly => "quarterly",
        }
    }
}

impl fmt::Display for PeriodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A column label of a financial statement export.
///
/// Labels are either a fiscal year (`2024`), a fiscal quarter (`2024Q3`)
/// or a trailing twelve months column (`LTM`). Ordering is chronological,
/// with a year sorting after its own quarters and `LTM` last.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PeriodLabel {
    /// A fiscal year.
    Year(u16),
    /// A fiscal quarter (1..=4).
    Quarter(u16, u8),
    /// Trailing twelve months.
    Ltm,
}

impl PeriodLabel {
    /// Parses a header cell, ignoring surrounding whitespace and quotes.
    ///
    /// Returns `None` for anything that is not a period label.
    #[must_use]
    pub fn parse(cell: &str) -> Option<Self> {
        let cell = cell.trim().trim_matches('"').trim();
        if cell.eq_ignore_ascii_case("LTM") {
            return Some(Self::Ltm);
        }
        let year_part = cell.get(..4)?;
        if !year_part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let year: u16 = year_part.parse().ok()?;
        match &cell[4..] {
            "" => Some(Self::Year(year)),
            rest => {
                let quarter = rest.strip_prefix('Q')?;
                match quarter {
                    "1" | "2" | "3" | "4" => Some(Self::Quarter(year, quarter.parse().ok()?)),
                    _ => None,
                }
            }
        }
    }

    /// Returns true for a concrete reporting period (year or quarter).
    #[must_use]
    pub const fn is_reporting(&self) -> bool {
        !matches!(self, Self::Ltm)
    }

    const fn sort_key(&self) -> (u16, u8) {
        match *self {
            Self::Year(y) => (y, 5),
            Self::Quarter(y, q) => (y, q),
            Self::Ltm => (u16::MAX, u8::MAX),
        }
    }
}

impl PartialOrd for PeriodLabel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PeriodLabel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl fmt::Display for PeriodLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Year(y) => write!(f, "{y}"),
            Self::Quarter(y, q) => write!(f, "{y}Q{q}"),
            Self::Ltm => f.write_str("LTM"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_labels() {
        assert_eq!(PeriodLabel::parse("2024"), Some(PeriodLabel::Year(2024)));
        assert_eq!(
            PeriodLabel::parse("\"2025Q3\""),
            Some(PeriodLabel::Quarter(2025, 3))
        );
        assert_eq!(PeriodLabel::parse("LTM"), Some(PeriodLabel::Ltm));
        assert_eq!(PeriodLabel::parse("2025Q5"), None);
        assert_eq!(PeriodLabel::parse("Выручка"), None);
        assert_eq!(PeriodLabel::parse(""), None);
    }

    #[test]
    fn test_chronological_order() {
        let mut labels = vec![
            PeriodLabel::Ltm,
            PeriodLabel::Quarter(2024, 2),
            PeriodLabel::Year(2023),
            PeriodLabel::Quarter(2023, 4),
        ];
        labels.sort();
        let rendered: Vec<_> = labels.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, ["2023Q4", "2023", "2024Q2", "LTM"]);
    }

    #[test]
    fn test_period_type_names() {
        assert_eq!(PeriodType::Yearly.as_str(), "yearly");
        assert_eq!(PeriodType::Quarterly.to_string(), "quarterly");
        assert_eq!(PeriodType::default(), PeriodType::Yearly);
    }
}
