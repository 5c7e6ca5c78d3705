//! Staleness of company documents.

use crate::cards::CompanyCard;
use chrono::NaiveDate;
use kb_core::{FrontMatter, Result, Ticker};
use kb_store::{KnowledgeBase, read_optional};
use std::fmt;
use tracing::debug;

/// Documents within this many days of their threshold are due soon.
pub const DUE_SOON_DAYS: i64 = 7;

/// A company document with its own freshness threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DocumentKind {
    /// `_index.md`.
    Index,
    /// `events.md`.
    Events,
    /// `governance.md`.
    Governance,
    /// `opinions.md`.
    Opinions,
}

impl DocumentKind {
    /// Every kind, in report order.
    pub const ALL: [Self; 4] = [Self::Index, Self::Events, Self::Governance, Self::Opinions];

    /// File name inside the company directory.
    #[must_use]
    pub const fn file_name(&self) -> &'static str {
        match self {
            Self::Index => "_index.md",
            Self::Events => "events.md",
            Self::Governance => "governance.md",
            Self::Opinions => "opinions.md",
        }
    }

    /// Default freshness threshold in days.
    #[must_use]
    pub const fn default_threshold(&self) -> i64 {
        match self {
            Self::Index | Self::Governance => 180,
            Self::Events => 30,
            Self::Opinions => 90,
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Freshness thresholds per document kind, in days.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Thresholds {
    /// Company index.
    pub index: i64,
    /// Events document.
    pub events: i64,
    /// Governance document.
    pub governance: i64,
    /// Opinions document.
    pub opinions: i64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            index: DocumentKind::Index.default_threshold(),
            events: DocumentKind::Events.default_threshold(),
            governance: DocumentKind::Governance.default_threshold(),
            opinions: DocumentKind::Opinions.default_threshold(),
        }
    }
}

impl Thresholds {
    /// Threshold for a kind.
    #[must_use]
    pub const fn get(&self, kind: DocumentKind) -> i64 {
        match kind {
            DocumentKind::Index => self.index,
            DocumentKind::Events => self.events,
            DocumentKind::Governance => self.governance,
            DocumentKind::Opinions => self.opinions,
        }
    }
}

/// Freshness of one dated document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Freshness {
    /// Past its threshold.
    Overdue {
        /// Days past the threshold.
        days: i64,
    },
    /// Within [`DUE_SOON_DAYS`] of its threshold.
    DueSoon {
        /// Days left.
        days: i64,
    },
    /// Nothing to do.
    Fresh,
}

/// Classifies a document updated on `updated`.
#[must_use]
pub fn freshness(updated: NaiveDate, threshold: i64, today: NaiveDate) -> Freshness {
    let left = threshold - (today - updated).num_days();
    if left < 0 {
        Freshness::Overdue { days: -left }
    } else if left <= DUE_SOON_DAYS {
        Freshness::DueSoon { days: left }
    } else {
        Freshness::Fresh
    }
}

/// Parses an ISO `YYYY-MM-DD` date.
#[must_use]
pub fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

/// One document that needs attention.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaleDocument {
    /// Company.
    pub ticker: Ticker,
    /// Document kind.
    pub kind: DocumentKind,
    /// Its `updated` date.
    pub updated: NaiveDate,
    /// Days overdue, or days left for documents due soon.
    pub days: i64,
}

/// Result of a staleness scan.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StalenessReport {
    /// Overdue documents, by kind then most overdue first.
    pub overdue: Vec<StaleDocument>,
    /// Documents due soon, soonest first.
    pub due_soon: Vec<StaleDocument>,
    /// Number of fresh documents.
    pub fresh: usize,
    /// Existing documents without a valid `updated` date.
    pub undated: Vec<(Ticker, DocumentKind)>,
    /// Companies without a valid sentiment.
    pub stubs: Vec<Ticker>,
}

impl StalenessReport {
    /// Overdue documents of one kind.
    pub fn overdue_by_kind(&self, kind: DocumentKind) -> impl Iterator<Item = &StaleDocument> {
        self.overdue.iter().filter(move |d| d.kind == kind)
    }

    /// Returns true if a document is overdue.
    #[must_use]
    pub fn is_overdue(&self, ticker: &Ticker, kind: DocumentKind) -> bool {
        self.overdue.iter().any(|d| &d.ticker == ticker && d.kind == kind)
    }
}

impl fmt::Display for StalenessReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.overdue.is_empty() {
            writeln!(f, "No overdue documents")?;
        } else {
            writeln!(f, "Overdue ({})", self.overdue.len())?;
            for kind in DocumentKind::ALL {
                let mut docs = self.overdue_by_kind(kind).peekable();
                if docs.peek().is_none() {
                    continue;
                }
                writeln!(f, "  {kind}")?;
                for doc in docs {
                    writeln!(
                        f,
                        "    {} updated {} ({} days overdue)",
                        doc.ticker, doc.updated, doc.days
                    )?;
                }
            }
        }
        if !self.due_soon.is_empty() {
            writeln!(f, "Due within {DUE_SOON_DAYS} days ({})", self.due_soon.len())?;
            for doc in &self.due_soon {
                writeln!(f, "  {}/{} in {} days", doc.ticker, doc.kind, doc.days)?;
            }
        }
        if !self.undated.is_empty() {
            writeln!(f, "Without a valid updated date ({})", self.undated.len())?;
            for (ticker, kind) in &self.undated {
                writeln!(f, "  {ticker}/{kind}")?;
            }
        }
        if !self.stubs.is_empty() {
            let names: Vec<String> = self.stubs.iter().map(ToString::to_string).collect();
            writeln!(f, "Stub companies ({}): {}", self.stubs.len(), names.join(", "))?;
        }
        write!(f, "Fresh: {}", self.fresh)
    }
}

/// Scans every active company's documents.
///
/// Missing documents are skipped. A company whose index has no valid
/// sentiment is listed as a stub.
///
/// # Errors
///
/// Returns an error if the company directories cannot be listed or an
/// existing document cannot be read.
pub fn check_staleness(
    kb: &KnowledgeBase,
    thresholds: &Thresholds,
    today: NaiveDate,
) -> Result<StalenessReport> {
    let mut report = StalenessReport::default();
    for ticker in kb.discover_tickers()? {
        for kind in DocumentKind::ALL {
            let Some(content) = read_optional(&kb.company_file(&ticker, kind.file_name()))? else {
                if kind == DocumentKind::Index {
                    report.stubs.push(ticker.clone());
                }
                continue;
            };
            if kind == DocumentKind::Index
                && CompanyCard::new(ticker.clone(), Some(content.clone()))
                    .sentiment()
                    .is_none()
            {
                report.stubs.push(ticker.clone());
            }
            let updated = FrontMatter::parse(&content)
                .and_then(|f| f.get("updated").and_then(parse_iso_date));
            let Some(updated) = updated else {
                report.undated.push((ticker.clone(), kind));
                continue;
            };
            let state = freshness(updated, thresholds.get(kind), today);
            debug!(%ticker, %kind, %updated, ?state, "checked document");
            let stale = |days| StaleDocument {
                ticker: ticker.clone(),
                kind,
                updated,
                days,
            };
            match state {
                Freshness::Overdue { days } => report.overdue.push(stale(days)),
                Freshness::DueSoon { days } => report.due_soon.push(stale(days)),
                Freshness::Fresh => report.fresh += 1,
            }
        }
    }
    report.overdue.sort_by(|a, b| {
        a.kind
            .cmp(&b.kind)
            .then(b.days.cmp(&a.days))
            .then(a.ticker.cmp(&b.ticker))
    });
    report
        .due_soon
        .sort_by(|a, b| a.days.cmp(&b.days).then(a.ticker.cmp(&b.ticker)));
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use kb_core::testing::ScratchDir;

    fn day(s: &str) -> NaiveDate {
        parse_iso_date(s).unwrap()
    }

    #[test]
    fn test_freshness_boundaries() {
        let today = day("2026-03-01");
        let ago = |days| freshness(today - Duration::days(days), 180, today);
        assert_eq!(ago(181), Freshness::Overdue { days: 1 });
        assert_eq!(ago(179), Freshness::DueSoon { days: 1 });
        assert_eq!(ago(180), Freshness::DueSoon { days: 0 });
        assert_eq!(ago(100), Freshness::Fresh);
    }

    #[test]
    fn test_check_staleness() {
        let dir = ScratchDir::new("staleness").unwrap();
        let today = day("2026-03-01");
        let old = today - Duration::days(181);
        let recent = today - Duration::days(179);
        let events = today - Duration::days(40);
        let gazp = today - Duration::days(200);
        dir.write(
            "companies/SBER/_index.md",
            &format!("---\nticker: SBER\nsentiment: bullish\nupdated: {old}\n---\n"),
        )
        .unwrap();
        dir.write("companies/SBER/events.md", &format!("---\nupdated: {events}\n---\n"))
            .unwrap();
        dir.write(
            "companies/LKOH/_index.md",
            &format!("---\nticker: LKOH\nupdated: {recent}\n---\n"),
        )
        .unwrap();
        dir.write("companies/LKOH/governance.md", "---\nupdated: soon\n---\n").unwrap();
        dir.write(
            "companies/GAZP/_index.md",
            &format!("---\nsentiment: neutral\nupdated: {gazp}\n---\n"),
        )
        .unwrap();
        let kb = KnowledgeBase::new(dir.path());

        let report = check_staleness(&kb, &Thresholds::default(), today).unwrap();
        assert!(report.is_overdue(&Ticker::new("SBER"), DocumentKind::Index));
        assert!(!report.is_overdue(&Ticker::new("LKOH"), DocumentKind::Index));
        assert_eq!(report.due_soon.len(), 1);
        assert_eq!(report.due_soon[0].ticker, Ticker::new("LKOH"));

        let index: Vec<(&str, i64)> = report
            .overdue_by_kind(DocumentKind::Index)
            .map(|d| (d.ticker.as_str(), d.days))
            .collect();
        assert_eq!(index, vec![("GAZP", 20), ("SBER", 1)]);
        assert_eq!(report.overdue.last().map(|d| d.kind), Some(DocumentKind::Events));
        assert_eq!(report.undated, vec![(Ticker::new("LKOH"), DocumentKind::Governance)]);
        assert_eq!(report.stubs, vec![Ticker::new("LKOH")]);
        assert!(report.to_string().contains("SBER updated"));
    }
}
