//! Detection of newly published reports.
//!
//! A report is new when the latest period of the remote export differs
//! from the latest period of the local copy.

use kb_core::{PeriodLabel, PeriodType, Result, Ticker};
use kb_store::{KnowledgeBase, read_optional, write_file};
use std::fmt;
use tracing::warn;

use crate::{SmartLabProvider, file_name, latest_period};

/// Root-level file listing the tickers with new reports, one per line.
pub const NEW_TICKERS_FILE: &str = "reports_new_tickers.txt";

/// Local versus remote latest period of one export.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PeriodComparison {
    /// Latest period of the stored export.
    pub local: Option<PeriodLabel>,
    /// Latest period currently published.
    pub remote: Option<PeriodLabel>,
}

impl PeriodComparison {
    /// Returns true if a period is published that the local copy lacks.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.remote.is_some() && self.remote != self.local
    }
}

/// Outcome of checking one ticker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReportStatus {
    /// At least one export has a newer period.
    New,
    /// Both exports match the local copies.
    Unchanged,
    /// An export could not be downloaded and nothing new was seen.
    Error,
}

impl fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::New => "new",
            Self::Unchanged => "unchanged",
            Self::Error => "error",
        })
    }
}

/// Result of checking one ticker. `None` means the download failed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportCheck {
    /// Company ticker.
    pub ticker: Ticker,
    /// Quarterly comparison.
    pub quarterly: Option<PeriodComparison>,
    /// Yearly comparison.
    pub yearly: Option<PeriodComparison>,
}

impl ReportCheck {
    /// Overall status.
    #[must_use]
    pub fn status(&self) -> ReportStatus {
        let comparisons = [self.quarterly, self.yearly];
        if comparisons.iter().flatten().any(PeriodComparison::is_new) {
            ReportStatus::New
        } else if comparisons.iter().any(Option::is_none) {
            ReportStatus::Error
        } else {
            ReportStatus::Unchanged
        }
    }
}

/// Latest period of the stored export, if any.
#[must_use]
pub fn local_latest_period(
    kb: &KnowledgeBase,
    ticker: &Ticker,
    period_type: PeriodType,
) -> Option<PeriodLabel> {
    let path = kb.data_file(ticker, file_name(period_type));
    read_optional(&path).ok().flatten().and_then(|text| latest_period(&text))
}

impl SmartLabProvider {
    /// Compares the remote exports of a ticker with its stored copies.
    ///
    /// Download failures are recorded in the result, never returned.
    pub async fn check_reports(&self, kb: &KnowledgeBase, ticker: &Ticker) -> ReportCheck {
        let mut check = ReportCheck {
            ticker: ticker.clone(),
            quarterly: None,
            yearly: None,
        };
        for period_type in [PeriodType::Quarterly, PeriodType::Yearly] {
            let comparison = match self.remote_latest_period(ticker, period_type).await {
                Ok(remote) => Some(PeriodComparison {
                    local: local_latest_period(kb, ticker, period_type),
                    remote,
                }),
                Err(e) => {
                    warn!(%ticker, %period_type, error = %e, "report check failed");
                    None
                }
            };
            match period_type {
                PeriodType::Quarterly => check.quarterly = comparison,
                PeriodType::Yearly => check.yearly = comparison,
            }
        }
        check
    }
}

/// Writes [`NEW_TICKERS_FILE`] at the knowledge base root.
///
/// The file is emptied when there are no new reports.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_new_tickers(kb: &KnowledgeBase, tickers: &[Ticker]) -> Result<()> {
    let contents = if tickers.is_empty() {
        String::new()
    } else {
        let mut joined = tickers.iter().map(Ticker::as_str).collect::<Vec<_>>().join("\n");
        joined.push('\n');
        joined
    };
    write_file(&kb.root().join(NEW_TICKERS_FILE), contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_core::testing::{ScratchDir, StubTransport};
    use kb_core::{HttpResponse, Pacer};
    use std::sync::Arc;

    #[test]
    fn test_status() {
        let same = PeriodComparison {
            local: Some(PeriodLabel::Year(2024)),
            remote: Some(PeriodLabel::Year(2024)),
        };
        let newer = PeriodComparison {
            local: Some(PeriodLabel::Quarter(2025, 2)),
            remote: Some(PeriodLabel::Quarter(2025, 3)),
        };
        let check = |q, y| {
            ReportCheck { ticker: Ticker::new("X"), quarterly: q, yearly: y }.status()
        };
        assert_eq!(check(Some(same), Some(same)), ReportStatus::Unchanged);
        assert_eq!(check(Some(newer), None), ReportStatus::New);
        assert_eq!(check(None, Some(same)), ReportStatus::Error);
    }

    #[tokio::test]
    async fn test_check_against_local_copy() {
        let dir = ScratchDir::new("kb-reports").unwrap();
        dir.write("companies/SBER/_index.md", "---\nticker: SBER\n---\n").unwrap();
        dir.write("companies/SBER/data/smartlab_quarterly.csv", ";2025Q1;2025Q2\nx;1;2\n").unwrap();
        dir.write("companies/SBER/data/smartlab_yearly.csv", ";2023;2024\nx;1;2\n").unwrap();
        let kb = KnowledgeBase::open(dir.path()).unwrap();

        let stub = Arc::new(
            StubTransport::new()
                .route(
                    "https://smart-lab.ru/q/SBER/f/q/",
                    HttpResponse::new(200, ";2025Q2;2025Q3;LTM\nx;1;2;3\n"),
                )
                .route(
                    "https://smart-lab.ru/q/SBER/f/y/",
                    HttpResponse::new(200, ";2023;2024;LTM\nx;1;2;3\n"),
                ),
        );
        let provider = SmartLabProvider::with_transport(stub, Pacer::unpaced());
        let check = provider.check_reports(&kb, &Ticker::new("SBER")).await;

        assert_eq!(check.status(), ReportStatus::New);
        assert_eq!(check.quarterly.unwrap().remote, Some(PeriodLabel::Quarter(2025, 3)));
        assert!(!check.yearly.unwrap().is_new());

        write_new_tickers(&kb, &[Ticker::new("SBER"), Ticker::new("LKOH")]).unwrap();
        let listed = std::fs::read_to_string(dir.path().join(NEW_TICKERS_FILE)).unwrap();
        assert_eq!(listed, "SBER\nLKOH\n");
        write_new_tickers(&kb, &[]).unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join(NEW_TICKERS_FILE)).unwrap(), "");
    }
}
