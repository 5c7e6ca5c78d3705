//! Parsing of the `;`-delimited statement export.

use kb_core::frontmatter::parse_number;
use kb_core::{
    FinancialStatementRecord, KbError, MetricRow, PeriodLabel, PeriodType, Result, Ticker,
};
use std::collections::{BTreeMap, HashSet};

use crate::PROVIDER_NAME;

/// Bodies shorter than this are error pages, not exports.
pub const MIN_BODY_LEN: usize = 50;

/// Metric name fragments identifying the payout ratio row.
const PAYOUT_NEEDLES: &[&str] = &["payout", "дивиденд/прибыль", "коэфф"];

/// Rejects bodies that are not a statement export.
///
/// # Errors
///
/// Returns [`KbError::Schema`] for HTML pages and truncated bodies.
pub fn validate_body(body: &[u8]) -> Result<()> {
    let head = body.get(..5).unwrap_or(body);
    if head == b"<html" || head == b"<!DOC" {
        return Err(KbError::Schema {
            provider: PROVIDER_NAME.to_string(),
            reason: "got an HTML page instead of CSV".into(),
        });
    }
    if body.len() < MIN_BODY_LEN {
        return Err(KbError::Schema {
            provider: PROVIDER_NAME.to_string(),
            reason: format!("body too short ({} bytes)", body.len()),
        });
    }
    Ok(())
}

fn strip_bom(text: &str) -> &str {
    text.strip_prefix('\u{feff}').unwrap_or(text)
}

/// Reporting periods (years and quarters) of a header line, sorted.
#[must_use]
pub fn header_periods(header: &str) -> Vec<PeriodLabel> {
    let mut periods: Vec<PeriodLabel> = strip_bom(header)
        .split(';')
        .filter_map(PeriodLabel::parse)
        .filter(PeriodLabel::is_reporting)
        .collect();
    periods.sort();
    periods.dedup();
    periods
}

/// Latest reporting period listed in the first line of an export.
#[must_use]
pub fn latest_period(export: &str) -> Option<PeriodLabel> {
    let header = strip_bom(export).lines().next()?;
    header_periods(header).pop()
}

/// Parses a statement export into a record.
///
/// The first non-empty row holds the period labels (its first cell is the
/// metric column caption). Cells that are not numbers become `None`.
///
/// # Errors
///
/// Returns [`KbError::Csv`] if the text is not delimited text and
/// [`KbError::Schema`] if the header has no columns or repeats a label.
pub fn parse_statement(
    ticker: &Ticker,
    period_type: PeriodType,
    body: &[u8],
) -> Result<FinancialStatementRecord> {
    let text = String::from_utf8_lossy(body);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(false)
        .flexible(true)
        .from_reader(strip_bom(&text).as_bytes());

    let mut record = FinancialStatementRecord::new(ticker.clone(), period_type);
    let mut have_header = false;

    for row in reader.records() {
        let row = row.map_err(|e| KbError::Csv(format!("{ticker} {period_type}: {e}")))?;
        if row.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        if !have_header {
            record.periods = row.iter().skip(1).map(|c| c.trim().to_string()).collect();
            while record.periods.last().is_some_and(String::is_empty) {
                record.periods.pop();
            }
            have_header = true;
            continue;
        }
        let name = row.get(0).unwrap_or_default().trim().to_string();
        let values = (0..record.periods.len())
            .map(|i| row.get(i + 1).and_then(parse_number))
            .collect();
        record.metrics.push(MetricRow { name, values });
    }

    if record.periods.is_empty() {
        return Err(KbError::Schema {
            provider: PROVIDER_NAME.to_string(),
            reason: format!("{ticker} {period_type}: no period columns"),
        });
    }
    let mut seen = HashSet::new();
    if let Some(dup) = record.periods.iter().find(|p| !p.is_empty() && !seen.insert(*p)) {
        return Err(KbError::Schema {
            provider: PROVIDER_NAME.to_string(),
            reason: format!("{ticker} {period_type}: duplicate period {dup}"),
        });
    }
    Ok(record)
}

/// Payout ratio per column of a yearly record, positive values only.
///
/// Uses the first metric whose name mentions the payout ratio; an absent
/// row yields an empty map.
#[must_use]
pub fn payout_by_period(record: &FinancialStatementRecord) -> BTreeMap<String, f64> {
    record
        .find_metric(PAYOUT_NEEDLES)
        .map(|row| {
            record
                .series(row)
                .filter(|(_, v)| *v > 0.0)
                .map(|(p, v)| (p.to_string(), v))
                .collect()
        })
        .unwrap_or_default()
}
