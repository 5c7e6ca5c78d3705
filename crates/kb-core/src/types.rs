//! Core record types shared by every pipeline stage.
//!
//! This module defines the fundamental data structures:
//!
//! - [`Ticker`] - Exchange ticker of a covered company
//! - [`FinancialStatementRecord`] - Yearly or quarterly statement export
//! - [`MarketSnapshot`] - Quote, liquidity and capitalization snapshot
//! - [`EventsFile`] - Dividends and IR calendar entries for one company
//! - [`SanctionsFile`] - Sanctions screening result for one company
//! - [`Post`] - A message scraped from a public channel

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::period::{PeriodLabel, PeriodType};

/// A ticker symbol.
///
/// Tickers are automatically uppercased on creation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ticker(String);

impl Ticker {
    /// Creates a new ticker from a string, trimming and converting to uppercase.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().trim().to_uppercase())
    }

    /// Returns the ticker as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Ticker {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Ticker {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Ticker {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// One metric row of a financial statement export.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    /// Metric name as printed in the export.
    pub name: String,
    /// One value per period column; non-numeric cells are `None`.
    pub values: Vec<Option<f64>>,
}

/// A financial statement export for one ticker and period type.
///
/// Rows are metrics, columns are period labels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinancialStatementRecord {
    /// Company ticker.
    pub ticker: Ticker,
    /// Yearly or quarterly.
    pub period_type: PeriodType,
    /// Column headers in file order.
    pub periods: Vec<String>,
    /// Metric rows in file order.
    pub metrics: Vec<MetricRow>,
}

impl FinancialStatementRecord {
    /// Creates an empty record.
    #[must_use]
    pub const fn new(ticker: Ticker, period_type: PeriodType) -> Self {
        Self {
            ticker,
            period_type,
            periods: Vec::new(),
            metrics: Vec::new(),
        }
    }

    /// Returns the most recent reporting period (years and quarters only).
    #[must_use]
    pub fn latest_period(&self) -> Option<PeriodLabel> {
        self.periods
            .iter()
            .filter_map(|p| PeriodLabel::parse(p))
            .filter(PeriodLabel::is_reporting)
            .max()
    }

    /// Finds the first metric whose lowercased name contains any of `needles`.
    #[must_use]
    pub fn find_metric(&self, needles: &[&str]) -> Option<&MetricRow> {
        self.metrics.iter().find(|row| {
            let name = row.name.to_lowercase();
            needles.iter().any(|n| name.contains(n))
        })
    }

    /// Returns `(period, value)` pairs of a metric, skipping empty cells.
    pub fn series<'a>(&'a self, row: &'a MetricRow) -> impl Iterator<Item = (&'a str, f64)> + 'a {
        self.periods
            .iter()
            .zip(row.values.iter())
            .filter_map(|(p, v)| v.map(|v| (p.as_str(), v)))
    }
}

/// Price block of a [`MarketSnapshot`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceBlock {
    /// Last trade price (or official close when no trades yet).
    pub last: f64,
    /// Best bid.
    pub bid: f64,
    /// Best offer.
    pub offer: f64,
    /// Opening price.
    pub open: f64,
    /// Session high.
    pub high: f64,
    /// Session low.
    pub low: f64,
    /// Weighted average price.
    pub waprice: f64,
    /// Previous session close.
    pub prev_close: f64,
}

/// Volume block of a [`MarketSnapshot`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeBlock {
    /// Shares traded today.
    pub shares_today: f64,
    /// Value traded today, RUB.
    pub value_today_rub: f64,
    /// Number of trades today.
    pub num_trades_today: u64,
}

/// Liquidity block of a [`MarketSnapshot`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiquidityBlock {
    /// 30-day average daily traded value, RUB.
    pub adv_30d_rub: f64,
    /// Same in millions, one decimal.
    pub adv_30d_mln_rub: f64,
    /// Bid-ask spread relative to the mid price, percent.
    pub bid_ask_spread_pct: f64,
}

/// Capitalization block of a [`MarketSnapshot`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapitalizationBlock {
    /// Market capitalization, RUB.
    pub market_cap_rub: f64,
    /// Same in billions, one decimal.
    pub market_cap_bln_rub: f64,
    /// Shares outstanding.
    pub shares_outstanding: f64,
}

/// 52-week range of a [`MarketSnapshot`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RangeBlock {
    /// Highest daily high.
    pub high: f64,
    /// Lowest daily low.
    pub low: f64,
}

/// Listing block of a [`MarketSnapshot`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingBlock {
    /// Trading board.
    pub board: String,
    /// Listing tier.
    pub list_level: u32,
    /// Lot size.
    pub lot_size: u64,
}

/// Market data snapshot for one ticker.
///
/// All fields describe a single observation; the snapshot is replaced as a
/// whole on every successful fetch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Company ticker.
    pub ticker: Ticker,
    /// Observation date.
    pub date: NaiveDate,
    /// Exchange short name.
    #[serde(default)]
    pub shortname: String,
    /// Exchange full security name.
    #[serde(default)]
    pub secname: String,
    /// Prices.
    #[serde(default)]
    pub price: PriceBlock,
    /// Volumes.
    #[serde(default)]
    pub volume: VolumeBlock,
    /// Liquidity metrics.
    #[serde(default)]
    pub liquidity: LiquidityBlock,
    /// Capitalization.
    #[serde(default)]
    pub capitalization: CapitalizationBlock,
    /// 52-week range.
    #[serde(default)]
    pub range_52w: RangeBlock,
    /// Listing details.
    #[serde(default)]
    pub listing: ListingBlock,
}

/// A dividend record.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Dividend {
    /// Registry close date, `YYYY-MM-DD`.
    #[serde(rename = "registryclosedate", default)]
    pub record_date: String,
    /// Amount per share.
    #[serde(rename = "value", default)]
    pub amount: f64,
    /// Currency code.
    #[serde(rename = "currencyid", default)]
    pub currency: String,
}

impl Dividend {
    /// Parses the record date.
    #[must_use]
    pub fn date(&self) -> Option<NaiveDate> {
        parse_iso_date(&self.record_date)
    }
}

/// An investor relations calendar entry.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IrEvent {
    /// Issuer name as published in the calendar.
    pub company_name: String,
    /// Issuer tax id.
    pub inn: String,
    /// Event date, `YYYY-MM-DD`.
    pub event_date: String,
    /// Event type label.
    pub event_type: String,
    /// Free-text description.
    pub description: String,
    /// Link to the announcement.
    pub link: String,
}

impl IrEvent {
    /// Parses the event date.
    #[must_use]
    pub fn date(&self) -> Option<NaiveDate> {
        parse_iso_date(&self.event_date)
    }

    /// Returns the description, falling back to the event type.
    #[must_use]
    pub fn label(&self) -> &str {
        if self.description.trim().is_empty() {
            &self.event_type
        } else {
            &self.description
        }
    }
}

/// Corporate events fetched for one ticker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventsFile {
    /// Company ticker.
    pub ticker: Ticker,
    /// Name used to match calendar entries.
    pub company_name: String,
    /// Fetch date.
    pub date: NaiveDate,
    /// Dividend history.
    #[serde(default)]
    pub dividends: Vec<Dividend>,
    /// Matched IR calendar entries.
    #[serde(default)]
    pub ir_events: Vec<IrEvent>,
}

/// Minimum score of a sanctions search hit considered relevant.
pub const SANCTIONS_RELEVANCE_THRESHOLD: f64 = 0.7;

/// A sanctions search hit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SanctionMatch {
    /// Entity id.
    pub id: String,
    /// Entity display name.
    pub caption: String,
    /// Entity schema (Company, Person, ...).
    pub schema: String,
    /// Source datasets.
    pub datasets: Vec<String>,
    /// Match confidence.
    pub score: f64,
}

impl SanctionMatch {
    /// Returns true if the score is above [`SANCTIONS_RELEVANCE_THRESHOLD`].
    #[must_use]
    pub fn is_relevant(&self) -> bool {
        self.score > SANCTIONS_RELEVANCE_THRESHOLD
    }
}

/// Sanctions screening result for one ticker.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SanctionsFile {
    /// Company ticker.
    pub ticker: Ticker,
    /// Company name.
    pub company_name: String,
    /// Search query sent.
    pub query: String,
    /// Screening date.
    pub date: NaiveDate,
    /// All hits returned.
    #[serde(default)]
    pub results: Vec<SanctionMatch>,
    /// Total number of candidate records reported by the service.
    #[serde(default)]
    pub total: u64,
    /// Number of relevant hits.
    #[serde(default)]
    pub relevant_matches: usize,
}

impl SanctionsFile {
    /// Returns the relevant hits.
    pub fn relevant(&self) -> impl Iterator<Item = &SanctionMatch> {
        self.results.iter().filter(|m| m.is_relevant())
    }
}

/// A message from a public channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Channel-assigned message id.
    pub id: u64,
    /// Publication date, `YYYY-MM-DD`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// Raw publication timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,
    /// Plain message text.
    #[serde(default)]
    pub text: String,
    /// Publication year.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
}

impl Post {
    /// Creates a post with only an id and text.
    #[must_use]
    pub fn new(id: u64, text: impl Into<String>) -> Self {
        Self {
            id,
            date: None,
            datetime: None,
            text: text.into(),
            year: None,
        }
    }

    /// Sets the publication timestamp, deriving `date` and `year` from it.
    #[must_use]
    pub fn with_datetime(mut self, datetime: impl Into<String>) -> Self {
        let datetime = datetime.into();
        if let Some(date) = parse_iso_date(&datetime) {
            self.date = Some(date.format("%Y-%m-%d").to_string());
            self.year = Some(chrono::Datelike::year(&date));
        }
        self.datetime = Some(datetime);
        self
    }
}

/// Parses the `YYYY-MM-DD` prefix of a date or timestamp string.
#[must_use]
pub fn parse_iso_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s.get(..10)?, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticker_creation() {
        let ticker = Ticker::new(" sber ");
        assert_eq!(ticker.as_str(), "SBER");
        assert_eq!(ticker.to_string(), "SBER");
        assert_eq!("lkoh".parse::<Ticker>().map(|t| t.0), Ok("LKOH".to_string()));
    }

    #[test]
    fn test_latest_period_ignores_ltm() {
        let mut record = FinancialStatementRecord::new(Ticker::new("SBER"), PeriodType::Quarterly);
        record.periods = vec![
            String::new(),
            "2024Q4".into(),
            "2025Q2".into(),
            "2025Q1".into(),
            "LTM".into(),
        ];
        assert_eq!(record.latest_period(), Some(PeriodLabel::Quarter(2025, 2)));
    }

    #[test]
    fn test_find_metric_and_series() {
        let mut record = FinancialStatementRecord::new(Ticker::new("SBER"), PeriodType::Yearly);
        record.periods = vec!["2023".into(), "2024".into()];
        record.metrics.push(MetricRow {
            name: "Payout ratio, %".into(),
            values: vec![Some(50.0), None],
        });
        let row = record.find_metric(&["payout"]);
        assert!(row.is_some());
        let series: Vec<_> = row.map(|r| record.series(r).collect()).unwrap_or_default();
        assert_eq!(series, vec![("2023", 50.0)]);
    }

    #[test]
    fn test_sanction_relevance() {
        let hit = SanctionMatch {
            score: 0.71,
            ..Default::default()
        };
        let miss = SanctionMatch {
            score: 0.7,
            ..Default::default()
        };
        assert!(hit.is_relevant());
        assert!(!miss.is_relevant());
    }

    #[test]
    fn test_post_datetime() {
        let post = Post::new(3100, "text").with_datetime("2024-03-05T10:00:00+00:00");
        assert_eq!(post.date.as_deref(), Some("2024-03-05"));
        assert_eq!(post.year, Some(2024));
    }

    #[test]
    fn test_dividend_json_names() {
        let json = r#"{"registryclosedate":"2024-07-11","value":33.3,"currencyid":"RUB"}"#;
        let dividend: Dividend = serde_json::from_str(json).unwrap();
        assert_eq!(dividend.amount, 33.3);
        assert_eq!(dividend.date(), NaiveDate::from_ymd_opt(2024, 7, 11));
    }
}
