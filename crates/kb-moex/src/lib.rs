#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/kb/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Moscow Exchange ISS provider.
//!
//! This crate implements the `kb-core` fetcher traits for the public ISS
//! API:
//!
//! - [`MoexMarketProvider`] - Market snapshot per ticker
//! - [`MoexEventsProvider`] - Dividends and IR calendar per ticker
//! - [`PriceUpdater`] - Daily price log and history backfill
//!
//! # Example
//!
//! ```no_run
//! use kb_moex::{MoexClient, MoexMarketProvider};
//! use std::time::Duration;
//!
//! # fn example() -> kb_core::Result<()> {
//! let client = MoexClient::new(Duration::from_millis(500))?;
//! let market = MoexMarketProvider::new(client.clone());
//! # Ok(())
//! # }
//! ```

use chrono::NaiveDate;
use kb_core::http::BROWSER_USER_AGENT;
use kb_core::{HttpClient, HttpRequest, Pacer, ReqwestTransport, Result, Ticker, Transport};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Corporate events and IR calendar.
pub mod events;
/// ISS payload decoding.
pub mod iss;
/// Market snapshot.
pub mod market;
/// Price log updates.
pub mod prices;

// Re-export commonly used items at crate root
pub use events::{CompanyNameMatcher, EVENTS_FILE, MoexEventsProvider};
pub use market::{MARKET_FILE, MoexMarketProvider, average_daily_value, spread_pct};
pub use prices::{
    BoardQuote, DEFAULT_BACKFILL_DAYS, PriceOutcome, PriceUpdater, apply_quote, format_price,
};

/// Provider name used in logs and errors.
pub const PROVIDER_NAME: &str = "MOEX ISS";

/// ISS API root.
const ISS_BASE_URL: &str = "https://iss.moex.com/iss";

/// Main board for shares.
pub const MAIN_BOARD: &str = "TQBR";

/// Rows per page of paginated ISS endpoints.
pub const PAGE_SIZE: usize = 100;

/// Shared ISS client.
///
/// Cloning shares the underlying pacer, so every provider built from one
/// client observes the same spacing between requests.
#[derive(Clone, Debug)]
pub struct MoexClient {
    http: HttpClient,
}

impl MoexClient {
    /// Creates a client over HTTP.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(delay: Duration) -> Result<Self> {
        let transport = ReqwestTransport::new(BROWSER_USER_AGENT)?;
        Ok(Self::with_transport(Arc::new(transport), Pacer::new(delay)))
    }

    /// Creates a client on top of a custom transport.
    #[must_use]
    pub fn with_transport(transport: Arc<dyn Transport>, pacer: Pacer) -> Self {
        Self {
            http: HttpClient::new(PROVIDER_NAME, transport, pacer),
        }
    }

    /// Fetches and decodes an ISS endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure, non-success status or a body
    /// that is not JSON.
    pub async fn payload(&self, url: &str) -> Result<Value> {
        self.http.get_json(&HttpRequest::get(url)).await
    }

    /// Daily candles of a ticker on the main board, `from..=till`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the payload is malformed.
    pub async fn candles(
        &self,
        ticker: &Ticker,
        from: NaiveDate,
        till: NaiveDate,
    ) -> Result<Vec<iss::Candle>> {
        let payload = self.payload(&candles_url(ticker, from, till)).await?;
        iss::parse_candles(&payload)
    }
}

/// Security and session data of a ticker within the main board group.
#[must_use]
pub fn securities_url(ticker: &Ticker) -> String {
    format!(
        "{ISS_BASE_URL}/engines/stock/markets/shares/boardgroups/57/securities/{ticker}.json?\
         iss.meta=off&iss.json=extended&lang=ru"
    )
}

/// Daily candles of a ticker.
#[must_use]
pub fn candles_url(ticker: &Ticker, from: NaiveDate, till: NaiveDate) -> String {
    format!(
        "{ISS_BASE_URL}/engines/stock/markets/shares/boards/{MAIN_BOARD}/securities/{ticker}/\
         candles.json?iss.meta=off&iss.json=extended&interval=24&from={from}&till={till}&lang=ru"
    )
}

/// Dividend history of a ticker.
#[must_use]
pub fn dividends_url(ticker: &Ticker) -> String {
    format!("{ISS_BASE_URL}/securities/{ticker}/dividends.json?iss.meta=off&iss.json=extended")
}

/// One page of the IR calendar.
#[must_use]
pub fn ir_calendar_url(start: usize) -> String {
    format!(
        "{ISS_BASE_URL}/cci/calendars/ir-calendar.json?iss.meta=off&iss.json=extended&start={start}"
    )
}

/// One page of the main board listing.
#[must_use]
pub fn board_url(start: usize) -> String {
    format!(
        "{ISS_BASE_URL}/engines/stock/markets/shares/boards/{MAIN_BOARD}/securities.json?\
         iss.meta=off&iss.json=extended&start={start}"
    )
}

/// Rounds to `places` decimal places.
#[must_use]
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let ticker = Ticker::new("sber");
        let from = NaiveDate::from_ymd_opt(2025, 11, 17).unwrap();
        let till = NaiveDate::from_ymd_opt(2026, 1, 16).unwrap();
        assert!(securities_url(&ticker).contains("/boardgroups/57/securities/SBER.json?"));
        assert!(candles_url(&ticker, from, till).contains("&from=2025-11-17&till=2026-01-16"));
        assert!(
            dividends_url(&ticker)
                .ends_with("/securities/SBER/dividends.json?iss.meta=off&iss.json=extended")
        );
        assert!(ir_calendar_url(200).ends_with("start=200"));
        assert!(board_url(0).contains("/boards/TQBR/securities.json?"));
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.23456, 4), 1.2346);
        assert_eq!(round_to(6543.21, 1), 6543.2);
        assert_eq!(round_to(12.5, 0), 13.0);
    }
}
