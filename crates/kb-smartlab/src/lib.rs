#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/kb/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! smart-lab.ru statement export provider.
//!
//! # Usage
//!
//! ```rust,ignore
//! use kb_core::{FetchRequest, PeriodType, Ticker, TickerFetcher};
//! use kb_smartlab::SmartLabProvider;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = SmartLabProvider::new(Duration::from_millis(1500))?;
//!     let today = chrono::Local::now().date_naive();
//!     let artifacts = provider.fetch(&FetchRequest::new(Ticker::new("SBER"), today)).await?;
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use kb_core::http::BROWSER_USER_AGENT;
use kb_core::{
    Artifact, DataProvider, FetchRequest, HttpClient, Pacer, PeriodLabel, PeriodType,
    ReqwestTransport, Result, Ticker, TickerFetcher, Transport,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Statement parsing and payout lookup.
pub mod parse;
/// Detection of newly published reports.
pub mod reports;

pub use parse::{latest_period, parse_statement, payout_by_period, validate_body};
pub use reports::{
    NEW_TICKERS_FILE, PeriodComparison, ReportCheck, ReportStatus, local_latest_period,
    write_new_tickers,
};

/// Provider name used in logs and errors.
pub const PROVIDER_NAME: &str = "smart-lab";

/// Base URL of the per-ticker pages.
const SMARTLAB_BASE_URL: &str = "https://smart-lab.ru/q";

/// Stored file name of the yearly export.
pub const YEARLY_FILE: &str = "smartlab_yearly.csv";
/// Stored file name of the quarterly export.
pub const QUARTERLY_FILE: &str = "smartlab_quarterly.csv";

const ARTIFACTS: &[&str] = &[YEARLY_FILE, QUARTERLY_FILE];

/// Stored file name of an export.
#[must_use]
pub const fn file_name(period_type: PeriodType) -> &'static str {
    match period_type {
        PeriodType::Yearly => YEARLY_FILE,
        PeriodType::Quarterly => QUARTERLY_FILE,
    }
}

/// Download URL of an IFRS export.
#[must_use]
pub fn export_url(ticker: &Ticker, period_type: PeriodType) -> String {
    let period = match period_type {
        PeriodType::Yearly => "y",
        PeriodType::Quarterly => "q",
    };
    format!("{SMARTLAB_BASE_URL}/{ticker}/f/{period}/MSFO/download/")
}

/// smart-lab.ru provider.
///
/// Issues one request per period type and ticker, paced by the configured
/// delay. Bodies are stored verbatim.
#[derive(Clone, Debug)]
pub struct SmartLabProvider {
    http: HttpClient,
}

impl SmartLabProvider {
    /// Creates a provider over HTTP with a browser user agent.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(delay: Duration) -> Result<Self> {
        let transport = ReqwestTransport::new(BROWSER_USER_AGENT)?;
        Ok(Self::with_transport(Arc::new(transport), Pacer::new(delay)))
    }

    /// Creates a provider on top of a custom transport.
    #[must_use]
    pub fn with_transport(transport: Arc<dyn Transport>, pacer: Pacer) -> Self {
        Self {
            http: HttpClient::new(PROVIDER_NAME, transport, pacer),
        }
    }

    /// Downloads and validates one export.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure, non-success status, or a body
    /// that is not an export.
    pub async fn fetch_export(&self, ticker: &Ticker, period_type: PeriodType) -> Result<Vec<u8>> {
        let body = self.http.get_bytes(&export_url(ticker, period_type)).await?;
        validate_body(&body)?;
        debug!(%ticker, %period_type, bytes = body.len(), "downloaded export");
        Ok(body)
    }

    /// Latest reporting period currently published for a ticker.
    ///
    /// # Errors
    ///
    /// Returns an error if the export cannot be downloaded.
    pub async fn remote_latest_period(
        &self,
        ticker: &Ticker,
        period_type: PeriodType,
    ) -> Result<Option<PeriodLabel>> {
        let text = self.http.get_text(&export_url(ticker, period_type)).await?;
        Ok(latest_period(&text))
    }
}

impl DataProvider for SmartLabProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn description(&self) -> &str {
        "IFRS financial statements (yearly and quarterly CSV) from smart-lab.ru"
    }
}

#[async_trait]
impl TickerFetcher for SmartLabProvider {
    fn artifact_names(&self) -> &[&'static str] {
        ARTIFACTS
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Artifact>> {
        let mut artifacts = Vec::with_capacity(2);
        let mut last_error = None;
        for period_type in PeriodType::ALL {
            match self.fetch_export(&request.ticker, period_type).await {
                Ok(body) => artifacts.push(Artifact::new(file_name(period_type), body)),
                Err(e) => {
                    warn!(ticker = %request.ticker, %period_type, error = %e, "export unavailable");
                    last_error = Some(e);
                }
            }
        }
        match (artifacts.is_empty(), last_error) {
            (true, Some(e)) => Err(e),
            _ => Ok(artifacts),
        }
    }
}
