//! Dividends and IR calendar (`data/moex_events.json`).
//!
//! The IR calendar covers every issuer, so it is downloaded at most once
//! per provider instance and filtered per ticker by company name.

use async_trait::async_trait;
use kb_core::{
    Artifact, DataProvider, Dividend, EventsFile, FetchRequest, IrEvent, KbError, Result, Ticker,
    TickerFetcher,
};
use regex::Regex;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::{MoexClient, PAGE_SIZE, PROVIDER_NAME, dividends_url, ir_calendar_url, iss};

/// Stored file name.
pub const EVENTS_FILE: &str = "moex_events.json";

/// Upper bound on calendar pages.
pub const MAX_CALENDAR_PAGES: usize = 100;

/// Names shorter than this match on word boundaries only.
const SHORT_NAME_CHARS: usize = 4;

/// Matches calendar issuer names against a company's short name.
///
/// Short names (under four characters) must be delimited by whitespace,
/// quotes or brackets so that "ВК" does not match "БАНКОВСКИЙ"; longer
/// names match as case-insensitive substrings.
#[derive(Clone, Debug)]
pub struct CompanyNameMatcher {
    needle: String,
    bounded: Option<Regex>,
}

impl CompanyNameMatcher {
    /// Creates a matcher.
    ///
    /// # Errors
    ///
    /// Returns [`KbError::InvalidParameter`] for an empty name.
    pub fn new(name: &str) -> Result<Self> {
        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            return Err(KbError::InvalidParameter("empty company name".into()));
        }
        let bounded = if needle.chars().count() < SHORT_NAME_CHARS {
            let pattern = format!(
                r#"(?i)(?:^|[\s"«'(]){}(?:[\s"»').,]|$)"#,
                regex::escape(&needle)
            );
            Some(Regex::new(&pattern).map_err(|e| KbError::InvalidParameter(e.to_string()))?)
        } else {
            None
        };
        Ok(Self { needle, bounded })
    }

    /// Returns true if `company` refers to this company.
    #[must_use]
    pub fn matches(&self, company: &str) -> bool {
        match &self.bounded {
            Some(re) => re.is_match(company),
            None => company.to_lowercase().contains(&self.needle),
        }
    }

    /// Calendar entries of this company, in calendar order.
    #[must_use]
    pub fn filter(&self, calendar: &[IrEvent]) -> Vec<IrEvent> {
        calendar
            .iter()
            .filter(|e| self.matches(&e.company_name))
            .cloned()
            .collect()
    }
}

/// Events fetcher.
#[derive(Clone, Debug)]
pub struct MoexEventsProvider {
    client: MoexClient,
    calendar: Arc<OnceCell<Vec<IrEvent>>>,
}

impl MoexEventsProvider {
    /// Creates the provider.
    #[must_use]
    pub fn new(client: MoexClient) -> Self {
        Self {
            client,
            calendar: Arc::new(OnceCell::new()),
        }
    }

    /// The full IR calendar, downloaded on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the first page cannot be downloaded. A failed
    /// download is retried on the next call.
    pub async fn calendar(&self) -> Result<&[IrEvent]> {
        let events = self
            .calendar
            .get_or_try_init(|| self.download_calendar())
            .await?;
        Ok(events)
    }

    async fn download_calendar(&self) -> Result<Vec<IrEvent>> {
        let mut all = Vec::new();
        for page in 0..MAX_CALENDAR_PAGES {
            let start = page * PAGE_SIZE;
            let events = match self.client.payload(&ir_calendar_url(start)).await {
                Ok(payload) => iss::parse_ir_calendar(&payload)?,
                Err(e) if page == 0 => return Err(e),
                Err(e) => {
                    warn!(start, error = %e, "IR calendar page failed, keeping earlier pages");
                    break;
                }
            };
            let count = events.len();
            all.extend(events);
            if count < PAGE_SIZE {
                break;
            }
        }
        info!(events = all.len(), "loaded IR calendar");
        Ok(all)
    }

    /// Dividend history of a ticker.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the payload is malformed.
    pub async fn dividends(&self, ticker: &Ticker) -> Result<Vec<Dividend>> {
        let payload = self.client.payload(&dividends_url(ticker)).await?;
        iss::parse_dividends(&payload)
    }
}

/// Name used to match calendar entries: exchange short name, then
/// front-matter name, then the ticker.
#[must_use]
pub fn match_name(request: &FetchRequest) -> String {
    request
        .short_name
        .clone()
        .or_else(|| request.company_name.clone())
        .unwrap_or_else(|| request.ticker.to_string())
}

impl DataProvider for MoexEventsProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn description(&self) -> &str {
        "Dividend history and IR calendar from MOEX ISS"
    }
}

#[async_trait]
impl TickerFetcher for MoexEventsProvider {
    fn artifact_names(&self) -> &[&'static str] {
        &[EVENTS_FILE]
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Artifact>> {
        let dividends = self.dividends(&request.ticker).await?;
        let company_name = match_name(request);
        let matcher = CompanyNameMatcher::new(&company_name)?;
        let ir_events = matcher.filter(self.calendar().await?);
        debug!(
            ticker = %request.ticker,
            name = %company_name,
            dividends = dividends.len(),
            ir_events = ir_events.len(),
            "matched events"
        );

        let file = EventsFile {
            ticker: request.ticker.clone(),
            company_name,
            date: request.today,
            dividends,
            ir_events,
        };
        Ok(vec![Artifact::json(EVENTS_FILE, &file)?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use kb_core::testing::StubTransport;
    use kb_core::{HttpResponse, Pacer};
    use serde_json::json;

    fn event(company: &str) -> IrEvent {
        IrEvent {
            company_name: company.into(),
            event_date: "2026-02-26".into(),
            event_type: "Публикация отчетности".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_short_names_need_boundaries() {
        let vk = CompanyNameMatcher::new("ВК").unwrap();
        assert!(vk.matches("МКПАО «ВК»"));
        assert!(vk.matches("вк (группа)"));
        assert!(!vk.matches("ПАО БАНКОВСКИЙ"));

        let sber = CompanyNameMatcher::new("Сбербанк").unwrap();
        assert!(sber.matches("ПАО СБЕРБАНК РОССИИ"));
        assert!(!sber.matches("Газпром"));
        assert!(CompanyNameMatcher::new("  ").is_err());
    }

    #[test]
    fn test_match_name_priority() {
        let today = NaiveDate::from_ymd_opt(2026, 1, 16).unwrap();
        let request = FetchRequest::new(Ticker::new("SBER"), today);
        assert_eq!(match_name(&request), "SBER");
        let request = request.with_company_name(Some("Сбербанк России".into()));
        assert_eq!(match_name(&request), "Сбербанк России");
        let request = request.with_short_name(Some("Сбербанк".into()));
        assert_eq!(match_name(&request), "Сбербанк");
    }

    fn calendar_page(companies: &[&str]) -> String {
        let rows: Vec<_> = companies
            .iter()
            .map(|c| {
                json!({
                    "company_name_full_ru": c,
                    "event_date": "2026-02-26 00:00:00",
                    "event_type_name": "Публикация отчетности"
                })
            })
            .collect();
        json!([{"cci_ir_calendar": rows}]).to_string()
    }

    #[tokio::test]
    async fn test_calendar_downloaded_once() {
        let full_page: Vec<&str> = std::iter::repeat_n("ПАО Газпром", PAGE_SIZE).collect();
        let last_page = calendar_page(&["ПАО Сбербанк"]);
        let dividends = json!([{"dividends": [
            {"registryclosedate": "2025-07-18", "value": 34.84, "currencyid": "RUB"}
        ]}]);
        let stub = Arc::new(
            StubTransport::new()
                .route(ir_calendar_url(0), HttpResponse::new(200, calendar_page(&full_page)))
                .route(ir_calendar_url(100), HttpResponse::new(200, last_page))
                .route(
                    "https://iss.moex.com/iss/securities/",
                    HttpResponse::new(200, dividends.to_string()),
                ),
        );
        let client = MoexClient::with_transport(stub.clone(), Pacer::unpaced());
        let provider = MoexEventsProvider::new(client);
        let today = NaiveDate::from_ymd_opt(2026, 1, 16).unwrap();

        let sber =
            FetchRequest::new(Ticker::new("SBER"), today).with_short_name(Some("Сбербанк".into()));
        let artifacts = provider.fetch(&sber).await.unwrap();
        let file: EventsFile = serde_json::from_slice(&artifacts[0].contents).unwrap();
        assert_eq!(file.company_name, "Сбербанк");
        assert_eq!(file.dividends.len(), 1);
        assert_eq!(file.ir_events.len(), 1);
        assert_eq!(stub.calls(), 3);

        let gazp =
            FetchRequest::new(Ticker::new("GAZP"), today).with_short_name(Some("Газпром".into()));
        let artifacts = provider.fetch(&gazp).await.unwrap();
        let file: EventsFile = serde_json::from_slice(&artifacts[0].contents).unwrap();
        assert_eq!(file.ir_events.len(), PAGE_SIZE);
        // one more dividends call, no calendar calls
        assert_eq!(stub.calls(), 4);
    }

    #[test]
    fn test_filter_keeps_order() {
        let matcher = CompanyNameMatcher::new("Лукойл").unwrap();
        let calendar = vec![event("ПАО ЛУКОЙЛ"), event("ПАО Сбербанк"), event("Лукойл")];
        assert_eq!(matcher.filter(&calendar).len(), 2);
    }
}
