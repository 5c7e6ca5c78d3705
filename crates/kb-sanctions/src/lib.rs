#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/kb/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! OpenSanctions screening provider.
//!
//! # Usage
//!
//! ```rust,ignore
//! use kb_core::{FetchRequest, Ticker, TickerFetcher};
//! use kb_sanctions::SanctionsProvider;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = SanctionsProvider::new("your_api_key", Duration::from_secs(1))?;
//!     let today = chrono::Local::now().date_naive();
//!     let request = FetchRequest::new(Ticker::new("SBER"), today)
//!         .with_company_name(Some("Сбербанк".into()));
//!     let artifacts = provider.fetch(&request).await?;
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use kb_core::{
    Artifact, DataProvider, FetchRequest, HttpClient, HttpRequest, KbError, Pacer,
    ReqwestTransport, Result, SanctionMatch, SanctionsFile, TickerFetcher, Transport,
};
use reqwest::Url;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Provider name used in logs and errors.
pub const PROVIDER_NAME: &str = "OpenSanctions";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "OPENSANCTIONS_API_KEY";

/// Stored file name.
pub const SANCTIONS_FILE: &str = "sanctions.json";

/// Search endpoint over the default collection.
const SEARCH_URL: &str = "https://api.opensanctions.org/search/default";

/// Hits requested per search.
pub const SEARCH_LIMIT: usize = 10;

/// User agent asked for by the service for non-commercial use.
const USER_AGENT: &str = "investment-analysis/1.0 (non-commercial research)";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchResponse {
    results: Vec<SanctionMatch>,
    total: SearchTotal,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SearchTotal {
    value: u64,
}

/// Search URL for a query.
///
/// # Errors
///
/// Returns [`KbError::InvalidParameter`] if the URL cannot be built.
pub fn search_url(query: &str) -> Result<String> {
    let limit = SEARCH_LIMIT.to_string();
    Url::parse_with_params(SEARCH_URL, [("q", query), ("limit", limit.as_str())])
        .map(String::from)
        .map_err(|e| KbError::InvalidParameter(format!("search url: {e}")))
}

/// Query sent for a company: front-matter name, then exchange short name,
/// then the ticker.
#[must_use]
pub fn query_for(request: &FetchRequest) -> String {
    request
        .company_name
        .clone()
        .or_else(|| request.short_name.clone())
        .unwrap_or_else(|| request.ticker.to_string())
}

/// Decodes a search response into the stored file shape.
///
/// # Errors
///
/// Returns [`KbError::Schema`] if the body is not a search response.
pub fn parse_search(
    request: &FetchRequest,
    query: &str,
    body: &serde_json::Value,
) -> Result<SanctionsFile> {
    if !body.is_object() {
        return Err(KbError::Schema {
            provider: PROVIDER_NAME.to_string(),
            reason: "search response is not an object".into(),
        });
    }
    let response = SearchResponse::deserialize(body).map_err(|e| KbError::Schema {
        provider: PROVIDER_NAME.to_string(),
        reason: e.to_string(),
    })?;
    let relevant_matches = response.results.iter().filter(|m| m.is_relevant()).count();
    Ok(SanctionsFile {
        ticker: request.ticker.clone(),
        company_name: query.to_string(),
        query: query.to_string(),
        date: request.today,
        results: response.results,
        total: response.total.value,
        relevant_matches,
    })
}

/// OpenSanctions provider.
#[derive(Clone)]
pub struct SanctionsProvider {
    http: HttpClient,
    api_key: String,
}

impl fmt::Debug for SanctionsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SanctionsProvider")
            .field("http", &self.http)
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}

impl SanctionsProvider {
    /// Creates a provider over HTTP.
    ///
    /// # Errors
    ///
    /// Returns [`KbError::Config`] for an empty key or if the HTTP client
    /// cannot be built.
    pub fn new(api_key: impl Into<String>, delay: Duration) -> Result<Self> {
        let transport = ReqwestTransport::new(USER_AGENT)?;
        Self::with_transport(api_key, Arc::new(transport), Pacer::new(delay))
    }

    /// Creates a provider on top of a custom transport.
    ///
    /// # Errors
    ///
    /// Returns [`KbError::Config`] for an empty key.
    pub fn with_transport(
        api_key: impl Into<String>,
        transport: Arc<dyn Transport>,
        pacer: Pacer,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(KbError::Config(format!("{API_KEY_ENV} is not set")));
        }
        Ok(Self {
            http: HttpClient::new(PROVIDER_NAME, transport, pacer),
            api_key,
        })
    }

    /// Screens one company.
    ///
    /// # Errors
    ///
    /// Returns an error on network failure, non-success status or an
    /// unexpected response body.
    pub async fn screen(&self, request: &FetchRequest) -> Result<SanctionsFile> {
        let query = query_for(request);
        let http_request = HttpRequest::get(search_url(&query)?)
            .header("Authorization", format!("ApiKey {}", self.api_key));
        let body: serde_json::Value = self.http.get_json(&http_request).await?;
        let file = parse_search(request, &query, &body)?;
        debug!(
            ticker = %request.ticker,
            %query,
            hits = file.results.len(),
            relevant = file.relevant_matches,
            "screened company"
        );
        Ok(file)
    }
}

impl DataProvider for SanctionsProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn description(&self) -> &str {
        "Sanctions list screening from the OpenSanctions search API"
    }
}

#[async_trait]
impl TickerFetcher for SanctionsProvider {
    fn artifact_names(&self) -> &[&'static str] {
        &[SANCTIONS_FILE]
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Artifact>> {
        let file = self.screen(request).await?;
        Ok(vec![Artifact::json(SANCTIONS_FILE, &file)?])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use kb_core::testing::StubTransport;
    use kb_core::{HttpResponse, Ticker};
    use serde_json::json;

    fn request() -> FetchRequest {
        FetchRequest::new(Ticker::new("SBER"), NaiveDate::from_ymd_opt(2026, 1, 16).unwrap())
    }

    #[test]
    fn test_query_priority() {
        assert_eq!(query_for(&request()), "SBER");
        let with_short = request().with_short_name(Some("Сбербанк".into()));
        assert_eq!(query_for(&with_short), "Сбербанк");
        let with_name = with_short.with_company_name(Some("ПАО Сбербанк".into()));
        assert_eq!(query_for(&with_name), "ПАО Сбербанк");
    }

    #[test]
    fn test_search_url_encodes_query() {
        let url = search_url("ПАО Сбербанк").unwrap();
        assert!(url.starts_with("https://api.opensanctions.org/search/default?q="));
        assert!(url.ends_with("&limit=10"));
        assert!(!url.contains(' '));
    }

    #[test]
    fn test_debug_redacts_key() {
        let stub = Arc::new(StubTransport::new());
        let provider =
            SanctionsProvider::with_transport("secret-key", stub, Pacer::unpaced()).unwrap();
        let debug = format!("{provider:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("secret-key"));
    }

    #[test]
    fn test_empty_key_is_config_error() {
        let stub = Arc::new(StubTransport::new());
        let err = SanctionsProvider::with_transport(" ", stub, Pacer::unpaced()).unwrap_err();
        assert!(matches!(err, KbError::Config(_)));
        assert!(!err.is_ticker_scoped());
    }

    #[test]
    fn test_parse_counts_relevant() {
        let body = json!({
            "results": [
                {"id": "NK-1", "caption": "Sberbank", "schema": "Company",
                 "datasets": ["us_ofac_sdn"], "score": 0.93},
                {"id": "NK-2", "caption": "Sberbank Leasing", "schema": "Company",
                 "datasets": [], "score": 0.7},
                {"id": "NK-3", "caption": "Someone", "schema": "Person", "score": 0.2}
            ],
            "total": {"value": 57, "relation": "eq"}
        });
        let file = parse_search(&request(), "Сбербанк", &body).unwrap();
        assert_eq!(file.total, 57);
        assert_eq!(file.results.len(), 3);
        assert_eq!(file.relevant_matches, 1);
        assert_eq!(file.relevant().next().map(|m| m.id.as_str()), Some("NK-1"));
        assert!(parse_search(&request(), "x", &json!([])).is_err());
    }

    #[tokio::test]
    async fn test_fetch_sends_api_key() {
        let stub = Arc::new(StubTransport::new().route(
            SEARCH_URL,
            HttpResponse::new(200, json!({"results": [], "total": {"value": 0}}).to_string()),
        ));
        let provider =
            SanctionsProvider::with_transport("k123", stub.clone(), Pacer::unpaced()).unwrap();
        let artifacts = provider.fetch(&request()).await.unwrap();
        assert_eq!(artifacts[0].file_name, SANCTIONS_FILE);

        let sent = stub.requests();
        assert_eq!(sent.len(), 1);
        let auth = ("Authorization".to_string(), "ApiKey k123".to_string());
        assert!(sent[0].headers.contains(&auth));
        let file: SanctionsFile = serde_json::from_slice(&artifacts[0].contents).unwrap();
        assert_eq!(file.query, "SBER");
        assert_eq!(file.relevant_matches, 0);
    }
}
