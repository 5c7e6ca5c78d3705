//! Provider traits for fetching per-ticker data.
//!
//! This module defines the core provider traits:
//!
//! - [`DataProvider`] - Base trait for all data providers
//! - [`TickerFetcher`] - Fetches the raw artifacts of one ticker

use async_trait::async_trait;
use chrono::NaiveDate;
use std::fmt::Debug;

use crate::{error::Result, types::Ticker};

/// Base trait for all data providers.
pub trait DataProvider: Send + Sync + Debug {
    /// Returns the name of this provider (e.g., "MOEX ISS").
    fn name(&self) -> &str;

    /// Returns a description of this provider.
    fn description(&self) -> &str;
}

/// What a fetcher knows about the ticker it is asked for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchRequest {
    /// The ticker.
    pub ticker: Ticker,
    /// `name` from the company front-matter, if any.
    pub company_name: Option<String>,
    /// Exchange short name from the last market snapshot, if any.
    pub short_name: Option<String>,
    /// Date of the run.
    pub today: NaiveDate,
}

impl FetchRequest {
    /// Creates a request with no name hints.
    #[must_use]
    pub const fn new(ticker: Ticker, today: NaiveDate) -> Self {
        Self {
            ticker,
            company_name: None,
            short_name: None,
            today,
        }
    }

    /// Sets the company name hint.
    #[must_use]
    pub fn with_company_name(mut self, name: Option<String>) -> Self {
        self.company_name = name.filter(|n| !n.trim().is_empty());
        self
    }

    /// Sets the exchange short name hint.
    #[must_use]
    pub fn with_short_name(mut self, name: Option<String>) -> Self {
        self.short_name = name.filter(|n| !n.trim().is_empty());
        self
    }
}

/// A file produced by a fetch, stored under the ticker's `data/` directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Artifact {
    /// File name relative to `data/`.
    pub file_name: &'static str,
    /// File contents.
    pub contents: Vec<u8>,
}

impl Artifact {
    /// Creates an artifact.
    #[must_use]
    pub fn new(file_name: &'static str, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            file_name,
            contents: contents.into(),
        }
    }

    /// Serializes `value` as pretty JSON with a trailing newline.
    pub fn json<T: serde::Serialize>(file_name: &'static str, value: &T) -> Result<Self> {
        let mut contents = serde_json::to_vec_pretty(value)?;
        contents.push(b'\n');
        Ok(Self::new(file_name, contents))
    }
}

/// Fetches the raw artifacts of one ticker from a provider.
///
/// The batch runner decides whether to call [`fetch`](Self::fetch) at all
/// (freshness, exclusion) and writes the returned artifacts. Returning
/// fewer artifacts than [`artifact_names`](Self::artifact_names) lists
/// counts as a partial success.
#[async_trait]
pub trait TickerFetcher: DataProvider {
    /// File names this fetcher produces for every ticker.
    fn artifact_names(&self) -> &[&'static str];

    /// Fetches and normalizes the data of one ticker.
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Artifact>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_hints_skip_blank() {
        let today = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        let request = FetchRequest::new(Ticker::new("sber"), today)
            .with_company_name(Some("  ".into()))
            .with_short_name(Some("Сбербанк".into()));
        assert_eq!(request.company_name, None);
        assert_eq!(request.short_name.as_deref(), Some("Сбербанк"));
    }

    #[test]
    fn test_json_artifact_newline() {
        let artifact = Artifact::json("x.json", &serde_json::json!({"a": 1})).unwrap();
        assert_eq!(artifact.contents.last(), Some(&b'\n'));
        assert_eq!(artifact.file_name, "x.json");
    }
}
