#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/kb/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for the research knowledge base pipeline.
//!
//! This crate provides the foundational abstractions shared by every stage:
//!
//! - [`TickerFetcher`](provider::TickerFetcher) - Fetches raw artifacts for one ticker
//! - [`HttpClient`](http::HttpClient) - Paced, status-checked HTTP access
//! - [`FrontMatter`](frontmatter::FrontMatter) - Document header codec
//! - [`KbError`](error::KbError) - Error taxonomy

/// Error types for pipeline operations.
pub mod error;
/// Document front-matter parsing and in-place editing.
pub mod frontmatter;
/// HTTP transport and client.
pub mod http;
/// Request pacing.
pub mod pacing;
/// Reporting period definitions.
pub mod period;
/// Provider traits for fetching per-ticker data.
pub mod provider;
/// Core record types (Ticker, MarketSnapshot, Post, etc.).
pub mod types;

/// Offline transport for tests.
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

// Re-export commonly used items at crate root
pub use error::{KbError, Result};
pub use frontmatter::{FrontMatter, FrontValue};
pub use http::{HttpClient, HttpRequest, HttpResponse, ReqwestTransport, Transport};
pub use pacing::Pacer;
pub use period::{PeriodLabel, PeriodType};
pub use provider::{Artifact, DataProvider, FetchRequest, TickerFetcher};
pub use types::{
    Dividend, EventsFile, FinancialStatementRecord, IrEvent, MarketSnapshot, MetricRow, Post,
    SanctionMatch, SanctionsFile, Ticker,
};
