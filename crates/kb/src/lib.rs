#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/kb/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Equity research knowledge base pipeline.
//!
//! This crate re-exports the stage crates and provides a
//! [`FetcherRegistry`] for running per-ticker fetchers in batches.
//!
//! # Example
//!
//! ```rust,ignore
//! use kb::{BatchOptions, FetcherRegistry, KnowledgeBase, Source};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> kb::Result<()> {
//!     let kb = KnowledgeBase::open(".")?;
//!     let registry = FetcherRegistry::new().with_moex(Duration::from_millis(500))?;
//!     let tickers = kb.resolve_tickers(&[])?;
//!     let today = chrono::Local::now().date_naive();
//!
//!     let summary = registry.run(Source::Market, &kb, &tickers, BatchOptions::new(today)).await?;
//!     println!("{summary}");
//!     Ok(())
//! }
//! ```

// Core types and traits
pub use kb_core::*;
pub use kb_store::{KnowledgeBase, PostCollection, PriceHistory};

// Stage crates
pub use kb_docs as docs;
pub use kb_match as matching;
pub use kb_moex as moex;
pub use kb_report as report;
pub use kb_sanctions as sanctions;
pub use kb_smartlab as smartlab;
pub use kb_telegram as telegram;

/// Run configuration.
pub mod config;
mod registry;
/// Pipeline stages beyond per-ticker fetches.
pub mod stages;

pub use config::{KbConfig, ProviderDelays};
pub use registry::{
    BatchOptions, BatchSummary, FetcherRegistry, Source, TickerOutcome, fetch_request, run_batch,
};
pub use stages::{DocKind, GenerateSummary, PriceSummary};
