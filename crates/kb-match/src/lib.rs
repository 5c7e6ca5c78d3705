#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/kb/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Free-text matching against known companies.
//!
//! # Example
//!
//! ```
//! use kb_core::{Post, Ticker};
//! use kb_match::{AliasRegistry, group_by_ticker};
//!
//! let registry = AliasRegistry::builtin().unwrap();
//! let groups = group_by_ticker(vec![Post::new(1, "Сбербанк отчитался")], &registry);
//! assert!(groups.by_ticker.contains_key(&Ticker::new("SBER")));
//! ```

/// Posts grouped per ticker.
pub mod grouping;
/// Market-wide keywords.
pub mod keywords;
/// Ticker and alias registry.
pub mod registry;
/// Target-price extraction.
pub mod target_price;

// Re-export commonly used items at crate root
pub use grouping::{TickerGroups, group_by_ticker};
pub use keywords::{MARKET_KEYWORDS, is_market_relevant};
pub use registry::{AliasRegistry, CompanyEntry};
pub use target_price::{Currency, TargetPrice, TargetPriceExtractor};
