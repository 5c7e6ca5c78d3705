#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/kb/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Storage layer of the research knowledge base.
//!
//! Every stage reads its inputs from and writes its outputs to the tree
//! rooted at [`KnowledgeBase::root`]:
//!
//! - [`KnowledgeBase`] - Layout, ticker discovery and artifact writes
//! - [`PriceHistory`] - Daily price log of one company
//! - [`PostCollection`] - Posts of one channel

/// Daily freshness checks.
pub mod freshness;
/// Directory layout and ticker discovery.
pub mod knowledge_base;
/// Channel post collections.
pub mod posts;
/// Price history log.
pub mod price_history;

// Re-export commonly used items at crate root
pub use freshness::{is_fresh, modified_on};
pub use knowledge_base::{KnowledgeBase, read_optional, write_file};
pub use posts::{PostCollection, dedup_posts};
pub use price_history::{PRICE_HISTORY_FILE, PriceHistory, PriceRow};
