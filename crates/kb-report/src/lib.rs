#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/kb/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Cross-company reports.
//!
//! # Usage
//!
//! ```rust,ignore
//! use kb_report::{Thresholds, check_staleness, top_upside, validate};
//! use kb_store::KnowledgeBase;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let kb = KnowledgeBase::open(".")?;
//!     let today = chrono::Local::now().date_naive();
//!
//!     println!("{}", check_staleness(&kb, &Thresholds::default(), today)?);
//!     for entry in top_upside(&kb, 10)? {
//!         println!("{entry}");
//!     }
//!     let report = validate(&kb)?;
//!     if report.has_errors() {
//!         eprintln!("{report}");
//!     }
//!     Ok(())
//! }
//! ```

/// Company cards and their front-matter fields.
pub mod cards;
/// Consolidated export and trend data.
pub mod export;
/// Document staleness.
pub mod staleness;
/// Top-upside ranking.
pub mod upside;
/// Card validation.
pub mod validate;

// Re-export commonly used items at crate root
pub use cards::{CompanyCard, Position, Sentiment, load_cards};
pub use export::{
    EXPORT_FILE, ExportFile, TREND_FILE, TrendData, TrendReport, bound_probabilities, export,
    trend_probabilities, write_trends,
};
pub use staleness::{
    DocumentKind, Freshness, StalenessReport, Thresholds, check_staleness, freshness,
};
pub use upside::{DEFAULT_TOP_N, UpsideEntry, top_upside};
pub use validate::{Issue, ValidationReport, validate};
