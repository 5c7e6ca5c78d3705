#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/kb/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Company document generation.
//!
//! # Usage
//!
//! ```rust,ignore
//! use kb_core::Ticker;
//! use kb_docs::{KeywordHeuristic, generate_catalysts, generate_events, load_cb_meetings};
//! use kb_store::KnowledgeBase;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let kb = KnowledgeBase::open(".")?;
//!     let today = chrono::Local::now().date_naive();
//!     let meetings = load_cb_meetings(&kb, today)?;
//!     let ticker = Ticker::new("SBER");
//!
//!     generate_events(&kb, &ticker, &meetings, today)?;
//!     generate_catalysts(&kb, &ticker, &meetings, &KeywordHeuristic::default(), today)?;
//!     Ok(())
//! }
//! ```

/// Risk and opportunity catalysts.
pub mod catalysts;
/// Section model shared by all documents.
pub mod document;
/// Corporate events document.
pub mod events;
/// Governance document.
pub mod governance;
/// Central bank meeting calendar.
pub mod macro_calendar;
/// Opinions from channel posts.
pub mod opinions;

// Re-export commonly used items at crate root
pub use catalysts::{
    CATALYSTS_FILE, Catalyst, CatalystClassifier, CatalystKind, CatalystSource, CatalystSummary,
    CatalystsFile, Impact, KeywordHeuristic, Magnitude, build_catalysts, generate_catalysts,
};
pub use document::{DocOutcome, Document, Section, SectionRole, SectionTemplate, Template};
pub use events::{EVENTS_DOC, generate_events};
pub use governance::{DividendAnalysis, GOVERNANCE_DOC, Periodicity, Stability, generate_governance};
pub use macro_calendar::{cb_meetings, load_cb_meetings};
pub use opinions::{
    DEFAULT_CHANNEL, MARKET_DIGEST_FILE, OPINIONS_DOC, OpinionsGenerator, OpinionsReport,
};
