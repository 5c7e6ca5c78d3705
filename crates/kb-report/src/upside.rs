//! Top-upside ranking.

use crate::cards::{CompanyCard, Position, Sentiment, load_cards};
use kb_core::{Result, Ticker};
use kb_store::KnowledgeBase;
use std::fmt;

/// Default ranking size.
pub const DEFAULT_TOP_N: usize = 10;

/// One ranked company.
#[derive(Clone, Debug, PartialEq)]
pub struct UpsideEntry {
    /// Company.
    pub ticker: Ticker,
    /// Sentiment.
    pub sentiment: Sentiment,
    /// Position, if valid.
    pub position: Option<Position>,
    /// Upside in percent.
    pub upside_pct: f64,
    /// `current_price`, if numeric.
    pub price: Option<f64>,
    /// `my_fair_value`, if numeric.
    pub fair_value: Option<f64>,
}

impl UpsideEntry {
    /// Builds an entry from a card with a valid sentiment and a computable
    /// upside.
    #[must_use]
    pub fn from_card(card: &CompanyCard) -> Option<Self> {
        let sentiment = card.sentiment()?;
        let upside = card.upside()?;
        Some(Self {
            ticker: card.ticker(),
            sentiment,
            position: card.position(),
            upside_pct: upside * 100.0,
            price: card.number("current_price"),
            fair_value: card.number("my_fair_value"),
        })
    }
}

fn cell(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v}"))
}

impl fmt::Display for UpsideEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<8} {:<10} {:<8} {:>7.1}% {:>10} {:>10}",
            self.ticker.as_str(),
            self.sentiment.as_str(),
            self.position.map_or("-", |p| p.as_str()),
            self.upside_pct,
            cell(self.price),
            cell(self.fair_value),
        )
    }
}

/// Ranks cards by upside, highest first, and keeps `n`.
///
/// Delisted companies, stubs without a valid sentiment and cards without a
/// computable upside are left out.
#[must_use]
pub fn rank_upside(cards: &[CompanyCard], n: usize) -> Vec<UpsideEntry> {
    let mut entries: Vec<UpsideEntry> = cards
        .iter()
        .filter(|c| !c.is_delisted())
        .filter_map(UpsideEntry::from_card)
        .collect();
    entries.sort_by(|a, b| {
        b.upside_pct
            .total_cmp(&a.upside_pct)
            .then_with(|| a.ticker.cmp(&b.ticker))
    });
    entries.truncate(n);
    entries
}

/// Top `n` companies of the knowledge base by upside.
///
/// # Errors
///
/// Returns an error if the company cards cannot be read.
pub fn top_upside(kb: &KnowledgeBase, n: usize) -> Result<Vec<UpsideEntry>> {
    Ok(rank_upside(&load_cards(kb)?, n))
}
