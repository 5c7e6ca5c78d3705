//! Company cards: the `_index.md` of every company directory.

use kb_core::frontmatter::parse_number;
use kb_core::{FrontMatter, KbError, Result, Ticker};
use kb_store::{KnowledgeBase, read_optional};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Analyst view of a company.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    /// Expected to rise.
    Bullish,
    /// No strong view.
    Neutral,
    /// Expected to fall.
    Bearish,
}

impl Sentiment {
    /// Front-matter spelling.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bullish => "bullish",
            Self::Neutral => "neutral",
            Self::Bearish => "bearish",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sentiment {
    type Err = KbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "bullish" => Ok(Self::Bullish),
            "neutral" => Ok(Self::Neutral),
            "bearish" => Ok(Self::Bearish),
            other => Err(KbError::InvalidParameter(format!("sentiment: {other}"))),
        }
    }
}

/// Portfolio stance.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    /// Buy.
    Buy,
    /// Keep.
    Hold,
    /// Follow without a position.
    Watch,
    /// Sell.
    Sell,
    /// Stay away.
    Avoid,
}

impl Position {
    /// Front-matter spelling.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Hold => "hold",
            Self::Watch => "watch",
            Self::Sell => "sell",
            Self::Avoid => "avoid",
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Position {
    type Err = KbError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "buy" => Ok(Self::Buy),
            "hold" => Ok(Self::Hold),
            "watch" => Ok(Self::Watch),
            "sell" => Ok(Self::Sell),
            "avoid" => Ok(Self::Avoid),
            other => Err(KbError::InvalidParameter(format!("position: {other}"))),
        }
    }
}

/// Parses an `upside` field into a fraction.
///
/// `25%`, `+25%` and `25` are all 0.25; a bare number within ±1 is already
/// a fraction.
#[must_use]
pub fn parse_upside_fraction(value: &str) -> Option<f64> {
    let number = parse_number(value)?;
    if value.contains('%') || number.abs() > 1.0 {
        Some(number / 100.0)
    } else {
        Some(number)
    }
}

/// Upside of a fair value over a price, as a fraction. Both must be
/// positive.
#[must_use]
pub fn upside_fraction(price: f64, fair_value: f64) -> Option<f64> {
    (price > 0.0 && fair_value > 0.0).then(|| fair_value / price - 1.0)
}

/// One company directory and its `_index.md`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompanyCard {
    /// Directory name.
    pub dir: Ticker,
    /// Raw `_index.md`, if present.
    pub content: Option<String>,
    /// Parsed front-matter, if the file has a header.
    pub front: Option<FrontMatter>,
}

impl CompanyCard {
    /// Builds a card from the raw index text.
    #[must_use]
    pub fn new(dir: Ticker, content: Option<String>) -> Self {
        let front = content.as_deref().and_then(FrontMatter::parse);
        Self { dir, content, front }
    }

    /// Non-empty scalar value of a front-matter key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.front
            .as_ref()
            .and_then(|f| f.get(key))
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// Numeric front-matter value.
    #[must_use]
    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(parse_number)
    }

    /// `ticker` from the front-matter, else the directory name.
    #[must_use]
    pub fn ticker(&self) -> Ticker {
        self.get("ticker").map_or_else(|| self.dir.clone(), Ticker::new)
    }

    /// Valid sentiment, if any.
    #[must_use]
    pub fn sentiment(&self) -> Option<Sentiment> {
        self.get("sentiment").and_then(|s| s.parse().ok())
    }

    /// Valid position, if any.
    #[must_use]
    pub fn position(&self) -> Option<Position> {
        self.get("position").and_then(|s| s.parse().ok())
    }

    /// Returns true if the company is marked delisted.
    #[must_use]
    pub fn is_delisted(&self) -> bool {
        self.front.as_ref().is_some_and(FrontMatter::is_delisted)
    }

    /// Upside as a fraction: from `current_price` and `my_fair_value` when
    /// both are set, else from the `upside` field.
    #[must_use]
    pub fn upside(&self) -> Option<f64> {
        match (self.number("current_price"), self.number("my_fair_value")) {
            (Some(price), Some(fair)) => upside_fraction(price, fair),
            _ => None,
        }
        .or_else(|| self.get("upside").and_then(parse_upside_fraction))
    }
}

/// Reads the card of every company directory, delisted ones included.
///
/// # Errors
///
/// Returns an error if `companies/` or an existing index cannot be read.
pub fn load_cards(kb: &KnowledgeBase) -> Result<Vec<CompanyCard>> {
    kb.company_tickers()?
        .into_iter()
        .map(|ticker| {
            let content = read_optional(&kb.index_path(&ticker))?;
            Ok(CompanyCard::new(ticker, content))
        })
        .collect()
}
