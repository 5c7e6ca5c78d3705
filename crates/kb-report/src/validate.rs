//! Front-matter validation of company cards.
//!
//! Problems are reported per company and never corrected. Errors make the
//! report fail; warnings only inform.

use crate::cards::{CompanyCard, Position, Sentiment, load_cards};
use crate::staleness::parse_iso_date;
use kb_core::frontmatter::parse_number;
use kb_core::{Result, Ticker};
use kb_store::KnowledgeBase;
use std::fmt;

/// Fields every filled card must have.
pub const REQUIRED_FIELDS: &[&str] = &["ticker", "name", "sector", "sentiment", "updated"];

/// Fields a card with a valid sentiment should have.
pub const RECOMMENDED_FIELDS: &[&str] = &["position", "current_price", "my_fair_value", "upside"];

/// Fields that must hold a positive number when present.
pub const POSITIVE_FIELDS: &[&str] = &["current_price", "my_fair_value"];

/// A single problem with a card.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Issue {
    /// `_index.md` is missing.
    MissingIndex,
    /// The index has no front-matter.
    MissingFrontMatter,
    /// A required field is absent or empty.
    MissingField(&'static str),
    /// A field has a value outside its allowed set or range.
    InvalidValue {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: String,
    },
    /// A recommended field is absent or empty.
    Recommended(&'static str),
    /// Template HTML comments remain in the document.
    TemplateComments,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingIndex => f.write_str("no _index.md"),
            Self::MissingFrontMatter => f.write_str("no front-matter"),
            Self::MissingField(field) => write!(f, "missing {field}"),
            Self::InvalidValue { field, value } => write!(f, "invalid {field}: {value}"),
            Self::Recommended(field) => write!(f, "recommended field {field} is empty"),
            Self::TemplateComments => f.write_str("template HTML comments left"),
        }
    }
}

/// Validation result of one company.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CardValidation {
    /// Company directory.
    pub ticker: Ticker,
    /// Errors.
    pub errors: Vec<Issue>,
    /// Warnings.
    pub warnings: Vec<Issue>,
}

/// Validates one card.
#[must_use]
pub fn validate_card(card: &CompanyCard) -> CardValidation {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let ticker = card.dir.clone();

    let Some(content) = card.content.as_deref() else {
        return CardValidation { ticker, errors: vec![Issue::MissingIndex], warnings };
    };
    if card.front.as_ref().is_none_or(|f| f.is_empty()) {
        return CardValidation { ticker, errors: vec![Issue::MissingFrontMatter], warnings };
    }

    for field in REQUIRED_FIELDS {
        if card.get(field).is_none() {
            errors.push(Issue::MissingField(field));
        }
    }

    let sentiment = card.get("sentiment");
    if let Some(value) = sentiment {
        if value.parse::<Sentiment>().is_err() {
            errors.push(Issue::InvalidValue { field: "sentiment", value: value.to_string() });
        }
    }
    if let Some(value) = card.get("position") {
        if value.parse::<Position>().is_err() {
            errors.push(Issue::InvalidValue { field: "position", value: value.to_string() });
        }
    }
    for field in POSITIVE_FIELDS {
        if let Some(value) = card.get(field) {
            if !parse_number(value).is_some_and(|n| n > 0.0) {
                errors.push(Issue::InvalidValue { field, value: value.to_string() });
            }
        }
    }
    if let Some(value) = card.get("updated") {
        if parse_iso_date(value).is_none() {
            errors.push(Issue::InvalidValue { field: "updated", value: value.to_string() });
        }
    }

    if card.sentiment().is_some() {
        for field in RECOMMENDED_FIELDS {
            if card.get(field).is_none() {
                warnings.push(Issue::Recommended(field));
            }
        }
    }
    if content.contains("<!--") {
        warnings.push(Issue::TemplateComments);
    }

    CardValidation { ticker, errors, warnings }
}

/// Validation of every company.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Per-company results, in directory order.
    pub cards: Vec<CardValidation>,
}

impl ValidationReport {
    /// Returns true if any card has an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.cards.iter().any(|c| !c.errors.is_empty())
    }

    /// Cards without errors or warnings.
    #[must_use]
    pub fn valid(&self) -> usize {
        self.cards.iter().filter(|c| c.errors.is_empty() && c.warnings.is_empty()).count()
    }

    /// Cards with errors.
    #[must_use]
    pub fn with_errors(&self) -> usize {
        self.cards.iter().filter(|c| !c.errors.is_empty()).count()
    }

    /// Cards with warnings only.
    #[must_use]
    pub fn with_warnings(&self) -> usize {
        self.cards.iter().filter(|c| c.errors.is_empty() && !c.warnings.is_empty()).count()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for card in &self.cards {
            let mark = match (card.errors.is_empty(), card.warnings.is_empty()) {
                (false, _) => "✗",
                (true, false) => "⚠",
                (true, true) => continue,
            };
            writeln!(f, "{mark} {}", card.ticker)?;
            for issue in &card.errors {
                writeln!(f, "    error: {issue}")?;
            }
            for issue in &card.warnings {
                writeln!(f, "    warning: {issue}")?;
            }
        }
        write!(
            f,
            "Total: {} companies, valid {}, with warnings {}, with errors {}",
            self.cards.len(),
            self.valid(),
            self.with_warnings(),
            self.with_errors()
        )
    }
}

/// Validates the card of every company directory.
///
/// # Errors
///
/// Returns an error if the company cards cannot be read.
pub fn validate(kb: &KnowledgeBase) -> Result<ValidationReport> {
    let cards = load_cards(kb)?.iter().map(validate_card).collect();
    Ok(ValidationReport { cards })
}
