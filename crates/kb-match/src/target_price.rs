//! Target-price extraction.

use kb_core::{KbError, Result};
use regex::Regex;
use serde::Serialize;
use std::fmt;

/// Currency tag next to a target price.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Currency {
    /// Rubles (`руб`, `₽`, `RUB`).
    Rub,
    /// Dollars (`дол`, `$`, `USD`).
    Usd,
}

impl Currency {
    fn from_tag(tag: &str) -> Option<Self> {
        match tag.to_lowercase().as_str() {
            "руб" | "₽" | "rub" => Some(Self::Rub),
            "дол" | "$" | "usd" => Some(Self::Usd),
            _ => None,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rub => "RUB",
            Self::Usd => "USD",
        })
    }
}

/// A price target found in text.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TargetPrice {
    /// Price as written, without inner spaces (`1500`, `12,5`).
    pub raw: String,
    /// Numeric value.
    pub value: f64,
    /// Currency, when tagged.
    pub currency: Option<Currency>,
}

impl fmt::Display for TargetPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.currency {
            Some(currency) => write!(f, "{} {currency}", self.raw),
            None => f.write_str(&self.raw),
        }
    }
}

/// Finds "keyword: number [currency]" patterns.
///
/// Keywords: `оценка справедливой стоимости`, `справедливая стоимость`,
/// `целевая цена`, `оценка`, `target price`, `fair value`.
#[derive(Clone, Debug)]
pub struct TargetPriceExtractor {
    pattern: Regex,
}

impl TargetPriceExtractor {
    /// Compiles the pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern does not compile.
    pub fn new() -> Result<Self> {
        let pattern = Regex::new(concat!(
            r"(?i)(?:оценка справедливой стоимости|справедливая стоимость|целевая цена|оценка",
            r"|target price|fair value)",
            r"[:\s\-–—]+(\d[\d\s]*(?:[.,]\d+)?)\s*(руб|₽|дол|\$|usd|rub)?",
        ))
        .map_err(|e| KbError::Other(format!("target price pattern: {e}")))?;
        Ok(Self { pattern })
    }

    /// Every target price in `text`, in order. No match yields an empty
    /// list.
    #[must_use]
    pub fn extract(&self, text: &str) -> Vec<TargetPrice> {
        self.pattern
            .captures_iter(text)
            .filter_map(|caps| {
                let raw: String =
                    caps.get(1)?.as_str().chars().filter(|c| !c.is_whitespace()).collect();
                let value = raw.replace(',', ".").parse::<f64>().ok()?;
                let currency = caps.get(2).and_then(|m| Currency::from_tag(m.as_str()));
                Some(TargetPrice { raw, value, currency })
            })
            .collect()
    }
}
