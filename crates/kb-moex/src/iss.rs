//! ISS "extended" JSON payloads.
//!
//! With `iss.json=extended` every response is an array of objects, each
//! mapping block names (`securities`, `marketdata`, `candles`, ...) to an
//! array of row objects. Values are frequently `null`.

use kb_core::{Dividend, IrEvent, KbError, Result, Ticker};
use serde::de::{DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::PROVIDER_NAME;

/// Collects the rows of every block called `block`.
///
/// Rows that do not decode as `T` are skipped.
///
/// # Errors
///
/// Returns [`KbError::Schema`] if the payload is not an array.
pub fn block_rows<T: DeserializeOwned>(payload: &Value, block: &str) -> Result<Vec<T>> {
    let Some(items) = payload.as_array() else {
        return Err(KbError::Schema {
            provider: PROVIDER_NAME.to_string(),
            reason: "expected an array of blocks".into(),
        });
    };
    let mut rows = Vec::new();
    for item in items {
        let Some(Value::Array(raw_rows)) = item.get(block) else {
            continue;
        };
        for raw in raw_rows {
            match T::deserialize(raw) {
                Ok(row) => rows.push(row),
                Err(e) => debug!(block, error = %e, "skipping undecodable row"),
            }
        }
    }
    Ok(rows)
}

fn lenient_string<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<String, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Static security data (`securities` block).
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "UPPERCASE")]
pub struct SecurityRow {
    /// Exchange ticker.
    #[serde(deserialize_with = "lenient_string")]
    pub secid: String,
    /// Trading board.
    #[serde(deserialize_with = "lenient_string")]
    pub boardid: String,
    /// Short name.
    #[serde(deserialize_with = "lenient_string")]
    pub shortname: String,
    /// Full name.
    #[serde(deserialize_with = "lenient_string")]
    pub secname: String,
    /// Lot size.
    pub lotsize: Option<f64>,
    /// Shares issued.
    pub issuesize: Option<f64>,
    /// Previous close.
    pub prevprice: Option<f64>,
    /// Listing level.
    pub listlevel: Option<f64>,
}

/// Trading session data (`marketdata` block).
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, rename_all = "UPPERCASE")]
pub struct MarketDataRow {
    /// Exchange ticker.
    #[serde(deserialize_with = "lenient_string")]
    pub secid: String,
    /// Trading board.
    #[serde(deserialize_with = "lenient_string")]
    pub boardid: String,
    /// Last trade.
    pub last: Option<f64>,
    /// Official close, used before the first trade of the day.
    pub lcloseprice: Option<f64>,
    /// Best bid.
    pub bid: Option<f64>,
    /// Best offer.
    pub offer: Option<f64>,
    /// Open.
    pub open: Option<f64>,
    /// High.
    pub high: Option<f64>,
    /// Low.
    pub low: Option<f64>,
    /// Weighted average price.
    pub waprice: Option<f64>,
    /// Shares traded.
    pub voltoday: Option<f64>,
    /// Value traded, RUB.
    pub valtoday: Option<f64>,
    /// Number of trades.
    pub numtrades: Option<f64>,
    /// Capitalization, RUB.
    pub issuecapitalization: Option<f64>,
    /// Time of the last update.
    #[serde(deserialize_with = "lenient_string")]
    pub updatetime: String,
}

impl MarketDataRow {
    /// Last trade, falling back to the official close; zero counts as absent.
    #[must_use]
    pub fn price(&self) -> Option<f64> {
        self.last
            .filter(|p| *p > 0.0)
            .or(self.lcloseprice.filter(|p| *p > 0.0))
    }
}

/// A daily candle (`candles` block).
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Candle {
    /// Candle start, `YYYY-MM-DD HH:MM:SS`.
    #[serde(deserialize_with = "lenient_string")]
    pub begin: String,
    /// Open.
    pub open: Option<f64>,
    /// Close.
    pub close: Option<f64>,
    /// High.
    pub high: Option<f64>,
    /// Low.
    pub low: Option<f64>,
    /// Shares traded.
    pub volume: Option<f64>,
    /// Value traded, RUB.
    pub value: Option<f64>,
}

impl Candle {
    /// Trading date of the candle.
    #[must_use]
    pub fn date(&self) -> Option<chrono::NaiveDate> {
        kb_core::types::parse_iso_date(&self.begin)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DividendRow {
    #[serde(deserialize_with = "lenient_string")]
    registryclosedate: String,
    value: Option<f64>,
    #[serde(deserialize_with = "lenient_string")]
    currencyid: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct IrCalendarRow {
    #[serde(deserialize_with = "lenient_string")]
    company_name_full_ru: String,
    #[serde(deserialize_with = "lenient_string")]
    inn: String,
    #[serde(deserialize_with = "lenient_string")]
    event_date: String,
    #[serde(deserialize_with = "lenient_string")]
    event_type_name: String,
    #[serde(deserialize_with = "lenient_string")]
    event_description: String,
    #[serde(deserialize_with = "lenient_string")]
    event_link: String,
}

/// Parses the `dividends` block.
///
/// # Errors
///
/// Returns [`KbError::Schema`] if the payload is not an ISS response.
pub fn parse_dividends(payload: &Value) -> Result<Vec<Dividend>> {
    Ok(block_rows::<DividendRow>(payload, "dividends")?
        .into_iter()
        .map(|row| Dividend {
            record_date: row.registryclosedate,
            amount: row.value.unwrap_or_default(),
            currency: row.currencyid,
        })
        .collect())
}

/// Parses one page of the `cci_ir_calendar` block.
///
/// # Errors
///
/// Returns [`KbError::Schema`] if the payload is not an ISS response.
pub fn parse_ir_calendar(payload: &Value) -> Result<Vec<IrEvent>> {
    Ok(block_rows::<IrCalendarRow>(payload, "cci_ir_calendar")?
        .into_iter()
        .map(|row| IrEvent {
            company_name: row.company_name_full_ru,
            inn: row.inn,
            event_date: row.event_date.chars().take(10).collect(),
            event_type: row.event_type_name,
            description: row.event_description,
            link: row.event_link,
        })
        .collect())
}

/// Parses the `candles` block.
///
/// # Errors
///
/// Returns [`KbError::Schema`] if the payload is not an ISS response.
pub fn parse_candles(payload: &Value) -> Result<Vec<Candle>> {
    block_rows(payload, "candles")
}

/// First row of a board, matched on `boardid`.
pub fn on_board<'a, T>(rows: &'a [T], board: &str, board_of: impl Fn(&T) -> &str) -> Option<&'a T> {
    rows.iter().find(|row| board_of(row) == board)
}

/// Ticker of a security row, if set.
#[must_use]
pub fn row_ticker(secid: &str) -> Option<Ticker> {
    let secid = secid.trim();
    (!secid.is_empty()).then(|| Ticker::new(secid))
}
