//! Daily price log and `current_price` updates.
//!
//! One batch listing of the main board serves every ticker; history
//! backfill uses per-ticker daily candles.

use chrono::{Days, NaiveDate};
use kb_core::frontmatter::{FrontMatter, set_scalar};
use kb_core::{KbError, Result, Ticker};
use kb_store::{
    KnowledgeBase, PRICE_HISTORY_FILE, PriceHistory, PriceRow, read_optional, write_file,
};
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::iss::{self, MarketDataRow, SecurityRow};
use crate::{MoexClient, PAGE_SIZE, board_url, round_to};

/// Upper bound on listing pages.
const MAX_BOARD_PAGES: usize = 50;

/// Longest span requested per candles call.
pub const BACKFILL_CHUNK_DAYS: u64 = 499;

/// Default backfill depth in days.
pub const DEFAULT_BACKFILL_DAYS: u64 = 365;

/// Session data of one security from the board listing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BoardQuote {
    /// Last trade or official close.
    pub last: Option<f64>,
    /// Open.
    pub open: Option<f64>,
    /// High.
    pub high: Option<f64>,
    /// Low.
    pub low: Option<f64>,
    /// Value traded today, RUB.
    pub value_today: Option<f64>,
    /// Capitalization, RUB.
    pub capitalization: Option<f64>,
    /// Shares issued.
    pub issue_size: Option<f64>,
}

impl BoardQuote {
    /// Price log row for `date`, if the quote has a price.
    #[must_use]
    pub fn to_row(&self, date: NaiveDate) -> Option<PriceRow> {
        Some(PriceRow {
            date,
            close: self.last?,
            open: self.open,
            high: self.high,
            low: self.low,
            volume_rub: self.value_today.map(f64::trunc),
            market_cap_bln: self.capitalization.map(|c| round_to(c / 1_000_000_000.0, 1)),
        })
    }

    fn apply_session(&mut self, row: &MarketDataRow) {
        self.last = row.price();
        self.open = row.open;
        self.high = row.high;
        self.low = row.low;
        self.value_today = row.valtoday;
        self.capitalization = row.issuecapitalization;
    }
}

/// What happened to one ticker during a price update.
#[derive(Clone, Debug, PartialEq)]
pub enum PriceOutcome {
    /// The log or the header changed.
    Updated {
        /// New price.
        price: f64,
        /// `current_price` before the update.
        previous: Option<f64>,
    },
    /// Today's row and the header were already up to date.
    Unchanged,
    /// The board listing has no price for the ticker.
    NoQuote,
}

impl PriceOutcome {
    /// Percentage change against the previous header price.
    #[must_use]
    pub fn change_pct(&self) -> Option<f64> {
        match self {
            Self::Updated {
                price,
                previous: Some(prev),
            } if *prev > 0.0 => Some((price - prev) / prev * 100.0),
            _ => None,
        }
    }
}

/// Formats a price the way headers store it: integers without decimals,
/// otherwise at most two decimals.
#[must_use]
pub fn format_price(price: f64) -> String {
    if price.fract() == 0.0 {
        format!("{price:.0}")
    } else {
        let formatted = format!("{price:.2}");
        formatted.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Splits `from..=till` into windows of at most [`BACKFILL_CHUNK_DAYS`].
#[must_use]
pub fn backfill_windows(from: NaiveDate, till: NaiveDate) -> Vec<(NaiveDate, NaiveDate)> {
    let mut windows = Vec::new();
    let mut start = from;
    while start <= till {
        let end = start
            .checked_add_days(Days::new(BACKFILL_CHUNK_DAYS))
            .map_or(till, |d| d.min(till));
        windows.push((start, end));
        match end.succ_opt() {
            Some(next) if end < till => start = next,
            _ => break,
        }
    }
    windows
}

/// Price log updater.
#[derive(Clone, Debug)]
pub struct PriceUpdater {
    client: MoexClient,
}

impl PriceUpdater {
    /// Creates the updater.
    #[must_use]
    pub const fn new(client: MoexClient) -> Self {
        Self { client }
    }

    /// Downloads the whole main board listing, page by page.
    ///
    /// # Errors
    ///
    /// Returns an error if the first page fails or nothing is listed.
    pub async fn fetch_board(&self) -> Result<HashMap<Ticker, BoardQuote>> {
        let mut quotes: HashMap<Ticker, BoardQuote> = HashMap::new();
        for page in 0..MAX_BOARD_PAGES {
            let payload = match self.client.payload(&board_url(page * PAGE_SIZE)).await {
                Ok(payload) => payload,
                Err(e) if page == 0 => return Err(e),
                Err(e) => {
                    warn!(page, error = %e, "board page failed, keeping earlier pages");
                    break;
                }
            };
            let securities: Vec<SecurityRow> = iss::block_rows(&payload, "securities")?;
            let sessions: Vec<MarketDataRow> = iss::block_rows(&payload, "marketdata")?;
            let listed = securities.len();

            for row in &securities {
                if let Some(ticker) = iss::row_ticker(&row.secid) {
                    quotes.entry(ticker).or_default().issue_size = row.issuesize;
                }
            }
            for row in &sessions {
                if let Some(ticker) = iss::row_ticker(&row.secid) {
                    quotes.entry(ticker).or_default().apply_session(row);
                }
            }
            if listed == 0 {
                break;
            }
        }
        if quotes.is_empty() {
            return Err(KbError::NotFound("no securities on the main board".into()));
        }
        info!(securities = quotes.len(), "loaded board listing");
        Ok(quotes)
    }

    /// Backfills the price log of a ticker with `days` of daily candles.
    ///
    /// Dates already in the log are kept. Returns the number of rows in
    /// the log afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if a candles request fails, if no candle was
    /// returned, or if the log cannot be read or written.
    pub async fn backfill(
        &self,
        kb: &KnowledgeBase,
        ticker: &Ticker,
        days: u64,
        today: NaiveDate,
    ) -> Result<usize> {
        let from = today.checked_sub_days(Days::new(days)).unwrap_or(today);
        let mut rows = Vec::new();
        for (start, end) in backfill_windows(from, today) {
            let candles = self.client.candles(ticker, start, end).await?;
            rows.extend(candles.iter().filter_map(|c| {
                Some(PriceRow {
                    date: c.date()?,
                    close: c.close.filter(|v| *v != 0.0)?,
                    open: c.open,
                    high: c.high,
                    low: c.low,
                    volume_rub: c.value.map(f64::trunc),
                    market_cap_bln: None,
                })
            }));
        }
        if rows.is_empty() {
            return Err(KbError::NotFound(format!("no candles for {ticker}")));
        }

        let path = kb.data_file(ticker, PRICE_HISTORY_FILE);
        let mut history = PriceHistory::load(&path)?;
        let added = history.merge(rows);
        history.save(&path)?;
        debug!(%ticker, added, total = history.len(), "backfilled price history");
        Ok(history.len())
    }
}

/// Records today's quote of a ticker in its log and header.
///
/// The log keeps an existing row for `today` unless `force` is set. The
/// header `current_price` is rewritten only if the key exists.
///
/// # Errors
///
/// Returns an error if the log or the header cannot be read or written.
pub fn apply_quote(
    kb: &KnowledgeBase,
    ticker: &Ticker,
    quote: Option<&BoardQuote>,
    today: NaiveDate,
    force: bool,
) -> Result<PriceOutcome> {
    let Some(row) = quote.and_then(|q| q.to_row(today)) else {
        return Ok(PriceOutcome::NoQuote);
    };
    let price = row.close;

    let path = kb.data_file(ticker, PRICE_HISTORY_FILE);
    let mut history = PriceHistory::load(&path)?;
    let written = history.record(row, force);
    if written {
        history.save(&path)?;
    }

    let index = kb.index_path(ticker);
    let mut previous = None;
    let mut header_changed = false;
    if let Some(content) = read_optional(&index)? {
        let front = FrontMatter::parse(&content).unwrap_or_default();
        previous = front.number("current_price");
        if front.contains("current_price") {
            if let Some(updated) = set_scalar(&content, "current_price", &format_price(price)) {
                if updated != content {
                    write_file(&index, updated)?;
                    header_changed = true;
                }
            }
        }
    }

    if written || header_changed {
        Ok(PriceOutcome::Updated { price, previous })
    } else {
        Ok(PriceOutcome::Unchanged)
    }
}
