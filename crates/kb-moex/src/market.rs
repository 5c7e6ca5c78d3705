//! Market snapshot (`data/moex_market.json`).

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use kb_core::types::{
    CapitalizationBlock, LiquidityBlock, ListingBlock, PriceBlock, RangeBlock, VolumeBlock,
};
use kb_core::{
    Artifact, DataProvider, FetchRequest, KbError, MarketSnapshot, Result, Ticker, TickerFetcher,
};
use tracing::{debug, warn};

use crate::iss::{self, Candle, MarketDataRow, SecurityRow};
use crate::{MAIN_BOARD, MoexClient, PROVIDER_NAME, round_to};

pub use kb_store::knowledge_base::MARKET_FILE;

/// Trading days in the average daily value.
pub const ADV_DAYS: usize = 30;
/// Calendar days of candles requested for the average daily value.
const ADV_LOOKBACK_DAYS: u64 = 60;
/// Calendar days of candles requested for the 52-week range.
const RANGE_LOOKBACK_DAYS: u64 = 370;

/// Mean traded value over the last `days` candles with a positive value.
#[must_use]
pub fn average_daily_value(candles: &[Candle], days: usize) -> f64 {
    let traded: Vec<f64> = candles
        .iter()
        .filter_map(|c| c.value)
        .filter(|v| *v > 0.0)
        .collect();
    let recent = &traded[traded.len().saturating_sub(days)..];
    if recent.is_empty() {
        return 0.0;
    }
    recent.iter().sum::<f64>() / recent.len() as f64
}

/// Bid-ask spread relative to the mid price, in percent, 4 decimals.
///
/// Zero when either side is missing.
#[must_use]
pub fn spread_pct(bid: Option<f64>, offer: Option<f64>) -> f64 {
    match (bid, offer) {
        (Some(bid), Some(offer)) if bid > 0.0 && offer > 0.0 => {
            let mid = (bid + offer) / 2.0;
            round_to((offer - bid) / mid * 100.0, 4)
        }
        _ => 0.0,
    }
}

/// Highest high and lowest low over the candles; zeros when empty.
#[must_use]
pub fn range_52w(candles: &[Candle]) -> RangeBlock {
    let highs = candles.iter().filter_map(|c| c.high);
    let lows = candles.iter().filter_map(|c| c.low);
    RangeBlock {
        high: highs.reduce(f64::max).unwrap_or_default(),
        low: lows.reduce(f64::min).unwrap_or_default(),
    }
}

/// Assembles a snapshot from the parsed blocks.
#[must_use]
pub fn build_snapshot(
    ticker: &Ticker,
    today: NaiveDate,
    security: &SecurityRow,
    market: &MarketDataRow,
    adv: f64,
    range: RangeBlock,
) -> MarketSnapshot {
    let cap = market.issuecapitalization.unwrap_or_default();
    MarketSnapshot {
        ticker: ticker.clone(),
        date: today,
        shortname: security.shortname.clone(),
        secname: security.secname.clone(),
        price: PriceBlock {
            last: market.price().unwrap_or_default(),
            bid: market.bid.unwrap_or_default(),
            offer: market.offer.unwrap_or_default(),
            open: market.open.unwrap_or_default(),
            high: market.high.unwrap_or_default(),
            low: market.low.unwrap_or_default(),
            waprice: market.waprice.unwrap_or_default(),
            prev_close: security.prevprice.unwrap_or_default(),
        },
        volume: VolumeBlock {
            shares_today: market.voltoday.unwrap_or_default(),
            value_today_rub: market.valtoday.unwrap_or_default(),
            num_trades_today: market.numtrades.unwrap_or_default().max(0.0) as u64,
        },
        liquidity: LiquidityBlock {
            adv_30d_rub: adv.round(),
            adv_30d_mln_rub: round_to(adv / 1_000_000.0, 1),
            bid_ask_spread_pct: spread_pct(market.bid, market.offer),
        },
        capitalization: CapitalizationBlock {
            market_cap_rub: cap,
            market_cap_bln_rub: round_to(cap / 1_000_000_000.0, 1),
            shares_outstanding: security.issuesize.unwrap_or_default(),
        },
        range_52w: range,
        listing: ListingBlock {
            board: if security.boardid.is_empty() {
                market.boardid.clone()
            } else {
                security.boardid.clone()
            },
            list_level: security.listlevel.unwrap_or_default().max(0.0) as u32,
            lot_size: security.lotsize.unwrap_or_default().max(0.0) as u64,
        },
    }
}

/// Market snapshot fetcher.
#[derive(Clone, Debug)]
pub struct MoexMarketProvider {
    client: MoexClient,
}

impl MoexMarketProvider {
    /// Creates the provider.
    #[must_use]
    pub const fn new(client: MoexClient) -> Self {
        Self { client }
    }

    /// Candles for a derived metric; a failure only degrades that metric.
    async fn candles_or_empty(
        &self,
        ticker: &Ticker,
        from: NaiveDate,
        till: NaiveDate,
    ) -> Vec<Candle> {
        match self.client.candles(ticker, from, till).await {
            Ok(candles) => candles,
            Err(e) => {
                warn!(%ticker, error = %e, "candles unavailable");
                Vec::new()
            }
        }
    }

    /// Fetches the snapshot of one ticker.
    ///
    /// # Errors
    ///
    /// Returns an error if the securities request fails or the ticker is
    /// not traded on the main board.
    pub async fn snapshot(&self, ticker: &Ticker, today: NaiveDate) -> Result<MarketSnapshot> {
        let payload = self.client.payload(&crate::securities_url(ticker)).await?;
        let securities: Vec<SecurityRow> = iss::block_rows(&payload, "securities")?;
        let market: Vec<MarketDataRow> = iss::block_rows(&payload, "marketdata")?;

        let security = iss::on_board(&securities, MAIN_BOARD, |r| r.boardid.as_str());
        let session = iss::on_board(&market, MAIN_BOARD, |r| r.boardid.as_str());
        if security.is_none() && session.is_none() {
            return Err(KbError::Schema {
                provider: PROVIDER_NAME.to_string(),
                reason: format!("{ticker} is not listed on {MAIN_BOARD}"),
            });
        }
        let security = security.cloned().unwrap_or_default();
        let session = session.cloned().unwrap_or_default();

        let adv_from = today.checked_sub_days(Days::new(ADV_LOOKBACK_DAYS)).unwrap_or(today);
        let recent = self.candles_or_empty(ticker, adv_from, today).await;
        let adv = average_daily_value(&recent, ADV_DAYS);

        let range_from = today.checked_sub_days(Days::new(RANGE_LOOKBACK_DAYS)).unwrap_or(today);
        let year = self.candles_or_empty(ticker, range_from, today).await;
        let range = range_52w(&year);

        debug!(%ticker, adv, candles = year.len(), "built market snapshot");
        Ok(build_snapshot(ticker, today, &security, &session, adv, range))
    }
}

impl DataProvider for MoexMarketProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn description(&self) -> &str {
        "Quotes, liquidity, capitalization and 52-week range from MOEX ISS"
    }
}

#[async_trait]
impl TickerFetcher for MoexMarketProvider {
    fn artifact_names(&self) -> &[&'static str] {
        &[MARKET_FILE]
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Artifact>> {
        let snapshot = self.snapshot(&request.ticker, request.today).await?;
        Ok(vec![Artifact::json(MARKET_FILE, &snapshot)?])
    }
}
