//! Pipeline stages that are not plain per-ticker fetches.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use chrono::NaiveDate;
use tracing::{info, instrument, warn};

use kb_core::{KbError, Result, Ticker};
use kb_docs::{
    DocOutcome, KeywordHeuristic, OpinionsGenerator, OpinionsReport, generate_catalysts,
    generate_events, generate_governance, load_cb_meetings,
};
use kb_match::{AliasRegistry, group_by_ticker};
use kb_moex::{BoardQuote, PriceOutcome, PriceUpdater, apply_quote};
use kb_smartlab::{ReportCheck, ReportStatus, SmartLabProvider, write_new_tickers};
use kb_store::{KnowledgeBase, PostCollection};
use kb_telegram::{ChannelScraper, YearRange, merge_into_file};

/// A generated company document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocKind {
    /// `events.md`.
    Events,
    /// `governance.md`.
    Governance,
    /// `data/catalysts.json`.
    Catalysts,
}

impl fmt::Display for DocKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Events => "events",
            Self::Governance => "governance",
            Self::Catalysts => "catalysts",
        })
    }
}

/// Counts of a generation run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GenerateSummary {
    /// Documents created.
    pub created: usize,
    /// Documents changed.
    pub updated: usize,
    /// Documents already up to date.
    pub unchanged: usize,
    /// Tickers without input data.
    pub skipped: usize,
    /// Tickers that failed.
    pub failed: usize,
}

impl GenerateSummary {
    fn record(&mut self, outcome: DocOutcome) {
        match outcome {
            DocOutcome::Created => self.created += 1,
            DocOutcome::Updated => self.updated += 1,
            DocOutcome::Unchanged => self.unchanged += 1,
        }
    }
}

impl fmt::Display for GenerateSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "created {}, updated {}, unchanged {}, skipped {}, failed {}",
            self.created, self.updated, self.unchanged, self.skipped, self.failed
        )
    }
}

fn generate_one(
    kb: &KnowledgeBase,
    kind: DocKind,
    ticker: &Ticker,
    cb_meetings: &[NaiveDate],
    today: NaiveDate,
) -> Result<Option<DocOutcome>> {
    match kind {
        DocKind::Events => generate_events(kb, ticker, cb_meetings, today),
        DocKind::Governance => generate_governance(kb, ticker, today),
        DocKind::Catalysts => {
            let classifier = KeywordHeuristic::default();
            let generated = generate_catalysts(kb, ticker, cb_meetings, &classifier, today)?;
            Ok(generated.map(|(outcome, _)| outcome))
        }
    }
}

/// Regenerates one document kind for every ticker.
///
/// The central bank calendar is read once. Excluded tickers are skipped.
///
/// # Errors
///
/// Returns an error if the calendar cannot be read or a ticker fails with a
/// configuration error.
#[instrument(skip(kb, tickers), fields(tickers = tickers.len()))]
pub fn generate_documents(
    kb: &KnowledgeBase,
    kind: DocKind,
    tickers: &[Ticker],
    today: NaiveDate,
) -> Result<GenerateSummary> {
    let cb_meetings = match kind {
        DocKind::Governance => Vec::new(),
        DocKind::Events | DocKind::Catalysts => load_cb_meetings(kb, today)?,
    };
    let mut summary = GenerateSummary::default();
    for ticker in tickers {
        if kb.is_excluded(ticker) {
            summary.skipped += 1;
            continue;
        }
        match generate_one(kb, kind, ticker, &cb_meetings, today) {
            Ok(Some(outcome)) => {
                info!(%ticker, %outcome, "generated");
                summary.record(outcome);
            }
            Ok(None) => summary.skipped += 1,
            Err(e) if e.is_ticker_scoped() => {
                warn!(%ticker, error = %e, "generation failed, skipping ticker");
                summary.failed += 1;
            }
            Err(e) => return Err(e),
        }
    }
    info!(%summary, "generation finished");
    Ok(summary)
}

/// Matches a post collection to companies and writes opinions, the market
/// digest and stubs for companies without a card.
///
/// # Errors
///
/// Returns [`KbError::Config`] if `posts_path` does not exist, or an error
/// if the posts or the alias registry cannot be loaded.
pub fn generate_opinions(
    kb: &KnowledgeBase,
    posts_path: &Path,
    channel: &str,
    today: NaiveDate,
) -> Result<OpinionsReport> {
    if !posts_path.is_file() {
        return Err(KbError::Config(format!("posts file not found: {}", posts_path.display())));
    }
    let posts = PostCollection::load(posts_path)?.into_posts();
    let registry = AliasRegistry::load(kb)?;
    let groups = group_by_ticker(posts, &registry);
    info!(
        posts = groups.total,
        tickers = groups.by_ticker.len(),
        market = groups.market.len(),
        "matched posts"
    );
    OpinionsGenerator::new(&registry, channel)?.generate(kb, &groups, today)
}

/// Counts of a price update.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PriceSummary {
    /// Tickers whose log or header changed, with the new price.
    pub updated: Vec<(Ticker, PriceOutcome)>,
    /// Tickers already up to date.
    pub unchanged: usize,
    /// Tickers without a quote on the board.
    pub no_quote: Vec<Ticker>,
    /// Tickers that failed.
    pub failed: usize,
}

impl fmt::Display for PriceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "updated {}, unchanged {}, no quote {}, failed {}",
            self.updated.len(),
            self.unchanged,
            self.no_quote.len(),
            self.failed
        )
    }
}

/// Records quotes from a board listing for every ticker.
///
/// # Errors
///
/// Returns a configuration error unchanged; per-ticker failures are counted.
pub fn apply_board(
    kb: &KnowledgeBase,
    board: &HashMap<Ticker, BoardQuote>,
    tickers: &[Ticker],
    today: NaiveDate,
    force: bool,
) -> Result<PriceSummary> {
    let mut summary = PriceSummary::default();
    for ticker in tickers {
        match apply_quote(kb, ticker, board.get(ticker), today, force) {
            Ok(PriceOutcome::NoQuote) => {
                warn!(%ticker, "no quote on the board");
                summary.no_quote.push(ticker.clone());
            }
            Ok(PriceOutcome::Unchanged) => summary.unchanged += 1,
            Ok(outcome) => summary.updated.push((ticker.clone(), outcome)),
            Err(e) if e.is_ticker_scoped() => {
                warn!(%ticker, error = %e, "price update failed");
                summary.failed += 1;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(summary)
}

/// Downloads the board once and records today's quote of every ticker.
///
/// # Errors
///
/// Returns an error if the board cannot be downloaded.
pub async fn update_prices(
    kb: &KnowledgeBase,
    updater: &PriceUpdater,
    tickers: &[Ticker],
    today: NaiveDate,
    force: bool,
) -> Result<PriceSummary> {
    let board = updater.fetch_board().await?;
    apply_board(kb, &board, tickers, today, force)
}

/// Backfills the price log of every ticker. Returns the tickers that
/// failed.
pub async fn backfill_prices(
    kb: &KnowledgeBase,
    updater: &PriceUpdater,
    tickers: &[Ticker],
    days: u64,
    today: NaiveDate,
) -> Vec<Ticker> {
    let mut failed = Vec::new();
    for ticker in tickers {
        match updater.backfill(kb, ticker, days, today).await {
            Ok(rows) => info!(%ticker, rows, "backfilled"),
            Err(e) => {
                warn!(%ticker, error = %e, "backfill failed");
                failed.push(ticker.clone());
            }
        }
    }
    failed
}

/// Checks every ticker for newly published reports and records the ones
/// that have them.
///
/// # Errors
///
/// Returns an error if the list of new tickers cannot be written.
pub async fn check_reports(
    kb: &KnowledgeBase,
    provider: &SmartLabProvider,
    tickers: &[Ticker],
) -> Result<Vec<ReportCheck>> {
    let mut checks = Vec::with_capacity(tickers.len());
    for ticker in tickers {
        checks.push(provider.check_reports(kb, ticker).await);
    }
    let new: Vec<Ticker> = checks
        .iter()
        .filter(|c| c.status() == ReportStatus::New)
        .map(|c| c.ticker.clone())
        .collect();
    write_new_tickers(kb, &new)?;
    info!(checked = checks.len(), new = new.len(), "checked reports");
    Ok(checks)
}

/// Scrapes a channel and merges the posts into `output`. Returns the number
/// of new posts.
///
/// # Errors
///
/// Returns an error if the first page cannot be fetched or the file cannot
/// be updated.
pub async fn scrape_channel(
    scraper: &ChannelScraper,
    channel: &str,
    years: YearRange,
    output: &Path,
) -> Result<usize> {
    let posts = scraper.scrape(channel, years).await?;
    merge_into_file(output, posts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_core::testing::ScratchDir;
    use kb_core::{Dividend, EventsFile, Post};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    fn fixture() -> (ScratchDir, KnowledgeBase) {
        let dir = ScratchDir::new("kb-stages").unwrap();
        dir.write(
            "companies/SBER/_index.md",
            "---\nticker: SBER\nname: Сбербанк\n---\n# Сбербанк\n",
        )
        .unwrap();
        dir.write("companies/GAZP/_index.md", "---\nticker: GAZP\nname: Газпром\n---\n").unwrap();
        dir.write("companies/QIWI/_index.md", "---\nticker: QIWI\nstatus: delisted\n---\n")
            .unwrap();
        let kb = KnowledgeBase::new(dir.path());
        (dir, kb)
    }

    #[test]
    fn test_generate_events_stage() {
        let (dir, kb) = fixture();
        let events = EventsFile {
            ticker: Ticker::new("SBER"),
            company_name: "Сбербанк".into(),
            date: today(),
            dividends: vec![Dividend {
                record_date: "2025-07-18".into(),
                amount: 34.84,
                currency: "RUB".into(),
            }],
            ir_events: Vec::new(),
        };
        let json = serde_json::to_string(&events).unwrap();
        dir.write("companies/SBER/data/moex_events.json", &json).unwrap();
        let tickers: Vec<Ticker> = ["SBER", "GAZP", "QIWI"].into_iter().map(Ticker::new).collect();

        let first = generate_documents(&kb, DocKind::Events, &tickers, today()).unwrap();
        assert_eq!(first, GenerateSummary { created: 1, skipped: 2, ..Default::default() });
        assert!(dir.path().join("companies/SBER/events.md").is_file());

        let second = generate_documents(&kb, DocKind::Events, &tickers, today()).unwrap();
        assert_eq!(second.unchanged, 1);
        assert_eq!(second.created, 0);
    }

    #[test]
    fn test_generate_catalysts_stage() {
        let (dir, kb) = fixture();
        dir.write(
            "companies/GAZP/_index.md",
            "---\nticker: GAZP\nname: Газпром\nkey_risks: [Падение экспорта]\n---\n",
        )
        .unwrap();
        let tickers: Vec<Ticker> = ["SBER", "GAZP"].into_iter().map(Ticker::new).collect();

        let first = generate_documents(&kb, DocKind::Catalysts, &tickers, today()).unwrap();
        assert_eq!(first, GenerateSummary { created: 1, skipped: 1, ..Default::default() });

        let second = generate_documents(&kb, DocKind::Catalysts, &tickers, today()).unwrap();
        assert_eq!(second, GenerateSummary { unchanged: 1, skipped: 1, ..Default::default() });
    }

    #[test]
    fn test_generate_opinions_requires_file() {
        let (dir, kb) = fixture();
        let missing = dir.path().join("missing.json");
        let err = generate_opinions(&kb, &missing, "investopit", today()).unwrap_err();
        assert!(matches!(err, KbError::Config(_)));
    }

    #[test]
    fn test_generate_opinions_stage() {
        let (dir, kb) = fixture();
        let posts = vec![
            Post::new(1, "Сбер отчитался, целевая цена 400 руб")
                .with_datetime("2026-02-01T10:00:00+00:00"),
            Post::new(2, "ЦБ сохранил ключевую ставку").with_datetime("2026-02-02T10:00:00+00:00"),
        ];
        let path = dir.path().join("posts.json");
        std::fs::write(&path, serde_json::to_string(&posts).unwrap()).unwrap();

        let report = generate_opinions(&kb, &path, "investopit", today()).unwrap();
        assert_eq!(report.written, 1);
        assert_eq!(report.market_posts, 1);
        assert!(dir.path().join("companies/SBER/opinions.md").is_file());
    }

    #[test]
    fn test_apply_board_counts() {
        let (dir, kb) = fixture();
        dir.write("companies/SBER/_index.md", "---\nticker: SBER\ncurrent_price: 290\n---\n")
            .unwrap();
        let mut board = HashMap::new();
        board.insert(Ticker::new("SBER"), BoardQuote { last: Some(300.5), ..Default::default() });
        let tickers = vec![Ticker::new("SBER"), Ticker::new("GAZP")];

        let summary = apply_board(&kb, &board, &tickers, today(), false).unwrap();
        assert_eq!(summary.updated.len(), 1);
        assert_eq!(summary.no_quote, vec![Ticker::new("GAZP")]);
        let index = std::fs::read_to_string(kb.index_path(&Ticker::new("SBER"))).unwrap();
        assert!(index.contains("current_price: 300.5"));

        let again = apply_board(&kb, &board, &tickers, today(), false).unwrap();
        assert_eq!(again.unchanged, 1);
        assert!(again.updated.is_empty());
    }
}
