//! Fetcher registry and the per-ticker batch runner.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::{debug, info, instrument, warn};

use kb_core::{FetchRequest, KbError, Result, Ticker, TickerFetcher};
use kb_moex::{MoexClient, MoexEventsProvider, MoexMarketProvider};
use kb_sanctions::SanctionsProvider;
use kb_smartlab::SmartLabProvider;
use kb_store::KnowledgeBase;

/// A per-ticker fetch stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Source {
    /// Financial statement exports.
    SmartLab,
    /// Market snapshot.
    Market,
    /// Dividends and IR calendar.
    Events,
    /// Sanctions screening.
    Sanctions,
}

impl Source {
    /// Stage name used on the command line and in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SmartLab => "smartlab",
            Self::Market => "market",
            Self::Events => "events",
            Self::Sanctions => "sanctions",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options of one batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchOptions {
    /// Date of the run.
    pub today: NaiveDate,
    /// Fetch even if the artifacts were already written today.
    pub force: bool,
}

impl BatchOptions {
    /// Options for a run on `today` without forcing.
    #[must_use]
    pub const fn new(today: NaiveDate) -> Self {
        Self { today, force: false }
    }

    /// Sets the force flag.
    #[must_use]
    pub const fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// What happened to one ticker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TickerOutcome {
    /// Every artifact was written.
    Ok,
    /// Some artifacts were written.
    Partial {
        /// Artifacts that were not produced.
        missing: Vec<&'static str>,
    },
    /// Nothing was fetched.
    Skipped {
        /// Why.
        reason: &'static str,
    },
    /// The fetch failed.
    Failed {
        /// Error message.
        error: String,
    },
}

/// Outcome counts of a batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Per-ticker outcomes, in processing order.
    pub outcomes: Vec<(Ticker, TickerOutcome)>,
}

impl BatchSummary {
    fn count(&self, pred: impl Fn(&TickerOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }

    /// Tickers with every artifact written.
    #[must_use]
    pub fn ok(&self) -> usize {
        self.count(|o| matches!(o, TickerOutcome::Ok))
    }

    /// Tickers with some artifacts written.
    #[must_use]
    pub fn partial(&self) -> usize {
        self.count(|o| matches!(o, TickerOutcome::Partial { .. }))
    }

    /// Tickers skipped.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, TickerOutcome::Skipped { .. }))
    }

    /// Tickers that failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, TickerOutcome::Failed { .. }))
    }

    /// Outcome of a ticker, if it was part of the batch.
    #[must_use]
    pub fn outcome(&self, ticker: &Ticker) -> Option<&TickerOutcome> {
        self.outcomes.iter().find(|(t, _)| t == ticker).map(|(_, o)| o)
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ok {}, partial {}, skipped {}, failed {}",
            self.ok(),
            self.partial(),
            self.skipped(),
            self.failed()
        )?;
        for (ticker, outcome) in &self.outcomes {
            if let TickerOutcome::Failed { error } = outcome {
                write!(f, "\n  {ticker}: {error}")?;
            }
        }
        Ok(())
    }
}

/// Builds the request of a ticker with name hints from the knowledge base.
#[must_use]
pub fn fetch_request(kb: &KnowledgeBase, ticker: &Ticker, today: NaiveDate) -> FetchRequest {
    FetchRequest::new(ticker.clone(), today)
        .with_company_name(kb.company_name(ticker))
        .with_short_name(kb.short_name(ticker))
}

/// Runs one fetcher over `tickers`, one ticker at a time.
///
/// Excluded tickers are skipped, as are tickers whose artifacts were all
/// written today unless `force` is set. Errors scoped to a ticker are
/// logged and the batch moves on.
///
/// # Errors
///
/// Returns the first configuration error. Fetch and write failures of a
/// single ticker are recorded in the summary instead.
#[instrument(
    skip_all,
    fields(provider = fetcher.name(), tickers = tickers.len(), force = options.force)
)]
pub async fn run_batch(
    kb: &KnowledgeBase,
    fetcher: &dyn TickerFetcher,
    tickers: &[Ticker],
    options: BatchOptions,
) -> Result<BatchSummary> {
    let mut summary = BatchSummary::default();
    let expected = fetcher.artifact_names();

    for ticker in tickers {
        if kb.is_excluded(ticker) {
            debug!(%ticker, "excluded");
            summary.outcomes.push((ticker.clone(), TickerOutcome::Skipped { reason: "excluded" }));
            continue;
        }
        if !options.force && kb.is_fresh(ticker, expected, options.today) {
            debug!(%ticker, "already fetched today");
            summary.outcomes.push((ticker.clone(), TickerOutcome::Skipped { reason: "fresh" }));
            continue;
        }

        let request = fetch_request(kb, ticker, options.today);
        let fetched = match fetcher.fetch(&request).await {
            Ok(artifacts) => kb.write_artifacts(ticker, &artifacts).map(|()| artifacts),
            Err(e) => Err(e),
        };
        let outcome = match fetched {
            Ok(artifacts) => {
                let missing: Vec<&'static str> = expected
                    .iter()
                    .copied()
                    .filter(|name| !artifacts.iter().any(|a| a.file_name == *name))
                    .collect();
                if missing.is_empty() {
                    info!(%ticker, files = artifacts.len(), "fetched");
                    TickerOutcome::Ok
                } else {
                    warn!(%ticker, ?missing, "fetched partially");
                    TickerOutcome::Partial { missing }
                }
            }
            Err(e) if e.is_ticker_scoped() => {
                warn!(%ticker, error = %e, "ticker failed, skipping");
                TickerOutcome::Failed { error: e.to_string() }
            }
            Err(e) => return Err(e),
        };
        summary.outcomes.push((ticker.clone(), outcome));
    }

    info!(
        ok = summary.ok(),
        partial = summary.partial(),
        skipped = summary.skipped(),
        failed = summary.failed(),
        "batch finished"
    );
    Ok(summary)
}

/// Registry of per-ticker fetchers, one per [`Source`].
#[derive(Default)]
pub struct FetcherRegistry {
    fetchers: BTreeMap<Source, Arc<dyn TickerFetcher>>,
}

impl fmt::Debug for FetcherRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(
                self.fetchers.iter().map(|(source, fetcher)| (source.as_str(), fetcher.name())),
            )
            .finish()
    }
}

impl FetcherRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fetcher, replacing any previous one for `source`.
    pub fn register(&mut self, source: Source, fetcher: Arc<dyn TickerFetcher>) {
        debug!(%source, provider = fetcher.name(), "registering fetcher");
        self.fetchers.insert(source, fetcher);
    }

    /// The fetcher of a source.
    #[must_use]
    pub fn get(&self, source: Source) -> Option<&Arc<dyn TickerFetcher>> {
        self.fetchers.get(&source)
    }

    /// Registered sources.
    pub fn sources(&self) -> impl Iterator<Item = Source> + '_ {
        self.fetchers.keys().copied()
    }

    /// Runs the fetcher of `source` over `tickers`.
    ///
    /// # Errors
    ///
    /// Returns [`KbError::Config`] if no fetcher is registered for
    /// `source`, otherwise see [`run_batch`].
    pub async fn run(
        &self,
        source: Source,
        kb: &KnowledgeBase,
        tickers: &[Ticker],
        options: BatchOptions,
    ) -> Result<BatchSummary> {
        let fetcher = self
            .get(source)
            .ok_or_else(|| KbError::Config(format!("no fetcher registered for {source}")))?;
        run_batch(kb, fetcher.as_ref(), tickers, options).await
    }

    /// Adds the smart-lab provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_smartlab(mut self, delay: Duration) -> Result<Self> {
        self.register(Source::SmartLab, Arc::new(SmartLabProvider::new(delay)?));
        Ok(self)
    }

    /// Adds the market and events providers over one shared MOEX client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_moex(mut self, delay: Duration) -> Result<Self> {
        let client = MoexClient::new(delay)?;
        self.register(Source::Market, Arc::new(MoexMarketProvider::new(client.clone())));
        self.register(Source::Events, Arc::new(MoexEventsProvider::new(client)));
        Ok(self)
    }

    /// Adds the sanctions provider.
    ///
    /// # Errors
    ///
    /// Returns [`KbError::Config`] for an empty key, or an error if the
    /// HTTP client cannot be built.
    pub fn with_sanctions(mut self, api_key: &str, delay: Duration) -> Result<Self> {
        self.register(Source::Sanctions, Arc::new(SanctionsProvider::new(api_key, delay)?));
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use kb_core::testing::ScratchDir;
    use kb_core::{Artifact, DataProvider};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct CountingFetcher {
        calls: AtomicUsize,
        seen: Mutex<Vec<FetchRequest>>,
        version: AtomicUsize,
    }

    impl DataProvider for CountingFetcher {
        fn name(&self) -> &str {
            "counting"
        }

        fn description(&self) -> &str {
            "test fetcher"
        }
    }

    #[async_trait]
    impl TickerFetcher for CountingFetcher {
        fn artifact_names(&self) -> &[&'static str] {
            &["a.json", "b.json"]
        }

        async fn fetch(&self, request: &FetchRequest) -> Result<Vec<Artifact>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(request.clone());
            let version = self.version.load(Ordering::SeqCst);
            match request.ticker.as_str() {
                "FAIL" => Err(KbError::Network("connection reset".into())),
                "HALF" => Ok(vec![Artifact::new("a.json", format!("v{version}"))]),
                "CONF" => Err(KbError::Config("bad key".into())),
                _ => Ok(vec![
                    Artifact::new("a.json", format!("v{version}")),
                    Artifact::new("b.json", format!("v{version}")),
                ]),
            }
        }
    }

    fn fixture() -> (ScratchDir, KnowledgeBase) {
        let dir = ScratchDir::new("kb-registry").unwrap();
        dir.write("companies/SBER/_index.md", "---\nticker: SBER\nname: Сбербанк\n---\n").unwrap();
        dir.write("companies/HALF/_index.md", "---\nticker: HALF\n---\n").unwrap();
        dir.write("companies/FAIL/_index.md", "---\nticker: FAIL\n---\n").unwrap();
        dir.write("companies/QIWI/_index.md", "---\nticker: QIWI\nstatus: delisted\n---\n")
            .unwrap();
        let kb = KnowledgeBase::new(dir.path());
        (dir, kb)
    }

    fn tickers(names: &[&str]) -> Vec<Ticker> {
        names.iter().map(|n| Ticker::new(*n)).collect()
    }

    fn today() -> NaiveDate {
        chrono::Local::now().date_naive()
    }

    #[tokio::test]
    async fn test_batch_outcomes() {
        let (_dir, kb) = fixture();
        let fetcher = CountingFetcher::default();
        let batch = tickers(&["SBER", "HALF", "FAIL", "QIWI"]);
        let summary = run_batch(&kb, &fetcher, &batch, BatchOptions::new(today())).await.unwrap();

        assert_eq!(
            (summary.ok(), summary.partial(), summary.skipped(), summary.failed()),
            (1, 1, 1, 1)
        );
        assert_eq!(
            summary.outcome(&Ticker::new("HALF")),
            Some(&TickerOutcome::Partial { missing: vec!["b.json"] })
        );
        assert_eq!(
            summary.outcome(&Ticker::new("QIWI")),
            Some(&TickerOutcome::Skipped { reason: "excluded" })
        );
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 3);

        let seen = fetcher.seen.lock().unwrap();
        assert_eq!(seen[0].company_name.as_deref(), Some("Сбербанк"));
        assert!(summary.to_string().starts_with("ok 1, partial 1, skipped 1, failed 1"));
    }

    #[tokio::test]
    async fn test_second_run_same_day_makes_no_calls() {
        let (_dir, kb) = fixture();
        let fetcher = CountingFetcher::default();
        let sber = tickers(&["SBER"]);

        run_batch(&kb, &fetcher, &sber, BatchOptions::new(today())).await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

        let second = run_batch(&kb, &fetcher, &sber, BatchOptions::new(today())).await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.outcome(&sber[0]), Some(&TickerOutcome::Skipped { reason: "fresh" }));
    }

    #[tokio::test]
    async fn test_force_overwrites() {
        let (_dir, kb) = fixture();
        let fetcher = CountingFetcher::default();
        let sber = tickers(&["SBER"]);

        run_batch(&kb, &fetcher, &sber, BatchOptions::new(today())).await.unwrap();
        fetcher.version.store(2, Ordering::SeqCst);
        run_batch(&kb, &fetcher, &sber, BatchOptions::new(today()).force(true)).await.unwrap();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        let written = std::fs::read_to_string(kb.data_file(&sber[0], "b.json")).unwrap();
        assert_eq!(written, "v2");
    }

    #[tokio::test]
    async fn test_config_error_stops_batch() {
        let (dir, kb) = fixture();
        dir.write("companies/CONF/_index.md", "---\nticker: CONF\n---\n").unwrap();
        let fetcher = CountingFetcher::default();
        let err = run_batch(&kb, &fetcher, &tickers(&["CONF", "SBER"]), BatchOptions::new(today()))
            .await
            .unwrap_err();
        assert!(matches!(err, KbError::Config(_)));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_write_failure_skips_only_that_ticker() {
        let (dir, kb) = fixture();
        dir.write("companies/AAAA/_index.md", "---\nticker: AAAA\n---\n").unwrap();
        dir.write("companies/AAAA/data", "not a directory").unwrap();
        let fetcher = CountingFetcher::default();

        let batch = tickers(&["AAAA", "SBER"]);
        let summary = run_batch(&kb, &fetcher, &batch, BatchOptions::new(today())).await.unwrap();

        assert!(matches!(summary.outcome(&batch[0]), Some(TickerOutcome::Failed { .. })));
        assert_eq!(summary.outcome(&batch[1]), Some(&TickerOutcome::Ok));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        let written = std::fs::read_to_string(kb.data_file(&batch[1], "a.json")).unwrap();
        assert_eq!(written, "v0");
    }

    #[tokio::test]
    async fn test_registry_run_requires_registration() {
        let (_dir, kb) = fixture();
        let mut registry = FetcherRegistry::new();
        let err = registry
            .run(Source::Market, &kb, &tickers(&["SBER"]), BatchOptions::new(today()))
            .await
            .unwrap_err();
        assert!(matches!(err, KbError::Config(_)));

        registry.register(Source::Market, Arc::new(CountingFetcher::default()));
        assert_eq!(registry.sources().collect::<Vec<_>>(), vec![Source::Market]);
        let summary = registry
            .run(Source::Market, &kb, &tickers(&["SBER"]), BatchOptions::new(today()))
            .await
            .unwrap();
        assert_eq!(summary.ok(), 1);
        assert!(format!("{registry:?}").contains("counting"));
    }
}
