//! `kb`: runs one pipeline stage over the knowledge base.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::info;

use kb::config::API_KEY_ENV;
use kb::docs::DEFAULT_CHANNEL;
use kb::moex::{MoexClient, PriceUpdater};
use kb::report::{check_staleness, export, top_upside, validate, write_trends};
use kb::smartlab::{ReportStatus, SmartLabProvider};
use kb::stages::{self, DocKind};
use kb::telegram::{ChannelScraper, YearRange, channel_name, default_output, posts_by_year};
use kb::{BatchOptions, FetcherRegistry, KbConfig, KnowledgeBase, PostCollection, Source, Ticker};

const PIPELINE_CRATES: &[&str] = &[
    "kb",
    "kb_core",
    "kb_store",
    "kb_smartlab",
    "kb_moex",
    "kb_sanctions",
    "kb_telegram",
    "kb_match",
    "kb_docs",
    "kb_report",
];

#[derive(Parser)]
#[command(name = "kb")]
#[command(version)]
#[command(about = "Maintain the equity research knowledge base", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Knowledge base root
    #[arg(long, global = true, env = "KB_ROOT")]
    root: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Download raw data
    #[command(subcommand)]
    Fetch(FetchCommand),

    /// Record today's prices and update `current_price`
    Prices(PricesArgs),

    /// Look for newly published financial reports
    CheckReports(TickerList),

    /// Regenerate documents
    #[command(subcommand)]
    Generate(GenerateCommand),

    /// Cross-company reports
    #[command(subcommand)]
    Report(ReportCommand),

    /// Write data/export.json and per-company trend.json
    Export,
}

#[derive(Subcommand)]
enum FetchCommand {
    /// Financial statements from smart-lab.ru
    Smartlab(FetchArgs),
    /// Market snapshot from MOEX
    Market(FetchArgs),
    /// Dividends and IR calendar from MOEX
    Events(FetchArgs),
    /// Sanctions screening from OpenSanctions
    Sanctions(FetchArgs),
    /// Posts of a Telegram channel
    Telegram(TelegramArgs),
}

#[derive(Args)]
struct TickerList {
    /// Tickers; all active companies when empty
    tickers: Vec<String>,
}

#[derive(Args)]
struct FetchArgs {
    #[command(flatten)]
    list: TickerList,

    /// Fetch even if already fetched today
    #[arg(long)]
    force: bool,
}

#[derive(Args)]
struct TelegramArgs {
    /// Channel name, with or without `@`
    channel: String,

    /// Output file; `<channel>_posts.json` under the root by default
    #[arg(long)]
    output: Option<PathBuf>,

    /// First year to keep
    #[arg(long, default_value_t = 2022)]
    from_year: i32,

    /// Last year to keep; the current year by default
    #[arg(long)]
    to_year: Option<i32>,
}

#[derive(Args)]
struct PricesArgs {
    #[command(flatten)]
    list: TickerList,

    /// Overwrite today's row
    #[arg(long)]
    force: bool,

    /// Backfill the price log with this many days of candles (365 if no value)
    #[arg(long, num_args = 0..=1, default_missing_value = "365")]
    backfill: Option<u64>,
}

#[derive(Subcommand)]
enum GenerateCommand {
    /// events.md
    Events(TickerList),
    /// governance.md
    Governance(TickerList),
    /// data/catalysts.json
    Catalysts(TickerList),
    /// opinions.md from a posts file
    Opinions {
        /// Posts JSON written by `fetch telegram`
        posts: PathBuf,

        /// Channel the posts come from, for links
        #[arg(long, default_value = DEFAULT_CHANNEL)]
        channel: String,
    },
}

#[derive(Subcommand)]
enum ReportCommand {
    /// Overdue and soon-due documents
    Staleness,
    /// Companies ranked by upside
    Upside {
        /// Ranking size
        #[arg(long)]
        top: Option<usize>,
    },
    /// Front-matter problems; exits with 1 on errors
    Validate,
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let default_filter = PIPELINE_CRATES
        .iter()
        .map(|c| format!("{c}={level}"))
        .collect::<Vec<_>>()
        .join(",");
    let filter = if verbose {
        tracing_subscriber::EnvFilter::new(default_filter)
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn fetch(
    kb: &KnowledgeBase,
    config: &KbConfig,
    source: Source,
    args: FetchArgs,
) -> anyhow::Result<ExitCode> {
    let tickers = kb.resolve_tickers(&args.list.tickers)?;
    let registry = match source {
        Source::SmartLab => FetcherRegistry::new().with_smartlab(config.delays.smartlab)?,
        Source::Market | Source::Events => {
            FetcherRegistry::new().with_moex(config.delays.moex)?
        }
        Source::Sanctions => {
            let Some(key) = config.sanctions_api_key.as_deref() else {
                println!("{} is not set; skipping sanctions screening.", API_KEY_ENV);
                println!("Get a key at https://www.opensanctions.org/api/ and add it to .env");
                return Ok(ExitCode::SUCCESS);
            };
            FetcherRegistry::new().with_sanctions(key, config.delays.sanctions)?
        }
    };
    let options = BatchOptions::new(config.today).force(args.force);
    let summary = registry.run(source, kb, &tickers, options).await?;
    println!("{source}: {summary}");
    Ok(ExitCode::SUCCESS)
}

async fn fetch_telegram(config: &KbConfig, args: TelegramArgs) -> anyhow::Result<ExitCode> {
    let channel = channel_name(&args.channel)?;
    let years = match args.to_year {
        Some(to) => YearRange::new(args.from_year, to)?,
        None => YearRange::through(args.from_year, config.today)?,
    };
    let output = args
        .output
        .unwrap_or_else(|| config.root.join(default_output(&channel)));
    let scraper = ChannelScraper::new(config.delays.telegram)?;

    let added = stages::scrape_channel(&scraper, &channel, years, &output).await?;
    let collection = PostCollection::load(&output)?;
    println!(
        "{channel}: {added} new posts, {} total in {}",
        collection.len(),
        output.display()
    );
    for (year, count) in posts_by_year(collection.posts()) {
        match year {
            Some(year) => println!("  {year}: {count}"),
            None => println!("  undated: {count}"),
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn prices(
    kb: &KnowledgeBase,
    config: &KbConfig,
    args: PricesArgs,
) -> anyhow::Result<ExitCode> {
    let tickers = kb.resolve_tickers(&args.list.tickers)?;
    let updater = PriceUpdater::new(MoexClient::new(config.delays.moex)?);

    if let Some(days) = args.backfill {
        let failed = stages::backfill_prices(kb, &updater, &tickers, days, config.today).await;
        println!(
            "backfilled {} of {} tickers",
            tickers.len() - failed.len(),
            tickers.len()
        );
        for ticker in &failed {
            println!("  failed: {ticker}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let summary =
        stages::update_prices(kb, &updater, &tickers, config.today, args.force).await?;
    for (ticker, outcome) in &summary.updated {
        match outcome.change_pct() {
            Some(change) => println!("  {ticker}: {change:+.2}%"),
            None => println!("  {ticker}: recorded"),
        }
    }
    println!("prices: {summary}");
    Ok(ExitCode::SUCCESS)
}

async fn check_reports(
    kb: &KnowledgeBase,
    config: &KbConfig,
    list: TickerList,
) -> anyhow::Result<ExitCode> {
    let tickers = kb.resolve_tickers(&list.tickers)?;
    let provider = SmartLabProvider::new(config.delays.smartlab)?;
    let checks = stages::check_reports(kb, &provider, &tickers).await?;

    let mut new: Vec<&Ticker> = Vec::new();
    for check in &checks {
        let status = check.status();
        println!("  {}: {status}", check.ticker);
        if status == ReportStatus::New {
            new.push(&check.ticker);
        }
    }
    println!("checked {}, new reports {}", checks.len(), new.len());
    Ok(ExitCode::SUCCESS)
}

fn generate(
    kb: &KnowledgeBase,
    config: &KbConfig,
    command: GenerateCommand,
) -> anyhow::Result<ExitCode> {
    let (kind, list) = match command {
        GenerateCommand::Events(list) => (DocKind::Events, list),
        GenerateCommand::Governance(list) => (DocKind::Governance, list),
        GenerateCommand::Catalysts(list) => (DocKind::Catalysts, list),
        GenerateCommand::Opinions { posts, channel } => {
            let channel = channel_name(&channel)?;
            let report = stages::generate_opinions(kb, &posts, &channel, config.today)
                .with_context(|| format!("generating opinions from {}", posts.display()))?;
            println!(
                "opinions: written {}, unchanged {}, failed {}, new stubs {}, market posts {}",
                report.written, report.unchanged, report.failed, report.stubs, report.market_posts
            );
            return Ok(ExitCode::SUCCESS);
        }
    };
    let tickers = kb.resolve_tickers(&list.tickers)?;
    let summary = stages::generate_documents(kb, kind, &tickers, config.today)?;
    println!("{kind}: {summary}");
    Ok(ExitCode::SUCCESS)
}

fn report(
    kb: &KnowledgeBase,
    config: &KbConfig,
    command: ReportCommand,
) -> anyhow::Result<ExitCode> {
    match command {
        ReportCommand::Staleness => {
            println!("{}", check_staleness(kb, &config.thresholds, config.today)?);
        }
        ReportCommand::Upside { top } => {
            let entries = top_upside(kb, top.unwrap_or(config.top_n))?;
            println!(
                "{:<8} {:<10} {:<8} {:>8} {:>10} {:>10}",
                "Ticker", "Sentiment", "Position", "Upside", "Price", "Target"
            );
            for entry in entries {
                println!("{entry}");
            }
        }
        ReportCommand::Validate => {
            let report = validate(kb)?;
            println!("{report}");
            if report.has_errors() {
                return Ok(ExitCode::from(1));
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn export_all(kb: &KnowledgeBase, config: &KbConfig) -> anyhow::Result<ExitCode> {
    let file = export(kb, config.today)?;
    let trends = write_trends(kb, config.today)?;
    println!("exported {} companies", file.total_companies);
    println!(
        "trend.json: written {}, skipped {}, removed {}",
        trends.written, trends.skipped, trends.removed
    );
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let today = chrono::Local::now().date_naive();
    let mut config = KbConfig::from_env(today);
    if let Some(root) = cli.root {
        config.root = root;
    }
    info!(root = %config.root.display(), %today, "starting");

    let command = match cli.command {
        Command::Fetch(FetchCommand::Telegram(args)) => return fetch_telegram(&config, args).await,
        command => command,
    };
    let kb = KnowledgeBase::open(&config.root)
        .with_context(|| format!("opening knowledge base at {}", config.root.display()))?;

    match command {
        Command::Fetch(FetchCommand::Smartlab(args)) => {
            fetch(&kb, &config, Source::SmartLab, args).await
        }
        Command::Fetch(FetchCommand::Market(args)) => {
            fetch(&kb, &config, Source::Market, args).await
        }
        Command::Fetch(FetchCommand::Events(args)) => {
            fetch(&kb, &config, Source::Events, args).await
        }
        Command::Fetch(FetchCommand::Sanctions(args)) => {
            fetch(&kb, &config, Source::Sanctions, args).await
        }
        Command::Fetch(FetchCommand::Telegram(args)) => fetch_telegram(&config, args).await,
        Command::Prices(args) => prices(&kb, &config, args).await,
        Command::CheckReports(list) => check_reports(&kb, &config, list).await,
        Command::Generate(command) => generate(&kb, &config, command),
        Command::Report(command) => report(&kb, &config, command),
        Command::Export => export_all(&kb, &config),
    }
}
