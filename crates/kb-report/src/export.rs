//! Consolidated export and per-company trend data.

use crate::cards::{CompanyCard, Sentiment, load_cards};
use chrono::NaiveDate;
use kb_core::{Result, Ticker};
use kb_store::{KnowledgeBase, write_file};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Consolidated export, under the shared `data/` directory.
pub const EXPORT_FILE: &str = "export.json";

/// Trend data, inside each company directory.
pub const TREND_FILE: &str = "trend.json";

const MIN_PROBABILITY: f64 = 0.05;
const MAX_PROBABILITY: f64 = 0.90;

/// One company in the export.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportedCompany {
    /// Ticker.
    pub ticker: Ticker,
    /// Full name.
    pub name: String,
    /// Sector.
    pub sector: String,
    /// Sentiment as written.
    pub sentiment: String,
    /// Position as written.
    pub position: String,
    /// Last price.
    pub current_price: Option<f64>,
    /// Analyst fair value.
    pub fair_value: Option<f64>,
    /// Upside as a fraction.
    pub upside: Option<f64>,
    /// Price to earnings.
    pub p_e: Option<f64>,
    /// Dividend yield as written.
    pub dividend_yield: String,
    /// Return on equity as written.
    pub roe: String,
    /// Last update as written.
    pub updated: String,
}

impl ExportedCompany {
    /// Flattens a card. Cards without a sentiment are not exported.
    #[must_use]
    pub fn from_card(card: &CompanyCard) -> Option<Self> {
        let text = |key: &str| card.get(key).unwrap_or_default().to_string();
        Some(Self {
            ticker: card.ticker(),
            name: text("name"),
            sector: text("sector"),
            sentiment: card.get("sentiment")?.to_string(),
            position: text("position"),
            current_price: card.number("current_price"),
            fair_value: card.number("my_fair_value"),
            upside: card.upside(),
            p_e: card.number("p_e"),
            dividend_yield: text("dividend_yield"),
            roe: text("roe"),
            updated: text("updated"),
        })
    }
}

/// The `data/export.json` document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExportFile {
    /// Generation date.
    pub generated: NaiveDate,
    /// Number of exported companies.
    pub total_companies: usize,
    /// Companies in directory order.
    pub companies: Vec<ExportedCompany>,
}

/// Builds the export from company cards.
#[must_use]
pub fn build_export(cards: &[CompanyCard], today: NaiveDate) -> ExportFile {
    let companies: Vec<ExportedCompany> =
        cards.iter().filter_map(ExportedCompany::from_card).collect();
    ExportFile { generated: today, total_companies: companies.len(), companies }
}

fn to_json<T: Serialize>(value: &T) -> Result<String> {
    let mut json = serde_json::to_string_pretty(value)?;
    json.push('\n');
    Ok(json)
}

/// Writes `data/export.json`.
///
/// # Errors
///
/// Returns an error if the cards cannot be read or the file cannot be
/// written.
pub fn export(kb: &KnowledgeBase, today: NaiveDate) -> Result<ExportFile> {
    let file = build_export(&load_cards(kb)?, today);
    let path = kb.shared_data_file(EXPORT_FILE);
    write_file(&path, to_json(&file)?)?;
    info!(companies = file.total_companies, path = %path.display(), "wrote export");
    Ok(file)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Growth and decline probabilities for a sentiment and upside fraction.
///
/// The sentiment sets the base, a large upside adds to growth and a
/// negative one to decline. Both are then bounded by [`bound_probabilities`].
#[must_use]
pub fn trend_probabilities(sentiment: Sentiment, upside: Option<f64>) -> (f64, f64) {
    let (mut growth, mut decline): (f64, f64) = match sentiment {
        Sentiment::Bullish => (0.65, 0.20),
        Sentiment::Neutral => (0.40, 0.40),
        Sentiment::Bearish => (0.20, 0.65),
    };
    if let Some(upside) = upside {
        if upside > 0.50 {
            growth += 0.10;
        } else if upside > 0.30 {
            growth += 0.05;
        }
        if upside < 0.0 {
            decline += 0.10;
        }
    }
    bound_probabilities(growth, decline)
}

/// Clamps both probabilities to `[0.05, 0.90]` and scales them down
/// together if their sum exceeds one. Results are rounded to two places.
#[must_use]
pub fn bound_probabilities(growth: f64, decline: f64) -> (f64, f64) {
    let mut growth = growth.clamp(MIN_PROBABILITY, MAX_PROBABILITY);
    let mut decline = decline.clamp(MIN_PROBABILITY, MAX_PROBABILITY);
    let total = growth + decline;
    if total > 1.0 {
        growth /= total;
        decline /= total;
    }
    (round2(growth), round2(decline))
}

/// Contents of a company's `trend.json`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrendData {
    /// Ticker.
    pub ticker: Ticker,
    /// Sentiment.
    pub sentiment: Sentiment,
    /// Upside fraction, zero when unknown.
    pub upside: f64,
    /// Probability of growth.
    pub growth_probability: f64,
    /// Probability of decline.
    pub decline_probability: f64,
    /// Generation date.
    pub updated: NaiveDate,
}

impl TrendData {
    /// Trend data of a card. Delisted companies and cards without a valid
    /// sentiment have none.
    #[must_use]
    pub fn from_card(card: &CompanyCard, today: NaiveDate) -> Option<Self> {
        if card.is_delisted() {
            return None;
        }
        let sentiment = card.sentiment()?;
        let upside = card.upside();
        let (growth_probability, decline_probability) = trend_probabilities(sentiment, upside);
        Some(Self {
            ticker: card.ticker(),
            sentiment,
            upside: upside.unwrap_or_default(),
            growth_probability,
            decline_probability,
            updated: today,
        })
    }
}

/// Counts of a trend run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TrendReport {
    /// Files written.
    pub written: usize,
    /// Companies skipped.
    pub skipped: usize,
    /// Stale files removed.
    pub removed: usize,
}

/// Writes `trend.json` for every eligible company and removes it from
/// skipped ones.
///
/// Two directories with the same front-matter ticker produce one file, in
/// the first directory.
///
/// # Errors
///
/// Returns an error if the cards cannot be read or a file cannot be written
/// or removed.
pub fn write_trends(kb: &KnowledgeBase, today: NaiveDate) -> Result<TrendReport> {
    let mut report = TrendReport::default();
    let mut seen: BTreeMap<Ticker, Ticker> = BTreeMap::new();
    for card in load_cards(kb)? {
        let path = kb.company_file(&card.dir, TREND_FILE);
        let Some(trend) = TrendData::from_card(&card, today) else {
            report.skipped += 1;
            if path.exists() {
                std::fs::remove_file(&path)?;
                report.removed += 1;
                info!(ticker = %card.dir, "removed stale trend data");
            }
            continue;
        };
        if let Some(first) = seen.get(&trend.ticker) {
            debug!(
                dir = %card.dir,
                ticker = %trend.ticker,
                first = %first,
                "ticker already processed"
            );
            report.skipped += 1;
            continue;
        }
        seen.insert(trend.ticker.clone(), card.dir.clone());
        write_file(&path, to_json(&trend)?)?;
        debug!(
            ticker = %trend.ticker,
            growth = trend.growth_probability,
            decline = trend.decline_probability,
            "wrote trend data"
        );
        report.written += 1;
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_core::testing::ScratchDir;

    fn close(a: (f64, f64), b: (f64, f64)) -> bool {
        (a.0 - b.0).abs() < 1e-9 && (a.1 - b.1).abs() < 1e-9
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    #[test]
    fn test_trend_probabilities() {
        assert!(close(trend_probabilities(Sentiment::Bullish, None), (0.65, 0.20)));
        assert!(close(trend_probabilities(Sentiment::Bullish, Some(0.6)), (0.75, 0.20)));
        assert!(close(trend_probabilities(Sentiment::Bullish, Some(0.35)), (0.70, 0.20)));
        assert!(close(trend_probabilities(Sentiment::Neutral, Some(-0.1)), (0.40, 0.50)));
        assert!(close(trend_probabilities(Sentiment::Bearish, Some(-0.2)), (0.20, 0.75)));
    }

    #[test]
    fn test_trend_adjustments_by_upside() {
        // Large upside lifts growth only for a bullish card.
        assert!(close(trend_probabilities(Sentiment::Bullish, Some(0.51)), (0.75, 0.20)));
        assert!(close(trend_probabilities(Sentiment::Bullish, Some(0.50)), (0.70, 0.20)));
        assert!(close(trend_probabilities(Sentiment::Bullish, Some(0.30)), (0.65, 0.20)));
        assert!(close(trend_probabilities(Sentiment::Bearish, Some(-0.01)), (0.20, 0.75)));
        assert!(close(trend_probabilities(Sentiment::Bearish, Some(0.0)), (0.20, 0.65)));
        assert!(close(trend_probabilities(Sentiment::Neutral, Some(0.8)), (0.50, 0.40)));
    }

    #[test]
    fn test_bound_probabilities_clamps() {
        assert!(close(bound_probabilities(0.01, 0.30), (0.05, 0.30)));
        assert!(close(bound_probabilities(0.40, -0.2), (0.40, 0.05)));
        assert!(close(bound_probabilities(0.95, 0.0), (0.90, 0.05)));
    }

    #[test]
    fn test_bound_probabilities_normalizes() {
        // 0.90 + 0.30 = 1.2
        assert!(close(bound_probabilities(0.95, 0.30), (0.75, 0.25)));
        assert!(close(bound_probabilities(0.90, 0.90), (0.50, 0.50)));
        let (g, d) = bound_probabilities(0.70, 0.60);
        assert!(close((g, d), (0.54, 0.46)));
        assert!(g + d <= 1.0 + 1e-9);
        // exactly one is left alone
        assert!(close(bound_probabilities(0.60, 0.40), (0.60, 0.40)));
    }

    #[test]
    fn test_probabilities_stay_bounded() {
        for sentiment in [Sentiment::Bullish, Sentiment::Neutral, Sentiment::Bearish] {
            for upside in [None, Some(-5.0), Some(-0.1), Some(0.0), Some(0.4), Some(3.0)] {
                let (g, d) = trend_probabilities(sentiment, upside);
                assert!((MIN_PROBABILITY..=MAX_PROBABILITY).contains(&g));
                assert!((MIN_PROBABILITY..=MAX_PROBABILITY).contains(&d));
                assert!(g + d <= 1.0 + 1e-9);
            }
        }
    }

    #[test]
    fn test_export_file() {
        let dir = ScratchDir::new("export").unwrap();
        dir.write(
            "companies/SBER/_index.md",
            "---\nticker: SBER\nname: Сбербанк\nsector: banks\nsentiment: bullish\n\
             current_price: 300\nmy_fair_value: 360\np_e: 4,5\ndividend_yield: 11%\n\
             updated: 2026-02-01\n---\n",
        )
        .unwrap();
        dir.write("companies/GAZP/_index.md", "---\nticker: GAZP\nname: Газпром\n---\n").unwrap();
        let kb = KnowledgeBase::new(dir.path());

        let file = export(&kb, today()).unwrap();
        assert_eq!(file.total_companies, 1);
        let sber = &file.companies[0];
        assert_eq!(sber.ticker, Ticker::new("SBER"));
        assert_eq!(sber.p_e, Some(4.5));
        assert_eq!(sber.dividend_yield, "11%");
        assert!((sber.upside.unwrap() - 0.2).abs() < 1e-9);

        let written = std::fs::read_to_string(kb.shared_data_file(EXPORT_FILE)).unwrap();
        let parsed: ExportFile = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed, file);
        assert!(written.contains("\"generated\": \"2026-03-01\""));
    }

    #[test]
    fn test_write_trends() {
        let dir = ScratchDir::new("trends").unwrap();
        dir.write(
            "companies/SBER/_index.md",
            "---\nticker: SBER\nsentiment: bullish\nupside: 60%\n---\n",
        )
        .unwrap();
        dir.write(
            "companies/SBER_OLD/_index.md",
            "---\nticker: SBER\nsentiment: bearish\n---\n",
        )
        .unwrap();
        dir.write(
            "companies/QIWI/_index.md",
            "---\nticker: QIWI\nsentiment: bearish\nstatus: delisted\n---\n",
        )
        .unwrap();
        dir.write("companies/QIWI/trend.json", "{}").unwrap();
        dir.write("companies/NEW/_index.md", "---\nticker: NEW\nsentiment: maybe\n---\n").unwrap();
        let kb = KnowledgeBase::new(dir.path());

        let report = write_trends(&kb, today()).unwrap();
        assert_eq!(report, TrendReport { written: 1, skipped: 3, removed: 1 });
        assert!(!dir.path().join("companies/QIWI/trend.json").exists());
        assert!(!dir.path().join("companies/SBER_OLD/trend.json").exists());

        let written =
            std::fs::read_to_string(dir.path().join("companies/SBER/trend.json")).unwrap();
        let sber: TrendData = serde_json::from_str(&written).unwrap();
        assert_eq!(sber.sentiment, Sentiment::Bullish);
        assert!(close((sber.growth_probability, sber.decline_probability), (0.75, 0.20)));
        assert!((sber.upside - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_export_then_trends() {
        let dir = ScratchDir::new("export-trends").unwrap();
        dir.write(
            "companies/LKOH/_index.md",
            "---\nticker: LKOH\nname: Лукойл\nsector: oil\nsentiment: bullish\n\
             current_price: 5000\nmy_fair_value: 8000\nupdated: 2026-02-10\n---\n",
        )
        .unwrap();
        dir.write(
            "companies/MTSS/_index.md",
            "---\nticker: MTSS\nname: МТС\nsentiment: bearish\ncurrent_price: 250\n\
             my_fair_value: 200\n---\n",
        )
        .unwrap();
        dir.write(
            "companies/QIWI/_index.md",
            "---\nticker: QIWI\nsentiment: neutral\nstatus: delisted\n---\n",
        )
        .unwrap();
        dir.write("companies/PIKK/_index.md", "---\nticker: PIKK\nname: ПИК\n---\n").unwrap();
        dir.write("companies/PIKK/trend.json", "{}").unwrap();
        let kb = KnowledgeBase::new(dir.path());

        let file = export(&kb, today()).unwrap();
        let exported: Vec<&str> = file.companies.iter().map(|c| c.ticker.as_str()).collect();
        assert_eq!(exported, vec!["LKOH", "MTSS", "QIWI"]);
        assert_eq!(file.total_companies, 3);

        let report = write_trends(&kb, today()).unwrap();
        assert_eq!(report, TrendReport { written: 2, skipped: 2, removed: 1 });
        assert!(!dir.path().join("companies/PIKK/trend.json").exists());
        assert!(!dir.path().join("companies/QIWI/trend.json").exists());

        let read = |ticker: &str| -> TrendData {
            let path = dir.path().join(format!("companies/{ticker}/{TREND_FILE}"));
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
        };
        let lkoh = read("LKOH");
        assert!((lkoh.upside - 0.6).abs() < 1e-9);
        assert!(close((lkoh.growth_probability, lkoh.decline_probability), (0.75, 0.20)));
        let mtss = read("MTSS");
        assert!((mtss.upside + 0.2).abs() < 1e-9);
        assert!(close((mtss.growth_probability, mtss.decline_probability), (0.20, 0.75)));
        assert_eq!(mtss.updated, today());
    }
}
