//! `governance.md`: dividend history and sanctions screening.

use chrono::{Datelike, NaiveDate};
use kb_core::{Dividend, EventsFile, PeriodType, Result, SanctionsFile, Ticker};
use kb_moex::EVENTS_FILE;
use kb_sanctions::SANCTIONS_FILE;
use kb_smartlab::{YEARLY_FILE, parse_statement, payout_by_period};
use kb_store::{KnowledgeBase, read_optional};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

use crate::document::{DocOutcome, SectionTemplate, Template};

/// Document file name.
pub const GOVERNANCE_DOC: &str = "governance.md";

/// Generated dividend section.
pub const DIVIDEND_HISTORY_HEADING: &str = "Дивидендная история";
/// Generated sanctions section.
pub const SANCTIONS_SCREENING_HEADING: &str = "Санкционный скрининг";

/// Payments listed in the detail table.
pub const RECENT_PAYMENTS: usize = 10;

/// Datasets shown per sanctions hit.
const MAX_DATASETS: usize = 5;

const SHAREHOLDERS_DEFAULT: &str = "| Акционер | Доля, % | Тип |
|----------|---------|-----|
| | | Государство / Частный / Менеджмент / Free-float |
| Free-float | | |

**Доля государства (прямая + косвенная):** X%
**Казначейские акции:** X% (есть ли план по гашению?)";

const DIVIDEND_POLICY_DEFAULT: &str = "**Текст политики:** (из устава / решения совета директоров)

| Параметр | Значение |
|----------|----------|
| Payout ratio (цель) | X% от ЧП МСФО/РСБУ |
| Дата ГОСА (обычно) | месяц |
| Реестр (обычно) | через X дней после ГОСА |";

const BUYBACK_DEFAULT: &str = "| Параметр | Значение |
|----------|----------|
| Объявлена | да/нет |
| Объём | X млрд ₽ / X% капитализации |
| Срок | до 20XX |
| Цель | гашение / казначейский пакет / мотивация менеджмента |";

const MANAGEMENT_DEFAULT: &str = "| Должность | Имя | С какого года | Комментарий |
|-----------|-----|---------------|-------------|
| CEO | | | |
| CFO | | | |
| Председатель СД | | | |";

const RISKS_DEFAULT: &str = "- [ ] Допэмиссии за последние 5 лет (размытие)
- [ ] Сделки с аффилированными лицами
- [ ] Смена аудитора
- [ ] Задержка публикации отчётности
- [ ] Казначейские акции > 10% без плана гашения";

const GOD_DEFAULT: &str = "| Фактор | Значение | Дисконт |
|--------|----------|---------|
| Гос. владение > 50%? | да/нет | |
| Payout | X% | базовый: X% |
| Казначейские > 20%? | да/нет | X% |
| Рост дивидендов > 3 лет? | да/нет | X% |
| **Итого GOD** | | **X%** |";

/// Section layout of `governance.md`.
pub const TEMPLATE: Template = Template {
    file_name: GOVERNANCE_DOC,
    sections: &[
        SectionTemplate::manual("Структура акционеров", SHAREHOLDERS_DEFAULT),
        SectionTemplate::manual("Дивидендная политика", DIVIDEND_POLICY_DEFAULT),
        SectionTemplate::generated(DIVIDEND_HISTORY_HEADING),
        SectionTemplate::manual("Программа buyback", BUYBACK_DEFAULT),
        SectionTemplate::manual("Менеджмент", MANAGEMENT_DEFAULT),
        SectionTemplate::generated(SANCTIONS_SCREENING_HEADING),
        SectionTemplate::manual("Риски корпоративного управления", RISKS_DEFAULT),
        SectionTemplate::manual("Расчёт GOD-дисконта", GOD_DEFAULT),
    ],
};

/// How often a company pays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Periodicity {
    /// About once a year.
    Annual,
    /// About twice a year.
    Semiannual,
    /// About four times a year.
    Quarterly,
    /// Years without payments between the first and the last one.
    Irregular,
}

impl fmt::Display for Periodicity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Annual => "1 раз в год",
            Self::Semiannual => "2 раза в год",
            Self::Quarterly => "4 раза в год",
            Self::Irregular => "нерегулярно",
        })
    }
}

/// Stability of per-year totals, from their coefficient of variation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stability {
    /// CV below 0.25.
    Stable,
    /// CV below 0.5.
    Moderate,
    /// CV of 0.5 or more.
    Volatile,
    /// Fewer than two paying years.
    InsufficientData,
}

impl Stability {
    /// Classifies a coefficient of variation.
    #[must_use]
    pub fn from_cv(cv: Option<f64>) -> Self {
        match cv {
            None => Self::InsufficientData,
            Some(cv) if cv < 0.25 => Self::Stable,
            Some(cv) if cv < 0.5 => Self::Moderate,
            Some(_) => Self::Volatile,
        }
    }
}

impl fmt::Display for Stability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stable => "стабильные",
            Self::Moderate => "умеренно волатильные",
            Self::Volatile => "нестабильные",
            Self::InsufficientData => "недостаточно данных",
        })
    }
}

/// Payments of one calendar year.
#[derive(Clone, Debug, PartialEq)]
pub struct YearSummary {
    /// Calendar year of the record dates.
    pub year: i32,
    /// Sum of amounts.
    pub total: f64,
    /// Number of payments.
    pub payments: usize,
    /// Currency of the first payment.
    pub currency: String,
}

/// Summary of a dividend history.
#[derive(Clone, Debug, PartialEq)]
pub struct DividendAnalysis {
    /// Paying years, ascending.
    pub years: Vec<YearSummary>,
    /// Paying years in a row, counted back from the last one.
    pub consecutive_years: usize,
    /// Payment frequency.
    pub periodicity: Periodicity,
    /// Coefficient of variation of yearly totals.
    pub cv: Option<f64>,
    /// Stability label.
    pub stability: Stability,
}

impl DividendAnalysis {
    /// Analyzes payments with a valid date and a positive amount. Returns
    /// `None` if there are none.
    #[must_use]
    pub fn from_dividends(dividends: &[Dividend]) -> Option<Self> {
        let mut by_year: BTreeMap<i32, YearSummary> = BTreeMap::new();
        for dividend in dividends.iter().filter(|d| d.amount > 0.0) {
            let Some(date) = dividend.date() else {
                continue;
            };
            let entry = by_year.entry(date.year()).or_insert_with(|| YearSummary {
                year: date.year(),
                total: 0.0,
                payments: 0,
                currency: currency_or_rub(&dividend.currency).to_string(),
            });
            entry.total += dividend.amount;
            entry.payments += 1;
        }
        let years: Vec<YearSummary> = by_year.into_values().collect();
        let (first, last) = (years.first()?.year, years.last()?.year);

        let consecutive_years = years
            .iter()
            .rev()
            .zip((first..=last).rev())
            .take_while(|(summary, expected)| summary.year == *expected)
            .count();

        let span = usize::try_from(last - first + 1).unwrap_or(usize::MAX);
        let periodicity = if years.len() < span {
            Periodicity::Irregular
        } else {
            let payments: usize = years.iter().map(|y| y.payments).sum();
            let average = payments as f64 / years.len() as f64;
            if average >= 3.5 {
                Periodicity::Quarterly
            } else if average >= 1.5 {
                Periodicity::Semiannual
            } else {
                Periodicity::Annual
            }
        };

        let cv = coefficient_of_variation(&years.iter().map(|y| y.total).collect::<Vec<_>>());
        Some(Self {
            consecutive_years,
            periodicity,
            cv,
            stability: Stability::from_cv(cv),
            years,
        })
    }

    /// First paying year.
    #[must_use]
    pub fn first_year(&self) -> Option<i32> {
        self.years.first().map(|y| y.year)
    }

    /// Number of paying years.
    #[must_use]
    pub fn total_years(&self) -> usize {
        self.years.len()
    }
}

/// Population standard deviation over mean; `None` below two values or for
/// a zero mean.
fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    if mean <= 0.0 {
        return None;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    Some(variance.sqrt() / mean)
}

fn currency_or_rub(currency: &str) -> &str {
    if currency.trim().is_empty() {
        "RUB"
    } else {
        currency
    }
}

/// Body of the dividend history section.
#[must_use]
pub fn dividend_history(
    ticker: &Ticker,
    dividends: &[Dividend],
    payout: &BTreeMap<String, f64>,
) -> String {
    let Some(analysis) = DividendAnalysis::from_dividends(dividends) else {
        return format!("*Нет данных о дивидендах. Скачайте: `kb fetch events {ticker}`*");
    };

    let mut lines = vec![
        format!("**Периодичность:** {}", analysis.periodicity),
        format!(
            "**Стабильность выплат:** платили {} лет подряд (всего {} лет с {})",
            analysis.consecutive_years,
            analysis.total_years(),
            analysis.first_year().unwrap_or_default()
        ),
        match analysis.cv {
            Some(cv) => format!("**Волатильность выплат:** {} (CV {cv:.2})", analysis.stability),
            None => format!("**Волатильность выплат:** {}", analysis.stability),
        },
        String::new(),
        "| Год | Дивиденд на акцию | Выплат в году | Payout ratio |".into(),
        "|-----|-------------------|---------------|--------------|".into(),
    ];
    for year in analysis.years.iter().rev() {
        let ratio = payout
            .get(&year.year.to_string())
            .map_or_else(|| "—".to_string(), |p| format!("{p:.0}%"));
        lines.push(format!(
            "| {} | {:.2} {} | {} | {ratio} |",
            year.year, year.total, year.currency, year.payments
        ));
    }

    let mut recent: Vec<&Dividend> = dividends.iter().collect();
    recent.sort_by(|a, b| b.record_date.cmp(&a.record_date));
    lines.extend([
        String::new(),
        "### Последние выплаты".into(),
        String::new(),
        "| Дата закрытия реестра | Дивиденд | Валюта |".into(),
        "|----------------------|----------|--------|".into(),
    ]);
    lines.extend(recent.iter().take(RECENT_PAYMENTS).map(|d| {
        format!("| {} | {:.2} | {} |", d.record_date, d.amount, currency_or_rub(&d.currency))
    }));
    lines.join("\n")
}

/// Body of the sanctions screening section.
#[must_use]
pub fn sanctions_screening(ticker: &Ticker, sanctions: Option<&SanctionsFile>) -> String {
    let Some(file) = sanctions else {
        return format!("*Нет данных. Скачайте: `kb fetch sanctions {ticker}`*");
    };

    let mut lines = vec![
        format!(
            "*Автоматический скрининг OpenSanctions (запрос: «{}», дата: {})*",
            file.query, file.date
        ),
        String::new(),
    ];
    let relevant: Vec<_> = file.relevant().collect();
    if relevant.is_empty() {
        lines.push(format!(
            "**Результат: совпадений не найдено** (проверено {} записей)",
            file.total
        ));
    } else {
        lines.push(format!("**Результат: найдено {} совпадений**", relevant.len()));
        lines.push(String::new());
        lines.push("| Имя | Тип | Датасеты | Score |".into());
        lines.push("|-----|-----|----------|-------|".into());
        for hit in relevant {
            let datasets = hit
                .datasets
                .iter()
                .take(MAX_DATASETS)
                .cloned()
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!(
                "| {} | {} | {datasets} | {:.2} |",
                hit.caption, hit.schema, hit.score
            ));
        }
    }
    lines.push(String::new());
    lines.push("*Проверьте вручную для точности: SDN (OFAC), ЕС, UK списки.*".into());
    lines.join("\n")
}

/// Payout ratio per year from the yearly statement export, if fetched.
/// An unreadable export is logged and treated as absent.
fn load_payout(kb: &KnowledgeBase, ticker: &Ticker) -> BTreeMap<String, f64> {
    let path = kb.data_file(ticker, YEARLY_FILE);
    let body = match read_optional(&path) {
        Ok(Some(body)) => body,
        Ok(None) => return BTreeMap::new(),
        Err(e) => {
            warn!(%ticker, path = %path.display(), error = %e, "cannot read yearly statement");
            return BTreeMap::new();
        }
    };
    match parse_statement(ticker, PeriodType::Yearly, body.as_bytes()) {
        Ok(record) => payout_by_period(&record),
        Err(e) => {
            warn!(%ticker, error = %e, "cannot parse yearly statement");
            BTreeMap::new()
        }
    }
}

/// Header and intro of a new `governance.md`.
#[must_use]
pub fn skeleton(ticker: &Ticker, company_name: &str, today: NaiveDate) -> String {
    format!(
        "---\nticker: {ticker}\nupdated: {today}\n---\n\n\
         # Корпоративное управление: {company_name} ({ticker})\n\n\
         Данные для расчёта GOD-дисконта и оценки рисков корпоративного управления.\n\
         Автоматические секции обновляются: `kb fetch events {ticker} && \
         kb fetch sanctions {ticker} && kb generate governance {ticker}`.\n\n"
    )
}

/// Regenerates `governance.md` of one company.
///
/// Returns `None` when neither events nor a sanctions screening were
/// fetched for the ticker.
///
/// # Errors
///
/// Returns an error if a fetched file cannot be decoded or the document
/// cannot be written.
pub fn generate_governance(
    kb: &KnowledgeBase,
    ticker: &Ticker,
    today: NaiveDate,
) -> Result<Option<DocOutcome>> {
    let events = kb.read_json::<EventsFile>(ticker, EVENTS_FILE)?;
    let sanctions = kb.read_json::<SanctionsFile>(ticker, SANCTIONS_FILE)?;
    if events.is_none() && sanctions.is_none() {
        debug!(%ticker, "no events or sanctions fetched");
        return Ok(None);
    }
    let dividends = events.map(|e| e.dividends).unwrap_or_default();
    let payout = load_payout(kb, ticker);
    let company_name = kb.company_name(ticker).unwrap_or_else(|| ticker.to_string());

    let generated = [
        (DIVIDEND_HISTORY_HEADING, dividend_history(ticker, &dividends, &payout)),
        (SANCTIONS_SCREENING_HEADING, sanctions_screening(ticker, sanctions.as_ref())),
    ];
    let outcome = TEMPLATE.regenerate_file(
        &kb.company_file(ticker, GOVERNANCE_DOC),
        || skeleton(ticker, &company_name, today),
        &generated,
        today,
    )?;
    Ok(Some(outcome))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_core::SanctionMatch;
    use kb_core::testing::ScratchDir;

    fn dividend(date: &str, amount: f64) -> Dividend {
        Dividend {
            record_date: date.into(),
            amount,
            currency: "RUB".into(),
        }
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_periodicity() {
        let annual = [
            dividend("2022-07-01", 10.0),
            dividend("2023-07-01", 11.0),
            dividend("2024-07-01", 12.0),
        ];
        let analysis = DividendAnalysis::from_dividends(&annual).unwrap();
        assert_eq!(analysis.periodicity, Periodicity::Annual);
        assert_eq!(analysis.consecutive_years, 3);
        assert_eq!(analysis.stability, Stability::Stable);

        let semiannual = [
            dividend("2023-01-10", 5.0),
            dividend("2023-07-10", 5.0),
            dividend("2024-01-10", 5.0),
            dividend("2024-07-10", 6.0),
        ];
        assert_eq!(
            DividendAnalysis::from_dividends(&semiannual).unwrap().periodicity,
            Periodicity::Semiannual
        );

        let quarterly: Vec<Dividend> = ["01", "04", "07", "10"]
            .iter()
            .map(|m| dividend(&format!("2024-{m}-15"), 3.0))
            .collect();
        assert_eq!(
            DividendAnalysis::from_dividends(&quarterly).unwrap().periodicity,
            Periodicity::Quarterly
        );

        let gaps = [
            dividend("2019-07-01", 10.0),
            dividend("2022-07-01", 30.0),
            dividend("2023-07-01", 1.0),
        ];
        let analysis = DividendAnalysis::from_dividends(&gaps).unwrap();
        assert_eq!(analysis.periodicity, Periodicity::Irregular);
        assert_eq!(analysis.consecutive_years, 2);
        assert_eq!(analysis.total_years(), 3);
        assert_eq!(analysis.stability, Stability::Volatile);
    }

    #[test]
    fn test_ignores_invalid_payments() {
        let payments = [dividend("2024-07-01", 0.0), dividend("", 5.0)];
        assert!(DividendAnalysis::from_dividends(&payments).is_none());
        let body = dividend_history(&Ticker::new("SBER"), &payments, &BTreeMap::new());
        assert!(body.starts_with("*Нет данных о дивидендах"));
    }

    #[test]
    fn test_history_table_with_payout() {
        let payments = [dividend("2023-05-11", 25.0), dividend("2024-07-11", 33.3)];
        let payout = BTreeMap::from([("2024".to_string(), 50.4)]);
        let body = dividend_history(&Ticker::new("SBER"), &payments, &payout);
        assert!(body.contains("| 2024 | 33.30 RUB | 1 | 50% |\n| 2023 | 25.00 RUB | 1 | — |"));
        assert!(body.contains("платили 2 лет подряд (всего 2 лет с 2023)"));
        assert!(body.ends_with("| 2024-07-11 | 33.30 | RUB |\n| 2023-05-11 | 25.00 | RUB |"));
    }

    #[test]
    fn test_sanctions_screening_lists_relevant() {
        let file = SanctionsFile {
            ticker: Ticker::new("SBER"),
            company_name: "Сбербанк".into(),
            query: "Сбербанк".into(),
            date: date("2025-06-01"),
            results: vec![
                SanctionMatch {
                    caption: "Sberbank".into(),
                    schema: "Company".into(),
                    datasets: (1..=7).map(|i| format!("ds{i}")).collect(),
                    score: 0.95,
                    ..SanctionMatch::default()
                },
                SanctionMatch {
                    caption: "Other".into(),
                    score: 0.7,
                    ..SanctionMatch::default()
                },
            ],
            total: 42,
            relevant_matches: 1,
        };
        let body = sanctions_screening(&Ticker::new("SBER"), Some(&file));
        assert!(body.contains("**Результат: найдено 1 совпадений**"));
        assert!(body.contains("| Sberbank | Company | ds1, ds2, ds3, ds4, ds5 | 0.95 |"));
        assert!(!body.contains("Other"));

        let clean = SanctionsFile {
            results: vec![],
            ..file
        };
        let sber = Ticker::new("SBER");
        assert!(sanctions_screening(&sber, Some(&clean)).contains("(проверено 42 записей)"));
        assert!(sanctions_screening(&sber, None).starts_with("*Нет данных."));
    }

    #[test]
    fn test_generate_keeps_hand_written_sections() {
        let dir = ScratchDir::new("kb-docs-governance").unwrap();
        dir.write("companies/SBER/_index.md", "---\nticker: SBER\nname: Сбербанк\n---\n").unwrap();
        let events = EventsFile {
            ticker: Ticker::new("SBER"),
            company_name: "Сбербанк".into(),
            date: date("2025-06-01"),
            dividends: vec![dividend("2024-07-11", 33.3)],
            ir_events: vec![],
        };
        dir.write("companies/SBER/data/moex_events.json", &serde_json::to_string(&events).unwrap())
            .unwrap();
        dir.write(
            "companies/SBER/data/smartlab_yearly.csv",
            "Показатель;2023;2024\nДивиденд, руб/акцию;25;33,3\nPayout ratio, %;50;50,2\n",
        )
        .unwrap();
        let hand_written = "---\nticker: SBER\nupdated: 2025-01-01\n---\n\n\
            # Корпоративное управление\n\n## Структура акционеров\n\nМинфин 50% + 1 акция\n\n\
            ## Дивидендная история\n\nустарело\n\n## Менеджмент\n\nГреф с 2007\n";
        dir.write("companies/SBER/governance.md", hand_written).unwrap();

        let kb = KnowledgeBase::new(dir.path());
        let ticker = Ticker::new("SBER");
        let today = date("2025-06-01");
        assert_eq!(generate_governance(&kb, &ticker, today).unwrap(), Some(DocOutcome::Updated));

        let path = kb.company_file(&ticker, GOVERNANCE_DOC);
        let first = std::fs::read_to_string(&path).unwrap();
        assert!(first.contains(
            "## Структура акционеров\n\nМинфин 50% + 1 акция\n\n## Дивидендная политика"
        ));
        assert!(first.contains(
            "## Менеджмент\n\nГреф с 2007\n## Санкционный скрининг\n\n*Нет данных."
        ));
        assert!(first.contains("| 2024 | 33.30 RUB | 1 | 50% |"));
        assert!(!first.contains("устарело"));
        assert!(first.contains("updated: 2025-06-01"));

        assert_eq!(
            generate_governance(&kb, &ticker, date("2025-06-05")).unwrap(),
            Some(DocOutcome::Unchanged)
        );
        assert_eq!(std::fs::read_to_string(&path).unwrap(), first);
    }
}
