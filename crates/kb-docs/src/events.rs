//! `events.md`: recent and upcoming corporate events.

use chrono::{Days, NaiveDate};
use kb_core::{EventsFile, Result, Ticker};
use kb_moex::EVENTS_FILE;
use kb_store::KnowledgeBase;
use std::collections::HashSet;
use tracing::debug;

use crate::document::{DocOutcome, SectionTemplate, Template};

/// Document file name.
pub const EVENTS_DOC: &str = "events.md";

/// Events of the last [`RECENT_WINDOW_DAYS`] days.
pub const RECENT_HEADING: &str = "Последние события (6 месяцев)";
/// Events from today on, plus central bank meetings.
pub const UPCOMING_HEADING: &str = "Предстоящие катализаторы";

/// Length of the recent window.
pub const RECENT_WINDOW_DAYS: u64 = 180;

const SOURCE: &str = "MOEX ISS";

const GUIDANCE_DEFAULT: &str = "Прогнозы менеджмента из последних конференц-звонков и презентаций.

| Параметр | Прогноз менеджмента | Источник | Дата |
|----------|---------------------|----------|------|
| Рост выручки 20XX | | | |
| Маржа EBITDA 20XX | | | |
| CAPEX 20XX | | | |
| Дивидендная политика | | | |
| Долговая стратегия | | | |";

const IR_DEFAULT: &str = "### Последняя презентация (дата, название)

Основные тезисы:
1.
2.
3.";

const SANCTIONS_STATUS_DEFAULT: &str = "| Параметр | Значение |
|----------|----------|
| SDN (OFAC) | да/нет |
| ЕС sanctions | да/нет |
| UK sanctions | да/нет |
| Вторичные санкции | риск для контрагентов да/нет |
| Влияние на бизнес | описание |";

/// Section layout of `events.md`.
pub const TEMPLATE: Template = Template {
    file_name: EVENTS_DOC,
    sections: &[
        SectionTemplate::generated(RECENT_HEADING),
        SectionTemplate::generated(UPCOMING_HEADING),
        SectionTemplate::manual("Guidance менеджмента", GUIDANCE_DEFAULT),
        SectionTemplate::manual("Ключевые выдержки из IR-презентаций", IR_DEFAULT),
        SectionTemplate::manual("Санкционный статус", SANCTIONS_STATUS_DEFAULT),
    ],
};

/// Expected price impact of an IR calendar event type.
#[must_use]
pub fn event_impact(event_type: &str) -> &'static str {
    match event_type {
        "Публикация отчетности" => "зависит от результатов",
        "Выплаты по инструментам" => "позитив",
        _ => "нейтрально",
    }
}

#[derive(Clone, Debug, PartialEq)]
struct EventRow {
    date: NaiveDate,
    kind: String,
    description: String,
    impact: &'static str,
}

/// Dated rows from fetched events, deduplicated by (type, date).
fn event_rows(events: &EventsFile) -> Vec<EventRow> {
    let dividends = events.dividends.iter().filter_map(|d| {
        Some(EventRow {
            date: d.date()?,
            kind: "dividend".into(),
            description: format!(
                "Дивидендная отсечка: {} {}",
                d.amount,
                currency_or_rub(&d.currency)
            ),
            impact: "позитив",
        })
    });
    let ir = events.ir_events.iter().filter_map(|e| {
        Some(EventRow {
            date: e.date()?,
            kind: e.event_type.clone(),
            description: e.label().to_string(),
            impact: event_impact(&e.event_type),
        })
    });

    let mut seen = HashSet::new();
    ir.chain(dividends)
        .filter(|row| seen.insert((row.kind.clone(), row.date)))
        .collect()
}

fn currency_or_rub(currency: &str) -> &str {
    if currency.trim().is_empty() {
        "RUB"
    } else {
        currency
    }
}

/// Table of events in `[today - 180 days, today)`, newest first.
#[must_use]
pub fn recent_table(events: &EventsFile, today: NaiveDate) -> String {
    let cutoff = today.checked_sub_days(Days::new(RECENT_WINDOW_DAYS)).unwrap_or(NaiveDate::MIN);
    let mut rows: Vec<EventRow> = event_rows(events)
        .into_iter()
        .filter(|row| row.date >= cutoff && row.date < today)
        .collect();
    rows.sort_by(|a, b| b.date.cmp(&a.date));

    let mut lines = vec![
        "| Дата | Событие | Влияние | Источник |".to_string(),
        "|------|---------|---------|----------|".to_string(),
    ];
    if rows.is_empty() {
        lines.push("| | Нет данных за последние 6 месяцев | | |".into());
    }
    lines.extend(
        rows.iter()
            .map(|r| format!("| {} | {} | {} | {SOURCE} |", r.date, r.description, r.impact)),
    );
    lines.join("\n")
}

/// Table of events from today on and upcoming central bank meetings,
/// soonest first.
#[must_use]
pub fn upcoming_table(events: &EventsFile, cb_meetings: &[NaiveDate], today: NaiveDate) -> String {
    let mut rows: Vec<EventRow> = event_rows(events)
        .into_iter()
        .filter(|row| row.date >= today)
        .collect();
    let mut seen: HashSet<NaiveDate> = HashSet::new();
    rows.extend(
        cb_meetings
            .iter()
            .filter(|date| **date >= today && seen.insert(**date))
            .map(|date| EventRow {
                date: *date,
                kind: "cb_meeting".into(),
                description: "Заседание ЦБ (влияет на сектор)".into(),
                impact: "зависит от решения",
            }),
    );
    rows.sort_by(|a, b| a.date.cmp(&b.date));

    let mut lines = vec![
        "| Дата (ожид.) | Событие | Ожидаемое влияние |".to_string(),
        "|--------------|---------|-------------------|".to_string(),
    ];
    if rows.is_empty() {
        lines.push("| | Нет предстоящих событий | |".into());
    }
    lines.extend(
        rows.iter()
            .map(|r| format!("| {} | {} | {} |", r.date, r.description, r.impact)),
    );
    lines.join("\n")
}

/// Header and intro of a new `events.md`.
#[must_use]
pub fn skeleton(ticker: &Ticker, company_name: &str, today: NaiveDate) -> String {
    format!(
        "---\nticker: {ticker}\nupdated: {today}\n---\n\n\
         # Корпоративные события: {company_name} ({ticker})\n\n\
         IR-материалы, пресс-релизы и предстоящие катализаторы.\n\
         Таблицы событий обновляются автоматически: \
         `kb fetch events {ticker} && kb generate events {ticker}`.\n\n"
    )
}

/// Regenerates `events.md` of one company.
///
/// Returns `None` when no events were fetched for the ticker.
///
/// # Errors
///
/// Returns an error if the events file cannot be decoded or the document
/// cannot be written.
pub fn generate_events(
    kb: &KnowledgeBase,
    ticker: &Ticker,
    cb_meetings: &[NaiveDate],
    today: NaiveDate,
) -> Result<Option<DocOutcome>> {
    let Some(events) = kb.read_json::<EventsFile>(ticker, EVENTS_FILE)? else {
        debug!(%ticker, "no events fetched");
        return Ok(None);
    };
    let company_name = kb.company_name(ticker).unwrap_or_else(|| ticker.to_string());

    let generated = [
        (RECENT_HEADING, recent_table(&events, today)),
        (UPCOMING_HEADING, upcoming_table(&events, cb_meetings, today)),
    ];
    let outcome = TEMPLATE.regenerate_file(
        &kb.company_file(ticker, EVENTS_DOC),
        || skeleton(ticker, &company_name, today),
        &generated,
        today,
    )?;
    Ok(Some(outcome))
}
