//! Central bank meeting dates from `russia/macro.md`.

use chrono::NaiveDate;
use kb_core::Result;
use kb_store::{KnowledgeBase, read_optional};
use tracing::debug;

use crate::document::Document;

/// Heading of the meeting table in the macro document.
pub const CB_MEETINGS_HEADING: &str = "Ближайшие заседания ЦБ";

const GENITIVE_MONTHS: [&str; 12] = [
    "января",
    "февраля",
    "марта",
    "апреля",
    "мая",
    "июня",
    "июля",
    "августа",
    "сентября",
    "октября",
    "ноября",
    "декабря",
];

/// Parses a date written as `13 февраля 2026`.
#[must_use]
pub fn parse_ru_date(text: &str) -> Option<NaiveDate> {
    let mut words = text.split_whitespace();
    let day: u32 = words.next()?.parse().ok()?;
    let month_word = words.next()?.to_lowercase();
    let month = GENITIVE_MONTHS.iter().position(|m| *m == month_word)?;
    let year_word = words.next()?;
    let year: i32 = year_word.get(..4)?.parse().ok()?;
    NaiveDate::from_ymd_opt(year, u32::try_from(month).ok()? + 1, day)
}

/// Meeting dates on or after `today` listed in the meeting table of a macro
/// document, ascending. Header and separator rows are skipped.
#[must_use]
pub fn cb_meetings(macro_text: &str, today: NaiveDate) -> Vec<NaiveDate> {
    let doc = Document::parse(macro_text);
    let Some(section) = doc.section(CB_MEETINGS_HEADING) else {
        return Vec::new();
    };

    let mut dates: Vec<NaiveDate> = section
        .body()
        .lines()
        .map(str::trim)
        .filter(|line| line.starts_with('|') && !line.contains("---") && !line.contains("Дата"))
        .filter_map(|line| line.split('|').nth(1))
        .filter_map(parse_ru_date)
        .filter(|date| *date >= today)
        .collect();
    dates.sort_unstable();
    dates.dedup();
    dates
}

/// Reads upcoming meetings from the knowledge base. A missing macro
/// document yields no meetings.
///
/// # Errors
///
/// Returns an error if the document exists but cannot be read.
pub fn load_cb_meetings(kb: &KnowledgeBase, today: NaiveDate) -> Result<Vec<NaiveDate>> {
    let Some(text) = read_optional(&kb.macro_path())? else {
        debug!(path = %kb.macro_path().display(), "no macro document");
        return Ok(Vec::new());
    };
    let meetings = cb_meetings(&text, today);
    debug!(count = meetings.len(), "upcoming central bank meetings");
    Ok(meetings)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MACRO: &str = "---\nupdated: 2025-12-01\n---\n\n# Макро\n\n\
        ## Ключевая ставка\n\n| 16.5% | |\n\n\
        ## Ближайшие заседания ЦБ\n\n\
        | Дата | Комментарий |\n|------|-------------|\n\
        | 24 октября 2025 | прошло |\n\
        | 19 декабря 2025 | ожидаем снижение |\n\
        | 13 февраля 2026 | |\n\
        | 13 февраля 2026 | дубль |\n\
        | скоро | |\n\n\
        ## Инфляция\n\n| 1 марта 2026 | не заседание |\n";

    #[test]
    fn test_parse_ru_date() {
        assert_eq!(parse_ru_date("13 февраля 2026"), NaiveDate::from_ymd_opt(2026, 2, 13));
        assert_eq!(parse_ru_date("1 Марта 2026 г."), NaiveDate::from_ymd_opt(2026, 3, 1));
        assert_eq!(parse_ru_date("2026г"), None);
        assert_eq!(parse_ru_date("31 февраля 2026"), None);
        assert_eq!(parse_ru_date("13 february 2026"), None);
    }

    #[test]
    fn test_cb_meetings_upcoming_only() {
        let today = NaiveDate::from_ymd_opt(2025, 12, 19).unwrap();
        assert_eq!(
            cb_meetings(MACRO, today),
            vec![
                NaiveDate::from_ymd_opt(2025, 12, 19).unwrap(),
                NaiveDate::from_ymd_opt(2026, 2, 13).unwrap()
            ]
        );
        assert!(cb_meetings("# нет таблицы\n", today).is_empty());
    }
}
