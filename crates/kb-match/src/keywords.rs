//! Market-wide keywords.

/// Lowercase phrases that mark a text as relevant to the Russian market
/// as a whole.
pub const MARKET_KEYWORDS: &[&str] = &[
    "рынок рф",
    "рынке рф",
    "российский рынок",
    "российском рынке",
    "цб рф",
    "центробанк",
    "банк россии",
    "ключевая ставка",
    "ключевую ставку",
    "ставка цб",
    "ставку цб",
    "рубль",
    "рубля",
    "рублей",
    "рублю",
    "санкции",
    "санкций",
    "мосбиржа",
    "московская биржа",
    "moex",
    "индекс мосбиржи",
    "imoex",
    "россия",
    "российск",
];

/// Returns true if `text` contains any of [`MARKET_KEYWORDS`].
#[must_use]
pub fn is_market_relevant(text: &str) -> bool {
    let lowered = text.to_lowercase();
    MARKET_KEYWORDS.iter().any(|kw| lowered.contains(kw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_market_keywords() {
        assert!(is_market_relevant("Банк России сохранил КЛЮЧЕВУЮ СТАВКУ"));
        assert!(is_market_relevant("Индекс MOEX обновил минимум"));
        assert!(is_market_relevant("Российские облигации"));
        assert!(!is_market_relevant("Nvidia reported record revenue"));
    }
}
