//! Ticker, name and alias registry.

use kb_core::{KbError, Result, Ticker};
use kb_store::KnowledgeBase;
use regex::Regex;
use std::collections::BTreeMap;
use tracing::debug;

/// Aliases shorter than this only match whole words.
pub const SHORT_ALIAS_CHARS: usize = 4;

/// Built-in issuers: ticker, display name, legacy symbols, aliases.
const BUILTIN: &[(&str, &str, &[&str], &[&str])] = &[
    // oil and gas
    ("GAZP", "Газпром", &[], &["газпром", "gazprom"]),
    ("LKOH", "Лукойл", &[], &["лукойл", "lukoil"]),
    ("ROSN", "Роснефть", &[], &["роснефть", "rosneft"]),
    ("NVTK", "Новатэк", &[], &["новатэк", "novatek"]),
    ("TATN", "Татнефть", &[], &["татнефть", "tatneft"]),
    ("SNGS", "Сургутнефтегаз", &[], &["сургутнефтегаз", "сургут", "surgutneftegas"]),
    ("SIBN", "Газпром нефть", &[], &["газпром нефть", "газпромнефть"]),
    ("BANEP", "Башнефть", &[], &["башнефть"]),
    // metals and mining
    ("GMKN", "Норникель", &[], &["норникель", "норильский никель", "norilsk"]),
    ("NLMK", "НЛМК", &[], &["нлмк"]),
    ("CHMF", "Северсталь", &[], &["северсталь", "severstal"]),
    ("MAGN", "ММК", &[], &["ммк", "магнитогорский"]),
    ("ALRS", "Алроса", &[], &["алроса", "alrosa"]),
    ("PLZL", "Полюс", &[], &["полюс", "polyus"]),
    ("POLY", "Polymetal", &[], &["polymetal", "полиметалл"]),
    ("RUAL", "Русал", &[], &["русал", "rusal"]),
    // banks and finance
    ("SBER", "Сбер", &[], &["сбер", "сбербанк", "sber", "sberbank"]),
    ("VTBR", "ВТБ", &[], &["втб", "vtb"]),
    ("TCSG", "Т-Банк", &[], &["тинькофф", "т-банк", "tinkoff", "t-bank", "т-брокер"]),
    ("MOEX", "Мосбиржа", &[], &["мосбиржа", "московская биржа"]),
    ("AFKS", "АФК Система", &[], &["афк система", "sistema"]),
    // telecom and IT
    ("MTSS", "МТС", &[], &["мтс"]),
    ("YDEX", "Яндекс", &["YNDX"], &["яндекс", "yandex"]),
    ("VKCO", "VK", &[], &["vk", "вконтакте", "vkontakte"]),
    ("OZON", "Озон", &[], &["озон", "ozon"]),
    ("HHRU", "HeadHunter", &["HEAD"], &["headhunter", "hh.ru", "хедхантер"]),
    ("CIAN", "Циан", &[], &["циан"]),
    ("POSI", "Positive Technologies", &[], &["позитив", "positive technologies"]),
    // retail
    ("MGNT", "Магнит", &[], &["магнит"]),
    ("X5", "X5", &["FIVE"], &["x5", "пятёрочка", "пятерочка", "перекрёсток", "перекресток"]),
    ("FIXP", "Fix Price", &[], &["fix price", "фикс прайс"]),
    ("LENT", "Лента", &[], &["лента"]),
    ("DSKY", "Детский мир", &[], &["детский мир"]),
    // transport
    ("AFLT", "Аэрофлот", &[], &["аэрофлот", "aeroflot"]),
    ("FLOT", "Совкомфлот", &[], &["совкомфлот", "sovcomflot"]),
    ("NMTP", "НМТП", &[], &["нмтп"]),
    ("FESH", "ДВМП", &[], &["двмп", "fesco"]),
    // utilities
    ("IRAO", "Интер РАО", &[], &["интер рао", "inter rao"]),
    ("HYDR", "РусГидро", &[], &["русгидро", "rushydro"]),
    ("FEES", "ФСК ЕЭС", &[], &["фск еэс", "россети"]),
    ("UPRO", "Юнипро", &[], &["юнипро", "unipro"]),
    ("OGKB", "ОГК-2", &[], &["огк-2"]),
    ("MSNG", "Мосэнерго", &[], &["мосэнерго"]),
    // fertilizers
    ("PHOR", "ФосАгро", &[], &["фосагро", "phosagro"]),
    ("AKRN", "Акрон", &[], &["акрон", "akron"]),
    // developers
    ("PIKK", "ПИК", &[], &["пик"]),
    ("LSRG", "Группа ЛСР", &[], &["группа лср", "лср"]),
    ("SMLT", "Самолёт", &[], &["самолёт", "самолет"]),
    ("ETLN", "Эталон", &[], &["группа эталон"]),
    // other
    ("RTKM", "Ростелеком", &[], &["ростелеком", "rostelecom"]),
    ("SGZH", "Сегежа", &[], &["сегежа", "segezha"]),
    ("MVID", "М.Видео", &[], &["м.видео", "мвидео", "mvideo"]),
    ("CBOM", "МКБ", &[], &["мкб"]),
    ("BSPB", "Банк СПб", &[], &["банк санкт-петербург", "банк спб"]),
];

/// A company known to the registry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompanyEntry {
    /// Current ticker.
    pub ticker: Ticker,
    /// Display name.
    pub name: String,
    /// Other exchange symbols (former tickers, depositary receipts).
    pub symbols: Vec<String>,
    /// Lowercase aliases searched in text.
    pub aliases: Vec<String>,
}

impl CompanyEntry {
    /// Creates an entry with no aliases.
    #[must_use]
    pub fn new(ticker: Ticker, name: impl Into<String>) -> Self {
        Self {
            ticker,
            name: name.into(),
            symbols: Vec::new(),
            aliases: Vec::new(),
        }
    }

    /// Adds aliases, lowercased; blanks and repeats are dropped.
    #[must_use]
    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for alias in aliases {
            self.push_alias(alias.as_ref());
        }
        self
    }

    fn push_alias(&mut self, alias: &str) {
        let alias = alias.trim().to_lowercase();
        if !alias.is_empty() && !self.aliases.contains(&alias) {
            self.aliases.push(alias);
        }
    }

    fn absorb(&mut self, other: Self) {
        if self.name.is_empty() {
            self.name = other.name;
        }
        for symbol in other.symbols {
            if !self.symbols.contains(&symbol) {
                self.symbols.push(symbol);
            }
        }
        for alias in &other.aliases {
            self.push_alias(alias);
        }
    }
}

#[derive(Clone, Debug)]
struct CompiledEntry {
    ticker: Ticker,
    whole_words: Regex,
    substrings: Vec<String>,
}

impl CompiledEntry {
    fn compile(entry: &CompanyEntry) -> Result<Self> {
        let mut words: Vec<String> = std::iter::once(entry.ticker.as_str())
            .chain(entry.symbols.iter().map(String::as_str))
            .map(regex::escape)
            .collect();
        let mut substrings = Vec::new();
        for alias in &entry.aliases {
            if alias.chars().count() < SHORT_ALIAS_CHARS {
                words.push(regex::escape(alias));
            } else {
                substrings.push(alias.clone());
            }
        }
        let pattern = format!(r"(?i)\b(?:{})\b", words.join("|"));
        let whole_words = Regex::new(&pattern)
            .map_err(|e| KbError::InvalidParameter(format!("aliases of {}: {e}", entry.ticker)))?;
        Ok(Self {
            ticker: entry.ticker.clone(),
            whole_words,
            substrings,
        })
    }

    fn matches(&self, text: &str, lowered: &str) -> bool {
        self.substrings.iter().any(|s| lowered.contains(s.as_str()))
            || self.whole_words.is_match(text)
    }
}

/// Companies searchable in free text.
///
/// Built once and passed explicitly to everything that matches text.
#[derive(Clone, Debug)]
pub struct AliasRegistry {
    entries: BTreeMap<Ticker, CompanyEntry>,
    compiled: Vec<CompiledEntry>,
}

impl AliasRegistry {
    /// Builds a registry; entries sharing a ticker are merged.
    ///
    /// # Errors
    ///
    /// Returns [`KbError::InvalidParameter`] if an entry cannot be compiled.
    pub fn from_entries(entries: impl IntoIterator<Item = CompanyEntry>) -> Result<Self> {
        let mut merged: BTreeMap<Ticker, CompanyEntry> = BTreeMap::new();
        for entry in entries {
            match merged.get_mut(&entry.ticker) {
                Some(existing) => existing.absorb(entry),
                None => {
                    merged.insert(entry.ticker.clone(), entry);
                }
            }
        }
        let compiled = merged.values().map(CompiledEntry::compile).collect::<Result<Vec<_>>>()?;
        Ok(Self {
            entries: merged,
            compiled,
        })
    }

    /// Entries of the built-in issuer table.
    #[must_use]
    pub fn builtin_entries() -> Vec<CompanyEntry> {
        BUILTIN
            .iter()
            .map(|(ticker, name, symbols, aliases)| {
                let mut entry =
                    CompanyEntry::new(Ticker::new(*ticker), *name).with_aliases(aliases.iter());
                entry.symbols = symbols.iter().map(|s| (*s).to_string()).collect();
                entry
            })
            .collect()
    }

    /// Registry of the built-in issuers only.
    ///
    /// # Errors
    ///
    /// Returns an error if the table cannot be compiled.
    pub fn builtin() -> Result<Self> {
        Self::from_entries(Self::builtin_entries())
    }

    /// Built-in issuers plus `name` and `aliases` of every company header.
    ///
    /// # Errors
    ///
    /// Returns an error if the companies directory cannot be listed.
    pub fn load(kb: &KnowledgeBase) -> Result<Self> {
        let mut entries = Self::builtin_entries();
        for ticker in kb.company_tickers()? {
            let Some(front) = kb.front_matter(&ticker) else {
                continue;
            };
            let name = front.get("name").unwrap_or_default().to_string();
            let mut aliases = front.list("aliases");
            if !name.is_empty() {
                aliases.push(name.as_str());
            }
            let entry = CompanyEntry::new(ticker.clone(), name.clone()).with_aliases(aliases);
            entries.push(entry);
        }
        let registry = Self::from_entries(entries)?;
        debug!(companies = registry.len(), "built alias registry");
        Ok(registry)
    }

    /// Tickers mentioned in `text`, sorted.
    #[must_use]
    pub fn tickers_in(&self, text: &str) -> Vec<Ticker> {
        let lowered = text.to_lowercase();
        self.compiled
            .iter()
            .filter(|c| c.matches(text, &lowered))
            .map(|c| c.ticker.clone())
            .collect()
    }

    /// Entry of a ticker.
    #[must_use]
    pub fn get(&self, ticker: &Ticker) -> Option<&CompanyEntry> {
        self.entries.get(ticker)
    }

    /// Display name of a ticker, falling back to the ticker itself.
    #[must_use]
    pub fn display_name(&self, ticker: &Ticker) -> String {
        self.get(ticker)
            .map(|e| e.name.clone())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| ticker.to_string())
    }

    /// Number of companies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_core::testing::ScratchDir;

    fn registry(entries: &[(&str, &[&str])]) -> AliasRegistry {
        AliasRegistry::from_entries(
            entries
                .iter()
                .map(|(t, aliases)| {
                    CompanyEntry::new(Ticker::new(*t), *t).with_aliases(aliases.iter())
                }),
        )
        .unwrap()
    }

    #[test]
    fn test_alias_matches_inflected_name() {
        let registry = registry(&[("SBER", &["Сбер", "Сбербанк"])]);
        assert_eq!(registry.tickers_in("Сбербанк отчитался"), vec![Ticker::new("SBER")]);
        assert_eq!(registry.tickers_in("По Сбербанку вышла отчётность"), vec![Ticker::new("SBER")]);
        assert!(registry.tickers_in("Газпром отчитался").is_empty());
    }

    #[test]
    fn test_ticker_symbols_are_whole_words() {
        let registry = registry(&[("GAZP", &[]), ("PIKK", &["пик"])]);
        assert_eq!(registry.tickers_in("Покупаю #GAZP"), vec![Ticker::new("GAZP")]);
        assert_eq!(registry.tickers_in("gazp на хаях"), vec![Ticker::new("GAZP")]);
        assert!(registry.tickers_in("GAZPROM").is_empty());
        assert_eq!(registry.tickers_in("Акции ПИК растут"), vec![Ticker::new("PIKK")]);
        assert!(registry.tickers_in("Пикник на обочине").is_empty());
    }

    #[test]
    fn test_builtin_table() {
        let registry = AliasRegistry::builtin().unwrap();
        let found = registry.tickers_in("ВТБ и Яндекс (#YNDX) против X5");
        assert_eq!(found, vec![Ticker::new("VTBR"), Ticker::new("X5"), Ticker::new("YDEX")]);
        assert_eq!(registry.display_name(&Ticker::new("SBER")), "Сбер");
        assert_eq!(registry.display_name(&Ticker::new("ZZZZ")), "ZZZZ");
    }

    #[test]
    fn test_entries_merge_by_ticker() {
        let registry = AliasRegistry::from_entries([
            CompanyEntry::new(Ticker::new("SBER"), "Сбер").with_aliases(["сбер"]),
            CompanyEntry::new(Ticker::new("SBER"), "Сбербанк России")
                .with_aliases(["Sberbank", "сбер"]),
        ])
        .unwrap();
        let entry = registry.get(&Ticker::new("SBER")).unwrap();
        assert_eq!(entry.name, "Сбер");
        assert_eq!(entry.aliases, vec!["сбер", "sberbank"]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_load_adds_front_matter_aliases() {
        let dir = ScratchDir::new("kb-registry").unwrap();
        dir.write(
            "companies/ABIO/_index.md",
            "---\nticker: ABIO\nname: Артген\naliases: [ArtGen, Артген биотех]\n---\n",
        )
        .unwrap();
        dir.write("companies/_template/_index.md", "---\nname: Шаблон\n---\n").unwrap();
        let kb = KnowledgeBase::open(dir.path()).unwrap();
        let registry = AliasRegistry::load(&kb).unwrap();

        assert_eq!(registry.tickers_in("ArtGen получил патент"), vec![Ticker::new("ABIO")]);
        assert_eq!(registry.display_name(&Ticker::new("ABIO")), "Артген");
        assert!(registry.tickers_in("Шаблон").is_empty());
    }
}
