//! `opinions.md` from channel posts, a market digest and `_index.md` stubs.

use chrono::NaiveDate;
use kb_core::{Post, Result, Ticker};
use kb_match::{AliasRegistry, TargetPriceExtractor, TickerGroups};
use kb_store::{KnowledgeBase, write_file};
use std::cmp::Reverse;
use tracing::{info, warn};

use crate::document::{DocOutcome, SectionTemplate, Template};

/// Document file name.
pub const OPINIONS_DOC: &str = "opinions.md";

/// Generated list of matched posts.
pub const MENTIONS_HEADING: &str = "Упоминания";

/// Generated list of market-wide posts.
pub const MARKET_POSTS_HEADING: &str = "Рыночные посты";

/// Digest of market-relevant posts, relative to the knowledge base root.
pub const MARKET_DIGEST_FILE: &str = "russia/market_digest.md";

/// Channel used when none is given.
pub const DEFAULT_CHANNEL: &str = "investopit";

/// Section layout of `opinions.md`.
pub const TEMPLATE: Template = Template {
    file_name: OPINIONS_DOC,
    sections: &[
        SectionTemplate::generated(MENTIONS_HEADING),
        SectionTemplate::manual("Выводы", "<!-- Собственная оценка мнений -->"),
    ],
};

/// Section layout of the market digest.
pub const DIGEST_TEMPLATE: Template = Template {
    file_name: "market_digest.md",
    sections: &[
        SectionTemplate::generated(MARKET_POSTS_HEADING),
        SectionTemplate::manual("Выводы", "<!-- Что из этого влияет на портфель -->"),
    ],
};

/// Counts of one opinions run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OpinionsReport {
    /// Opinion documents created or changed.
    pub written: usize,
    /// Opinion documents already up to date.
    pub unchanged: usize,
    /// Tickers whose document could not be written.
    pub failed: usize,
    /// `_index.md` stubs created.
    pub stubs: usize,
    /// Posts in the market digest.
    pub market_posts: usize,
}

/// Link to a post.
#[must_use]
pub fn post_link(channel: &str, id: u64) -> String {
    format!("https://t.me/{channel}/{id}")
}

/// Newest first; undated posts last, then by id descending.
fn newest_first(posts: &[Post]) -> Vec<&Post> {
    let mut sorted: Vec<&Post> = posts.iter().collect();
    sorted.sort_by_key(|p| (Reverse(p.date.clone()), Reverse(p.id)));
    sorted
}

fn quote(text: &str) -> String {
    text.trim()
        .lines()
        .map(|line| {
            if line.is_empty() {
                ">".to_string()
            } else {
                format!("> {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// `_index.md` stub for a company first seen in posts.
#[must_use]
pub fn stub_index(ticker: &Ticker, name: &str, today: NaiveDate) -> String {
    format!(
        "---
ticker: {ticker}
name: {name}
sector:
sentiment:
position: watch
updated: {today}
---

# {name} ({ticker})

> Заглушка. Требуется исследование.

## Бизнес-модель

<!-- Описание бизнеса -->

## Финансовые показатели

| Показатель | Значение |
|------------|----------|
| Капитализация | |
| P/E | |
| EV/EBITDA | |
| Див. доходность | |

## Инвестиционный тезис

<!-- Почему интересна / не интересна -->

## Риски

-

## Источники

- [Smart-lab](https://smart-lab.ru/q/{ticker}/)
- [Внешние мнения]({OPINIONS_DOC})
"
    )
}

/// Writes opinion documents, the market digest and stubs.
#[derive(Debug)]
pub struct OpinionsGenerator<'a> {
    registry: &'a AliasRegistry,
    extractor: TargetPriceExtractor,
    channel: String,
}

impl<'a> OpinionsGenerator<'a> {
    /// Creates a generator for posts of `channel`.
    ///
    /// # Errors
    ///
    /// Returns an error if the target price pattern does not compile.
    pub fn new(registry: &'a AliasRegistry, channel: impl Into<String>) -> Result<Self> {
        Ok(Self {
            registry,
            extractor: TargetPriceExtractor::new()?,
            channel: channel.into(),
        })
    }

    /// Body of the mentions section.
    #[must_use]
    pub fn mentions(&self, posts: &[Post]) -> String {
        let mut out = format!("**Всего упоминаний:** {}\n", posts.len());
        for post in newest_first(posts) {
            out.push_str(&format!(
                "\n### {}\n[Источник]({})\n\n",
                post.date.as_deref().unwrap_or("без даты"),
                post_link(&self.channel, post.id)
            ));
            let targets = self.extractor.extract(&post.text);
            for target in &targets {
                out.push_str(&format!("**Целевая цена:** {target}\n"));
            }
            if !targets.is_empty() {
                out.push('\n');
            }
            out.push_str(&quote(&post.text));
            out.push('\n');
        }
        out
    }

    /// Body of the market digest section.
    #[must_use]
    pub fn market_digest(&self, posts: &[Post]) -> String {
        let mut out = format!("**Всего постов:** {}\n", posts.len());
        for post in newest_first(posts) {
            out.push_str(&format!(
                "\n### {}\n[Источник]({})\n\n{}\n",
                post.date.as_deref().unwrap_or("без даты"),
                post_link(&self.channel, post.id),
                quote(&post.text)
            ));
        }
        out
    }

    fn skeleton(&self, ticker: &Ticker, name: &str, today: NaiveDate) -> String {
        format!(
            "---\nticker: {ticker}\ncompany: {name}\nupdated: {today}\n\
             source: '@{channel}'\n---\n\n\
             # Внешние мнения: {name} ({ticker})\n\n\
             Мнения из Telegram-канала [@{channel}](https://t.me/{channel}).\n\n",
            channel = self.channel
        )
    }

    fn digest_skeleton(&self, today: NaiveDate) -> String {
        format!(
            "---\nupdated: {today}\nsource: '@{channel}'\n---\n\n# Рыночные посты @{channel}\n\n\
             Посты о рынке в целом, без упоминания конкретных компаний.\n\n",
            channel = self.channel
        )
    }

    /// Regenerates `opinions.md` of one ticker.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be read or written.
    pub fn write_opinions(
        &self,
        kb: &KnowledgeBase,
        ticker: &Ticker,
        posts: &[Post],
        today: NaiveDate,
    ) -> Result<DocOutcome> {
        let name = kb
            .company_name(ticker)
            .unwrap_or_else(|| self.registry.display_name(ticker));
        TEMPLATE.regenerate_file(
            &kb.company_file(ticker, OPINIONS_DOC),
            || self.skeleton(ticker, &name, today),
            &[(MENTIONS_HEADING, self.mentions(posts))],
            today,
        )
    }

    /// Writes a stub `_index.md` unless the company already has one.
    ///
    /// # Errors
    ///
    /// Returns an error if the stub cannot be written.
    pub fn ensure_stub(
        &self,
        kb: &KnowledgeBase,
        ticker: &Ticker,
        today: NaiveDate,
    ) -> Result<bool> {
        let path = kb.index_path(ticker);
        if path.exists() {
            return Ok(false);
        }
        let name = self.registry.display_name(ticker);
        write_file(&path, stub_index(ticker, &name, today))?;
        info!(%ticker, "created company stub");
        Ok(true)
    }

    /// Writes everything for grouped posts. Failures of one ticker are
    /// logged and counted; they do not stop the run.
    ///
    /// # Errors
    ///
    /// Returns an error only if the market digest cannot be written.
    pub fn generate(
        &self,
        kb: &KnowledgeBase,
        groups: &TickerGroups,
        today: NaiveDate,
    ) -> Result<OpinionsReport> {
        let mut report = OpinionsReport::default();
        for (ticker, posts) in &groups.by_ticker {
            if kb.is_excluded(ticker) {
                continue;
            }
            let result = self.ensure_stub(kb, ticker, today).and_then(|stub| {
                self.write_opinions(kb, ticker, posts, today)
                    .map(|outcome| (stub, outcome))
            });
            match result {
                Ok((stub, outcome)) => {
                    report.stubs += usize::from(stub);
                    if outcome == DocOutcome::Unchanged {
                        report.unchanged += 1;
                    } else {
                        report.written += 1;
                    }
                    info!(%ticker, posts = posts.len(), %outcome, "opinions");
                }
                Err(e) => {
                    warn!(%ticker, error = %e, "failed to write opinions");
                    report.failed += 1;
                }
            }
        }

        if !groups.market.is_empty() {
            DIGEST_TEMPLATE.regenerate_file(
                &kb.root().join(MARKET_DIGEST_FILE),
                || self.digest_skeleton(today),
                &[(MARKET_POSTS_HEADING, self.market_digest(&groups.market))],
                today,
            )?;
            report.market_posts = groups.market.len();
        }
        Ok(report)
    }
}
