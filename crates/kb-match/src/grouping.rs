//! Posts grouped by the companies they mention.

use kb_core::{Post, Ticker};
use kb_store::dedup_posts;
use std::collections::BTreeMap;
use tracing::debug;

use crate::keywords::is_market_relevant;
use crate::registry::AliasRegistry;

/// Result of matching a post collection.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TickerGroups {
    /// Posts per ticker, in order of appearance.
    pub by_ticker: BTreeMap<Ticker, Vec<Post>>,
    /// Market-relevant posts that name no company, in order of appearance.
    pub market: Vec<Post>,
    /// Distinct posts considered.
    pub total: usize,
}

impl TickerGroups {
    /// Tickers sorted by number of posts, most mentioned first.
    #[must_use]
    pub fn ranked(&self) -> Vec<(&Ticker, usize)> {
        let mut ranked: Vec<_> = self.by_ticker.iter().map(|(t, posts)| (t, posts.len())).collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
    }
}

/// Groups posts by mentioned ticker after dropping repeated ids.
///
/// A post naming several companies is listed under each of them. Posts
/// without text are ignored.
#[must_use]
pub fn group_by_ticker(posts: Vec<Post>, registry: &AliasRegistry) -> TickerGroups {
    let posts = dedup_posts(posts);
    let mut groups = TickerGroups {
        total: posts.len(),
        ..TickerGroups::default()
    };
    for post in posts {
        if post.text.trim().is_empty() {
            continue;
        }
        let tickers = registry.tickers_in(&post.text);
        if tickers.is_empty() {
            if is_market_relevant(&post.text) {
                groups.market.push(post);
            }
            continue;
        }
        for ticker in tickers {
            groups.by_ticker.entry(ticker).or_default().push(post.clone());
        }
    }
    debug!(
        posts = groups.total,
        companies = groups.by_ticker.len(),
        market = groups.market.len(),
        "grouped posts"
    );
    groups
}
