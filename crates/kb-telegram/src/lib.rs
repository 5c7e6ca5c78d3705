#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/kb/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Public channel preview scraper.
//!
//! # Usage
//!
//! ```rust,ignore
//! use kb_telegram::{ChannelScraper, YearRange};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let scraper = ChannelScraper::new(Duration::from_millis(1500))?;
//!     let today = chrono::Local::now().date_naive();
//!     let posts = scraper.scrape("investopit", YearRange::through(2022, today)?).await?;
//!     let added = kb_telegram::merge_into_file("investopit_posts.json".as_ref(), posts)?;
//!     Ok(())
//! }
//! ```

use chrono::{Datelike, NaiveDate};
use kb_core::http::BROWSER_USER_AGENT;
use kb_core::{DataProvider, HttpClient, KbError, Pacer, Post, ReqwestTransport, Result, Transport};
use kb_store::PostCollection;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Preview HTML parsing.
pub mod parse;

pub use parse::{ChannelPage, parse_page, post_id};

/// Provider name used in logs and errors.
pub const PROVIDER_NAME: &str = "Telegram";

const PREVIEW_BASE_URL: &str = "https://t.me/s";

/// Consecutive empty pages after which paging stops.
pub const MAX_EMPTY_PAGES: usize = 3;

/// Upper bound on pages per run.
const MAX_PAGES: usize = 10_000;

/// Inclusive range of publication years to keep.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct YearRange {
    /// First year kept.
    pub from: i32,
    /// Last year kept.
    pub to: i32,
}

impl YearRange {
    /// Creates a range.
    ///
    /// # Errors
    ///
    /// Returns [`KbError::InvalidParameter`] if `from` is after `to`.
    pub fn new(from: i32, to: i32) -> Result<Self> {
        if from > to {
            return Err(KbError::InvalidParameter(format!("year range {from}..{to} is empty")));
        }
        Ok(Self { from, to })
    }

    /// Range from `from` through the year of `today`.
    ///
    /// # Errors
    ///
    /// Returns [`KbError::InvalidParameter`] if `from` is after that year.
    pub fn through(from: i32, today: NaiveDate) -> Result<Self> {
        Self::new(from, today.year())
    }

    /// Returns true if `year` is inside the range.
    #[must_use]
    pub const fn contains(&self, year: i32) -> bool {
        self.from <= year && year <= self.to
    }

    /// January 1st of the first year.
    #[must_use]
    pub fn start_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.from, 1, 1)
    }
}

/// Preview URL of a channel, optionally before a post id.
#[must_use]
pub fn preview_url(channel: &str, before: Option<u64>) -> String {
    match before {
        Some(id) => format!("{PREVIEW_BASE_URL}/{channel}?before={id}"),
        None => format!("{PREVIEW_BASE_URL}/{channel}"),
    }
}

/// Normalizes a channel argument (`@name` or `name`).
///
/// # Errors
///
/// Returns [`KbError::InvalidParameter`] for an empty name.
pub fn channel_name(raw: &str) -> Result<String> {
    let name = raw.trim().trim_start_matches('@');
    if name.is_empty() || name.contains('/') {
        return Err(KbError::InvalidParameter(format!("invalid channel name: {raw:?}")));
    }
    Ok(name.to_string())
}

/// Default output file of a channel.
#[must_use]
pub fn default_output(channel: &str) -> PathBuf {
    PathBuf::from(format!("{channel}_posts.json"))
}

/// Scraper for channel previews.
#[derive(Clone, Debug)]
pub struct ChannelScraper {
    http: HttpClient,
}

impl ChannelScraper {
    /// Creates a scraper over HTTP.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(delay: Duration) -> Result<Self> {
        let transport = ReqwestTransport::new(BROWSER_USER_AGENT)?;
        Ok(Self::with_transport(Arc::new(transport), Pacer::new(delay)))
    }

    /// Creates a scraper on top of a custom transport.
    #[must_use]
    pub fn with_transport(transport: Arc<dyn Transport>, pacer: Pacer) -> Self {
        Self {
            http: HttpClient::new(PROVIDER_NAME, transport, pacer),
        }
    }

    /// Downloads and parses one preview page.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the page is not a channel
    /// preview.
    pub async fn fetch_page(&self, channel: &str, before: Option<u64>) -> Result<ChannelPage> {
        let html = self.http.get_text(&preview_url(channel, before)).await?;
        parse_page(&html)
    }

    /// Collects the posts of a channel published within `years`, newest
    /// first.
    ///
    /// # Errors
    ///
    /// Returns an error if the first page cannot be fetched. Later page
    /// failures end paging with what was collected.
    pub async fn scrape(&self, channel: &str, years: YearRange) -> Result<Vec<Post>> {
        let start = years.start_date();
        let mut collected: BTreeMap<u64, Post> = BTreeMap::new();
        let mut before = None;
        let mut empty_pages = 0;

        for page_no in 0..MAX_PAGES {
            let page = match self.fetch_page(channel, before).await {
                Ok(page) => page,
                Err(e) if page_no == 0 => return Err(e),
                Err(e) => {
                    warn!(channel, ?before, error = %e, "page failed, stopping");
                    break;
                }
            };

            let next = page.min_id.filter(|id| Some(*id) != before);
            if page.posts.is_empty() {
                empty_pages += 1;
                debug!(channel, ?before, empty_pages, "empty page");
                match next {
                    Some(id) if empty_pages < MAX_EMPTY_PAGES => {
                        before = Some(id);
                        continue;
                    }
                    _ => break,
                }
            }
            empty_pages = 0;

            let mut oldest: Option<NaiveDate> = None;
            let mut added = 0usize;
            for post in page.posts {
                let date = post.date.as_deref().and_then(kb_core::types::parse_iso_date);
                if let Some(date) = date {
                    oldest = Some(oldest.map_or(date, |o| o.min(date)));
                }
                // undated posts are kept
                let keep = date.is_none_or(|d| years.contains(d.year()));
                if keep && !collected.contains_key(&post.id) {
                    collected.insert(post.id, post);
                    added += 1;
                }
            }
            debug!(channel, ?before, added, total = collected.len(), ?oldest, "page parsed");

            if let (Some(oldest), Some(start)) = (oldest, start) {
                if oldest < start {
                    debug!(channel, %oldest, "reached posts before the range");
                    break;
                }
            }
            match next {
                Some(id) => before = Some(id),
                None => break,
            }
        }

        info!(channel, posts = collected.len(), "scraped channel");
        Ok(collected.into_values().rev().collect())
    }
}

impl DataProvider for ChannelScraper {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn description(&self) -> &str {
        "Posts from the public web preview of Telegram channels"
    }
}

/// Merges scraped posts into a collection file and saves it.
///
/// Returns the number of posts that were not in the file before.
///
/// # Errors
///
/// Returns an error if the existing file cannot be read or the result
/// cannot be written.
pub fn merge_into_file(path: &Path, posts: Vec<Post>) -> Result<usize> {
    let mut collection = PostCollection::load(path)?;
    let added = collection.merge(posts);
    collection.save(path)?;
    info!(path = %path.display(), added, total = collection.len(), "saved posts");
    Ok(added)
}

/// Number of posts per publication year; undated posts count under `None`.
#[must_use]
pub fn posts_by_year(posts: &[Post]) -> BTreeMap<Option<i32>, usize> {
    let mut counts = BTreeMap::new();
    for post in posts {
        *counts.entry(post.year).or_insert(0) += 1;
    }
    counts
}
