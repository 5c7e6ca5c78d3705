//! Run configuration.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;
use kb_report::{DEFAULT_TOP_N, Thresholds};

/// Environment variable holding the knowledge base root.
pub const ROOT_ENV: &str = "KB_ROOT";

pub use kb_sanctions::API_KEY_ENV;

/// Minimum spacing between requests, per provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProviderDelays {
    /// smart-lab.ru exports.
    pub smartlab: Duration,
    /// MOEX ISS.
    pub moex: Duration,
    /// OpenSanctions search.
    pub sanctions: Duration,
    /// Telegram channel previews.
    pub telegram: Duration,
}

impl Default for ProviderDelays {
    fn default() -> Self {
        Self {
            smartlab: Duration::from_millis(1500),
            moex: Duration::from_millis(500),
            sanctions: Duration::from_secs(1),
            telegram: Duration::from_millis(1500),
        }
    }
}

/// Everything a stage needs besides its own arguments.
#[derive(Clone, PartialEq, Eq)]
pub struct KbConfig {
    /// Knowledge base root.
    pub root: PathBuf,
    /// OpenSanctions API key.
    pub sanctions_api_key: Option<String>,
    /// Request pacing.
    pub delays: ProviderDelays,
    /// Date of the run.
    pub today: NaiveDate,
    /// Staleness thresholds.
    pub thresholds: Thresholds,
    /// Size of the upside ranking.
    pub top_n: usize,
}

impl fmt::Debug for KbConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KbConfig")
            .field("root", &self.root)
            .field("sanctions_api_key", &self.sanctions_api_key.as_ref().map(|_| "[REDACTED]"))
            .field("delays", &self.delays)
            .field("today", &self.today)
            .field("thresholds", &self.thresholds)
            .field("top_n", &self.top_n)
            .finish()
    }
}

impl KbConfig {
    /// Defaults for a knowledge base at `root`, running on `today`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, today: NaiveDate) -> Self {
        Self {
            root: root.into(),
            sanctions_api_key: None,
            delays: ProviderDelays::default(),
            today,
            thresholds: Thresholds::default(),
            top_n: DEFAULT_TOP_N,
        }
    }

    /// Defaults with the root and API key taken from the environment.
    ///
    /// The root falls back to the current directory.
    #[must_use]
    pub fn from_env(today: NaiveDate) -> Self {
        let root = std::env::var(ROOT_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| ".".into());
        Self::new(root, today).with_sanctions_api_key(std::env::var(API_KEY_ENV).ok())
    }

    /// Sets the API key; blank keys count as absent.
    #[must_use]
    pub fn with_sanctions_api_key(mut self, key: Option<String>) -> Self {
        self.sanctions_api_key = key.map(|k| k.trim().to_string()).filter(|k| !k.is_empty());
        self
    }

    /// Sets the request pacing.
    #[must_use]
    pub const fn with_delays(mut self, delays: ProviderDelays) -> Self {
        self.delays = delays;
        self
    }

    /// Sets the staleness thresholds.
    #[must_use]
    pub const fn with_thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Sets the ranking size.
    #[must_use]
    pub const fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 15).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = KbConfig::new("/kb", today());
        assert_eq!(config.delays.smartlab, Duration::from_millis(1500));
        assert_eq!(config.delays.moex, Duration::from_millis(500));
        assert_eq!(config.thresholds.events, 30);
        assert_eq!(config.top_n, 10);
        assert_eq!(config.sanctions_api_key, None);
    }

    #[test]
    fn test_blank_key_is_absent() {
        let config = KbConfig::new(".", today()).with_sanctions_api_key(Some("  ".into()));
        assert_eq!(config.sanctions_api_key, None);
        let config = config.with_sanctions_api_key(Some(" k1 ".into()));
        assert_eq!(config.sanctions_api_key.as_deref(), Some("k1"));
    }

    #[test]
    fn test_debug_redacts_key() {
        let config = KbConfig::new(".", today()).with_sanctions_api_key(Some("secret".into()));
        let debug = format!("{config:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("secret"));
    }
}
