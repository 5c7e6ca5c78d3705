//! Directory layout and ticker discovery.

use kb_core::{Artifact, FrontMatter, KbError, Result, Ticker};
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, warn};

use crate::freshness::is_fresh;

/// Directory holding one sub-directory per company.
pub const COMPANIES_DIR: &str = "companies";
/// Company front-matter document.
pub const INDEX_FILE: &str = "_index.md";
/// Per-company directory of fetched artifacts.
pub const DATA_DIR: &str = "data";
/// Macro calendar document, relative to the root.
pub const MACRO_FILE: &str = "russia/macro.md";
/// Market snapshot artifact, read back for short names.
pub const MARKET_FILE: &str = "moex_market.json";

/// A knowledge base rooted at a directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KnowledgeBase {
    root: PathBuf,
}

impl KnowledgeBase {
    /// Creates a handle without touching the filesystem.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Opens an existing knowledge base.
    ///
    /// # Errors
    ///
    /// Returns [`KbError::Config`] if `root` has no `companies/` directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let kb = Self::new(root);
        if !kb.companies_dir().is_dir() {
            return Err(KbError::Config(format!(
                "{} is not a knowledge base: missing {COMPANIES_DIR}/",
                kb.root.display()
            )));
        }
        Ok(kb)
    }

    /// Root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `companies/`.
    #[must_use]
    pub fn companies_dir(&self) -> PathBuf {
        self.root.join(COMPANIES_DIR)
    }

    /// `companies/<TICKER>/`.
    #[must_use]
    pub fn company_dir(&self, ticker: &Ticker) -> PathBuf {
        self.companies_dir().join(ticker.as_str())
    }

    /// `companies/<TICKER>/<file_name>`.
    #[must_use]
    pub fn company_file(&self, ticker: &Ticker, file_name: &str) -> PathBuf {
        self.company_dir(ticker).join(file_name)
    }

    /// `companies/<TICKER>/data/`.
    #[must_use]
    pub fn data_dir(&self, ticker: &Ticker) -> PathBuf {
        self.company_dir(ticker).join(DATA_DIR)
    }

    /// `companies/<TICKER>/data/<file_name>`.
    #[must_use]
    pub fn data_file(&self, ticker: &Ticker, file_name: &str) -> PathBuf {
        self.data_dir(ticker).join(file_name)
    }

    /// `companies/<TICKER>/_index.md`.
    #[must_use]
    pub fn index_path(&self, ticker: &Ticker) -> PathBuf {
        self.company_file(ticker, INDEX_FILE)
    }

    /// `russia/macro.md`.
    #[must_use]
    pub fn macro_path(&self) -> PathBuf {
        self.root.join(MACRO_FILE)
    }

    /// Root-level `data/<file_name>`.
    #[must_use]
    pub fn shared_data_file(&self, file_name: &str) -> PathBuf {
        self.root.join(DATA_DIR).join(file_name)
    }

    /// Returns true if `companies/<TICKER>/` exists.
    #[must_use]
    pub fn has_company(&self, ticker: &Ticker) -> bool {
        self.company_dir(ticker).is_dir()
    }

    /// Lists every company directory, including delisted ones, sorted.
    ///
    /// Directories starting with `_` or `.` are templates and never listed.
    ///
    /// # Errors
    ///
    /// Returns an error if `companies/` cannot be read.
    pub fn company_tickers(&self) -> Result<Vec<Ticker>> {
        let mut tickers = Vec::new();
        for entry in std::fs::read_dir(self.companies_dir())? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_template_name(&name) {
                continue;
            }
            tickers.push(Ticker::new(name));
        }
        tickers.sort();
        Ok(tickers)
    }

    /// Lists the tickers a batch should visit by default: every company
    /// directory that is not excluded.
    ///
    /// # Errors
    ///
    /// Returns an error if `companies/` cannot be read.
    #[instrument(skip(self), fields(root = %self.root.display()))]
    pub fn discover_tickers(&self) -> Result<Vec<Ticker>> {
        let all = self.company_tickers()?;
        let total = all.len();
        let active: Vec<Ticker> = all.into_iter().filter(|t| !self.is_excluded(t)).collect();
        debug!(total, active = active.len(), "discovered tickers");
        Ok(active)
    }

    /// Resolves the tickers of a batch.
    ///
    /// Explicit tickers are uppercased and deduplicated in the order given;
    /// an empty list means every discovered ticker.
    ///
    /// # Errors
    ///
    /// Returns [`KbError::Config`] if an explicit ticker has no company
    /// directory. This happens before any network activity.
    pub fn resolve_tickers(&self, explicit: &[String]) -> Result<Vec<Ticker>> {
        if explicit.is_empty() {
            return self.discover_tickers();
        }
        let mut seen = HashSet::new();
        let mut tickers = Vec::new();
        for raw in explicit {
            let ticker = Ticker::new(raw.as_str());
            if ticker.as_str().is_empty() {
                return Err(KbError::InvalidParameter("empty ticker".into()));
            }
            if !self.has_company(&ticker) {
                return Err(KbError::Config(format!(
                    "unknown ticker {ticker}: {} does not exist",
                    self.company_dir(&ticker).display()
                )));
            }
            if seen.insert(ticker.clone()) {
                tickers.push(ticker);
            }
        }
        Ok(tickers)
    }

    /// Returns true if a ticker is never processed: template directories
    /// and companies marked delisted.
    #[must_use]
    pub fn is_excluded(&self, ticker: &Ticker) -> bool {
        is_template_name(ticker.as_str())
            || self
                .front_matter(ticker)
                .is_some_and(|fm| fm.is_delisted())
    }

    /// Parses the front-matter of `_index.md`.
    #[must_use]
    pub fn front_matter(&self, ticker: &Ticker) -> Option<FrontMatter> {
        let content = std::fs::read_to_string(self.index_path(ticker)).ok()?;
        FrontMatter::parse(&content)
    }

    /// `name` from the company front-matter.
    #[must_use]
    pub fn company_name(&self, ticker: &Ticker) -> Option<String> {
        self.front_matter(ticker)
            .and_then(|fm| fm.get("name").map(str::to_string))
    }

    /// Exchange short name from the last market snapshot.
    #[must_use]
    pub fn short_name(&self, ticker: &Ticker) -> Option<String> {
        let value: serde_json::Value = self.read_json(ticker, MARKET_FILE).ok().flatten()?;
        value
            .get("shortname")
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    /// Reads and decodes `data/<file_name>`. A missing file is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or decoded.
    pub fn read_json<T: DeserializeOwned>(
        &self,
        ticker: &Ticker,
        file_name: &str,
    ) -> Result<Option<T>> {
        let path = self.data_file(ticker, file_name);
        let Some(content) = read_optional(&path)? else {
            return Ok(None);
        };
        serde_json::from_str(&content).map(Some).map_err(|e| {
            KbError::Schema {
                provider: file_name.to_string(),
                reason: format!("{}: {e}", path.display()),
            }
        })
    }

    /// Returns true if every artifact of a ticker was written today.
    #[must_use]
    pub fn is_fresh(&self, ticker: &Ticker, file_names: &[&str], today: chrono::NaiveDate) -> bool {
        let paths: Vec<PathBuf> = file_names
            .iter()
            .map(|name| self.data_file(ticker, name))
            .collect();
        is_fresh(&paths, today)
    }

    /// Writes fetched artifacts to `data/`, replacing previous versions.
    ///
    /// # Errors
    ///
    /// Returns an error if a file cannot be written.
    pub fn write_artifacts(&self, ticker: &Ticker, artifacts: &[Artifact]) -> Result<()> {
        for artifact in artifacts {
            let path = self.data_file(ticker, artifact.file_name);
            write_file(&path, &artifact.contents)?;
            debug!(
                %ticker,
                path = %path.display(),
                bytes = artifact.contents.len(),
                "wrote artifact"
            );
        }
        Ok(())
    }

    /// Removes `data/<file_name>` if present.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn remove_data_file(&self, ticker: &Ticker, file_name: &str) -> Result<bool> {
        let path = self.data_file(ticker, file_name);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to remove file");
                Err(e.into())
            }
        }
    }
}

/// Returns true for reserved directory names (`_TEMPLATE`, `.git`, ...).
#[must_use]
pub fn is_template_name(name: &str) -> bool {
    name.starts_with('_') || name.starts_with('.')
}

/// Reads a file to a string; a missing file is `Ok(None)`.
///
/// # Errors
///
/// Returns an error for any failure other than the file not existing.
pub fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Writes a file, creating parent directories.
///
/// # Errors
///
/// Returns an error if a directory or the file cannot be written.
pub fn write_file(path: &Path, contents: impl AsRef<[u8]>) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;
    use kb_core::testing::ScratchDir;

    fn fixture() -> ScratchDir {
        let dir = ScratchDir::new("kb-store").unwrap();
        dir.write("companies/SBER/_index.md", "---\nticker: SBER\nname: Сбербанк\n---\n")
            .unwrap();
        dir.write("companies/GAZP/_index.md", "---\nticker: GAZP\n---\n").unwrap();
        dir.write("companies/YNDX/_index.md", "---\nticker: YNDX\nstatus: delisted\n---\n")
            .unwrap();
        dir.write("companies/QIWI/_index.md", "---\ndelisted: true\n---\n").unwrap();
        dir.write("companies/_TEMPLATE/_index.md", "---\nticker:\n---\n").unwrap();
        dir.write("companies/.hidden/x", "").unwrap();
        dir.write("companies/README.md", "not a company").unwrap();
        dir
    }

    #[test]
    fn test_discover_skips_templates_and_delisted() {
        let dir = fixture();
        let kb = KnowledgeBase::open(dir.path()).unwrap();
        let tickers = kb.discover_tickers().unwrap();
        assert_eq!(tickers, vec![Ticker::new("GAZP"), Ticker::new("SBER")]);
        assert_eq!(kb.company_tickers().unwrap().len(), 4);
    }

    #[test]
    fn test_resolve_explicit_uppercases_and_fails_fast() {
        let dir = fixture();
        let kb = KnowledgeBase::open(dir.path()).unwrap();

        let tickers = kb
            .resolve_tickers(&["sber".into(), "SBER".into(), "gazp".into()])
            .unwrap();
        assert_eq!(tickers, vec![Ticker::new("SBER"), Ticker::new("GAZP")]);

        let err = kb.resolve_tickers(&["SBER".into(), "NOPE".into()]).unwrap_err();
        assert!(matches!(err, KbError::Config(_)));
        assert!(!err.is_ticker_scoped());
    }

    #[test]
    fn test_open_requires_companies_dir() {
        let dir = ScratchDir::new("kb-store").unwrap();
        assert!(matches!(KnowledgeBase::open(dir.path()), Err(KbError::Config(_))));
    }

    #[test]
    fn test_names_and_artifacts() {
        let dir = fixture();
        let kb = KnowledgeBase::open(dir.path()).unwrap();
        let sber = Ticker::new("SBER");
        assert_eq!(kb.company_name(&sber).as_deref(), Some("Сбербанк"));
        assert_eq!(kb.short_name(&sber), None);

        let today = Local::now().date_naive();
        assert!(!kb.is_fresh(&sber, &[MARKET_FILE], today));

        let artifact =
            Artifact::json(MARKET_FILE, &serde_json::json!({"shortname": "Сбербанк"})).unwrap();
        kb.write_artifacts(&sber, &[artifact]).unwrap();
        assert_eq!(kb.short_name(&sber).as_deref(), Some("Сбербанк"));
        assert!(kb.is_fresh(&sber, &[MARKET_FILE], today));

        assert!(kb.remove_data_file(&sber, MARKET_FILE).unwrap());
        assert!(!kb.remove_data_file(&sber, MARKET_FILE).unwrap());
    }

    #[test]
    fn test_read_json_reports_schema_errors() {
        let dir = fixture();
        dir.write("companies/SBER/data/broken.json", "{not json").unwrap();
        let kb = KnowledgeBase::open(dir.path()).unwrap();
        let sber = Ticker::new("SBER");

        let missing: Option<serde_json::Value> = kb.read_json(&sber, "absent.json").unwrap();
        assert!(missing.is_none());
        let broken: Result<Option<serde_json::Value>> = kb.read_json(&sber, "broken.json");
        assert!(matches!(broken, Err(KbError::Schema { .. })));
    }
}
