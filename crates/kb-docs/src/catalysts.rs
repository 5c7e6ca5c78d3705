//! `catalysts.json`: risks, opportunities and central bank meetings.
//!
//! Impact and magnitude come from a [`CatalystClassifier`]. The default
//! [`KeywordHeuristic`] only looks for keyword stems; it is a rough label,
//! not a scoring model.

use crate::document::DocOutcome;
use chrono::NaiveDate;
use kb_core::{Artifact, FrontMatter, Result, Ticker};
use kb_store::KnowledgeBase;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::{debug, warn};

/// Output file name under `data/`.
pub const CATALYSTS_FILE: &str = "catalysts.json";

/// Front-matter list of opportunities.
pub const OPPORTUNITIES_KEY: &str = "key_opportunities";
/// Front-matter list of risks.
pub const RISKS_KEY: &str = "key_risks";

/// Hex digits kept from the digest.
const ID_LEN: usize = 12;

const CB_MEETING_DESCRIPTION: &str = "Заседание ЦБ по ключевой ставке";

/// Stems that make a catalyst high magnitude.
pub const HIGH_MAGNITUDE_KEYWORDS: &[&str] = &[
    "санкц",
    "ставк",
    "ЦБ",
    "дивиденд",
    "SDN",
    "OFAC",
    "делистинг",
    "национализ",
    "IPO",
    "SPO",
    "buyback",
];

/// Stems of wording that cuts both ways.
pub const AMBIGUOUS_KEYWORDS: &[&str] = &[
    "неопредел",
    "как позитив",
    "двояк",
    "либо",
    "или негатив",
    "может как",
];

/// Stems of monetary easing.
pub const EASING_KEYWORDS: &[&str] = &["снижени", "смягчени", "снизит"];

/// Stems of monetary tightening.
pub const TIGHTENING_KEYWORDS: &[&str] = &["повышени", "ужесточени", "повысит"];

/// Catalyst origin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalystKind {
    /// From `key_opportunities`.
    Opportunity,
    /// From `key_risks`.
    Risk,
    /// A central bank rate meeting.
    #[serde(rename = "cb_meeting")]
    CentralBankMeeting,
}

impl CatalystKind {
    /// Serialized name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Opportunity => "opportunity",
            Self::Risk => "risk",
            Self::CentralBankMeeting => "cb_meeting",
        }
    }
}

impl fmt::Display for CatalystKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Expected direction of the price effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Impact {
    /// Upside.
    Positive,
    /// Downside.
    Negative,
    /// Either way.
    Mixed,
}

/// Expected size of the price effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Magnitude {
    /// Large.
    High,
    /// Default.
    Medium,
}

/// Where a catalyst was read from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalystSource {
    /// The company `_index.md`.
    Index,
    /// `russia/macro.md`.
    Macro,
}

/// One catalyst.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalyst {
    /// Stable short id.
    pub id: String,
    /// Origin.
    #[serde(rename = "type")]
    pub kind: CatalystKind,
    /// Direction.
    pub impact: Impact,
    /// Size.
    pub magnitude: Magnitude,
    /// Expected date, if known.
    pub date: Option<NaiveDate>,
    /// Text of the catalyst.
    pub description: String,
    /// Source document.
    pub source: CatalystSource,
}

/// Counts per impact.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalystSummary {
    /// All catalysts.
    pub total: usize,
    /// Positive ones.
    pub positive: usize,
    /// Negative ones.
    pub negative: usize,
    /// Mixed ones.
    pub mixed: usize,
}

impl CatalystSummary {
    /// Counts a list.
    #[must_use]
    pub fn from_catalysts(catalysts: &[Catalyst]) -> Self {
        let count = |impact: Impact| catalysts.iter().filter(|c| c.impact == impact).count();
        Self {
            total: catalysts.len(),
            positive: count(Impact::Positive),
            negative: count(Impact::Negative),
            mixed: count(Impact::Mixed),
        }
    }
}

/// Contents of `catalysts.json`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalystsFile {
    /// Company ticker.
    pub ticker: Ticker,
    /// Company name.
    pub company_name: String,
    /// Generation date.
    pub generated: NaiveDate,
    /// Catalysts: opportunities, risks, then meetings.
    pub catalysts: Vec<Catalyst>,
    /// Counts per impact.
    pub summary: CatalystSummary,
}

impl CatalystsFile {
    /// Returns true if both files list the same catalysts, whatever their
    /// generation dates.
    #[must_use]
    pub fn same_content(&self, other: &Self) -> bool {
        self.ticker == other.ticker
            && self.company_name == other.company_name
            && self.catalysts == other.catalysts
            && self.summary == other.summary
    }
}

/// Assigns impact and magnitude to catalyst text.
pub trait CatalystClassifier: fmt::Debug + Send + Sync {
    /// Direction of a catalyst.
    fn impact(&self, kind: CatalystKind, text: &str) -> Impact;

    /// Size of a catalyst.
    fn magnitude(&self, kind: CatalystKind, text: &str) -> Magnitude;
}

/// Keyword-stem heuristic.
///
/// Opportunities are positive and risks negative unless the wording is
/// ambiguous. Meetings are positive or negative only when the text talks
/// about easing or tightening alone. Any high-magnitude stem makes the
/// catalyst high, everything else is medium.
#[derive(Clone, Debug)]
pub struct KeywordHeuristic {
    high: Vec<String>,
    ambiguous: Vec<String>,
    easing: Vec<String>,
    tightening: Vec<String>,
}

fn lowered(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_lowercase()).collect()
}

impl Default for KeywordHeuristic {
    fn default() -> Self {
        Self {
            high: lowered(HIGH_MAGNITUDE_KEYWORDS),
            ambiguous: lowered(AMBIGUOUS_KEYWORDS),
            easing: lowered(EASING_KEYWORDS),
            tightening: lowered(TIGHTENING_KEYWORDS),
        }
    }
}

impl KeywordHeuristic {
    /// Replaces the high-magnitude stems.
    #[must_use]
    pub fn with_high_magnitude<I, S>(mut self, stems: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.high = stems.into_iter().map(|s| s.as_ref().to_lowercase()).collect();
        self
    }

    fn mentions(words: &[String], text: &str) -> bool {
        words.iter().any(|w| text.contains(w.as_str()))
    }
}

impl CatalystClassifier for KeywordHeuristic {
    fn impact(&self, kind: CatalystKind, text: &str) -> Impact {
        let text = text.to_lowercase();
        match kind {
            _ if Self::mentions(&self.ambiguous, &text) => Impact::Mixed,
            CatalystKind::Opportunity => Impact::Positive,
            CatalystKind::Risk => Impact::Negative,
            CatalystKind::CentralBankMeeting => {
                let easing = Self::mentions(&self.easing, &text);
                let tightening = Self::mentions(&self.tightening, &text);
                match (easing, tightening) {
                    (true, false) => Impact::Positive,
                    (false, true) => Impact::Negative,
                    _ => Impact::Mixed,
                }
            }
        }
    }

    fn magnitude(&self, _kind: CatalystKind, text: &str) -> Magnitude {
        let text = text.to_lowercase();
        if Self::mentions(&self.high, &text) {
            Magnitude::High
        } else {
            Magnitude::Medium
        }
    }
}

/// Short SHA-256 id of a catalyst. The date takes part for dated
/// catalysts so that meetings with the same wording stay distinct.
#[must_use]
pub fn catalyst_id(
    ticker: &Ticker,
    kind: CatalystKind,
    description: &str,
    date: Option<NaiveDate>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ticker.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(kind.as_str().as_bytes());
    hasher.update([0]);
    hasher.update(description.as_bytes());
    if let Some(date) = date {
        hasher.update([0]);
        hasher.update(date.to_string().as_bytes());
    }
    let mut id = hex::encode(hasher.finalize());
    id.truncate(ID_LEN);
    id
}

fn classify(
    classifier: &dyn CatalystClassifier,
    ticker: &Ticker,
    kind: CatalystKind,
    description: &str,
    date: Option<NaiveDate>,
    source: CatalystSource,
) -> Catalyst {
    Catalyst {
        id: catalyst_id(ticker, kind, description, date),
        kind,
        impact: classifier.impact(kind, description),
        magnitude: classifier.magnitude(kind, description),
        date,
        description: description.to_string(),
        source,
    }
}

/// Catalysts of one company: opportunities, risks, then meetings.
#[must_use]
pub fn build_catalysts(
    ticker: &Ticker,
    front: &FrontMatter,
    cb_meetings: &[NaiveDate],
    classifier: &dyn CatalystClassifier,
) -> Vec<Catalyst> {
    let listed = |key: &str, kind: CatalystKind| {
        front
            .list(key)
            .into_iter()
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(move |item| classify(classifier, ticker, kind, item, None, CatalystSource::Index))
            .collect::<Vec<_>>()
    };

    let mut catalysts = listed(OPPORTUNITIES_KEY, CatalystKind::Opportunity);
    catalysts.extend(listed(RISKS_KEY, CatalystKind::Risk));
    catalysts.extend(cb_meetings.iter().map(|date| {
        classify(
            classifier,
            ticker,
            CatalystKind::CentralBankMeeting,
            CB_MEETING_DESCRIPTION,
            Some(*date),
            CatalystSource::Macro,
        )
    }));
    catalysts
}

/// Writes `data/catalysts.json` of one company.
///
/// Returns `None`, writing nothing, when the company has no `_index.md` or
/// no catalysts. An existing file listing the same catalysts is left as is
/// and reported as [`DocOutcome::Unchanged`].
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn generate_catalysts(
    kb: &KnowledgeBase,
    ticker: &Ticker,
    cb_meetings: &[NaiveDate],
    classifier: &dyn CatalystClassifier,
    today: NaiveDate,
) -> Result<Option<(DocOutcome, CatalystsFile)>> {
    let Some(front) = kb.front_matter(ticker) else {
        debug!(%ticker, "no company front-matter");
        return Ok(None);
    };
    let catalysts = build_catalysts(ticker, &front, cb_meetings, classifier);
    if catalysts.is_empty() {
        debug!(%ticker, "no catalysts");
        return Ok(None);
    }

    let file = CatalystsFile {
        ticker: ticker.clone(),
        company_name: front
            .get("name")
            .map_or_else(|| ticker.to_string(), str::to_string),
        generated: today,
        summary: CatalystSummary::from_catalysts(&catalysts),
        catalysts,
    };

    let existed = kb.data_file(ticker, CATALYSTS_FILE).exists();
    let previous = kb
        .read_json::<CatalystsFile>(ticker, CATALYSTS_FILE)
        .unwrap_or_else(|e| {
            warn!(%ticker, error = %e, "unreadable catalysts file, rewriting");
            None
        });
    if let Some(previous) = previous.filter(|p| p.same_content(&file)) {
        debug!(%ticker, "catalysts unchanged");
        return Ok(Some((DocOutcome::Unchanged, previous)));
    }

    kb.write_artifacts(ticker, &[Artifact::json(CATALYSTS_FILE, &file)?])?;
    let outcome = if existed {
        DocOutcome::Updated
    } else {
        DocOutcome::Created
    };
    Ok(Some((outcome, file)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kb_core::testing::ScratchDir;

    fn heuristic() -> KeywordHeuristic {
        KeywordHeuristic::default()
    }

    #[test]
    fn test_risk_with_negative_wording_is_negative() {
        let h = heuristic();
        let margin = "Падение маржи из-за роста издержек";
        let sanctions = "Санкционное давление на экспорт";
        assert_eq!(h.impact(CatalystKind::Risk, margin), Impact::Negative);
        assert_eq!(h.impact(CatalystKind::Risk, sanctions), Impact::Negative);
        assert_eq!(h.magnitude(CatalystKind::Risk, sanctions), Magnitude::High);
    }

    #[test]
    fn test_opportunity_defaults_to_medium() {
        let h = heuristic();
        assert_eq!(h.impact(CatalystKind::Opportunity, "Рост доли рынка"), Impact::Positive);
        assert_eq!(h.magnitude(CatalystKind::Opportunity, "Рост доли рынка"), Magnitude::Medium);
        assert_eq!(h.magnitude(CatalystKind::Opportunity, "Рост дивидендов"), Magnitude::High);
        assert_eq!(h.magnitude(CatalystKind::Opportunity, "решение цб"), Magnitude::High);
    }

    #[test]
    fn test_ambiguous_and_meetings() {
        let h = heuristic();
        assert_eq!(
            h.impact(CatalystKind::Opportunity, "Реформа НДПИ: эффект неопределенный"),
            Impact::Mixed
        );
        let meeting = CatalystKind::CentralBankMeeting;
        assert_eq!(h.impact(meeting, CB_MEETING_DESCRIPTION), Impact::Mixed);
        assert_eq!(h.impact(meeting, "Ожидаем снижение ставки"), Impact::Positive);
        assert_eq!(h.impact(meeting, "Риск повышения ставки"), Impact::Negative);
        assert_eq!(h.magnitude(meeting, CB_MEETING_DESCRIPTION), Magnitude::High);

        let custom = heuristic().with_high_magnitude(["маржа"]);
        assert_eq!(custom.magnitude(CatalystKind::Risk, "Санкции"), Magnitude::Medium);
    }

    #[test]
    fn test_ids_are_stable_and_distinct() {
        let t = Ticker::new("SBER");
        let a = catalyst_id(&t, CatalystKind::Risk, "Санкции", None);
        assert_eq!(a.len(), ID_LEN);
        assert_eq!(a, catalyst_id(&t, CatalystKind::Risk, "Санкции", None));
        assert_ne!(a, catalyst_id(&t, CatalystKind::Opportunity, "Санкции", None));
        assert_ne!(a, catalyst_id(&Ticker::new("VTBR"), CatalystKind::Risk, "Санкции", None));
        let d = NaiveDate::from_ymd_opt(2026, 2, 13);
        let next = d.and_then(|d| d.succ_opt());
        assert_ne!(
            catalyst_id(&t, CatalystKind::CentralBankMeeting, CB_MEETING_DESCRIPTION, d),
            catalyst_id(&t, CatalystKind::CentralBankMeeting, CB_MEETING_DESCRIPTION, next)
        );
    }

    #[test]
    fn test_generate_writes_file_and_summary() {
        let dir = ScratchDir::new("kb-docs-catalysts").unwrap();
        dir.write(
            "companies/LKOH/_index.md",
            "---\nticker: LKOH\nname: Лукойл\nkey_opportunities:\n  - Buyback нерезидентов\n  \
             - Рост добычи\nkey_risks: [Санкции на экспорт, Налоговая нагрузка]\n---\n",
        )
        .unwrap();
        dir.write("companies/EMPTY/_index.md", "---\nticker: EMPTY\n---\n").unwrap();
        let kb = KnowledgeBase::new(dir.path());
        let today = NaiveDate::from_ymd_opt(2026, 1, 10).unwrap();
        let meetings = [NaiveDate::from_ymd_opt(2026, 2, 13).unwrap()];

        let (outcome, file) =
            generate_catalysts(&kb, &Ticker::new("LKOH"), &meetings, &heuristic(), today)
                .unwrap()
                .unwrap();
        assert_eq!(outcome, DocOutcome::Created);
        assert_eq!(file.company_name, "Лукойл");
        assert_eq!(
            file.summary,
            CatalystSummary {
                total: 5,
                positive: 2,
                negative: 2,
                mixed: 1
            }
        );
        let kinds: Vec<_> = file.catalysts.iter().map(|c| c.kind).collect();
        assert_eq!(kinds[0], CatalystKind::Opportunity);
        assert_eq!(kinds[4], CatalystKind::CentralBankMeeting);
        assert_eq!(file.catalysts[0].magnitude, Magnitude::High);
        assert_eq!(file.catalysts[1].magnitude, Magnitude::Medium);
        assert_eq!(file.catalysts[3].magnitude, Magnitude::Medium);

        let path = kb.data_file(&Ticker::new("LKOH"), CATALYSTS_FILE);
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written["catalysts"][4]["type"], "cb_meeting");
        assert_eq!(written["catalysts"][4]["source"], "macro");
        assert_eq!(written["catalysts"][0]["date"], serde_json::Value::Null);
        assert_eq!(written["summary"]["mixed"], 1);

        let empty = generate_catalysts(&kb, &Ticker::new("EMPTY"), &[], &heuristic(), today);
        assert!(empty.unwrap().is_none());
        let none = generate_catalysts(&kb, &Ticker::new("NONE"), &meetings, &heuristic(), today);
        assert!(none.unwrap().is_none());
    }

    #[test]
    fn test_regeneration_reports_unchanged() {
        let dir = ScratchDir::new("kb-docs-catalysts-rerun").unwrap();
        dir.write(
            "companies/SBER/_index.md",
            "---\nticker: SBER\nname: Сбербанк\nkey_risks: [Снижение ставки]\n---\n",
        )
        .unwrap();
        let kb = KnowledgeBase::new(dir.path());
        let sber = Ticker::new("SBER");
        let first_day = NaiveDate::from_ymd_opt(2026, 1, 10).unwrap();
        let next_day = NaiveDate::from_ymd_opt(2026, 1, 11).unwrap();
        let path = kb.data_file(&sber, CATALYSTS_FILE);

        let (outcome, _) =
            generate_catalysts(&kb, &sber, &[], &heuristic(), first_day).unwrap().unwrap();
        assert_eq!(outcome, DocOutcome::Created);
        let written = std::fs::read_to_string(&path).unwrap();

        let (outcome, file) =
            generate_catalysts(&kb, &sber, &[], &heuristic(), next_day).unwrap().unwrap();
        assert_eq!(outcome, DocOutcome::Unchanged);
        assert_eq!(file.generated, first_day);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), written);

        dir.write(
            "companies/SBER/_index.md",
            "---\nticker: SBER\nname: Сбербанк\nkey_risks: [Снижение ставки, Рост резервов]\n---\n",
        )
        .unwrap();
        let (outcome, file) =
            generate_catalysts(&kb, &sber, &[], &heuristic(), next_day).unwrap().unwrap();
        assert_eq!(outcome, DocOutcome::Updated);
        assert_eq!(file.summary.total, 2);
        assert!(std::fs::read_to_string(&path).unwrap().contains("2026-01-11"));
    }
}
