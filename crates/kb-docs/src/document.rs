//! Structured company documents.
//!
//! A document is a front-matter header, a preamble (title and intro) and an
//! ordered list of `## ` sections. [`Document::parse`] and the `Display`
//! impl round-trip byte for byte, so regeneration can swap the bodies of
//! generated sections and leave every other byte as written.

use chrono::NaiveDate;
use kb_core::frontmatter::{header_span, set_scalar};
use kb_core::{FrontMatter, Result};
use kb_store::{read_optional, write_file};
use std::fmt;
use std::path::Path;
use tracing::debug;

const HEADING_PREFIX: &str = "## ";
const FENCE: &str = "```";

/// Front-matter key bumped when generated content changes.
pub const UPDATED_KEY: &str = "updated";

/// Who owns the body of a section.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SectionRole {
    /// Rewritten from data on every run.
    Generated,
    /// Written by hand; only filled in when blank or absent.
    Manual,
}

/// A `## ` section: its heading line and everything up to the next heading.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Section {
    heading: String,
    title: String,
    body: String,
}

impl Section {
    /// Creates a section with a canonical heading line.
    #[must_use]
    pub fn new(title: &str, body: impl Into<String>) -> Self {
        Self {
            heading: format!("{HEADING_PREFIX}{title}\n"),
            title: title.to_string(),
            body: body.into(),
        }
    }

    fn from_heading(line: &str) -> Self {
        Self {
            heading: line.to_string(),
            title: line[HEADING_PREFIX.len()..].trim().to_string(),
            body: String::new(),
        }
    }

    /// Heading text without the `## ` marker.
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Raw body text.
    #[must_use]
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Returns true if the body holds only whitespace.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.body.trim().is_empty()
    }

    /// Returns true if this section carries the given template heading.
    /// Headings may carry a suffix (`## Менеджмент (2025)`).
    #[must_use]
    pub fn matches(&self, title: &str) -> bool {
        self.title.starts_with(title)
    }
}

/// A parsed document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Document {
    header: String,
    preamble: String,
    sections: Vec<Section>,
}

impl Document {
    /// Splits a document into header, preamble and sections.
    ///
    /// Lines starting with `## ` inside fenced code blocks are body text.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let header_end = header_span(text).map_or(0, |span| span.end);
        let (header, rest) = text.split_at(header_end);

        let mut doc = Self {
            header: header.to_string(),
            ..Self::default()
        };
        let mut in_fence = false;
        for line in rest.split_inclusive('\n') {
            if line.trim_start().starts_with(FENCE) {
                in_fence = !in_fence;
            }
            if !in_fence && line.starts_with(HEADING_PREFIX) {
                doc.sections.push(Section::from_heading(line));
                continue;
            }
            match doc.sections.last_mut() {
                Some(section) => section.body.push_str(line),
                None => doc.preamble.push_str(line),
            }
        }
        doc
    }

    /// Parsed front-matter; empty when the document has none.
    #[must_use]
    pub fn front_matter(&self) -> FrontMatter {
        FrontMatter::parse(&self.header).unwrap_or_default()
    }

    /// Rewrites one front-matter value. Returns false if there is no header.
    pub fn set_front(&mut self, key: &str, value: &str) -> bool {
        match set_scalar(&self.header, key, value) {
            Some(header) => {
                self.header = header;
                true
            }
            None => false,
        }
    }

    /// Text between the header and the first section.
    #[must_use]
    pub fn preamble(&self) -> &str {
        &self.preamble
    }

    /// Sections in file order.
    #[must_use]
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// First section carrying `title`.
    #[must_use]
    pub fn section(&self, title: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.matches(title))
    }

    fn position(&self, title: &str) -> Option<usize> {
        self.sections.iter().position(|s| s.matches(title))
    }

    /// Inserts a section at `index`, terminating the previous text with a
    /// line break first if needed.
    pub fn insert_section(&mut self, index: usize, section: Section) {
        let index = index.min(self.sections.len());
        let previous = match index.checked_sub(1) {
            Some(i) => &mut self.sections[i].body,
            None if self.preamble.is_empty() && !self.header.is_empty() => &mut self.header,
            None => &mut self.preamble,
        };
        if !previous.is_empty() && !previous.ends_with('\n') {
            previous.push('\n');
        }
        self.sections.insert(index, section);
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.header)?;
        f.write_str(&self.preamble)?;
        for section in &self.sections {
            f.write_str(&section.heading)?;
            f.write_str(&section.body)?;
        }
        Ok(())
    }
}

/// Canonical body of a section holding `content`.
#[must_use]
pub fn section_body(content: &str) -> String {
    format!("\n{}\n\n", content.trim_matches('\n').trim_end())
}

/// A section declared by a document kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SectionTemplate {
    /// Heading text.
    pub title: &'static str,
    /// Section owner.
    pub role: SectionRole,
    /// Body used for new or blank manual sections.
    pub default_body: &'static str,
}

impl SectionTemplate {
    /// A generated section.
    #[must_use]
    pub const fn generated(title: &'static str) -> Self {
        Self {
            title,
            role: SectionRole::Generated,
            default_body: "",
        }
    }

    /// A manual section with its default body.
    #[must_use]
    pub const fn manual(title: &'static str, default_body: &'static str) -> Self {
        Self {
            title,
            role: SectionRole::Manual,
            default_body,
        }
    }
}

/// Result of applying a template to a document.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocOutcome {
    /// The document did not exist and was created.
    Created,
    /// The document content changed.
    Updated,
    /// Regeneration produced identical bytes.
    Unchanged,
}

impl fmt::Display for DocOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        })
    }
}

/// Regenerated document text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Regenerated {
    /// New document text.
    pub content: String,
    /// What happened to the document.
    pub outcome: DocOutcome,
}

/// Section layout of one document kind.
#[derive(Clone, Copy, Debug)]
pub struct Template {
    /// File name inside the company directory.
    pub file_name: &'static str,
    /// Sections in template order.
    pub sections: &'static [SectionTemplate],
}

impl Template {
    /// Where a missing template section goes: after the nearest preceding
    /// template section present, else before the nearest following one,
    /// else at the end.
    fn insertion_point(&self, doc: &Document, template_index: usize) -> usize {
        let before = self.sections[..template_index]
            .iter()
            .rev()
            .find_map(|t| doc.position(t.title));
        if let Some(pos) = before {
            return pos + 1;
        }
        self.sections[template_index + 1..]
            .iter()
            .find_map(|t| doc.position(t.title))
            .unwrap_or(doc.sections.len())
    }

    /// Applies fresh generated content to a document.
    ///
    /// `existing` is the current text, if any; `skeleton` builds the header
    /// and preamble of a new document. `generated` maps generated section
    /// titles to their content. Manual sections present with content are
    /// never touched; the `updated` key changes only if a generated body did.
    pub fn apply(
        &self,
        existing: Option<&str>,
        skeleton: impl FnOnce() -> String,
        generated: &[(&str, String)],
        today: NaiveDate,
    ) -> Regenerated {
        let mut doc = match existing {
            Some(text) => Document::parse(text),
            None => Document::parse(&skeleton()),
        };

        let mut generated_changed = false;
        for (index, template) in self.sections.iter().enumerate() {
            let body = match template.role {
                SectionRole::Generated => section_body(
                    generated
                        .iter()
                        .find(|(title, _)| *title == template.title)
                        .map_or("", |(_, content)| content.as_str()),
                ),
                SectionRole::Manual => section_body(template.default_body),
            };

            match doc.position(template.title) {
                Some(pos) => {
                    let section = &mut doc.sections[pos];
                    match template.role {
                        SectionRole::Generated if section.body != body => {
                            section.body = body;
                            generated_changed = true;
                        }
                        SectionRole::Manual if section.is_blank() => section.body = body,
                        _ => {}
                    }
                }
                None => {
                    let at = self.insertion_point(&doc, index);
                    doc.insert_section(at, Section::new(template.title, body));
                    generated_changed |= template.role == SectionRole::Generated;
                }
            }
        }

        if existing.is_some() && generated_changed {
            doc.set_front(UPDATED_KEY, &today.format("%Y-%m-%d").to_string());
        }

        let content = doc.to_string();
        let outcome = match existing {
            None => DocOutcome::Created,
            Some(text) if text == content => DocOutcome::Unchanged,
            Some(_) => DocOutcome::Updated,
        };
        Regenerated { content, outcome }
    }

    /// Reads the document at `path`, applies the template and writes it back
    /// unless nothing changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or written.
    pub fn regenerate_file(
        &self,
        path: &Path,
        skeleton: impl FnOnce() -> String,
        generated: &[(&str, String)],
        today: NaiveDate,
    ) -> Result<DocOutcome> {
        let existing = read_optional(path)?;
        let regenerated = self.apply(existing.as_deref(), skeleton, generated, today);
        if regenerated.outcome != DocOutcome::Unchanged {
            write_file(path, &regenerated.content)?;
        }
        debug!(path = %path.display(), outcome = %regenerated.outcome, "regenerated document");
        Ok(regenerated.outcome)
    }
}
