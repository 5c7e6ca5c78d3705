//! Front-matter codec for knowledge base documents.
//!
//! Documents start with a `---` delimited header of `key: value` lines.
//! Values are scalars (optionally quoted) or lists, written either inline
//! (`aliases: [Сбер, Сбербанк]`) or as indented `- item` lines following a
//! key with an empty value. Anything else in the header is ignored.

use std::ops::Range;

/// A front-matter value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrontValue {
    /// A single value with surrounding quotes removed.
    Scalar(String),
    /// A list of values.
    List(Vec<String>),
}

/// Parsed front-matter, in file order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrontMatter {
    entries: Vec<(String, FrontValue)>,
}

/// Byte layout of a document's header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderSpan {
    /// Lines between the delimiters.
    pub inner: Range<usize>,
    /// Offset of the closing delimiter line.
    pub closing: usize,
    /// Offset right after the closing delimiter line (start of the body).
    pub end: usize,
}

/// Locates the front-matter header of `content`.
#[must_use]
pub fn header_span(content: &str) -> Option<HeaderSpan> {
    let first_end = content.find('\n')?;
    if content[..first_end].trim_end() != "---" {
        return None;
    }
    let inner_start = first_end + 1;
    let mut offset = inner_start;
    for line in content[inner_start..].split_inclusive('\n') {
        if line.trim_end() == "---" {
            return Some(HeaderSpan {
                inner: inner_start..offset,
                closing: offset,
                end: offset + line.len(),
            });
        }
        offset += line.len();
    }
    None
}

fn unquote(value: &str) -> &str {
    let value = value.trim();
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn split_key(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.split_once(':')?;
    let mut chars = key.chars();
    let first = chars.next()?;
    let key_char = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-';
    if !first.is_ascii_alphabetic() || !chars.all(key_char) {
        return None;
    }
    Some((key, value.trim()))
}

fn inline_list(value: &str) -> Option<Vec<String>> {
    let inner = value.strip_prefix('[')?.strip_suffix(']')?;
    Some(
        inner
            .split(',')
            .map(|item| unquote(item).to_string())
            .filter(|item| !item.is_empty())
            .collect(),
    )
}

impl FrontMatter {
    /// Parses the header of a document. Returns `None` if there is none.
    #[must_use]
    pub fn parse(content: &str) -> Option<Self> {
        let span = header_span(content)?;
        Some(Self::parse_block(&content[span.inner]))
    }

    /// Parses the lines between the delimiters.
    #[must_use]
    pub fn parse_block(block: &str) -> Self {
        let mut entries: Vec<(String, FrontValue)> = Vec::new();
        let mut open_list: Option<usize> = None;

        for line in block.lines() {
            let stripped = line.trim();
            if stripped.is_empty() || stripped.starts_with('#') {
                open_list = None;
                continue;
            }

            if let (Some(idx), Some(item)) = (open_list, stripped.strip_prefix("- ")) {
                if let Some((_, FrontValue::List(items))) = entries.get_mut(idx) {
                    items.push(unquote(item).to_string());
                }
                continue;
            }

            open_list = None;
            let Some((key, value)) = split_key(stripped) else {
                continue;
            };
            let value = if value.is_empty() {
                open_list = Some(entries.len());
                FrontValue::List(Vec::new())
            } else if let Some(items) = inline_list(value) {
                FrontValue::List(items)
            } else {
                FrontValue::Scalar(unquote(value).to_string())
            };
            entries.retain(|(k, _)| k != key);
            if open_list.is_some() {
                open_list = Some(entries.len());
            }
            entries.push((key.to_string(), value));
        }

        Self { entries }
    }

    /// Returns a non-empty scalar value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.iter().find_map(|(k, v)| match v {
            FrontValue::Scalar(s) if k == key && !s.is_empty() => Some(s.as_str()),
            _ => None,
        })
    }

    /// Returns a list value; a scalar is returned as a one-item list.
    #[must_use]
    pub fn list(&self, key: &str) -> Vec<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| match v {
                FrontValue::List(items) => items.iter().map(String::as_str).collect(),
                FrontValue::Scalar(s) if !s.is_empty() => vec![s.as_str()],
                FrontValue::Scalar(_) => Vec::new(),
            })
            .unwrap_or_default()
    }

    /// Returns true if `key` is present, even with an empty value.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Parses a scalar as a number, accepting `,` decimals and a `%` suffix.
    #[must_use]
    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(parse_number)
    }

    /// Returns true if the company is marked as delisted.
    #[must_use]
    pub fn is_delisted(&self) -> bool {
        self.get("status") == Some("delisted") || self.get("delisted") == Some("true")
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over the entries in file order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FrontValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Parses a loosely formatted number (`1 234,5`, `+25%`).
#[must_use]
pub fn parse_number(value: &str) -> Option<f64> {
    let cleaned: String = value
        .trim()
        .trim_end_matches('%')
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '+' && *c != '\u{a0}')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Rewrites (or appends) a scalar `key: value` line in the header of
/// `content`, leaving every other byte untouched.
///
/// Returns `None` if the document has no header.
#[must_use]
pub fn set_scalar(content: &str, key: &str, value: &str) -> Option<String> {
    let span = header_span(content)?;
    let prefix = format!("{key}:");
    let mut offset = span.inner.start;
    for line in content[span.inner.clone()].split_inclusive('\n') {
        let body = line.trim_end_matches(['\r', '\n']);
        if body.starts_with(&prefix) {
            let ending = &line[body.len()..];
            let mut out = String::with_capacity(content.len() + value.len());
            out.push_str(&content[..offset]);
            out.push_str(&format!("{key}: {value}"));
            out.push_str(ending);
            out.push_str(&content[offset + line.len()..]);
            return Some(out);
        }
        offset += line.len();
    }
    let mut out = String::with_capacity(content.len() + key.len() + value.len() + 3);
    out.push_str(&content[..span.closing]);
    out.push_str(&format!("{key}: {value}\n"));
    out.push_str(&content[span.closing..]);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = "---\nticker: SBER\nname: \"Сбербанк\"\nsentiment: bullish\n\
        current_price: 300\naliases: [Сбер, 'Sberbank']\n\
        key_risks:\n  - Санкции SDN\n  - \"Рост ставки ЦБ\"\n\
        sector:\n---\n\n# Body\n";

    #[test]
    fn test_parse_scalars_and_lists() {
        let fm = FrontMatter::parse(DOC).unwrap();
        assert_eq!(fm.get("ticker"), Some("SBER"));
        assert_eq!(fm.get("name"), Some("Сбербанк"));
        assert_eq!(fm.number("current_price"), Some(300.0));
        assert_eq!(fm.list("aliases"), vec!["Сбер", "Sberbank"]);
        assert_eq!(fm.list("key_risks"), vec!["Санкции SDN", "Рост ставки ЦБ"]);
        assert_eq!(fm.get("sector"), None);
        assert!(fm.contains("sector"));
        assert!(!fm.is_delisted());
    }

    #[test]
    fn test_no_header() {
        assert!(FrontMatter::parse("# Title\n").is_none());
        assert!(FrontMatter::parse("---\nticker: X\n").is_none());
    }

    #[test]
    fn test_delisted_flags() {
        let a = FrontMatter::parse("---\nstatus: delisted\n---\n").unwrap();
        let b = FrontMatter::parse("---\ndelisted: true\n---\n").unwrap();
        assert!(a.is_delisted());
        assert!(b.is_delisted());
    }

    #[test]
    fn test_parse_number_formats() {
        assert_eq!(parse_number("+25%"), Some(25.0));
        assert_eq!(parse_number("1 234,5"), Some(1234.5));
        assert_eq!(parse_number("n/a"), None);
        assert_eq!(parse_number(""), None);
    }

    #[test]
    fn test_set_scalar_replaces_line_only() {
        let updated = set_scalar(DOC, "current_price", "312.5").unwrap();
        assert!(updated.contains("current_price: 312.5\n"));
        assert_eq!(updated.replace("current_price: 312.5", "current_price: 300"), DOC);
    }

    #[test]
    fn test_set_scalar_appends_missing_key() {
        let updated = set_scalar("---\nticker: X\n---\nbody\n", "updated", "2026-01-15").unwrap();
        assert_eq!(updated, "---\nticker: X\nupdated: 2026-01-15\n---\nbody\n");
        assert!(set_scalar("body", "updated", "x").is_none());
    }

    #[test]
    fn test_header_span_offsets() {
        let doc = "---\na: 1\n---\nrest";
        let span = header_span(doc).unwrap();
        assert_eq!(&doc[span.inner.clone()], "a: 1\n");
        assert_eq!(&doc[span.end..], "rest");
    }
}
