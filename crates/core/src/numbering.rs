use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

static LEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)*)(\.?)\s*").expect("valid regex"));

/// Hierarchical section numbering such as `2.1.3.`.
///
/// The canonical string form is the dot-joined components followed by a single
/// trailing dot, so every stage compares numbering through [`Numbering::render`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Numbering(Vec<u32>);

/// A title split into its leading numbering and the remaining text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberedTitle<'a> {
    pub numbering: Numbering,
    /// Whether the source text closed the numbering with a dot (`1.2.` vs `1.2`).
    pub dotted: bool,
    pub rest: &'a str,
}

impl Numbering {
    pub fn new(parts: Vec<u32>) -> Option<Self> {
        if parts.is_empty() {
            None
        } else {
            Some(Self(parts))
        }
    }

    /// Parses the leading `\d+(\.\d+)*\.?` run of `text`.
    pub fn parse(text: &str) -> Option<Self> {
        Self::split(text).map(|title| title.numbering)
    }

    /// Parses `token` only if the whole token is a numbering (`"1.2."`, `"3"`).
    pub fn parse_exact(token: &str) -> Option<Self> {
        let title = Self::split(token)?;
        if title.rest.is_empty() && !token.ends_with(char::is_whitespace) {
            Some(title.numbering)
        } else {
            None
        }
    }

    pub fn split(text: &str) -> Option<NumberedTitle<'_>> {
        let caps = LEADING_RE.captures(text)?;
        let digits = caps.get(1)?.as_str();
        let parts = digits
            .split('.')
            .map(|part| part.parse::<u32>().ok())
            .collect::<Option<Vec<_>>>()?;
        let numbering = Self::new(parts)?;
        let dotted = caps.get(2).map(|m| !m.as_str().is_empty()).unwrap_or(false);
        let end = caps.get(0).map(|m| m.end()).unwrap_or(0);
        Some(NumberedTitle {
            numbering,
            dotted,
            rest: &text[end..],
        })
    }

    pub fn render(&self) -> String {
        let mut out = String::with_capacity(self.0.len() * 3);
        for part in &self.0 {
            out.push_str(&part.to_string());
            out.push('.');
        }
        out
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn components(&self) -> &[u32] {
        &self.0
    }

    pub fn last(&self) -> u32 {
        self.0[self.0.len() - 1]
    }

    /// All components but the last; `None` for top-level numbering.
    pub fn parent(&self) -> Option<Self> {
        Self::new(self.0[..self.0.len() - 1].to_vec())
    }

    pub fn with_last(&self, last: u32) -> Self {
        let mut parts = self.0.clone();
        let idx = parts.len() - 1;
        parts[idx] = last;
        Self(parts)
    }

    pub fn next_sibling(&self) -> Self {
        self.with_last(self.last().saturating_add(1))
    }

    pub fn child(&self, index: u32) -> Self {
        let mut parts = self.0.clone();
        parts.push(index);
        Self(parts)
    }

    pub fn starts_with(&self, prefix: &Numbering) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl fmt::Display for Numbering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Joins a numbering and a title text the canonical way: `"1.2. Title"`.
pub fn numbered_title(numbering: &Numbering, text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        numbering.render()
    } else {
        format!("{} {}", numbering.render(), text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_leading_runs() {
        let n = Numbering::parse("2.1.3 Methods").unwrap();
        assert_eq!(n.components(), &[2, 1, 3]);
        assert_eq!(n.render(), "2.1.3.");
        assert_eq!(Numbering::parse("4. Results").unwrap().render(), "4.");
        assert_eq!(Numbering::parse("7").unwrap().depth(), 1);
        assert!(Numbering::parse("Annex A").is_none());
        assert!(Numbering::parse(" 1. leading space").is_none());
    }

    #[test]
    fn split_reports_dot_and_rest() {
        let title = Numbering::split("1.2.Scope").unwrap();
        assert!(title.dotted);
        assert_eq!(title.rest, "Scope");
        let title = Numbering::split("3 Overview").unwrap();
        assert!(!title.dotted);
        assert_eq!(title.rest, "Overview");
    }

    #[test]
    fn exact_tokens_only() {
        assert!(Numbering::parse_exact("1.2.").is_some());
        assert!(Numbering::parse_exact("12").is_some());
        assert!(Numbering::parse_exact("1.2.x").is_none());
        assert!(Numbering::parse_exact("Intro").is_none());
    }

    #[test]
    fn hierarchy_helpers() {
        let n = Numbering::parse("3.4.").unwrap();
        assert_eq!(n.parent().unwrap().render(), "3.");
        assert!(Numbering::parse("3.").unwrap().parent().is_none());
        assert_eq!(n.next_sibling().render(), "3.5.");
        assert_eq!(n.child(1).render(), "3.4.1.");
        assert!(n.child(2).starts_with(&n));
        assert_eq!(numbered_title(&n, " Scope "), "3.4. Scope");
        assert_eq!(numbered_title(&n, ""), "3.4.");
    }
}
