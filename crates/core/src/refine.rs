use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::segment::SectionMap;

static SPACED_THIRD_LEVEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\.\d+\.\d+\.\s+.+").expect("valid regex"));
static SECOND_LEVEL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\.\d+\..+").expect("valid regex"));
static FIRST_LEVEL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\..+").expect("valid regex"));
static NUMBERING_GROUP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"((?:\d+\.){2,3})\s*").expect("valid regex"));
static FIRST_LEVEL_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\.\s*").expect("valid regex"));

/// The form a title is expected to take inside body text.
///
/// `"1.2.3. Foo"` stays as is, `"1.2.Foo"` becomes `"1.2. Foo"` and
/// `"1. Foo"` loses its numbering entirely.
pub fn search_key(title: &str) -> Cow<'_, str> {
    if SPACED_THIRD_LEVEL_RE.is_match(title) {
        Cow::Borrowed(title)
    } else if SECOND_LEVEL_RE.is_match(title) {
        let spaced = NUMBERING_GROUP_RE.replace_all(title, "${1} ");
        Cow::Owned(spaced.trim().to_string())
    } else if FIRST_LEVEL_RE.is_match(title) {
        FIRST_LEVEL_PREFIX_RE.replace(title, "")
    } else {
        Cow::Borrowed(title)
    }
}

/// Tightens every body so it starts at its own title and stops before the
/// next one. Bodies whose title cannot be found are left untouched.
pub fn refine(sections: &SectionMap) -> SectionMap {
    let titles = sections.keys().map(String::as_str).collect::<Vec<_>>();
    let mut refined = SectionMap::with_capacity(sections.len());
    for (index, (title, text)) in sections.iter().enumerate() {
        let next_title = titles.get(index + 1).copied();
        let body = refine_body(text, title, next_title).unwrap_or_else(|| {
            debug!(title = %title, "title not found in its body, keeping it unrefined");
            text.clone()
        });
        refined.insert(title.clone(), body);
    }
    refined
}

fn refine_body(text: &str, title: &str, next_title: Option<&str>) -> Option<String> {
    if text.is_empty() {
        return Some(String::new());
    }
    let (start, matched) = find_start(text, title)?;
    let from = start + matched;
    let end = next_title.and_then(|next| {
        let key = search_key(next);
        find_from(text, &key, from).or_else(|| find_from(text, next, from))
    });
    let body = match end {
        Some(end) => &text[start..end],
        None => &text[start..],
    };
    Some(body.trim().to_string())
}

/// Offset and matched length of the title: search key, raw title, then the
/// title without its first-level numbering.
fn find_start(text: &str, title: &str) -> Option<(usize, usize)> {
    let key = search_key(title);
    if let Some(start) = text.find(key.as_ref()) {
        return Some((start, key.len()));
    }
    if let Some(start) = text.find(title) {
        return Some((start, title.len()));
    }
    let stripped = FIRST_LEVEL_PREFIX_RE.replace(title, "");
    if stripped.len() == title.len() {
        return None;
    }
    text.find(stripped.as_ref())
        .map(|start| (start, stripped.len()))
}

fn find_from(text: &str, needle: &str, from: usize) -> Option<usize> {
    text.get(from..)?.find(needle).map(|offset| from + offset)
}
