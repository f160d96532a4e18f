use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::numbering::{numbered_title, Numbering};
use crate::segment::SectionMap;
use crate::toc::RectifiedToc;

static KEY_SPLIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)*\.*)(.*)$").expect("valid regex"));
static TOC_NUMBERING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)*)").expect("valid regex"));
static KEY_TEXT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:\d+(?:\.\d+)*\.?\s*)?(.*)").expect("valid regex"));
static DIGIT_GROUP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+[\.\s]*").expect("valid regex"));
static DOTTED_NUMBERING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+(?:\.\d+)*\.)").expect("valid regex"));
static DOTTED_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+(?:\.\d+)*\.\s*").expect("valid regex"));

/// Bodies at or under this many characters, once digit groups are removed,
/// are treated as a heading with no content.
pub const MIN_BODY_CHARS: usize = 50;

/// Brings section keys into the canonical `"1.2. Title"` form.
pub fn normalize(sections: &SectionMap, toc: &RectifiedToc) -> SectionMap {
    let sections = if toc.has_numbering {
        apply_toc_numbering(sections, toc)
    } else {
        let trimmed = sections
            .iter()
            .map(|(title, text)| (trim_glued_tail(title), text.clone()))
            .collect::<SectionMap>();
        drop_heading_echoes(&trimmed)
    };
    canonical_keys(&sections)
}

/// Puts the outline numbering back on the section keys, entry by entry.
pub fn apply_toc_numbering(sections: &SectionMap, toc: &RectifiedToc) -> SectionMap {
    if sections.len() != toc.entries.len() {
        warn!(
            sections = sections.len(),
            entries = toc.entries.len(),
            "section count differs from the outline, keeping keys"
        );
        return sections.clone();
    }
    toc.entries
        .iter()
        .zip(sections)
        .map(|(entry, (key, body))| {
            let text = KEY_TEXT_RE
                .captures(key)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().trim())
                .unwrap_or_default();
            let title = match TOC_NUMBERING_RE.find(&entry.title) {
                Some(numbering) => format!("{}. {}", numbering.as_str(), text)
                    .trim()
                    .to_string(),
                None => text.to_string(),
            };
            (title, body.clone())
        })
        .collect()
}

/// `"1. IntroductionThe"` -> `"1. Introduction"`: drops a run-on tail that
/// starts at a capital letter glued to the previous word.
pub fn trim_glued_tail(key: &str) -> String {
    let Some(caps) = KEY_SPLIT_RE.captures(key) else {
        return key.to_string();
    };
    let numbering = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
    let mut text = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
    let chars = text.char_indices().collect::<Vec<_>>();
    if let Some(pos) = chars.iter().rposition(|(_, c)| c.is_uppercase()) {
        let glued = pos > 0 && chars[pos - 1].1.is_lowercase();
        let followed = chars.get(pos + 1).map(|(_, c)| *c != ' ').unwrap_or(false);
        if glued && followed {
            text = &text[..chars[pos].0];
        }
    }
    format!("{numbering} {text}")
}

/// Removes the heading repeated at the top of each body and blanks bodies
/// that hold nothing but numbering and a few words.
pub fn drop_heading_echoes(sections: &SectionMap) -> SectionMap {
    sections
        .iter()
        .map(|(title, text)| {
            let mut text = text.as_str();
            if let Some(rest) = text.strip_prefix(title.as_str()) {
                text = rest.trim();
            }
            let stripped_title = DIGIT_GROUP_RE.replace_all(title, "");
            let stripped_title = stripped_title.trim();
            let stripped_text = DIGIT_GROUP_RE.replace_all(text, "");
            if stripped_text.trim().chars().count() <= MIN_BODY_CHARS {
                text = "";
            }
            if let Some(numbering) = DOTTED_NUMBERING_RE.find(title) {
                let expected = format!("{} {}", numbering.as_str(), stripped_title);
                if let Some(rest) = text.strip_prefix(expected.as_str()) {
                    text = rest.trim();
                }
            }
            (title.clone(), text.to_string())
        })
        .collect()
}

/// Every numbered key becomes `"<n.n.> <title>"`; other keys are kept.
pub fn canonical_keys(sections: &SectionMap) -> SectionMap {
    sections
        .iter()
        .map(|(key, text)| (canonical_key(key), text.clone()))
        .collect()
}

pub fn canonical_key(key: &str) -> String {
    match Numbering::split(key) {
        Some(title) => numbered_title(&title.numbering, title.rest),
        None => key.to_string(),
    }
}

/// Drops everything up to and including the first mention of the title
/// (numbering removed) from each body.
pub fn remove_title_echo(sections: &SectionMap) -> SectionMap {
    sections
        .iter()
        .map(|(title, text)| {
            let bare = DOTTED_PREFIX_RE.replace(title, "");
            let bare = bare.trim();
            let text = match text.find(bare) {
                Some(start) => text[start + bare.len()..].trim_start().to_string(),
                None => text.clone(),
            };
            (title.clone(), text)
        })
        .collect()
}
