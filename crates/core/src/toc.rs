use std::ops::Range;

use itertools::iproduct;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::TextCleaner;
use crate::error::Result;
use crate::source::{OutlineEntry, PageCorpus};
use crate::variations::TitleVariations;

static NUMBERED_TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+(\.\d+)*\.?\s").expect("valid regex"));
static TITLE_SUFFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*?)(?:[A-Z]+\s*|\d+\s*)*$").expect("valid regex"));

/// Numbering literals tried in front of every title variant, coarsest first.
const NUMBERING_PATTERNS: [&str; 7] = [
    r"\d+",
    r"\d+\.",
    r"\d+\.\d+",
    r"\d+\.\d+\.",
    r"\d+\.\d+\.\d+",
    r"\d+\.\d+\.\d+\.",
    r"\d+\.\d+\.\d+\.\d+",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocEntry {
    pub level: u32,
    pub title: String,
    /// 1-based page where the section starts.
    pub page: u32,
}

/// Table of contents after numbering classification and recovery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RectifiedToc {
    pub entries: Vec<TocEntry>,
    /// Whether the outline titles carried their own numbering.
    pub has_numbering: bool,
}

impl RectifiedToc {
    pub fn titles(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.title.as_str())
    }

    pub fn page_range(&self, index: usize, page_count: usize) -> Range<usize> {
        page_range(&self.entries, index, page_count)
    }
}

/// 0-based pages spanned by entry `index`: from its own page through the next
/// entry's page, or through the last page for the final entry.
pub fn page_range(entries: &[TocEntry], index: usize, page_count: usize) -> Range<usize> {
    let Some(entry) = entries.get(index) else {
        return 0..0;
    };
    let start = (entry.page.saturating_sub(1) as usize).min(page_count);
    let end = match entries.get(index + 1) {
        Some(next) => (next.page as usize).min(page_count),
        None => page_count,
    };
    start..end.max(start)
}

/// Strips a trailing run of capital-letter words and digit groups, the usual
/// residue of a page footer glued onto a title. Never returns an empty title.
pub fn clean_title_suffix(title: &str) -> String {
    let cleaned = TITLE_SUFFIX_RE
        .captures(title)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .unwrap_or(title);
    if cleaned.is_empty() {
        title.trim().to_string()
    } else {
        cleaned.to_string()
    }
}

pub fn has_numbering_prefix(title: &str) -> bool {
    NUMBERED_TITLE_RE.is_match(title)
}

/// Recovers section numbering for outlines whose titles lack it.
#[derive(Debug, Clone)]
pub struct TocRectifier {
    max_spacing_gaps: usize,
}

impl TocRectifier {
    pub fn new(max_spacing_gaps: usize) -> Self {
        Self { max_spacing_gaps }
    }

    /// Classification followed by numbering recovery.
    pub fn rectify(&self, corpus: &PageCorpus, cleaner: &TextCleaner) -> Result<RectifiedToc> {
        let toc = self.classify(corpus, cleaner);
        self.recover(&toc, corpus)
    }

    /// Cleans the outline titles and decides whether they carry numbering.
    pub fn classify(&self, corpus: &PageCorpus, cleaner: &TextCleaner) -> RectifiedToc {
        let cleaned = corpus
            .outline
            .iter()
            .map(|entry| (entry, cleaner.clean(&entry.title)))
            .collect::<Vec<_>>();
        let has_numbering = cleaned
            .first()
            .map(|(_, title)| has_numbering_prefix(title))
            .unwrap_or(false);
        let entries = cleaned
            .into_iter()
            .map(|(entry, title)| toc_entry(entry, title, has_numbering))
            .collect();
        RectifiedToc {
            entries,
            has_numbering,
        }
    }

    /// Searches the page text for numbered spellings of unnumbered titles.
    pub fn recover(&self, toc: &RectifiedToc, corpus: &PageCorpus) -> Result<RectifiedToc> {
        let mut recovered_toc = toc.clone();
        if toc.has_numbering || toc.entries.is_empty() {
            return Ok(recovered_toc);
        }
        let entries = &mut recovered_toc.entries;
        let mut recovered = 0;
        for index in 0..entries.len() {
            let pages = page_range(entries, index, corpus.page_count());
            if let Some(title) = self.search_numbered_title(&entries[index].title, pages, corpus)? {
                debug!(from = %entries[index].title, to = %title, "recovered numbered title");
                entries[index].title = title;
                recovered += 1;
            }
        }
        info!(
            entries = entries.len(),
            recovered, "recovered numbering from page text"
        );
        Ok(recovered_toc)
    }

    fn search_numbered_title(
        &self,
        title: &str,
        pages: Range<usize>,
        corpus: &PageCorpus,
    ) -> Result<Option<String>> {
        let variations = TitleVariations::with_max_gaps(title, self.max_spacing_gaps);
        for (numbering, variant) in iproduct!(NUMBERING_PATTERNS, variations) {
            let pattern = RegexBuilder::new(&format!(r"{numbering}\s*{variant}"))
                .case_insensitive(true)
                .build()?;
            for page in pages.clone() {
                // Leftmost match is the first offset scanning left to right.
                if let Some(found) = pattern.find(&corpus.cleaned[page]) {
                    return Ok(Some(clean_title_suffix(found.as_str())));
                }
            }
        }
        Ok(None)
    }
}

impl Default for TocRectifier {
    fn default() -> Self {
        Self::new(crate::variations::DEFAULT_MAX_SPACING_GAPS)
    }
}

fn toc_entry(entry: &OutlineEntry, title: String, has_numbering: bool) -> TocEntry {
    let title = if has_numbering {
        title
    } else {
        clean_title_suffix(&title)
    };
    TocEntry {
        level: entry.level,
        title,
        page: entry.page,
    }
}
