use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use crate::config::TextCleaner;
use crate::source::PageCorpus;
use crate::toc::RectifiedToc;

static TRAILING_NUMBERING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(.*?)(\d+(?:\.\d+)*\.)$").expect("valid regex"));

/// Flat, insertion-ordered `title -> body` mapping passed between stages.
pub type SectionMap = IndexMap<String, String>;

/// Cuts the page text into one body per table-of-contents entry.
pub fn segment(toc: &RectifiedToc, corpus: &PageCorpus, cleaner: &TextCleaner) -> SectionMap {
    if toc.has_numbering {
        segment_by_pages(toc, corpus, cleaner)
    } else {
        segment_by_titles(toc, corpus, cleaner)
    }
}

/// Trusts the outline page numbers as section boundaries.
fn segment_by_pages(toc: &RectifiedToc, corpus: &PageCorpus, cleaner: &TextCleaner) -> SectionMap {
    let mut sections = SectionMap::new();
    for (index, entry) in toc.entries.iter().enumerate() {
        let mut text = String::new();
        for page in toc.page_range(index, corpus.page_count()) {
            text.push_str(&corpus.clipped[page]);
            text.push('\n');
        }
        sections.insert(entry.title.clone(), finish(&text, cleaner));
    }
    sections
}

/// Locates each title inside the page text and reads until the next title.
fn segment_by_titles(toc: &RectifiedToc, corpus: &PageCorpus, cleaner: &TextCleaner) -> SectionMap {
    let mut sections = SectionMap::new();
    for (index, entry) in toc.entries.iter().enumerate() {
        let title = strip_trailing_numbering(&entry.title);
        let next_title = toc.entries.get(index + 1).map(|next| next.title.as_str());
        let pages = toc.page_range(index, corpus.page_count());

        let mut text = String::new();
        let mut started = false;
        for page in pages.clone() {
            let page_text = corpus.cleaned[page].as_str();
            if !started {
                if let Some(start) = find_title(page_text, &title) {
                    started = true;
                    text.push_str(&page_text[start..]);
                    text.push('\n');
                }
                continue;
            }
            if let Some(end) = next_title.and_then(|next| find_title(page_text, next)) {
                text.push_str(&page_text[..end]);
                break;
            }
            text.push_str(page_text);
            text.push('\n');
        }

        if !started {
            warn!(title = %title, "title not found in its pages, keeping whole page text");
            for page in pages {
                text.push_str(&corpus.cleaned[page]);
                text.push('\n');
            }
        } else {
            debug!(title = %title, "located section start");
        }
        sections.insert(title, finish(&text, cleaner));
    }
    sections
}

fn find_title(page_text: &str, title: &str) -> Option<usize> {
    if page_text.is_empty() {
        return None;
    }
    page_text.find(title)
}

fn finish(text: &str, cleaner: &TextCleaner) -> String {
    cleaner.clean(&cleaner.strip_boilerplate(text))
}

/// `"Scope 4.2."` -> `"Scope"`: numbering glued to the end of a title.
pub fn strip_trailing_numbering(title: &str) -> String {
    match TRAILING_NUMBERING_RE.captures(title).and_then(|caps| caps.get(1)) {
        Some(head) => head.as_str().trim().to_string(),
        None => title.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CleanupConfig;
    use crate::toc::TocEntry;

    fn toc(entries: &[(&str, u32)], has_numbering: bool) -> RectifiedToc {
        RectifiedToc {
            entries: entries
                .iter()
                .map(|(title, page)| TocEntry {
                    level: 1,
                    title: title.to_string(),
                    page: *page,
                })
                .collect(),
            has_numbering,
        }
    }

    fn corpus(cleaned: &[&str], clipped: &[&str]) -> PageCorpus {
        PageCorpus {
            cleaned: cleaned.iter().map(|p| p.to_string()).collect(),
            clipped: clipped.iter().map(|p| p.to_string()).collect(),
            outline: Vec::new(),
        }
    }

    #[test]
    fn numbered_mode_reads_clipped_page_ranges() {
        let config = CleanupConfig {
            texts_to_remove: vec!["Confidential".into()],
            ..CleanupConfig::default()
        };
        let cleaner = config.compile().unwrap();
        let corpus = corpus(
            &["HEAD 1. Intro a", "HEAD b 2. Scope c", "HEAD d"],
            &["1. Intro a\nConfidential", "b 2. Scope c", "d"],
        );
        let sections = segment(
            &toc(&[("1. Intro", 1), ("2. Scope", 2)], true),
            &corpus,
            &cleaner,
        );
        assert_eq!(sections["1. Intro"], "1. Intro a b 2. Scope c");
        assert_eq!(sections["2. Scope"], "b 2. Scope c d");
    }

    #[test]
    fn title_mode_starts_at_the_title_and_stops_at_the_next() {
        let corpus = corpus(
            &[
                "preamble 1 Intro first page",
                "more intro",
                "tail of intro 2 Scope scope text",
            ],
            &["", "", ""],
        );
        let sections = segment(
            &toc(&[("1 Intro", 1), ("2 Scope", 3)], false),
            &corpus,
            &TextCleaner::default(),
        );
        let keys = sections.keys().cloned().collect::<Vec<_>>();
        assert_eq!(keys, vec!["1 Intro", "2 Scope"]);
        assert_eq!(
            sections["1 Intro"],
            "1 Intro first page more intro tail of intro"
        );
        assert_eq!(sections["2 Scope"], "2 Scope scope text");
    }

    #[test]
    fn missing_titles_fall_back_to_page_text() {
        let corpus = corpus(&["nothing matches", "still nothing"], &["", ""]);
        let sections = segment(
            &toc(&[("Annex 4.", 1)], false),
            &corpus,
            &TextCleaner::default(),
        );
        assert_eq!(sections["Annex"], "nothing matches still nothing");
    }

    #[test]
    fn trailing_numbering_is_removed() {
        assert_eq!(strip_trailing_numbering("Scope 4.2."), "Scope");
        assert_eq!(strip_trailing_numbering("1. Scope"), "1. Scope");
    }
}
