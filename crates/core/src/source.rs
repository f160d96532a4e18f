use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::config::TextCleaner;
use crate::error::{Result, SectionsError};

pub type Metadata = IndexMap<String, String>;

/// Margins, in page units, excluded from clipped text extraction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageClip {
    pub top: f32,
    pub bottom: f32,
}

impl PageClip {
    /// Default running header and footer bands.
    pub const CONTENT: PageClip = PageClip {
        top: 50.0,
        bottom: 70.0,
    };

    /// `y` is measured from the top edge of a page `height` units tall.
    pub fn contains(&self, y: f32, height: f32) -> bool {
        y >= self.top && y <= height - self.bottom
    }
}

impl Default for PageClip {
    fn default() -> Self {
        Self::CONTENT
    }
}

/// One entry of a document's native outline. `page` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineEntry {
    pub level: u32,
    pub title: String,
    pub page: u32,
}

impl OutlineEntry {
    pub fn new(level: u32, title: impl Into<String>, page: u32) -> Self {
        Self {
            level,
            title: title.into(),
            page,
        }
    }
}

/// Read access to a page-oriented document. Dropping the source closes it.
pub trait DocumentSource {
    fn page_count(&self) -> usize;

    fn page_text(&mut self, index: usize, clip: Option<PageClip>) -> Result<String>;

    fn table_of_contents(&mut self) -> Result<Vec<OutlineEntry>>;

    fn metadata(&mut self) -> Result<Metadata>;
}

const DEFAULT_PAGE_HEIGHT: f32 = 842.0;
const BODY_TOP: f32 = 100.0;
const LINE_PITCH: f32 = 14.0;

#[derive(Debug, Clone, PartialEq)]
pub struct MemoryPage {
    pub height: f32,
    /// `(y from top, text)` pairs in reading order.
    pub lines: Vec<(f32, String)>,
}

impl Default for MemoryPage {
    fn default() -> Self {
        Self {
            height: DEFAULT_PAGE_HEIGHT,
            lines: Vec::new(),
        }
    }
}

impl MemoryPage {
    pub fn new() -> Self {
        Self::default()
    }

    /// A page whose lines all sit inside the default content band.
    pub fn from_body(text: &str) -> Self {
        text.lines().fold(Self::new(), |page, line| page.body(line))
    }

    pub fn line(mut self, y: f32, text: impl Into<String>) -> Self {
        self.lines.push((y, text.into()));
        self
    }

    pub fn header(self, text: impl Into<String>) -> Self {
        self.line(20.0, text)
    }

    pub fn body(self, text: impl Into<String>) -> Self {
        let body_lines = self
            .lines
            .iter()
            .filter(|(y, _)| PageClip::CONTENT.contains(*y, self.height))
            .count();
        let y = BODY_TOP + body_lines as f32 * LINE_PITCH;
        self.line(y, text)
    }

    pub fn footer(self, text: impl Into<String>) -> Self {
        let y = self.height - 30.0;
        self.line(y, text)
    }

    fn text(&self, clip: Option<PageClip>) -> String {
        let mut out = String::new();
        for (y, line) in &self.lines {
            if clip.map_or(true, |clip| clip.contains(*y, self.height)) {
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }
}

/// Document held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    pages: Vec<MemoryPage>,
    outline: Vec<OutlineEntry>,
    metadata: Metadata,
}

impl MemorySource {
    pub fn new(pages: Vec<MemoryPage>) -> Self {
        Self {
            pages,
            ..Self::default()
        }
    }

    pub fn with_outline(mut self, outline: Vec<OutlineEntry>) -> Self {
        self.outline = outline;
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

impl DocumentSource for MemorySource {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_text(&mut self, index: usize, clip: Option<PageClip>) -> Result<String> {
        self.pages
            .get(index)
            .map(|page| page.text(clip))
            .ok_or(SectionsError::PageOutOfRange {
                index,
                count: self.pages.len(),
            })
    }

    fn table_of_contents(&mut self) -> Result<Vec<OutlineEntry>> {
        Ok(self.outline.clone())
    }

    fn metadata(&mut self) -> Result<Metadata> {
        Ok(self.metadata.clone())
    }
}

/// Every page read once, so the structuring stages never touch the source.
#[derive(Debug, Clone, Default)]
pub struct PageCorpus {
    /// Full page text after [`TextCleaner::clean`].
    pub cleaned: Vec<String>,
    /// Raw text of the clipped content area of each page.
    pub clipped: Vec<String>,
    pub outline: Vec<OutlineEntry>,
}

impl PageCorpus {
    pub fn load<S: DocumentSource + ?Sized>(
        source: &mut S,
        cleaner: &TextCleaner,
        clip: PageClip,
    ) -> Result<Self> {
        let outline = source.table_of_contents()?;
        let count = source.page_count();
        let mut cleaned = Vec::with_capacity(count);
        let mut clipped = Vec::with_capacity(count);
        for index in 0..count {
            cleaned.push(cleaner.clean(&source.page_text(index, None)?));
            clipped.push(source.page_text(index, Some(clip))?);
        }
        Ok(Self {
            cleaned,
            clipped,
            outline,
        })
    }

    pub fn page_count(&self) -> usize {
        self.cleaned.len()
    }
}

/// Whole-document text: every page joined by newlines, then cleaned.
pub fn document_text<S: DocumentSource + ?Sized>(
    source: &mut S,
    cleaner: &TextCleaner,
) -> Result<String> {
    let mut all_text = String::new();
    for index in 0..source.page_count() {
        all_text.push_str(&source.page_text(index, None)?);
        all_text.push('\n');
    }
    Ok(cleaner.clean(&all_text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_drops_header_and_footer_lines() {
        let page = MemoryPage::new()
            .header("Running head")
            .body("First line")
            .body("Second line")
            .footer("Page 1");
        let mut source = MemorySource::new(vec![page]);
        assert_eq!(
            source.page_text(0, None).unwrap(),
            "Running head\nFirst line\nSecond line\nPage 1\n"
        );
        assert_eq!(
            source.page_text(0, Some(PageClip::CONTENT)).unwrap(),
            "First line\nSecond line\n"
        );
    }

    #[test]
    fn out_of_range_pages_are_source_errors() {
        let mut source = MemorySource::new(vec![MemoryPage::from_body("only")]);
        let err = source.page_text(3, None).unwrap_err();
        assert!(err.is_source_error());
    }

    #[test]
    fn corpus_reads_every_page_once() {
        let cleaner = TextCleaner::default();
        let mut source = MemorySource::new(vec![
            MemoryPage::from_body("a  b").header("H"),
            MemoryPage::from_body("c"),
        ])
        .with_outline(vec![OutlineEntry::new(1, "A", 1)]);
        let corpus = PageCorpus::load(&mut source, &cleaner, PageClip::CONTENT).unwrap();
        assert_eq!(corpus.page_count(), 2);
        assert_eq!(corpus.cleaned[0], "a b H");
        assert_eq!(corpus.clipped[0], "a  b\n");
        assert_eq!(corpus.outline.len(), 1);
        assert_eq!(document_text(&mut source, &cleaner).unwrap(), "a b H c");
    }
}
