use std::any::Any;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::{CleanupConfig, TextCleaner};
use crate::error::{Result, SectionsError};
use crate::normalize::{normalize, remove_title_echo};
use crate::pdf::PdfSource;
use crate::refine::refine;
use crate::repair::repair;
use crate::segment::{segment, SectionMap};
use crate::source::{document_text, DocumentSource, Metadata, PageClip, PageCorpus};
use crate::toc::TocRectifier;
use crate::tree::{build_tree, render_outline, SectionTree};
use crate::variations::DEFAULT_MAX_SPACING_GAPS;

/// Unit of work whose failure is recorded without stopping the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Open,
    Metadata,
    CleanedText,
    Read,
    Rectify,
    Segment,
    Refine,
    Normalize,
    Repair,
    Tree,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Open => "open",
            Stage::Metadata => "metadata",
            Stage::CleanedText => "cleaned_text",
            Stage::Read => "read",
            Stage::Rectify => "rectify",
            Stage::Segment => "segment",
            Stage::Refine => "refine",
            Stage::Normalize => "normalize",
            Stage::Repair => "repair",
            Stage::Tree => "tree",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub message: String,
}

impl From<StageFailure> for SectionsError {
    fn from(failure: StageFailure) -> Self {
        SectionsError::Stage {
            stage: failure.stage,
            message: failure.message,
        }
    }
}

/// Everything that went wrong while extracting one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionReport {
    pub failures: Vec<StageFailure>,
}

impl ExtractionReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed(&self, stage: Stage) -> bool {
        self.failures.iter().any(|failure| failure.stage == stage)
    }

    /// Whether the document itself could not be read, which leaves the
    /// section fields empty.
    pub fn source_failed(&self) -> bool {
        self.failures
            .iter()
            .any(|failure| matches!(failure.stage, Stage::Open | Stage::Read))
    }

    fn record(&mut self, stage: Stage, message: String) {
        error!(stage = %stage, message = %message, "stage failed");
        self.failures.push(StageFailure { stage, message });
    }
}

/// The four-field output of one document. Field order is part of the format.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub metadata: Metadata,
    pub leveled_text: SectionTree,
    pub processed_text: SectionMap,
    pub cleaned_text: String,
}

impl ExtractionRecord {
    pub fn to_json_string(&self) -> Result<String> {
        let mut out = Vec::new();
        self.write_json(&mut out)?;
        String::from_utf8(out).map_err(|e| SectionsError::Other(e.to_string()))
    }

    /// Pretty JSON with four-space indentation and non-ASCII kept as is.
    pub fn write_json<W: Write>(&self, writer: W) -> Result<()> {
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(writer, formatter);
        self.serialize(&mut serializer)?;
        Ok(())
    }

    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_json(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let record = serde_json::from_reader(file)?;
        Ok(record)
    }
}

/// Output record plus the failures met while producing it.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub record: ExtractionRecord,
    pub report: ExtractionReport,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExtractorOptions {
    pub clip: PageClip,
    pub max_spacing_gaps: usize,
}

impl Default for ExtractorOptions {
    fn default() -> Self {
        Self {
            clip: PageClip::CONTENT,
            max_spacing_gaps: DEFAULT_MAX_SPACING_GAPS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractorBuilder {
    cleaner: TextCleaner,
    options: ExtractorOptions,
}

impl ExtractorBuilder {
    pub fn new(config: &CleanupConfig) -> Result<Self> {
        Ok(Self {
            cleaner: config.compile()?,
            options: ExtractorOptions::default(),
        })
    }

    pub fn clip(mut self, clip: PageClip) -> Self {
        self.options.clip = clip;
        self
    }

    pub fn header_margin(mut self, top: f32) -> Self {
        self.options.clip.top = top;
        self
    }

    pub fn footer_margin(mut self, bottom: f32) -> Self {
        self.options.clip.bottom = bottom;
        self
    }

    pub fn max_spacing_gaps(mut self, gaps: usize) -> Self {
        self.options.max_spacing_gaps = gaps;
        self
    }

    pub fn build(self) -> Extractor {
        Extractor {
            cleaner: self.cleaner,
            options: self.options,
        }
    }
}

/// Turns documents into titled section trees.
#[derive(Debug, Clone)]
pub struct Extractor {
    cleaner: TextCleaner,
    options: ExtractorOptions,
}

impl Extractor {
    pub fn builder(config: &CleanupConfig) -> Result<ExtractorBuilder> {
        ExtractorBuilder::new(config)
    }

    pub fn new(config: &CleanupConfig) -> Result<Self> {
        Ok(Self::builder(config)?.build())
    }

    pub fn options(&self) -> &ExtractorOptions {
        &self.options
    }

    pub fn cleaner(&self) -> &TextCleaner {
        &self.cleaner
    }

    /// Opens and extracts a PDF. A document that cannot be opened still
    /// yields an (empty) record, with the failure in the report.
    pub fn extract_path<P: AsRef<Path>>(&self, path: P) -> Extraction {
        let path = path.as_ref();
        match PdfSource::open(path) {
            Ok(source) => self.extract(source),
            Err(err) => {
                let mut report = ExtractionReport::default();
                report.record(Stage::Open, err.to_string());
                Extraction {
                    record: ExtractionRecord::default(),
                    report,
                }
            }
        }
    }

    /// Runs the whole pipeline. The source is dropped once every page has
    /// been read, before the structuring stages start.
    pub fn extract<S: DocumentSource>(&self, mut source: S) -> Extraction {
        let mut report = ExtractionReport::default();
        let metadata = run_stage(Stage::Metadata, &mut report, || source.metadata())
            .unwrap_or_default();
        let cleaned_text = run_stage(Stage::CleanedText, &mut report, || {
            document_text(&mut source, &self.cleaner)
        })
        .unwrap_or_default();
        let corpus = run_stage(Stage::Read, &mut report, || {
            PageCorpus::load(&mut source, &self.cleaner, self.options.clip)
        });
        drop(source);

        let (leveled_text, processed_text) = match corpus {
            Some(corpus) => self.structure(&corpus, &mut report),
            None => (SectionTree::new(), SectionMap::new()),
        };
        info!(
            sections = processed_text.len(),
            roots = leveled_text.len(),
            failures = report.failures.len(),
            "extraction finished"
        );
        Extraction {
            record: ExtractionRecord {
                metadata,
                leveled_text,
                processed_text,
                cleaned_text,
            },
            report,
        }
    }

    /// Rectify, segment, refine, normalize, repair and nest the sections.
    pub fn structure(
        &self,
        corpus: &PageCorpus,
        report: &mut ExtractionReport,
    ) -> (SectionTree, SectionMap) {
        let rectifier = TocRectifier::new(self.options.max_spacing_gaps);
        let classified = rectifier.classify(corpus, &self.cleaner);
        let toc = run_stage(Stage::Rectify, report, || {
            rectifier.recover(&classified, corpus)
        })
        .unwrap_or(classified);
        debug!(
            entries = toc.entries.len(),
            has_numbering = toc.has_numbering,
            "table of contents ready"
        );

        let sections = run_stage(Stage::Segment, report, || {
            Ok(segment(&toc, corpus, &self.cleaner))
        })
        .unwrap_or_default();
        let sections = apply(Stage::Refine, report, sections, |s| Ok(refine(s)));
        let sections = apply(Stage::Normalize, report, sections, |s| Ok(normalize(s, &toc)));
        let sections = apply(Stage::Repair, report, sections, |s| {
            Ok(remove_title_echo(&repair(s)))
        });

        let tree = run_stage(Stage::Tree, report, || Ok(build_tree(&sections)))
            .unwrap_or_default();
        debug!(outline = %render_outline(&tree), "section tree");
        (tree, sections)
    }
}

/// Runs `stage` on `sections`, keeping them unchanged if the stage fails.
fn apply<F>(stage: Stage, report: &mut ExtractionReport, sections: SectionMap, f: F) -> SectionMap
where
    F: FnOnce(&SectionMap) -> Result<SectionMap>,
{
    if sections.is_empty() {
        return sections;
    }
    match run_stage(stage, report, || f(&sections)) {
        Some(next) => next,
        None => sections,
    }
}

/// Runs one stage, turning both errors and panics into a recorded failure.
fn run_stage<T, F>(stage: Stage, report: &mut ExtractionReport, f: F) -> Option<T>
where
    F: FnOnce() -> Result<T>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Some(value),
        Ok(Err(err)) => {
            report.record(stage, err.to_string());
            None
        }
        Err(payload) => {
            report.record(stage, format!("panicked: {}", panic_message(payload.as_ref())));
            None
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MemoryPage, MemorySource, OutlineEntry};

    struct BrokenSource;

    impl DocumentSource for BrokenSource {
        fn page_count(&self) -> usize {
            1
        }

        fn page_text(&mut self, index: usize, _clip: Option<PageClip>) -> Result<String> {
            Err(SectionsError::PageOutOfRange { index, count: 0 })
        }

        fn table_of_contents(&mut self) -> Result<Vec<OutlineEntry>> {
            Ok(vec![OutlineEntry::new(1, "1. Intro", 1)])
        }

        fn metadata(&mut self) -> Result<Metadata> {
            let mut metadata = Metadata::new();
            metadata.insert("title".into(), "Broken".into());
            Ok(metadata)
        }
    }

    #[test]
    fn record_fields_keep_their_order() {
        let record = ExtractionRecord {
            cleaned_text: "text".into(),
            ..ExtractionRecord::default()
        };
        let json = record.to_json_string().unwrap();
        let positions = ["metadata", "leveled_text", "processed_text", "cleaned_text"]
            .map(|key| json.find(&format!("\"{key}\"")).unwrap());
        assert!(positions.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(json.contains("\n    \"cleaned_text\": \"text\""));
    }

    #[test]
    fn unreadable_pages_keep_metadata() {
        let extractor = Extractor::new(&CleanupConfig::default()).unwrap();
        let extraction = extractor.extract(BrokenSource);
        assert_eq!(extraction.record.metadata["title"], "Broken");
        assert!(extraction.record.leveled_text.is_empty());
        assert!(extraction.record.processed_text.is_empty());
        assert!(extraction.report.source_failed());
        assert!(extraction.report.failed(Stage::CleanedText));
    }

    #[test]
    fn missing_files_yield_an_empty_record() {
        let extractor = Extractor::new(&CleanupConfig::default()).unwrap();
        let extraction = extractor.extract_path("/no/such/file.pdf");
        assert!(extraction.report.failed(Stage::Open));
        assert_eq!(extraction.record, ExtractionRecord::default());
    }

    #[test]
    fn panics_become_stage_failures() {
        let mut report = ExtractionReport::default();
        let value: Option<()> = run_stage(Stage::Tree, &mut report, || panic!("boom"));
        assert!(value.is_none());
        assert_eq!(report.failures[0].stage, Stage::Tree);
        assert!(report.failures[0].message.contains("boom"));
    }

    #[test]
    fn builder_overrides_margins() {
        let extractor = Extractor::builder(&CleanupConfig::default())
            .unwrap()
            .header_margin(10.0)
            .footer_margin(20.0)
            .max_spacing_gaps(3)
            .build();
        assert_eq!(extractor.options().clip, PageClip { top: 10.0, bottom: 20.0 });
        assert_eq!(extractor.options().max_spacing_gaps, 3);
    }

    #[test]
    fn numbered_document_end_to_end() {
        let source = MemorySource::new(vec![
            MemoryPage::new()
                .header("ACME")
                .body("1. Intro")
                .body("Intro text.")
                .footer("1"),
            MemoryPage::new()
                .body("1.1. Background")
                .body("Background text.")
                .footer("2"),
        ])
        .with_outline(vec![
            OutlineEntry::new(1, "1. Intro", 1),
            OutlineEntry::new(2, "1.1. Background", 2),
        ]);
        let extractor = Extractor::new(&CleanupConfig::default()).unwrap();
        let extraction = extractor.extract(source);
        assert!(extraction.report.is_clean(), "{:?}", extraction.report);
        let processed = &extraction.record.processed_text;
        assert_eq!(processed["1. Intro"], "Intro text.");
        assert_eq!(processed["1.1. Background"], "Background text.");
        assert!(extraction.record.leveled_text["1. Intro"]
            .children()
            .unwrap()
            .contains_key("1.1. Background"));
        assert_eq!(
            extraction.record.cleaned_text,
            "ACME 1. Intro Intro text. 1 1.1. Background Background text. 2"
        );
    }
}
