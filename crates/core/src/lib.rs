mod config;
mod error;
mod extractor;
mod normalize;
mod numbering;
mod pdf;
mod refine;
mod repair;
mod segment;
mod source;
mod toc;
mod tree;
mod variations;

pub use config::{collapse_whitespace, CleanupConfig, TextCleaner};
pub use error::{Result, SectionsError};
pub use extractor::{
    Extraction, ExtractionRecord, ExtractionReport, Extractor, ExtractorBuilder, ExtractorOptions,
    Stage, StageFailure,
};
pub use normalize::{
    apply_toc_numbering, canonical_key, canonical_keys, drop_heading_echoes, normalize,
    remove_title_echo, trim_glued_tail, MIN_BODY_CHARS,
};
pub use numbering::{numbered_title, NumberedTitle, Numbering};
pub use pdf::{decode_pdf_string, PdfSource};
pub use refine::{refine, search_key};
pub use repair::{
    candidate_successors, find_illogical, key_numbering, reconstruct, repair, BRANCH_WIDTH,
    MAX_DEPTH,
};
pub use segment::{segment, strip_trailing_numbering, SectionMap};
pub use source::{
    document_text, DocumentSource, MemoryPage, MemorySource, Metadata, OutlineEntry, PageClip,
    PageCorpus,
};
pub use toc::{
    clean_title_suffix, has_numbering_prefix, page_range, RectifiedToc, TocEntry, TocRectifier,
};
pub use tree::{
    build_tree, filter_root, flatten, render_outline, tree_numbering, SectionNode, SectionTree,
    INTRODUCTION,
};
pub use variations::{
    numbering_placeholder, TitleVariations, DEFAULT_MAX_SPACING_GAPS, MAX_PLACEHOLDER_DEPTH,
};
