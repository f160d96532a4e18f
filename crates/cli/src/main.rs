use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use rayon::prelude::*;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

use pdfsections_core::{CleanupConfig, Extractor, SectionsError};

const VERSION: &str = env!("CARGO_PKG_VERSION");
/// Cores left free for the rest of the machine when `--jobs` is not given.
const RESERVED_CORES: usize = 4;

#[derive(Parser, Debug)]
#[command(
    name = "pdfsections",
    version = VERSION,
    about = "Split every PDF in a folder into a tree of titled sections"
)]
struct Cli {
    /// Folder holding the PDF files to process.
    #[arg(long = "folder-path", alias = "folder_path")]
    folder_path: PathBuf,
    #[arg(long = "output-folder", alias = "output_folder", default_value = "outputs")]
    output_folder: PathBuf,
    /// Cleanup rules (JSON, or TOML by extension).
    #[arg(
        long = "config-path",
        alias = "config_path",
        default_value = "text_cleanup_config.json"
    )]
    config_path: PathBuf,
    /// Documents processed in parallel.
    #[arg(long)]
    jobs: Option<usize>,
    #[arg(long = "header-margin")]
    header_margin: Option<f32>,
    #[arg(long = "footer-margin")]
    footer_margin: Option<f32>,
    /// Titles with more word gaps than this only try their canonical spacing.
    #[arg(long = "max-spacing-gaps")]
    max_spacing_gaps: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Complete,
    Degraded,
    Failed,
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let config = CleanupConfig::load(&cli.config_path)
        .with_context(|| format!("failed to load cleanup config {}", cli.config_path.display()))?;
    let extractor = build_extractor(&cli, &config)?;

    fs::create_dir_all(&cli.output_folder).with_context(|| {
        format!(
            "failed to create output folder {}",
            cli.output_folder.display()
        )
    })?;
    let pdfs = list_pdfs(&cli.folder_path)?;
    if pdfs.is_empty() {
        warn!(folder = %cli.folder_path.display(), "no PDF files found");
        return Ok(());
    }

    let jobs = cli.jobs.unwrap_or_else(default_jobs).max(1);
    info!(documents = pdfs.len(), jobs, "processing documents");
    let started = Instant::now();
    let pool = rayon::ThreadPoolBuilder::new().num_threads(jobs).build()?;
    let outcomes = pool.install(|| {
        pdfs.par_iter()
            .map(|pdf| process_document(&extractor, pdf, &cli.output_folder))
            .collect::<Vec<_>>()
    });

    let count = |wanted: Outcome| outcomes.iter().filter(|o| **o == wanted).count();
    println!(
        "processed {} documents in {:.1}s: {} complete, {} degraded, {} failed",
        outcomes.len(),
        started.elapsed().as_secs_f32(),
        count(Outcome::Complete),
        count(Outcome::Degraded),
        count(Outcome::Failed)
    );
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn build_extractor(cli: &Cli, config: &CleanupConfig) -> Result<Extractor> {
    let mut builder = Extractor::builder(config)?;
    if let Some(top) = cli.header_margin {
        builder = builder.header_margin(top);
    }
    if let Some(bottom) = cli.footer_margin {
        builder = builder.footer_margin(bottom);
    }
    if let Some(gaps) = cli.max_spacing_gaps {
        builder = builder.max_spacing_gaps(gaps);
    }
    Ok(builder.build())
}

fn default_jobs() -> usize {
    let cores = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    cores.saturating_sub(RESERVED_CORES).max(1)
}

/// PDF files directly inside `folder`, sorted by name.
fn list_pdfs(folder: &Path) -> Result<Vec<PathBuf>> {
    if !folder.is_dir() {
        return Err(anyhow!("the folder '{}' does not exist", folder.display()));
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(folder).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("failed to list {}", folder.display()))?;
        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false);
        if entry.file_type().is_file() && is_pdf {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

/// `<output>/<stem>_data.json`
fn output_path(output_folder: &Path, pdf: &Path) -> PathBuf {
    let stem = pdf
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    output_folder.join(format!("{stem}_data.json"))
}

fn process_document(extractor: &Extractor, pdf: &Path, output_folder: &Path) -> Outcome {
    info!(document = %pdf.display(), "processing");
    let extraction = extractor.extract_path(pdf);
    for failure in &extraction.report.failures {
        let err = SectionsError::from(failure.clone());
        warn!(document = %pdf.display(), "{err}");
    }

    let out = output_path(output_folder, pdf);
    if let Err(err) = extraction.record.save_json(&out) {
        error!(document = %pdf.display(), output = %out.display(), "failed to save: {err}");
        return Outcome::Failed;
    }
    info!(
        document = %pdf.display(),
        output = %out.display(),
        sections = extraction.record.processed_text.len(),
        "saved"
    );
    if extraction.report.source_failed() {
        Outcome::Failed
    } else if extraction.report.is_clean() {
        Outcome::Complete
    } else {
        Outcome::Degraded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_only_top_level_pdfs() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.pdf"), b"").unwrap();
        fs::write(dir.path().join("a.PDF"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("c.pdf"), b"").unwrap();

        let names = list_pdfs(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["a.PDF", "b.pdf"]);
        assert!(list_pdfs(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn output_files_are_named_after_the_document() {
        assert_eq!(
            output_path(Path::new("outputs"), Path::new("in/report v2.pdf")),
            PathBuf::from("outputs/report v2_data.json")
        );
    }

    #[test]
    fn unreadable_documents_still_get_a_record() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("broken.pdf");
        fs::write(&pdf, b"not a pdf").unwrap();
        let extractor = Extractor::new(&CleanupConfig::default()).unwrap();

        let outcome = process_document(&extractor, &pdf, dir.path());
        assert_eq!(outcome, Outcome::Failed);
        let saved = fs::read_to_string(dir.path().join("broken_data.json")).unwrap();
        assert!(saved.starts_with("{\n    \"metadata\": {}"));
    }
}
