//! DXF Translate - extract drawing text and back-fill translations
//!
//! Workflow: run `extract` on a drawing (or a directory of drawings) to
//! produce a translation workbook, have a translator fill in the target
//! column, then run `backfill` to write the translations into the drawings.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dxf_translate_toolkit::backfill::{process_directory, SubstitutionConfig};
use dxf_translate_toolkit::cleaner::fix_layer_names;
use dxf_translate_toolkit::document::{load_document, save_document};
use dxf_translate_toolkit::export::{export_csv, export_xlsx};
use dxf_translate_toolkit::extract::{ExtractionConfig, ExtractionEngine, TextRecord};
use dxf_translate_toolkit::filter::TextFilterConfig;
use dxf_translate_toolkit::translate::load_table;
use std::collections::HashSet;
use std::io::Write as IoWrite;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "dxf-translate")]
#[command(about = "Extract drawing text to a spreadsheet and back-fill translations")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract drawing text into a translation workbook
    Extract {
        /// Input drawing file or directory
        input: PathBuf,

        /// Output table path (.xlsx or .csv)
        #[arg(short, long, default_value = "extracted_texts.xlsx")]
        output: PathBuf,

        /// Keep only texts containing CJK characters
        #[arg(long)]
        cjk_only: bool,

        /// Minimum text length
        #[arg(long, default_value = "1")]
        min_length: usize,

        /// Maximum text length
        #[arg(long, default_value = "1000")]
        max_length: usize,
    },

    /// Back-fill translations from a filled-in table into drawings
    Backfill {
        /// Directory of drawings to process (searched recursively)
        #[arg(default_value = ".")]
        directory: PathBuf,

        /// Translation table (.xlsx or .csv) with source and target columns
        #[arg(short, long, default_value = "extracted_texts.xlsx")]
        table: PathBuf,

        /// Font for translated text
        #[arg(short, long, default_value = "Times New Roman")]
        font: String,

        /// Output directory (default: <directory>/translated)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Replace text in place instead of recreating entities
        #[arg(short, long)]
        replace: bool,

        /// Amount subtracted from the original text height
        #[arg(long, default_value = "4.0")]
        font_reduction: f64,

        /// Number of parallel threads (default: number of CPU cores)
        #[arg(long)]
        threads: Option<usize>,
    },

    /// Repair invalid layer names in a drawing
    Clean {
        /// Input drawing file
        input: PathBuf,

        /// Output drawing path (default: overwrite the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Extract {
            input,
            output,
            cjk_only,
            min_length,
            max_length,
        } => extract(&input, &output, cjk_only, min_length, max_length),
        Commands::Backfill {
            directory,
            table,
            font,
            output,
            replace,
            font_reduction,
            threads,
        } => backfill(
            &directory,
            &table,
            font,
            output,
            replace,
            font_reduction,
            threads,
        ),
        Commands::Clean { input, output } => clean(&input, output),
    }
}

// ============================================================================
// Extract
// ============================================================================

fn drawing_inputs(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() {
        Ok(vec![input.to_path_buf()])
    } else if input.is_dir() {
        let files = dxf_translate_toolkit::backfill::find_drawing_files(input)?;
        anyhow::ensure!(
            !files.is_empty(),
            "no drawing files found under {}",
            input.display()
        );
        Ok(files)
    } else {
        anyhow::bail!("input path {} does not exist", input.display());
    }
}

fn extract(
    input: &Path,
    output: &Path,
    cjk_only: bool,
    min_length: usize,
    max_length: usize,
) -> Result<()> {
    let config = ExtractionConfig {
        filter: TextFilterConfig {
            min_length,
            max_length,
            ..TextFilterConfig::default()
        },
        cjk_only,
        ..ExtractionConfig::default()
    };
    let engine = ExtractionEngine::new(&config)?;

    let files = drawing_inputs(input)?;
    let mut records: Vec<TextRecord> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut degraded_files = 0usize;

    for (i, file) in files.iter().enumerate() {
        eprintln!("[{}/{}] {}", i + 1, files.len(), file.display());
        let outcome = engine.extract_file(file);
        if outcome.degraded {
            degraded_files += 1;
        }
        for record in outcome.records {
            // Across a multi-file run duplicates collapse by value.
            if seen.insert(record.text.clone()) {
                records.push(record);
            }
        }
    }

    if records.is_empty() {
        eprintln!("No text found in {} file(s)", files.len());
        std::process::exit(1);
    }

    let ext = output
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "csv" => export_csv(&records, output)?,
        _ => export_xlsx(&records, &input.display().to_string(), output)?,
    }

    println!(
        "Extracted {} texts from {} file(s) to {}",
        records.len(),
        files.len(),
        output.display()
    );
    if degraded_files > 0 {
        println!(
            "Warning: {} file(s) could not be parsed structurally; raw-scan results lack provenance",
            degraded_files
        );
    }
    Ok(())
}

// ============================================================================
// Backfill
// ============================================================================

fn backfill(
    directory: &Path,
    table: &Path,
    font: String,
    output: Option<PathBuf>,
    replace: bool,
    font_reduction: f64,
    threads: Option<usize>,
) -> Result<()> {
    anyhow::ensure!(
        directory.is_dir(),
        "directory {} does not exist",
        directory.display()
    );

    let map = load_table(table)?;
    // An empty mapping means nothing can possibly be translated; that is a
    // failed run, not a silent no-op.
    anyhow::ensure!(
        !map.is_empty(),
        "translation table {} yielded no usable entries",
        table.display()
    );
    println!("Loaded {} translation entries", map.len());

    let output_dir = output.unwrap_or_else(|| directory.join("translated"));
    let config = SubstitutionConfig {
        font_name: font,
        replace_mode: replace,
        font_size_reduction: font_reduction,
    };

    let summary = process_directory(directory, &output_dir, &map, &config, threads, |progress| {
        eprint!(
            "\r[{}/{}] Translating... ({} failed)    ",
            progress.completed, progress.total, progress.errors
        );
        std::io::stderr().flush().ok();
        true
    })
    .context("batch processing failed")?;
    eprintln!();

    println!("Files:      {}", summary.files);
    println!("Succeeded:  {}", summary.succeeded);
    println!("Processed:  {}", summary.counters.processed);
    println!("Translated: {}", summary.counters.translated);
    println!("Skipped:    {}", summary.counters.skipped);
    println!("Errors:     {}", summary.counters.errors);
    for doc in summary.documents.iter().filter(|d| !d.success) {
        println!(
            "Failed: {} ({})",
            doc.file.display(),
            doc.error_message.as_deref().unwrap_or("unknown error")
        );
    }
    if summary.succeeded > 0 {
        println!("Translated drawings saved to {}", output_dir.display());
    }

    if summary.counters.errors > 0 || summary.succeeded < summary.files {
        std::process::exit(1);
    }
    Ok(())
}

// ============================================================================
// Clean
// ============================================================================

fn clean(input: &Path, output: Option<PathBuf>) -> Result<()> {
    let mut doc = load_document(input)
        .with_context(|| format!("cannot open {}", input.display()))?;
    let fixed = fix_layer_names(&mut doc);
    let output = output.unwrap_or_else(|| input.to_path_buf());
    save_document(&doc, &output)
        .with_context(|| format!("cannot save {}", output.display()))?;
    println!(
        "Fixed {} layer reference(s); saved to {}",
        fixed,
        output.display()
    );
    Ok(())
}
