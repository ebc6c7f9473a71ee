use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use pdfmd_core::{
    convert_pdf, validate_pdf_path, ConversionConfig, ExecutionProvider, NullOcrEngine, OcrEngine,
    OrtOcrEngine, PdfiumReader,
};

#[derive(Parser, Debug)]
#[command(name = "pdfmd", about = "Convert a PDF into layout-preserving Markdown")]
struct Args {
    file_path: PathBuf,

    /// Page range, e.g. "1-5" or "3". 1-indexed, inclusive on both ends.
    #[arg(short = 'r', long)]
    page_range: Option<String>,

    #[arg(short, long, env = "PDFMD_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    #[arg(long, default_value_t = 10)]
    chunk_size: usize,

    #[arg(long)]
    no_tables: bool,

    #[arg(long)]
    no_formatting: bool,

    #[arg(long, default_value_t = 2)]
    table_min_columns: usize,

    #[arg(long)]
    extract_images: bool,

    /// Path to an ONNX text-recognition model. When omitted, embedded
    /// images are still placed in the output but carry no recognized text.
    #[arg(long, env = "PDFMD_OCR_MODEL_PATH")]
    ocr_model_path: Option<PathBuf>,
}

fn parse_page_range(range: &str) -> anyhow::Result<(usize, Option<usize>)> {
    if let Some((start, end)) = range.split_once('-') {
        Ok((start.trim().parse()?, Some(end.trim().parse()?)))
    } else {
        let page: usize = range.trim().parse()?;
        Ok((page, Some(page)))
    }
}

fn setup_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}% {msg}",
        )
        .unwrap()
        .progress_chars("#>-"),
    );
    pb
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let (start_page, end_page) = match &args.page_range {
        Some(range) => parse_page_range(range)?,
        None => (1, None),
    };

    validate_pdf_path(&args.file_path)?;
    let reader = PdfiumReader::open(&args.file_path)?;
    let ocr: Box<dyn OcrEngine> = match &args.ocr_model_path {
        Some(path) => Box::new(OrtOcrEngine::load(path, ExecutionProvider::Cpu)?),
        None => Box::new(NullOcrEngine),
    };
    let config = ConversionConfig {
        chunk_size: args.chunk_size.max(1),
        table_detection_enabled: !args.no_tables,
        preserve_formatting: !args.no_formatting,
        table_min_columns: args.table_min_columns,
        extract_images: args.extract_images,
        start_page,
        end_page,
        ..Default::default()
    };

    let pb = setup_progress_bar();
    let outcome = convert_pdf(
        &reader,
        ocr.as_ref(),
        &config,
        |pct| pb.set_position(pct as u64),
        || false,
    )?;
    pb.finish_and_clear();

    let output_dir = args.output_dir.unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&output_dir)?;
    let stem = args
        .file_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)?
        .as_secs();
    let output_path = output_dir.join(format!("{stem}_converted_{timestamp}.md"));
    std::fs::write(&output_path, &outcome.markdown)?;

    println!(
        "{} Converted {} pages, found {} tables",
        "✓".green().bold(),
        outcome.pages_processed,
        outcome.tables_found
    );
    println!(
        "{} Output saved in: {}",
        "ℹ".yellow().bold(),
        output_path.display().to_string().cyan().underline()
    );

    Ok(())
}
