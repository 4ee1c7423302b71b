//! pdf-translate CLI
//!
//! Extracts the text of a PDF, translates it with a local MarianMT model and
//! writes the result to a new PDF.

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use pdf_translate::{
    Config, DevicePreference, LanguagePair, LoadOptions, MarianTranslator, ProgressTracker,
    TranslatePipeline,
};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pdf-translate")]
#[command(about = "Translate a PDF with a local MarianMT model")]
#[command(version)]
struct Cli {
    /// Input PDF file path
    #[arg(long = "input_pdf_path", default_value = "input.pdf")]
    input_pdf_path: PathBuf,

    /// Output PDF file path (overwritten if present)
    #[arg(long = "output_pdf_path", default_value = "output.pdf")]
    output_pdf_path: PathBuf,

    /// Source language
    #[arg(long = "source_language", default_value = "de")]
    source_language: String,

    /// Target language
    #[arg(long = "target_language", default_value = "en")]
    target_language: String,

    /// Segment length in characters, also the token limit per segment
    /// [default: from config, 512]
    #[arg(long = "max_length")]
    max_length: Option<NonZeroUsize>,

    /// Compute device: auto, cpu, metal, cuda [default: from config]
    #[arg(long)]
    device: Option<DevicePreference>,

    /// Config file [default: ~/.pdf-translate/config.toml]
    #[arg(long)]
    config: Option<PathBuf>,

    /// Hide progress output and the summary
    #[arg(short, long)]
    quiet: bool,

    /// Log pipeline steps to stderr
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "pdf_translate=info"
    } else {
        "pdf_translate=warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let max_length = cli.max_length.unwrap_or(config.max_length);
    let options = LoadOptions {
        device: cli.device.unwrap_or(config.device),
        max_tokens: max_length,
        show_progress: !cli.quiet,
    };
    let pair = LanguagePair::new(cli.source_language, cli.target_language);

    let mut progress = if cli.quiet {
        ProgressTracker::quiet()
    } else {
        ProgressTracker::new()
    };

    if progress.is_visible() {
        println!(
            "Translating {} ({})\n",
            cli.input_pdf_path.display(),
            pair.to_string().cyan()
        );
    }

    let pipeline = TranslatePipeline::new(max_length, config.output.clone());
    let report = pipeline
        .run(
            &cli.input_pdf_path,
            &cli.output_pdf_path,
            || MarianTranslator::load(&pair, &config.model, &options),
            &mut progress,
        )
        .with_context(|| format!("Failed to translate {}", cli.input_pdf_path.display()))?;

    if progress.is_visible() {
        println!(
            "\n{} Wrote {}",
            "✓".green(),
            cli.output_pdf_path.display().to_string().bold()
        );
        println!("  Model: {}", report.model_id);
        println!("  Pages read: {}", report.pages_read);
        println!("  Characters extracted: {}", report.chars_extracted);
        println!("  Segments translated: {}", report.segments);
        println!("  Characters written: {}", report.chars_written);
        println!("  Pages written: {}", report.pages_written);
    }

    Ok(())
}
