//! Parse command - extract data from a single document.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use super::output::{OutputFormat, format_attempts, format_result};
use super::{build_pipeline, content_type_for};

/// Arguments for the parse command.
#[derive(Args)]
pub struct ParseArgs {
    /// Input file (PDF or image)
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Declared MIME type (default: guessed from the extension)
    #[arg(long)]
    content_type: Option<String>,

    /// Print the acquisition attempts to stderr
    #[arg(long)]
    explain: bool,
}

pub async fn run(args: ParseArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let pipeline = build_pipeline(config_path)?;
    let data = fs::read(&args.input)?;
    let content_type = args
        .content_type
        .clone()
        .or_else(|| content_type_for(&args.input).map(str::to_string));

    info!(
        "Parsing {} as {}",
        args.input.display(),
        content_type.as_deref().unwrap_or("unknown type")
    );

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?,
    );
    pb.set_message(format!("Processing {}", args.input.display()));
    pb.enable_steady_tick(Duration::from_millis(100));

    // OCR and PDF work is blocking
    let report = tokio::task::spawn_blocking(move || {
        pipeline.process_with_report(&data, content_type.as_deref())
    })
    .await?;

    pb.finish_and_clear();
    debug!("Processed in {}ms", report.processing_time_ms);

    if args.explain {
        eprintln!("{}", style("Acquisition attempts:").bold());
        eprintln!("{}", format_attempts(&report.attempts));
        eprintln!();
    }

    let output = format_result(&report.result, args.format)?;

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    for warning in &report.result.warnings {
        eprintln!("{} {}", style("⚠").yellow(), warning);
    }

    Ok(())
}
