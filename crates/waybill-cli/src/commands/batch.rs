//! Batch processing command for multiple documents.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use console::style;
use futures_util::stream::{self, StreamExt};
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};

use waybill_core::models::document::ParseResult;

use super::output::{OutputFormat, format_result};
use super::{build_pipeline, content_type_for};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Glob pattern of input files
    #[arg(required = true)]
    input: String,

    /// Output directory for per-file results
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each file
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Also write a summary CSV
    #[arg(long)]
    summary: bool,

    /// Number of documents processed in parallel
    #[arg(short = 'j', long, default_value = "4")]
    jobs: usize,
}

/// Outcome for one file. Parsing never fails; reading the file can.
struct FileResult {
    path: PathBuf,
    result: Result<ParseResult, String>,
    processing_time_ms: u64,
}

pub async fn run(args: BatchArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let start = Instant::now();
    let pipeline = Arc::new(build_pipeline(config_path)?);

    let files: Vec<PathBuf> = glob(&args.input)?
        .filter_map(|r| r.ok())
        .filter(|p| content_type_for(p).is_some())
        .collect();

    if files.is_empty() {
        anyhow::bail!("No matching files found for pattern: {}", args.input);
    }

    println!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let overall_pb = ProgressBar::new(files.len() as u64);
    overall_pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files",
            )?
            .progress_chars("=>-"),
    );

    let jobs = args.jobs.max(1);
    let mut results: Vec<FileResult> = stream::iter(files)
        .map(|path| {
            let pipeline = Arc::clone(&pipeline);
            let pb = overall_pb.clone();
            async move {
                let task_path = path.clone();
                let outcome =
                    tokio::task::spawn_blocking(move || process_file(&pipeline, &task_path))
                        .await;
                pb.inc(1);
                match outcome {
                    Ok(result) => result,
                    Err(e) => FileResult {
                        path,
                        result: Err(format!("worker failed: {}", e)),
                        processing_time_ms: 0,
                    },
                }
            }
        })
        .buffer_unordered(jobs)
        .collect()
        .await;

    overall_pb.finish_and_clear();
    results.sort_by(|a, b| a.path.cmp(&b.path));

    if let Some(output_dir) = &args.output_dir {
        for file in &results {
            let Ok(result) = &file.result else { continue };
            let stem = file
                .path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("document");
            let output_path = output_dir.join(format!("{}.{}", stem, args.format.extension()));
            fs::write(&output_path, format_result(result, args.format)?)?;
            debug!("Wrote output to {}", output_path.display());
        }
    }

    if args.summary {
        let summary_path = args
            .output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        write_summary(&summary_path, &results)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    let failed: Vec<_> = results.iter().filter(|r| r.result.is_err()).collect();
    let empty = results
        .iter()
        .filter(|r| matches!(&r.result, Ok(res) if res.lines.is_empty()))
        .count();

    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        results.len(),
        start.elapsed()
    );
    println!(
        "   {} with line items, {} without, {} unreadable",
        style(results.len() - failed.len() - empty).green(),
        style(empty).yellow(),
        style(failed.len()).red()
    );

    if !failed.is_empty() {
        println!();
        println!("{}", style("Unreadable files:").red());
        for file in &failed {
            if let Err(e) = &file.result {
                println!("  - {}: {}", file.path.display(), e);
            }
        }
    }

    Ok(())
}

fn process_file(pipeline: &waybill_core::DocumentPipeline, path: &Path) -> FileResult {
    let start = Instant::now();
    let result = match fs::read(path) {
        Ok(data) => Ok(pipeline.process(&data, content_type_for(path))),
        Err(e) => {
            warn!("Failed to read {}: {}", path.display(), e);
            Err(e.to_string())
        }
    };

    FileResult {
        path: path.to_path_buf(),
        result,
        processing_time_ms: start.elapsed().as_millis() as u64,
    }
}

fn write_summary(path: &Path, results: &[FileResult]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "filename",
        "parser",
        "text_source",
        "line_count",
        "total",
        "warnings",
        "processing_time_ms",
        "error",
    ])?;

    for file in results {
        let filename = file.path.file_name().and_then(|s| s.to_str()).unwrap_or("");
        let time = file.processing_time_ms.to_string();

        match &file.result {
            Ok(result) => wtr.write_record([
                filename,
                result.parser.map(|p| p.as_str()).unwrap_or(""),
                &result.text_source.map(|s| s.to_string()).unwrap_or_default(),
                &result.lines.len().to_string(),
                &result.total.map(|t| t.to_string()).unwrap_or_default(),
                &result.warnings.join("; "),
                &time,
                "",
            ])?,
            Err(e) => wtr.write_record([filename, "", "", "", "", "", &time, e])?,
        }
    }

    wtr.flush()?;
    Ok(())
}
