//! Request command - process a `{contentType, data}` JSON envelope.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use serde::Serialize;

use waybill_core::acquisition::Attempt;
use waybill_core::models::document::{ParseRequest, ParseResult};

use super::build_pipeline;

/// Arguments for the request command.
#[derive(Args)]
pub struct RequestArgs {
    /// Request file, or `-` for stdin
    #[arg(default_value = "-")]
    input: PathBuf,

    /// Pretty-print the response
    #[arg(long)]
    pretty: bool,

    /// Include acquisition attempts in the response
    #[arg(long)]
    explain: bool,
}

#[derive(Serialize)]
struct Explained<'a> {
    #[serde(flatten)]
    result: &'a ParseResult,
    attempts: Vec<AttemptView>,
}

#[derive(Serialize)]
struct AttemptView {
    strategy: String,
    outcome: String,
    chars: usize,
}

impl From<&Attempt> for AttemptView {
    fn from(attempt: &Attempt) -> Self {
        Self {
            strategy: attempt.strategy.to_string(),
            outcome: attempt.outcome.to_string(),
            chars: attempt.chars,
        }
    }
}

pub async fn run(args: RequestArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let body = if args.input.as_os_str() == "-" {
        let mut body = String::new();
        std::io::stdin().read_to_string(&mut body)?;
        body
    } else {
        fs::read_to_string(&args.input)
            .with_context(|| format!("Failed to read {}", args.input.display()))?
    };

    let request: ParseRequest = serde_json::from_str(&body).context("Malformed request JSON")?;
    let data = request.decode()?;
    let pipeline = build_pipeline(config_path)?;

    let report = tokio::task::spawn_blocking(move || {
        pipeline.process_with_report(&data, request.content_type.as_deref())
    })
    .await?;

    let response = if args.explain {
        serde_json::to_value(Explained {
            result: &report.result,
            attempts: report.attempts.iter().map(AttemptView::from).collect(),
        })?
    } else {
        serde_json::to_value(&report.result)?
    };

    let output = if args.pretty {
        serde_json::to_string_pretty(&response)?
    } else {
        serde_json::to_string(&response)?
    };
    println!("{}", output);

    Ok(())
}
