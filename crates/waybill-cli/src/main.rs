//! `waybill` command line: turns warehouse transfer notes and supplier
//! invoices (PDF or scanned image) into priced line items.
//!
//! Every command reads documents through the same pipeline: the PDF text
//! layer first, OCR of rendered pages or embedded scans after, then the
//! transfer and invoice parsers in order. Results go to stdout; logs go to
//! stderr so JSON output stays pipeable.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{batch, config, parse, request};

const AFTER_HELP: &str = "\
Text is taken from the PDF text layer when it parses, otherwise from OCR.
A document that yields no line items still succeeds with an empty result.

Legacy overrides: OCR_PSMS, OCR_REMOVE_LINES, OCR_RASTER_DPI,
BARCODE_MIN_LENGTH and BARCODE_MAX_LENGTH take precedence over the file.";

/// Pull line items, quantities and totals out of transfer notes and invoices
#[derive(Parser)]
#[command(name = "waybill")]
#[command(author, version, about, long_about = None, after_help = AFTER_HELP)]
struct Cli {
    /// Log more to stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// JSON config file (defaults to the per-user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract line items from one PDF or image and print them
    Parse(parse::ParseArgs),

    /// Extract line items from every file a glob matches, several at a time
    Batch(batch::BatchArgs),

    /// Answer a `{contentType, data}` JSON envelope with a JSON result
    Request(request::RequestArgs),

    /// Create, inspect or edit the JSON config file
    Config(config::ConfigArgs),
}

/// Stderr log level for a count of `-v` flags; warnings are always shown.
fn log_level(verbose: u8) -> Level {
    match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level(cli.verbose))
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Parse(args) => parse::run(args, config_path).await,
        Commands::Batch(args) => batch::run(args, config_path).await,
        Commands::Request(args) => request::run(args, config_path).await,
        Commands::Config(args) => config::run(args, config_path).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_verbosity_saturates_at_trace() {
        assert_eq!(log_level(0), Level::WARN);
        assert_eq!(log_level(2), Level::DEBUG);
        assert_eq!(log_level(9), Level::TRACE);
    }

    #[test]
    fn test_verbose_flag_is_global() {
        let cli = Cli::try_parse_from(["waybill", "config", "path", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }
}
