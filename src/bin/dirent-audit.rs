//! Command-line entrypoint: audit a raw-count file against a reported-count file.
//!
//! Exit status is 0 for a clean run, 1 when input lines were dropped and 2 when
//! the run failed.

use std::{
    path::{Path, PathBuf},
    process::ExitCode,
};

use anyhow::Context;
use clap::Parser;
use dirent_audit::{
    audit,
    option::{DEFAULT_MAX_LINE_LENGTH, DEFAULT_WRITE_BUFFER},
    AuditOptions, AuditSummary, DiagnosticSink, Outcome, RecordStream,
};
use tokio::{
    fs::File,
    io::{AsyncWrite, BufReader},
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Compare raw directory entry counts with reported counts")]
struct Args {
    /// File of `<count> <json-string>` lines computed from actual entries.
    #[arg(long)]
    raw: PathBuf,
    /// File of `<count> <json-string>` lines previously reported.
    #[arg(long)]
    reported: PathBuf,
    /// Write diagnostics here instead of stdout.
    #[arg(long, short)]
    output: Option<PathBuf>,
    /// Also emit `count okay` diagnostics.
    #[arg(long, short)]
    verbose: bool,
    /// Longest accepted input line, in bytes.
    #[arg(long, default_value_t = DEFAULT_MAX_LINE_LENGTH)]
    max_line_length: usize,
    /// Output bytes buffered before the writer applies backpressure.
    #[arg(long, default_value_t = DEFAULT_WRITE_BUFFER)]
    write_buffer: usize,
}

async fn open(
    label: &str,
    path: &Path,
    options: &AuditOptions,
) -> anyhow::Result<RecordStream<BufReader<File>>> {
    let file = File::open(path)
        .await
        .with_context(|| format!("opening {label} input {}", path.display()))?;
    Ok(RecordStream::new(label, BufReader::new(file), options))
}

async fn run(args: Args) -> anyhow::Result<AuditSummary> {
    let options = AuditOptions::default()
        .verbose(args.verbose)
        .max_line_length(args.max_line_length)
        .write_buffer(args.write_buffer);

    let sources = vec![
        open("raw", &args.raw, &options).await?,
        open("reported", &args.reported, &options).await?,
    ];
    let writer: Box<dyn AsyncWrite + Unpin + Send> = match &args.output {
        Some(path) => Box::new(
            File::create(path)
                .await
                .with_context(|| format!("creating output {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdout()),
    };

    let summary = audit(sources, DiagnosticSink::new(writer, &options), &options).await?;
    Ok(summary)
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("dirent_audit=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(summary) => match summary.outcome() {
            Outcome::Clean => ExitCode::SUCCESS,
            Outcome::Warnings => {
                eprintln!("{} malformed input lines were skipped", summary.warnings());
                ExitCode::from(1)
            }
        },
        Err(err) => {
            eprintln!("dirent-audit: {err:#}");
            ExitCode::from(2)
        }
    }
}
