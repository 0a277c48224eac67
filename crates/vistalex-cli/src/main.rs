// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// VistaLex — command-line text extraction.
//
// Entry point. Initialises logging, assembles configuration from file, flags,
// and environment, runs one extraction, and prints the text (or the full
// result as JSON) to stdout. Progress and hints go to stderr.
//
// Exit codes: 0 extracted, 1 failed, 2 likely scanned, 130 interrupted.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Parser, ValueEnum};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vistalex_core::config::{ExtractionConfig, OcrBackendConfig};
use vistalex_core::human_errors::humanize;
use vistalex_core::types::{ContentType, DeclaredFormat, Outcome, PreprocessSpec};
use vistalex_core::Result;
use vistalex_extract::{CancelToken, Extractor, ProgressSink};

const EXIT_FAILED: u8 = 1;
const EXIT_LIKELY_SCANNED: u8 = 2;
const EXIT_INTERRUPTED: u8 = 130;

/// Extract readable text from text, PDF, DOCX, and image files.
#[derive(Debug, Parser)]
#[command(name = "vistalex", version, about)]
struct Cli {
    /// Document to extract.
    file: PathBuf,

    /// Declared MIME type. Inferred from the file extension when omitted.
    #[arg(long)]
    mime: Option<String>,

    /// What the document shows; selects the OCR preprocessing pipeline.
    #[arg(long, value_enum, default_value_t = ContentArg::Document)]
    content_type: ContentArg,

    /// Send images to OCR without preprocessing.
    #[arg(long)]
    no_enhance: bool,

    /// OCR language code.
    #[arg(long)]
    language: Option<String>,

    /// Direct-extraction text at or below this many characters escalates to OCR.
    #[arg(long)]
    min_chars: Option<usize>,

    /// Base URL of a remote OCR backend.
    #[arg(long, env = "VISTALEX_OCR_URL", conflicts_with_all = ["model_dir", "no_ocr"])]
    remote: Option<String>,

    /// Directory holding the local OCR models.
    #[arg(long, conflicts_with = "no_ocr")]
    model_dir: Option<PathBuf>,

    /// Never run OCR.
    #[arg(long)]
    no_ocr: bool,

    /// JSON configuration file. Flags override its values.
    #[arg(long, env = "VISTALEX_CONFIG")]
    config: Option<PathBuf>,

    /// Print the full result, diagnostics included, as JSON.
    #[arg(long)]
    json: bool,

    /// Suppress progress output.
    #[arg(short, long)]
    quiet: bool,

    /// Verbosity (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ContentArg {
    Document,
    Handwriting,
    Photo,
}

impl From<ContentArg> for ContentType {
    fn from(arg: ContentArg) -> Self {
        match arg {
            ContentArg::Document => ContentType::Document,
            ContentArg::Handwriting => ContentType::Handwriting,
            ContentArg::Photo => ContentType::Photo,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        1 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("vistalex: {}", err);
            ExitCode::from(EXIT_FAILED)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config = build_config(&cli)?;
    let mime = declared_mime(&cli.file, cli.mime.as_deref());
    let spec = PreprocessSpec {
        content_type: cli.content_type.into(),
        enhance: !cli.no_enhance,
    };
    let bytes = std::fs::read(&cli.file)?;
    let name = cli
        .file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    info!(file = %cli.file.display(), %mime, ocr = config.ocr_enabled(), "Extracting");

    let (sink, mut rx) = ProgressSink::channel(config.progress_capacity);
    let quiet = cli.quiet || cli.json;
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if !quiet {
                eprintln!("[{:>3}%] {}", event.percent, event.stage.as_str());
            }
        }
    });

    let cancel = CancelToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received; cancelling");
                cancel.cancel();
            }
        });
    }

    let extractor = Extractor::new(config);
    let outcome = extractor
        .extract_upload(bytes, &mime, &name, Some(spec), sink, &cancel)
        .await;
    extractor.shutdown().await;
    let _ = printer.await;

    let Ok(result) = outcome else {
        eprintln!("vistalex: cancelled");
        return Ok(ExitCode::from(EXIT_INTERRUPTED));
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else if !result.text().is_empty() {
        println!("{}", result.text());
    }

    if let Some(hint) = humanize(&result) {
        eprintln!("{}", hint.message);
        eprintln!("  {}", hint.suggestion);
    }

    Ok(match result.outcome() {
        Outcome::Extracted => ExitCode::SUCCESS,
        Outcome::EmptyLikelyScanned => ExitCode::from(EXIT_LIKELY_SCANNED),
        Outcome::Failed(_) => ExitCode::from(EXIT_FAILED),
    })
}

/// Configuration file (or defaults) with command-line overrides applied.
fn build_config(cli: &Cli) -> Result<ExtractionConfig> {
    let mut config = match &cli.config {
        Some(path) => ExtractionConfig::from_json_file(path)?,
        None => ExtractionConfig::default(),
    };

    if let Some(language) = &cli.language {
        config.language = language.clone();
    }
    if let Some(min_chars) = cli.min_chars {
        config.min_text_chars = min_chars;
    }

    if cli.no_ocr {
        config.ocr = OcrBackendConfig::Disabled;
    } else if let Some(url) = &cli.remote {
        config.ocr = OcrBackendConfig::remote(url.clone());
    } else if let Some(dir) = &cli.model_dir {
        config.ocr = OcrBackendConfig::Local {
            model_dir: Some(dir.clone()),
        };
    }

    Ok(config)
}

/// The explicit MIME type, else one inferred from the extension. Unknown
/// extensions fall through as `application/octet-stream` and are rejected
/// at ingestion.
fn declared_mime(path: &Path, explicit: Option<&str>) -> String {
    if let Some(mime) = explicit {
        return mime.to_string();
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(DeclaredFormat::from_extension)
        .map(|format| format.mime_type())
        .unwrap_or("application/octet-stream")
        .to_string()
}
