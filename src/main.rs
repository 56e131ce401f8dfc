//! mobikit - inspect and repack MOBI/AZW3 files

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::json;

use mobikit::{
    ApnxParams, ApnxPolicy, Book, TextCompression, WriteOptions, build_apnx, read_mobi,
    write_mobi_to_path,
};

#[derive(Parser)]
#[command(name = "mobikit")]
#[command(version, about = "Inspect and repack MOBI/AZW3 ebooks", long_about = None)]
#[command(after_help = "EXAMPLES:
    mobikit info book.azw3                  Print a JSON summary
    mobikit repack book.mobi out.azw3 --kf8 Rewrite as KF8
    mobikit apnx book.azw3 book.apnx        Generate a page map")]
struct Cli {
    /// Log debug output (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print metadata and structure as JSON
    Info {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
    },
    /// Read a book and write it back out
    Repack {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,
        /// Emit KF8 (dual-format when the input was dual)
        #[arg(long)]
        kf8: bool,
        /// Store text records uncompressed
        #[arg(long)]
        uncompressed: bool,
        /// Replace the title
        #[arg(long)]
        title: Option<String>,
    },
    /// Generate an APNX page map
    Apnx {
        #[arg(value_name = "INPUT")]
        input: PathBuf,
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,
        /// fast, accurate, pagebreak or regex
        #[arg(long, default_value = "fast")]
        policy: String,
        /// Page pattern for the regex policy
        #[arg(long)]
        pattern: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    let filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Info { input } => show_info(&input),
        Command::Repack {
            input,
            output,
            kf8,
            uncompressed,
            title,
        } => repack(&input, &output, kf8, uncompressed, title),
        Command::Apnx {
            input,
            output,
            policy,
            pattern,
        } => apnx(&input, &output, &policy, pattern),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn summary(path: &Path, book: &Book) -> serde_json::Value {
    let meta = &book.metadata;
    json!({
        "file": path.display().to_string(),
        "title": meta.title,
        "authors": meta.authors,
        "publisher": meta.publisher,
        "language": meta.language,
        "identifiers": meta
            .identifiers
            .iter()
            .map(|id| format!("{}:{}", id.scheme, id.value))
            .collect::<Vec<_>>(),
        "format": format!("{:?}", book.format_version),
        "encoding": format!("{:?}", book.text_encoding),
        "text_length": book.text_html.len(),
        "parts": book.spine.len(),
        "toc_entries": book.toc.len(),
        "resources": book
            .resources
            .iter()
            .map(|r| format!("{:?}", r.kind))
            .collect::<Vec<_>>(),
        "cover": book.cover_index,
        "warnings": book.warnings.iter().map(ToString::to_string).collect::<Vec<_>>(),
    })
}

fn show_info(path: &Path) -> Result<(), String> {
    let book = read_mobi(path).map_err(|e| e.to_string())?;
    let out = serde_json::to_string_pretty(&summary(path, &book)).map_err(|e| e.to_string())?;
    println!("{out}");
    Ok(())
}

fn repack(
    input: &Path,
    output: &Path,
    kf8: bool,
    uncompressed: bool,
    title: Option<String>,
) -> Result<(), String> {
    let book = read_mobi(input).map_err(|e| e.to_string())?;
    let mut options = WriteOptions::default().with_kf8(kf8);
    if uncompressed {
        options = options.with_compression(TextCompression::None);
    }
    if let Some(title) = title {
        options = options.with_title(title);
    }
    write_mobi_to_path(&book, &options, output).map_err(|e| e.to_string())?;
    tracing::info!(input = %input.display(), output = %output.display(), "repacked");
    Ok(())
}

fn apnx(input: &Path, output: &Path, policy: &str, pattern: Option<String>) -> Result<(), String> {
    let policy: ApnxPolicy = policy.parse().map_err(|e: mobikit::Error| e.to_string())?;
    let book = read_mobi(input).map_err(|e| e.to_string())?;
    let mut params = ApnxParams::default();
    params.pattern = pattern;
    if let Some(asin) = book.metadata.identifier("asin") {
        params.asin = asin.to_string();
    }
    let bytes = build_apnx(&book, policy, &params).map_err(|e| e.to_string())?;
    std::fs::write(output, bytes).map_err(|e| e.to_string())?;
    Ok(())
}
