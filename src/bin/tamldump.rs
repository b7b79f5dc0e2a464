//! Command-line tool for inspecting and re-encoding binary documents.
//!
//! Prints the header and an indented dump of the object tree, optionally with
//! counts, and can rewrite a document with or without body compression.

use std::fs;
use std::io::{self, Read, Write};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use log::debug;

use tamloxide::reader::{read_document_from_slice, Document, ReadOptions};
use tamloxide::writer::{write_document_to_vec, WriteOptions, DEFAULT_MAX_DEPTH};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// tamldump -- inspect and re-encode binary object documents.
#[derive(Parser, Debug)]
#[command(name = "tamldump", version, about, long_about = None)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Documents to process (use `-` for stdin).
    #[arg(required = true)]
    files: Vec<String>,

    /// Do not print the tree dump.
    #[arg(long)]
    noout: bool,

    /// Print element, alias and custom node counts.
    #[arg(long)]
    stats: bool,

    /// Print timing information.
    #[arg(long)]
    timing: bool,

    /// Maximum nesting depth accepted when reading.
    #[arg(long, value_name = "N", default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: u32,

    // -- Re-encoding -------------------------------------------------------
    /// Re-encode with a compressed body.
    #[arg(long, conflicts_with = "decompress", requires = "output")]
    compress: bool,

    /// Re-encode with an uncompressed body.
    #[arg(long, requires = "output")]
    decompress: bool,

    /// Where to write the re-encoded document.
    #[arg(long, value_name = "FILE")]
    output: Option<String>,
}

// ---------------------------------------------------------------------------
// Exit codes
// ---------------------------------------------------------------------------

const EXIT_SUCCESS: u8 = 0;
const EXIT_DECODE_ERROR: u8 = 1;
const EXIT_IO_ERROR: u8 = 2;

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    if cli.output.is_some() && cli.files.len() > 1 {
        eprintln!("--output takes a single input file");
        return ExitCode::from(EXIT_IO_ERROR);
    }

    let mut worst_exit = EXIT_SUCCESS;
    for file in &cli.files {
        worst_exit = worst_exit.max(process_file(&cli, file));
    }
    ExitCode::from(worst_exit)
}

/// Processes a single input file and returns an exit code.
fn process_file(cli: &Cli, filename: &str) -> u8 {
    let input = match read_input(filename) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("{filename}: failed to read: {e}");
            return EXIT_IO_ERROR;
        }
    };

    let start = Instant::now();
    let opts = ReadOptions::default().max_depth(cli.max_depth);
    let doc = match read_document_from_slice(&input, &opts) {
        Ok(doc) => doc,
        Err(e) => {
            eprintln!("{filename}: {e}");
            return EXIT_DECODE_ERROR;
        }
    };
    if cli.timing {
        eprintln!("Decoding took {:?}", start.elapsed());
    }
    debug!("{filename}: {} bytes on disk", input.len());

    let mut report = String::new();
    report.push_str(&format!(
        "{filename}: version {}, {}\n",
        doc.header.version,
        if doc.header.compressed {
            "compressed"
        } else {
            "uncompressed"
        }
    ));
    if cli.stats {
        report.push_str(&format_stats(&doc));
    }
    if !cli.noout {
        report.push_str(&doc.tree.debug_dump(doc.root));
    }
    if let Err(e) = io::stdout().write_all(report.as_bytes()) {
        eprintln!("failed to write output: {e}");
        return EXIT_IO_ERROR;
    }

    if let Some(ref output) = cli.output {
        return reencode(cli, &doc, output);
    }
    EXIT_SUCCESS
}

/// Reads input from a file or stdin (when filename is `-`).
fn read_input(filename: &str) -> io::Result<Vec<u8>> {
    if filename == "-" {
        let mut buf = Vec::new();
        io::stdin().read_to_end(&mut buf)?;
        Ok(buf)
    } else {
        fs::read(filename)
    }
}

/// Summarizes element and custom node counts.
fn format_stats(doc: &Document) -> String {
    let tree = &doc.tree;
    let aliases = tree.node_ids().filter(|&id| tree.node(id).is_alias()).count();
    let proxies = tree
        .custom_node_ids()
        .filter(|&id| tree.custom_node(id).is_proxy())
        .count();
    format!(
        "  elements: {} ({aliases} aliases)\n  custom nodes: {} ({proxies} proxies)\n",
        tree.node_count(),
        tree.custom_node_count()
    )
}

/// Writes the document back out with the requested body compression.
fn reencode(cli: &Cli, doc: &Document, output: &str) -> u8 {
    let compressed = if cli.compress {
        true
    } else if cli.decompress {
        false
    } else {
        doc.header.compressed
    };
    let opts = WriteOptions::default()
        .compressed(compressed)
        .version(doc.header.version)
        .max_depth(cli.max_depth);

    let start = Instant::now();
    let bytes = match write_document_to_vec(&doc.tree, doc.root, &opts) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("{output}: {e}");
            return EXIT_IO_ERROR;
        }
    };
    if cli.timing {
        eprintln!("Encoding took {:?}", start.elapsed());
    }
    if let Err(e) = fs::write(output, &bytes) {
        eprintln!("{output}: failed to write: {e}");
        return EXIT_IO_ERROR;
    }
    EXIT_SUCCESS
}
