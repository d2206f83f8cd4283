use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use ariadne::{Color, Label, Report, ReportKind, Source};
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use waypoint_common::manifest::{self, WaypointManifest};
use waypoint_common::{Diagnostic, Position, Span};
use waypoint_compiler::{AnnotationCatalog, CompiledUnit, Extractor, ResolverOptions};

/// Waypoint handler extraction compiler.
///
/// Reads a compiled-unit dump and writes the extracted API manifest.
#[derive(Parser)]
#[command(
    name = "waypointc",
    version,
    about,
    long_about = "Waypoint handler extraction compiler.\n\nReads a compiled-unit JSON dump produced by the host front end, extracts\nannotated handlers, and writes an API manifest (JSON).\n\nExamples:\n  waypointc unit.json                 Write unit.api.json\n  waypointc unit.json -o api.json     Write to a custom path\n  waypointc unit.json --check         Report diagnostics only\n  waypointc unit.json --emit-tree     Print the linked handler tree"
)]
struct Cli {
    /// Compiled-unit JSON file.
    input: PathBuf,

    /// Output file path (default: <input>.api.json).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Check for errors without writing a manifest.
    #[arg(long)]
    check: bool,

    /// Suppress warning output.
    #[arg(short, long)]
    quiet: bool,

    /// Write the manifest even when errors were reported.
    #[arg(long)]
    partial: bool,

    /// Print the linked handler tree as JSON to stdout (debug).
    #[arg(long = "emit-tree")]
    emit_tree: bool,

    /// Explicit Waypoint.toml (default: search upward from the input).
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Enable debug logging (overridden by WAYPOINT_LOG).
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let json = match fs::read_to_string(&cli.input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: could not read '{}': {}", cli.input.display(), e);
            process::exit(1);
        }
    };
    let unit = match CompiledUnit::from_json(&json) {
        Ok(u) => u,
        Err(e) => {
            eprintln!("error: '{}' is not a compiled unit: {}", cli.input.display(), e);
            process::exit(1);
        }
    };

    // === Manifest ===
    let abs_input = fs::canonicalize(&cli.input).unwrap_or_else(|_| cli.input.clone());
    let loaded = match &cli.manifest {
        Some(path) => manifest::load_manifest(path).map(Some),
        None => match manifest::find_and_load_manifest(&abs_input) {
            Ok(m) => Ok(Some(m)),
            // No Waypoint.toml is fine: built-in annotations, default resolver.
            Err(manifest::ManifestError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        },
    };
    let project = match loaded {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };

    let mut catalog = AnnotationCatalog::with_builtins();
    let mut options = ResolverOptions::default();
    if let Some(m) = &project {
        info!(project = %m.project.name, root = %m.root_dir.display(), "loaded manifest");
        for def in m.annotations.iter().cloned() {
            if let Err(e) = catalog.register(def) {
                eprintln!("error: {}", e);
                process::exit(1);
            }
        }
        options = ResolverOptions::from(&m.resolver);
    }

    // === Extraction ===
    let mut extractor = Extractor::new(&catalog, &unit, options);
    let extraction = match extractor.run() {
        Ok(x) => x,
        Err(e) => {
            eprintln!("internal error: {}", e);
            process::exit(2);
        }
    };

    let base_dir = abs_input
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let mut sources = SourceCache::new(base_dir, project.as_ref());
    for diag in &extraction.diagnostics {
        if diag.is_error() || !cli.quiet {
            sources.print(diag);
        }
    }

    if cli.emit_tree {
        match serde_json::to_string_pretty(&extraction.tree) {
            Ok(j) => println!("{}", j),
            Err(e) => {
                eprintln!("error: failed to serialize handler tree: {}", e);
                process::exit(1);
            }
        }
    }

    let success = extraction.is_success();
    if cli.check {
        if success {
            println!(
                "No errors found ({} definitions).",
                extraction.definitions.len()
            );
            return;
        }
        process::exit(1);
    }
    if !success && !cli.partial {
        let errors = extraction.errors().count();
        eprintln!(
            "error: extraction failed with {} error(s); no manifest written (use --partial to write anyway)",
            errors
        );
        process::exit(1);
    }

    let api = extraction.into_manifest(project.map(|m| m.project.name));
    let json = match serde_json::to_string_pretty(&api) {
        Ok(j) => j,
        Err(e) => {
            eprintln!("error: failed to serialize manifest: {}", e);
            process::exit(1);
        }
    };

    let output_path = cli.output.unwrap_or_else(|| {
        let mut p = cli.input.clone();
        p.set_extension("api.json");
        p
    });

    match fs::write(&output_path, &json) {
        Ok(()) => {
            println!(
                "Extracted {} definitions from {} -> {}",
                api.definitions.len(),
                cli.input.display(),
                output_path.display()
            );
        }
        Err(e) => {
            eprintln!("error: could not write '{}': {}", output_path.display(), e);
            process::exit(1);
        }
    }

    if !success {
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_env("WAYPOINT_LOG").unwrap_or_else(|_| EnvFilter::new(fallback)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Source text of files named in diagnostic spans, read on first use.
struct SourceCache {
    dirs: Vec<PathBuf>,
    files: HashMap<String, Option<String>>,
}

impl SourceCache {
    fn new(input_dir: PathBuf, project: Option<&WaypointManifest>) -> Self {
        let mut dirs = vec![input_dir];
        if let Some(m) = project {
            dirs.push(m.root_dir.clone());
        }
        Self {
            dirs,
            files: HashMap::new(),
        }
    }

    fn source(&mut self, file: &str) -> Option<&str> {
        if !self.files.contains_key(file) {
            let text = self
                .dirs
                .iter()
                .map(|d| d.join(file))
                .chain(std::iter::once(PathBuf::from(file)))
                .find_map(|p| fs::read_to_string(p).ok());
            if text.is_none() {
                debug!(file = %file, "source not readable; plain diagnostics");
            }
            self.files.insert(file.to_string(), text);
        }
        self.files.get(file).and_then(|t| t.as_deref())
    }

    fn print(&mut self, diag: &Diagnostic) {
        let Some(span) = diag.span.as_ref().filter(|s| !s.is_dummy()) else {
            print_plain(diag);
            return;
        };
        match self.source(&span.file) {
            Some(source) => {
                let source = source.to_string();
                print_report(diag, span, &source);
            }
            None => print_plain(diag),
        }
    }
}

fn print_report(diag: &Diagnostic, span: &Span, source: &str) {
    let file_name = span.file.as_str();
    let kind = if diag.is_error() {
        ReportKind::Error
    } else {
        ReportKind::Warning
    };
    let color = if diag.is_error() {
        Color::Red
    } else {
        Color::Yellow
    };

    let (start, end) = char_range(source, span);
    let mut report = Report::build(kind, file_name, start)
        .with_message(&diag.message)
        .with_label(
            Label::new((file_name, start..end))
                .with_message(&diag.message)
                .with_color(color),
        );
    if let Some(code) = diag.kind {
        report = report.with_code(code.code());
    }

    for related in &diag.related {
        // Labels must point into the same file.
        if related.span.file != span.file {
            continue;
        }
        let (rs, re) = char_range(source, &related.span);
        report = report.with_label(
            Label::new((file_name, rs..re))
                .with_message(&related.message)
                .with_color(Color::Blue),
        );
    }

    if let Some(ref suggestion) = diag.suggestion {
        report = report.with_help(suggestion);
    }

    if let Err(e) = report
        .finish()
        .eprint((file_name, Source::from(source)))
    {
        debug!(error = %e, "report rendering failed");
        print_plain(diag);
    }
}

fn print_plain(diag: &Diagnostic) {
    eprintln!("{}", diag);
    for related in &diag.related {
        eprintln!("   = note: {} ({})", related.message, related.span);
    }
    if let Some(ref suggestion) = diag.suggestion {
        eprintln!("   = help: {}", suggestion);
    }
    eprintln!();
}

/// Character range of a span; ariadne indexes sources by char. Hosts that
/// only report line and column get their offsets computed from the source text.
fn char_range(source: &str, span: &Span) -> (usize, usize) {
    let len = source.chars().count();
    let start = char_offset(source, &span.start).min(len);
    let end = if span.end == Position::default() {
        start
    } else {
        char_offset(source, &span.end)
    };
    (start, end.clamp(start + 1, len.max(start + 1)))
}

fn char_offset(source: &str, pos: &Position) -> usize {
    if pos.offset > 0 || pos.line == 0 {
        let byte = pos.offset as usize;
        return source.char_indices().take_while(|(i, _)| *i < byte).count();
    }
    let line_start: usize = source
        .split_inclusive('\n')
        .take(pos.line as usize - 1)
        .map(|line| line.chars().count())
        .sum();
    line_start + pos.column.saturating_sub(1) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "// größe\nclass Ä {\n  get(): string\n}\n";

    #[test]
    fn line_and_column_count_chars() {
        let span = Span::at("a.ts", 2, 9);
        let (start, end) = char_range(SOURCE, &span);
        assert_eq!(SOURCE.chars().nth(start), Some('{'));
        assert_eq!(end, start + 1);
    }

    #[test]
    fn byte_offsets_convert_to_chars() {
        let byte = SOURCE.find("get").unwrap();
        let start = Position::new(3, 3, byte as u32);
        let end = Position::new(3, 6, (byte + 3) as u32);
        let (s, e) = char_range(SOURCE, &Span::new("a.ts", start, end));
        let label: String = SOURCE.chars().skip(s).take(e - s).collect();
        assert_eq!(label, "get");
    }
}
