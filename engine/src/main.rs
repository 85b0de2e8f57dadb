//! Statnorm CLI - Extract canonical series from irregular statistical tables
//!
//! # Main Commands
//!
//! ```bash
//! statnorm extract -s cpi=cpi.xlsx -s business-cycle=ci.csv -o out.csv
//! statnorm profile list             # Manage table profiles
//! ```
//!
//! # Debug Commands
//!
//! ```bash
//! statnorm layout cpi.xlsx -p cpi   # Show the resolved layout
//! statnorm locate cpi.xlsx 総合     # Show every cell matching a pattern
//! ```

use clap::{Parser, Subcommand};
use statnorm::{
    locate, sink, CsvSink, ExtractionJob, Frequency, JsonSink, OutputFormat, Pattern, PipelineOptions,
    ProfileRegistry, Sink, SourceSpec, TableSource,
};
use std::io;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "statnorm")]
#[command(about = "Extract canonical period-indexed series from irregular statistical tables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract and merge series: PROFILE=PATH per source
    Extract {
        /// Source as PROFILE=PATH (profile name, stored id or JSON file)
        #[arg(short, long = "source", required = true)]
        sources: Vec<String>,

        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format: csv or json
        #[arg(short, long, default_value = "csv")]
        format: OutputFormat,

        /// Fail when a layout needed a fallback
        #[arg(long)]
        strict: bool,

        /// Expected frequency (annual, quarterly, monthly)
        #[arg(long)]
        frequency: Option<Frequency>,

        /// Write diagnostics as JSON to this file
        #[arg(long)]
        diagnostics: Option<PathBuf>,
    },

    /// Show the resolved layout of a table
    Layout {
        /// Input file
        input: PathBuf,

        /// Profile name, stored id or JSON file
        #[arg(short, long)]
        profile: String,

        /// Workbook sheet (overrides the profile)
        #[arg(long)]
        sheet: Option<String>,
    },

    /// List every cell matching a pattern
    Locate {
        /// Input file
        input: PathBuf,

        /// Text to search for
        pattern: String,

        /// Treat the pattern as a regular expression
        #[arg(long)]
        regex: bool,

        /// Only search the first N rows
        #[arg(long)]
        scan_limit: Option<usize>,

        /// Workbook sheet (default: first)
        #[arg(long)]
        sheet: Option<String>,
    },

    /// Manage table profiles
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// List stored profiles
    List,

    /// List built-in profiles
    Builtins,

    /// Show a profile as JSON
    Show {
        /// Profile name, stored id or JSON file
        name: String,
    },

    /// Import a profile JSON file
    Import {
        /// Profile JSON file
        file: PathBuf,
        /// Name for the stored profile
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Delete a stored profile
    Delete {
        /// Profile id
        id: String,
    },

    /// List profiles whose header anchor is present in a file
    Match {
        /// Input file
        input: PathBuf,
        /// Workbook sheet (default: first)
        #[arg(long)]
        sheet: Option<String>,
    },
}

fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Extract {
            sources,
            output,
            format,
            strict,
            frequency,
            diagnostics,
        } => {
            let options = PipelineOptions {
                strict,
                frequency,
                format,
            };
            cmd_extract(&sources, output.as_deref(), &options, diagnostics.as_deref())
        }

        Commands::Layout { input, profile, sheet } => cmd_layout(&input, &profile, sheet),

        Commands::Locate {
            input,
            pattern,
            regex,
            scan_limit,
            sheet,
        } => cmd_locate(&input, &pattern, regex, scan_limit, sheet),

        Commands::Profile { action } => cmd_profile(action),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

fn parse_source_arg(arg: &str) -> Result<(&str, &str), String> {
    match arg.split_once('=') {
        Some((profile, path)) if !profile.trim().is_empty() && !path.trim().is_empty() => {
            Ok((profile.trim(), path.trim()))
        }
        _ => Err(format!("expected PROFILE=PATH, got '{}'", arg)),
    }
}

fn cmd_extract(
    sources: &[String],
    output: Option<&Path>,
    options: &PipelineOptions,
    diagnostics_path: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let registry = ProfileRegistry::new();

    let mut jobs = Vec::with_capacity(sources.len());
    for arg in sources {
        let (name, path) = parse_source_arg(arg)?;
        let (profile, _) = registry.resolve(name)?;
        jobs.push(ExtractionJob::new(path, profile));
    }

    let report = statnorm::run_all(&jobs, options)?;

    for diagnostic in report.diagnostics.iter() {
        eprintln!("   ⚠️ {}", diagnostic);
    }
    if let Some(path) = diagnostics_path {
        std::fs::write(path, serde_json::to_string_pretty(&report.diagnostics)?)?;
        eprintln!("   💾 Diagnostics saved to: {}", path.display());
    }

    let table = &report.merged.table;
    let columns = statnorm::ColumnMapping::new();
    match output {
        Some(path) => {
            sink::write_file(path, options.format, table, &columns)?;
            eprintln!("   💾 Saved to: {}", path.display());
        }
        None => match options.format {
            OutputFormat::Csv => CsvSink::new(io::stdout().lock()).write(table, &columns)?,
            OutputFormat::Json => JsonSink::new(io::stdout().lock()).write(table, &columns)?,
        },
    }

    eprintln!("✅ {} periods, {} columns", table.len(), table.metrics.len());
    Ok(())
}

fn cmd_layout(input: &Path, profile: &str, sheet: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let registry = ProfileRegistry::new();
    let (profile, _) = registry.resolve(profile)?;

    let mut source = SourceSpec::new(input).with_options(profile.source.clone());
    if sheet.is_some() {
        source.options.sheet = sheet;
    }
    eprintln!("📄 Resolving layout: {}", source.describe());

    let grid = source.load_grid()?;
    let layout = statnorm::resolve(&grid, &profile.layout)?;

    for degradation in &layout.degradations {
        eprintln!("   ⚠️ {}", degradation);
    }
    println!("{}", serde_json::to_string_pretty(&layout)?);
    Ok(())
}

fn cmd_locate(
    input: &Path,
    pattern: &str,
    regex: bool,
    scan_limit: Option<usize>,
    sheet: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let pattern = if regex {
        Pattern::regex(pattern)?
    } else {
        Pattern::substring(pattern)
    };

    let mut source = SourceSpec::new(input);
    source.options.sheet = sheet;
    let grid = source.load_grid()?;

    let anchors = locate(&grid, &pattern, scan_limit);
    if anchors.is_empty() {
        eprintln!("No cell matches {}", pattern);
    }
    for anchor in &anchors {
        println!("{}\t{}\t{}", anchor.row, anchor.column, anchor.text);
    }
    Ok(())
}

fn cmd_profile(action: ProfileAction) -> Result<(), Box<dyn std::error::Error>> {
    let mut registry = ProfileRegistry::new();

    match action {
        ProfileAction::List => {
            let stored = registry.list();
            if stored.is_empty() {
                eprintln!("No stored profiles in {}", registry.dir().display());
            }
            for s in stored {
                println!("{}\t{}\t{}", s.id, s.profile.name, s.created_at);
            }
        }

        ProfileAction::Builtins => {
            for profile in statnorm::builtins() {
                println!("{}\t{}", profile.name, profile.description);
            }
        }

        ProfileAction::Show { name } => {
            let (profile, _) = registry.resolve(&name)?;
            println!("{}", profile.to_json()?);
        }

        ProfileAction::Import { file, name } => {
            let id = registry.import(&file, name.as_deref())?;
            println!("{}", id);
        }

        ProfileAction::Delete { id } => {
            registry.delete(&id)?;
            eprintln!("🗑️ Deleted {}", id);
        }

        ProfileAction::Match { input, sheet } => {
            let mut source = SourceSpec::new(input);
            source.options.sheet = sheet;
            let grid = source.load_grid()?;
            for name in registry.find_matching(&grid) {
                println!("{}", name);
            }
        }
    }

    Ok(())
}
