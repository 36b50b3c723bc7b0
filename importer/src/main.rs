//! tabload CLI - Import spreadsheet rows into SQLite
//!
//! # Main Commands
//!
//! ```bash
//! tabload import 2.xlsx --preset historical-records --db historical_records_v2.db
//! tabload import --config import.json       # everything from a config file
//! tabload show --db records.db --table historical_records
//! ```
//!
//! # Helpers
//!
//! ```bash
//! tabload inspect 1.xlsx                    # columns and row count
//! tabload mapping atmospheric-records       # print a preset mapping as JSON
//! tabload presets                           # list built-in mappings
//! ```

use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use tabload::logs::{LogFormat, LOG_SINK};
use tabload::{
    load_source, preset, run_import, EmptyKeyPolicy, FieldMapping, ImportConfig, SourceOptions,
    SqliteStore, PRESET_NAMES,
};

#[derive(Parser)]
#[command(name = "tabload")]
#[command(about = "Import spreadsheet rows into a uniqueness-constrained SQLite table", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the import pipeline
    Import {
        /// Input workbook or CSV file (overrides the config file source)
        input: Option<PathBuf>,

        /// JSON import configuration
        #[arg(short, long, conflicts_with_all = ["preset", "mapping"])]
        config: Option<PathBuf>,

        /// Built-in mapping preset
        #[arg(short, long, conflicts_with = "mapping")]
        preset: Option<String>,

        /// Mapping JSON file
        #[arg(short, long)]
        mapping: Option<PathBuf>,

        /// SQLite database file
        #[arg(long, env = "TABLOAD_DB")]
        db: Option<PathBuf>,

        /// Target table name
        #[arg(short, long)]
        table: Option<String>,

        /// Worksheet to read (default: first sheet)
        #[arg(long)]
        sheet: Option<String>,

        /// CSV delimiter (auto-detect if not specified)
        #[arg(short, long)]
        delimiter: Option<char>,

        /// Keep the existing table and append to it
        #[arg(long)]
        no_reset: bool,

        /// Drop rows whose key field is empty instead of deduplicating them
        #[arg(long)]
        reject_empty_keys: bool,

        /// Write the JSON report to a file (default: stdout)
        #[arg(short, long)]
        report: Option<PathBuf>,

        /// Emit log lines as JSON
        #[arg(long)]
        log_json: bool,
    },

    /// Load a source and print its columns and row count
    Inspect {
        /// Input workbook or CSV file
        input: PathBuf,

        /// Worksheet to read (default: first sheet)
        #[arg(long)]
        sheet: Option<String>,

        /// CSV delimiter (auto-detect if not specified)
        #[arg(short, long)]
        delimiter: Option<char>,
    },

    /// Print the rows of an imported table as JSON
    Show {
        /// SQLite database file
        #[arg(long, env = "TABLOAD_DB")]
        db: PathBuf,

        /// Table name
        #[arg(short, long)]
        table: String,
    },

    /// Print a preset mapping as JSON
    Mapping {
        /// Preset name
        name: String,
    },

    /// List built-in mapping presets
    Presets,
}

fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Import {
            input,
            config,
            preset,
            mapping,
            db,
            table,
            sheet,
            delimiter,
            no_reset,
            reject_empty_keys,
            report,
            log_json,
        } => {
            if log_json {
                LOG_SINK.set_format(LogFormat::Json);
            }
            build_config(ImportArgs {
                input,
                config,
                preset,
                mapping,
                db,
                table,
                sheet,
                delimiter,
                no_reset,
                reject_empty_keys,
            })
            .and_then(|config| cmd_import(&config, report.as_deref()))
        }

        Commands::Inspect {
            input,
            sheet,
            delimiter,
        } => cmd_inspect(&input, SourceOptions { sheet, delimiter }),

        Commands::Show { db, table } => cmd_show(&db, &table),

        Commands::Mapping { name } => cmd_mapping(&name),

        Commands::Presets => cmd_presets(),
    };

    if let Err(e) = result {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}

struct ImportArgs {
    input: Option<PathBuf>,
    config: Option<PathBuf>,
    preset: Option<String>,
    mapping: Option<PathBuf>,
    db: Option<PathBuf>,
    table: Option<String>,
    sheet: Option<String>,
    delimiter: Option<char>,
    no_reset: bool,
    reject_empty_keys: bool,
}

/// Merge a config file, preset or mapping file with command-line overrides.
fn build_config(args: ImportArgs) -> Result<ImportConfig, Box<dyn std::error::Error>> {
    let mut config = match args.config {
        Some(ref path) => ImportConfig::load(path)?,
        None => {
            let source = args
                .input
                .clone()
                .ok_or("an input file is required without --config")?;
            let db = args
                .db
                .clone()
                .ok_or("--db (or TABLOAD_DB) is required without --config")?;

            match args.mapping {
                Some(ref path) => {
                    let mapping = FieldMapping::from_json(&fs::read_to_string(path)?)?;
                    let table = args
                        .table
                        .clone()
                        .ok_or("--table is required with --mapping")?;
                    ImportConfig::new(source, db, table, mapping)
                }
                None => {
                    let name = args.preset.as_deref().unwrap_or("historical-records");
                    ImportConfig::from_preset(name, source, db)?
                }
            }
        }
    };

    if let Some(input) = args.input {
        config.source = input;
    }
    if let Some(db) = args.db {
        config.database = db;
    }
    if let Some(table) = args.table {
        config.table = table;
    }
    if args.sheet.is_some() {
        config.sheet = args.sheet;
    }
    if args.delimiter.is_some() {
        config.delimiter = args.delimiter;
    }
    if args.no_reset {
        config.reset_on_run = false;
    }
    if args.reject_empty_keys {
        config.empty_key_policy = EmptyKeyPolicy::Reject;
    }

    Ok(config)
}

fn cmd_import(config: &ImportConfig, report_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Importing: {}", config.source.display());
    eprintln!("   Table: {} ({})", config.table, config.database.display());
    if !config.reset_on_run {
        eprintln!("   Mode: append");
    }

    let report = run_import(config).map_err(|e| format!("{}: {}", e.kind(), e))?;

    eprintln!("\n📊 Summary:");
    eprintln!("   Rows read: {}", report.rows_read);
    if report.missing_key_removed > 0 {
        eprintln!("   Missing key removed: {}", report.missing_key_removed);
    }
    eprintln!("   Duplicates removed: {}", report.duplicates_removed);
    eprintln!("   Missing required removed: {}", report.missing_required_removed);
    eprintln!("   Rows persisted: {}", report.rows_persisted);

    let json = serde_json::to_string_pretty(&report)?;
    write_output(&json, report_path)?;

    eprintln!("\n✨ Done!");
    Ok(())
}

fn cmd_inspect(input: &Path, options: SourceOptions) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("📄 Inspecting: {}", input.display());

    let table = load_source(input, &options)?;

    if let Some(ref sheet) = table.sheet {
        eprintln!("   Sheet: {}", sheet);
    }
    if let Some(ref encoding) = table.encoding {
        eprintln!("   Encoding: {}", encoding);
    }
    if let Some(delimiter) = table.delimiter {
        eprintln!("   Delimiter: {:?}", delimiter);
    }
    eprintln!("   Columns: {}", table.headers.join(", "));
    eprintln!("✅ {} data rows", table.records.len());

    let summary = serde_json::json!({
        "kind": table.kind,
        "sheet": table.sheet,
        "columns": table.headers,
        "rows": table.records.len(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn cmd_show(db: &Path, table: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = SqliteStore::open(db)?;
    let rows = store.fetch_all(table)?;
    eprintln!("📋 {} rows in '{}'", rows.len(), table);
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

fn cmd_mapping(name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let preset = preset(name).ok_or_else(|| format!("Unknown mapping preset: {}", name))?;
    println!("{}", preset.mapping.to_json()?);
    Ok(())
}

fn cmd_presets() -> Result<(), Box<dyn std::error::Error>> {
    for name in PRESET_NAMES {
        if let Some(p) = preset(name) {
            println!("  📄 {} → table '{}'", p.name, p.table);
            println!("     {}", p.mapping.description);
            println!("     Columns: {}", p.mapping.source_labels().join(", "));
            println!();
        }
    }
    Ok(())
}

fn write_output(content: &str, path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    match path {
        Some(p) => {
            fs::write(p, content)?;
            eprintln!("💾 Report written to: {}", p.display());
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}
