//! Core logger aggregation CLI
//!
//! Command-line tool for combining per-section MSCL and XRF output into one
//! table, and for assigning core names to logger section numbers.

use agg_core::{
    aggregate, apply_names, run_batch, AggregateConfig, AggregateReport, BatchFile, BatchJob,
    DataSource, RenameOptions,
};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "agg-cli")]
#[command(about = "Sediment core logger data aggregator", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Options shared by every aggregation subcommand
#[derive(Args)]
struct CommonArgs {
    /// Directory holding the per-section folders
    input_dir: PathBuf,

    /// Output file name, written inside the input directory
    output_filename: PathBuf,

    /// Write an Excel workbook instead of CSV
    #[arg(short = 'e', long)]
    excel: bool,

    /// Print per-file detail
    #[arg(short, long)]
    verbose: bool,

    /// Registry file (machine,readable,unit) replacing the built-in one
    #[arg(long)]
    registry: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Combine Geotek MSCL-S whole-core data
    MsclS {
        #[command(flatten)]
        common: CommonArgs,

        /// Separator before the part number in folder names
        #[arg(short = 's', long, default_value = "-p")]
        separator: String,
    },

    /// Combine Geotek MSCL-XYZ split-core data
    MsclXyz {
        #[command(flatten)]
        common: CommonArgs,

        /// Remove invalid values (Magnetic Susceptibility < -50)
        #[arg(short = 'f', long)]
        filter_invalid: bool,
    },

    /// Combine XRF core scanner data
    Xrf {
        #[command(flatten)]
        common: CommonArgs,

        /// Write one file per site and hole
        #[arg(short = 's', long)]
        split: bool,
    },

    /// Replace section numbers with core names from a core list
    Rename {
        /// Aggregated file to rename
        input: PathBuf,

        /// Core list file (number,name per line)
        core_list: PathBuf,

        /// Output file for matched rows
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Zero-based section number column
        #[arg(short = 's', long)]
        section_column: Option<usize>,

        /// Zero-based section depth column
        #[arg(short = 'd', long)]
        depth_column: Option<usize>,

        /// Print detailed output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Run a batch of aggregation jobs
    Batch {
        /// Path to batch file (JSON)
        #[arg(short, long)]
        batch: PathBuf,

        /// Print per-file detail
        #[arg(short, long)]
        verbose: bool,
    },

    /// Create a batch file template
    CreateBatch {
        /// Output path for the batch file
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> agg_core::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::MsclS { common, separator } => {
            cmd_aggregate(DataSource::MsclS, common, false, false, Some(separator))
        }
        Commands::MsclXyz {
            common,
            filter_invalid,
        } => cmd_aggregate(DataSource::MsclXyz, common, filter_invalid, false, None),
        Commands::Xrf { common, split } => {
            cmd_aggregate(DataSource::Xrf, common, false, split, None)
        }
        Commands::Rename {
            input,
            core_list,
            output,
            section_column,
            depth_column,
            verbose,
        } => {
            init_logging(verbose);
            let options = RenameOptions {
                section_column,
                depth_column,
                output,
            };
            cmd_rename(&input, &core_list, &options)
        }
        Commands::Batch { batch, verbose } => {
            init_logging(verbose);
            cmd_batch(&batch)
        }
        Commands::CreateBatch { output } => cmd_create_batch(&output),
    }
}

/// Install the log subscriber; `RUST_LOG` overrides the verbosity flag
fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .init();
}

fn cmd_aggregate(
    source: DataSource,
    common: CommonArgs,
    filter_invalid: bool,
    split: bool,
    separator: Option<String>,
) -> agg_core::Result<()> {
    init_logging(common.verbose);

    let config = AggregateConfig {
        input_dir: common.input_dir,
        output_filename: common.output_filename,
        excel: common.excel,
        verbose: common.verbose,
        filter_invalid,
        split,
        registry: common.registry,
        separator,
    };

    let report = aggregate(source, &config)?;
    print_report(source, &report, config.verbose);

    Ok(())
}

fn print_report(source: DataSource, report: &AggregateReport, verbose: bool) {
    println!(
        "Combined {} rows of {} data from {} folders",
        report.rows,
        source,
        report.units.len()
    );

    if let (Some(from), Some(first)) = (&report.adjusted_from, report.outputs.first()) {
        let adjusted = first.file_name().map(Path::new).unwrap_or(first.as_path());
        println!(
            "Filename adjusted from '{}' to '{}'",
            from.display(),
            adjusted.display()
        );
    }

    if verbose {
        for (unit, columns) in &report.new_columns {
            println!("  {}: added {}", unit, columns.join(", "));
        }
    }

    if !report.schema_gaps.is_empty() {
        println!(
            "No readable header for: {}",
            report.schema_gaps.join(", ")
        );
    }

    if report.masked > 0 {
        println!("Removed {} invalid values", report.masked);
    }

    for path in &report.outputs {
        println!("  - {}", path.display());
    }
}

fn cmd_rename(input: &Path, core_list: &Path, options: &RenameOptions) -> agg_core::Result<()> {
    let report = apply_names(input, core_list, options)?;

    println!(
        "Assigned core names to {} rows ({} unmatched)",
        report.matched, report.unmatched
    );
    println!("  - {}", report.matched_path.display());
    if let Some(path) = &report.unmatched_path {
        println!("  - {}", path.display());
    }

    Ok(())
}

fn cmd_batch(batch_path: &Path) -> agg_core::Result<()> {
    let batch = BatchFile::load(batch_path)?;

    println!("Running batch with {} jobs", batch.jobs.len());
    println!();

    let result = run_batch(&batch);

    for (source, report) in &result.completed {
        print_report(*source, report, false);
    }

    println!();
    println!("Batch complete:");
    println!("  {} jobs succeeded", result.completed.len());

    if !result.errors.is_empty() {
        println!("\nErrors ({}):", result.errors.len());
        for (path, err) in &result.errors {
            println!("  {}: {}", path.display(), err);
        }
    }

    Ok(())
}

fn cmd_create_batch(output: &Path) -> agg_core::Result<()> {
    let job = |source, dir: &str, name: &str| BatchJob {
        source,
        config: AggregateConfig {
            input_dir: PathBuf::from(dir),
            output_filename: PathBuf::from(name),
            ..AggregateConfig::default()
        },
    };
    let batch = BatchFile {
        jobs: vec![
            job(DataSource::MsclS, "path/to/mscl-s", "MSCL-S_combined.csv"),
            job(DataSource::MsclXyz, "path/to/mscl-xyz", "MSCL-XYZ_combined.csv"),
            job(DataSource::Xrf, "path/to/xrf", "XRF_combined.csv"),
        ],
    };

    batch.save(output)?;
    println!("Created batch file: {}", output.display());
    println!();
    println!("Edit the file to configure your batch, then run:");
    println!("  agg-cli batch --batch {}", output.display());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mscl_s_separator_flag() {
        let cli = Cli::try_parse_from(["agg-cli", "mscl-s", "in", "out.csv", "-s", "_part"]).unwrap();
        match cli.command {
            Commands::MsclS { separator, .. } => assert_eq!(separator, "_part"),
            _ => panic!("expected mscl-s"),
        }

        let cli = Cli::try_parse_from(["agg-cli", "mscl-s", "in", "out.csv"]).unwrap();
        match cli.command {
            Commands::MsclS { separator, .. } => assert_eq!(separator, "-p"),
            _ => panic!("expected mscl-s"),
        }
    }
}
