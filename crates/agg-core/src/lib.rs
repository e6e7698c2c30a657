//! agg-core: Core library for aggregating sediment core logger output
//!
//! This library provides functionality to:
//! - Discover per-section instrument folders and order them
//! - Read and clean Geotek MSCL and XRF output files
//! - Merge section tables into one table with a stable column order
//! - Rename machine columns to readable headers with units
//! - Filter invalid values, split by site/hole and export to CSV or Excel
//! - Replace logger section numbers with core names from a core list

pub mod config;
pub mod error;
pub mod export;
pub mod filter;
pub mod merger;
pub mod parser;
pub mod pipeline;
pub mod renamer;
pub mod scanner;
pub mod schema;
pub mod table;

pub use config::{AggregateConfig, BatchFile, BatchJob, DataSource, SourceProfile};
pub use error::{Error, Result};
pub use export::{export_table, ExportFormat};
pub use filter::{apply_filters, partition, Comparison, FilterRule, Partition};
pub use merger::{merge_tables, ColumnOrder, MergeEngine, MergedTable};
pub use parser::{read_delimited, read_spreadsheet, ReadOptions};
pub use pipeline::{aggregate, run_batch, AggregateReport, Aggregator, BatchResult};
pub use renamer::{apply_names, RenameOptions, RenameReport};
pub use scanner::{discover_units, CoreId, RecordUnit, UnitOrdering};
pub use schema::{apply_registry, SchemaRegistry};
pub use table::{OutputTable, Row, Table};
