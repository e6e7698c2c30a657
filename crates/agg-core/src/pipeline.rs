//! Aggregation pipeline: discovery, reading, merge, rename, filter, export

use crate::config::{AggregateConfig, BatchFile, DataSource, FileKind, SourceProfile};
use crate::error::{Error, Result};
use crate::export::{export_table, normalize_export_path, partition_path, ExportFormat};
use crate::filter::{apply_filters, partition};
use crate::merger::{join_column, MergeEngine, MergedTable};
use crate::parser::{read_delimited, read_spreadsheet};
use crate::scanner::{discover_units, CoreId, RecordUnit};
use crate::schema::{apply_registry, SchemaRegistry};
use crate::table::{OutputTable, Table};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Summary of one aggregation run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateReport {
    /// Record-unit folders merged, in merge order
    pub units: Vec<String>,
    /// Data rows in the combined table
    pub rows: usize,
    /// Columns introduced after the first unit, per unit folder
    pub new_columns: Vec<(String, Vec<String>)>,
    /// Machine columns with no registry entry
    pub schema_gaps: Vec<String>,
    /// Cells blanked by filter rules
    pub masked: usize,
    /// Requested output name when it was changed to fit the format
    pub adjusted_from: Option<PathBuf>,
    /// Files written
    pub outputs: Vec<PathBuf>,
}

/// Runs the full pipeline for one data source
#[derive(Debug, Clone)]
pub struct Aggregator {
    profile: SourceProfile,
    registry: SchemaRegistry,
}

impl Aggregator {
    /// Create an aggregator from an explicit profile and registry
    pub fn new(profile: SourceProfile, registry: SchemaRegistry) -> Self {
        Self { profile, registry }
    }

    /// Create an aggregator with the built-in profile of `source`, applying
    /// the registry file and separator override of `config`
    pub fn for_source(source: DataSource, config: &AggregateConfig) -> Result<Self> {
        let registry = match &config.registry {
            Some(path) => SchemaRegistry::load(path)?,
            None => source.registry(),
        };
        let mut profile = source.profile();
        if let Some(separator) = &config.separator {
            profile = profile.with_separator(separator);
        }
        Ok(Self::new(profile, registry))
    }

    /// Find the record units under `input_dir`
    pub fn discover(&self, input_dir: &Path) -> Result<Vec<RecordUnit>> {
        discover_units(
            input_dir,
            &self.profile.ordering,
            &self.profile.extensions(),
            self.profile.file_tag.as_deref(),
        )
    }

    /// Read and clean every file of one unit into a single table
    pub fn read_unit(&self, unit: &RecordUnit) -> Result<Table> {
        let mut tables = Vec::with_capacity(unit.files.len());
        for (role, path) in self.profile.roles.iter().zip(&unit.files) {
            let table = match role.kind {
                FileKind::Delimited => read_delimited(path, &role.read)?,
                FileKind::Spreadsheet => read_spreadsheet(path, &role.read)?,
            };
            debug!(
                "Read {} rows, {} columns from '{}'",
                table.row_count(),
                table.column_count(),
                path.display()
            );
            tables.push(table);
        }

        let mut tables = tables.into_iter();
        let mut primary = tables.next().unwrap_or_default();

        if let (Some(column), Some(secondary)) = (&self.profile.join_column, tables.next()) {
            join_column(&mut primary, &secondary, column, &unit.name)?;
        }

        if let Some(column) = &self.profile.unit_id_column {
            if !primary.has_column(column) {
                let id = CoreId::parse(&unit.name)?.to_string();
                debug!("Adding {} '{}' to '{}'", column, id, primary.source_path.display());
                primary.prepend_column(column, &id);
            }
        }

        Ok(primary)
    }

    /// Read and merge all units in order.
    ///
    /// Also returns the columns each unit introduced.
    pub fn merge(&self, units: &[RecordUnit]) -> Result<(MergedTable, Vec<(String, Vec<String>)>)> {
        let mut engine = MergeEngine::new(self.profile.trailing_columns);
        let mut new_columns = Vec::new();

        for unit in units {
            let table = self.read_unit(unit)?;
            let added = engine.push(&table);
            if !added.is_empty() {
                new_columns.push((unit.name.clone(), added));
            }
        }

        Ok((engine.finish(), new_columns))
    }

    /// Rename to readable headers, attach units and apply filters.
    ///
    /// Returns the table, the schema gaps and the number of masked cells.
    pub fn build_output(
        &self,
        merged: &MergedTable,
        filter_invalid: bool,
    ) -> (OutputTable, Vec<String>, usize) {
        let (mut table, gaps) = apply_registry(merged, &self.registry, &self.profile.drop_columns);

        let mut masked = 0;
        if filter_invalid {
            if self.profile.filters.is_empty() {
                warn!("no filter rules defined for {}", self.profile.name);
            } else {
                masked = apply_filters(&mut table, &self.profile.filters);
                info!("Removed {} invalid value(s).", masked);
            }
        }

        (table, gaps, masked)
    }

    /// Run the pipeline end to end and write the output file(s)
    pub fn run(&self, config: &AggregateConfig) -> Result<AggregateReport> {
        let start = Instant::now();
        let format = ExportFormat::from_excel_flag(config.excel);

        let output = normalize_export_path(&config.output_filename, format);
        let adjusted_from = if output != config.output_filename {
            debug!(
                "Filename adjusted from '{}' to '{}'",
                config.output_filename.display(),
                output.display()
            );
            Some(config.output_filename.clone())
        } else {
            None
        };
        let output = config.input_dir.join(output);

        let units = self.discover(&config.input_dir)?;
        if units.is_empty() {
            return Err(Error::NoRecordUnits(config.input_dir.clone()));
        }
        let (merged, new_columns) = self.merge(&units)?;
        let (table, schema_gaps, masked) = self.build_output(&merged, config.filter_invalid);

        let outputs = if config.split {
            self.export_partitions(&table, &output, format)?
        } else {
            export_table(&table, &output, format)?;
            vec![output]
        };

        debug!(
            "{} aggregation took {:.2}s",
            self.profile.name,
            start.elapsed().as_secs_f64()
        );

        Ok(AggregateReport {
            units: units.into_iter().map(|u| u.name).collect(),
            rows: table.row_count(),
            new_columns,
            schema_gaps,
            masked,
            adjusted_from,
            outputs,
        })
    }

    fn export_partitions(
        &self,
        table: &OutputTable,
        output: &Path,
        format: ExportFormat,
    ) -> Result<Vec<PathBuf>> {
        let Some(rule) = &self.profile.partition else {
            warn!("{} output cannot be split; writing a single file", self.profile.name);
            export_table(table, output, format)?;
            return Ok(vec![output.to_path_buf()]);
        };

        let mut written = Vec::new();
        for part in partition(table, &rule.column, rule.token)? {
            let path = partition_path(output, &part.key);
            export_table(&part.table, &path, format)?;
            written.push(path);
        }
        Ok(written)
    }
}

/// Aggregate one data source with its built-in profile
pub fn aggregate(source: DataSource, config: &AggregateConfig) -> Result<AggregateReport> {
    info!("Aggregating {} data in '{}'", source, config.input_dir.display());
    Aggregator::for_source(source, config)?.run(config)
}

/// Outcome of a batch run
#[derive(Debug, Default)]
pub struct BatchResult {
    /// Reports of the jobs that succeeded
    pub completed: Vec<(DataSource, AggregateReport)>,
    /// Input directory and error message of each failed job
    pub errors: Vec<(PathBuf, String)>,
}

/// Run every job of a batch in order; a failing job does not stop the rest
pub fn run_batch(batch: &BatchFile) -> BatchResult {
    let mut result = BatchResult::default();
    for job in &batch.jobs {
        match aggregate(job.source, &job.config) {
            Ok(report) => result.completed.push((job.source, report)),
            Err(e) => {
                warn!("{} job in '{}' failed: {}", job.source, job.config.input_dir.display(), e);
                result
                    .errors
                    .push((job.config.input_dir.clone(), e.to_string()));
            }
        }
    }
    result
}
