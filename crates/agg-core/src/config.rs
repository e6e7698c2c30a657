//! Data-source profiles and run configuration

use crate::error::{Error, Result};
use crate::filter::{Comparison, FilterRule};
use crate::parser::{ReadOptions, TextEncoding};
use crate::scanner::UnitOrdering;
use crate::schema::SchemaRegistry;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Supported instrument outputs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataSource {
    /// Geotek MSCL-S whole-core logger (`.out`/`.raw` pairs)
    MsclS,
    /// Geotek MSCL-XYZ split-core logger (one `.csv` per part)
    MsclXyz,
    /// XRF core scanner (one `.xlsx` per section)
    Xrf,
}

impl DataSource {
    /// Built-in profile for this source
    pub fn profile(self) -> SourceProfile {
        match self {
            DataSource::MsclS => SourceProfile::mscl_s(),
            DataSource::MsclXyz => SourceProfile::mscl_xyz(),
            DataSource::Xrf => SourceProfile::xrf(),
        }
    }

    /// Built-in schema registry for this source
    pub fn registry(self) -> SchemaRegistry {
        match self {
            DataSource::MsclS => SchemaRegistry::mscl_s(),
            DataSource::MsclXyz => SchemaRegistry::mscl_xyz(),
            DataSource::Xrf => SchemaRegistry::xrf(),
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataSource::MsclS => "MSCL-S",
            DataSource::MsclXyz => "MSCL-XYZ",
            DataSource::Xrf => "XRF",
        };
        f.write_str(s)
    }
}

/// How a file is loaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Delimited,
    Spreadsheet,
}

/// One required file in every record-unit folder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileRole {
    /// Extension without the dot
    pub extension: String,
    pub kind: FileKind,
    pub read: ReadOptions,
}

/// Split settings: group rows by a dash-delimited token of `column`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitRule {
    /// Readable column holding the identifier
    pub column: String,
    /// Zero-based token index
    pub token: usize,
}

/// Everything format-specific about aggregating one data source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceProfile {
    pub name: String,
    /// Folder recognition and ordering
    pub ordering: UnitOrdering,
    /// Required files; the first is the primary table
    pub roles: Vec<FileRole>,
    /// Column copied from the second file into the primary table
    pub join_column: Option<String>,
    /// Columns kept last when new columns appear
    pub trailing_columns: usize,
    /// Machine columns left out of the export
    pub drop_columns: Vec<String>,
    /// Invalid-value rules, applied when filtering is requested
    pub filters: Vec<FilterRule>,
    /// Grouping used when splitting is requested
    pub partition: Option<SplitRule>,
    /// Column filled with the folder's CoreID when a file lacks it
    pub unit_id_column: Option<String>,
    /// Text every required file name must contain
    #[serde(default)]
    pub file_tag: Option<String>,
}

impl SourceProfile {
    /// MSCL-S: `.out` + `.raw` pairs in `*mscl*-p<N>` folders
    pub fn mscl_s() -> Self {
        let geotek = |drop_rows: Vec<usize>| ReadOptions {
            delimiter: '\t',
            skip_rows: 1,
            header_rows: 1,
            drop_rows,
            encoding: TextEncoding::Latin1,
        };

        Self {
            name: DataSource::MsclS.to_string(),
            ordering: UnitOrdering::PartSuffix {
                tag: "mscl".to_string(),
                separator: "-p".to_string(),
            },
            roles: vec![
                FileRole {
                    extension: "out".to_string(),
                    kind: FileKind::Delimited,
                    read: geotek(vec![0]),
                },
                // .raw rows run one behind the .out rows
                FileRole {
                    extension: "raw".to_string(),
                    kind: FileKind::Delimited,
                    read: geotek(vec![0, 1]),
                },
            ],
            join_column: Some("Temp".to_string()),
            trailing_columns: 1,
            drop_columns: vec!["SB DEPTH".to_string()],
            filters: Vec::new(),
            partition: None,
            unit_id_column: None,
            file_tag: None,
        }
    }

    /// MSCL-XYZ: one `.csv` in `*xyz*_part<N>` folders
    pub fn mscl_xyz() -> Self {
        Self {
            name: DataSource::MsclXyz.to_string(),
            ordering: UnitOrdering::PartSuffix {
                tag: "xyz".to_string(),
                separator: "_part".to_string(),
            },
            roles: vec![FileRole {
                extension: "csv".to_string(),
                kind: FileKind::Delimited,
                read: ReadOptions {
                    delimiter: ',',
                    skip_rows: 2,
                    header_rows: 2,
                    drop_rows: Vec::new(),
                    encoding: TextEncoding::Latin1,
                },
            }],
            join_column: None,
            trailing_columns: 0,
            drop_columns: vec![
                "Depth".to_string(),
                "Core Depth".to_string(),
                "Munsell Colour".to_string(),
            ],
            filters: vec![FilterRule::new(
                "Magnetic Susceptibility",
                Comparison::Lt,
                -50.0,
            )],
            partition: None,
            unit_id_column: None,
            file_tag: Some("xyz".to_string()),
        }
    }

    /// XRF: one `.xlsx` per CoreID-named folder
    pub fn xrf() -> Self {
        Self {
            name: DataSource::Xrf.to_string(),
            ordering: UnitOrdering::CoreId,
            roles: vec![FileRole {
                extension: "xlsx".to_string(),
                kind: FileKind::Spreadsheet,
                read: ReadOptions::default(),
            }],
            join_column: None,
            trailing_columns: 2,
            drop_columns: Vec::new(),
            filters: Vec::new(),
            partition: Some(SplitRule {
                column: "SectionID".to_string(),
                token: 2,
            }),
            unit_id_column: Some("SectionID".to_string()),
            file_tag: None,
        }
    }

    /// Extensions of the required files, in role order
    pub fn extensions(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.extension.clone()).collect()
    }

    /// Replace the part separator of suffix-numbered folders
    pub fn with_separator(mut self, separator: &str) -> Self {
        match &mut self.ordering {
            UnitOrdering::PartSuffix { separator: current, .. } => {
                *current = separator.to_string();
            }
            UnitOrdering::CoreId => {
                warn!("{} folders are named by CoreID; ignoring separator '{}'", self.name, separator);
            }
        }
        self
    }
}

/// Options for one aggregation run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateConfig {
    /// Directory holding the record-unit folders
    pub input_dir: PathBuf,
    /// Output file name, resolved against `input_dir` when relative
    pub output_filename: PathBuf,
    /// Write an Excel workbook instead of CSV
    #[serde(default)]
    pub excel: bool,
    /// Report per-file detail
    #[serde(default)]
    pub verbose: bool,
    /// Blank out values matched by the profile's filter rules
    #[serde(default)]
    pub filter_invalid: bool,
    /// Write one file per group instead of a single file
    #[serde(default)]
    pub split: bool,
    /// Registry file replacing the built-in one
    #[serde(default)]
    pub registry: Option<PathBuf>,
    /// Folder part separator replacing the profile's own (e.g. `-p`)
    #[serde(default)]
    pub separator: Option<String>,
}

/// One job of a batch file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchJob {
    pub source: DataSource,
    #[serde(flatten)]
    pub config: AggregateConfig,
}

/// A list of aggregation jobs run in order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchFile {
    pub jobs: Vec<BatchJob>,
}

impl BatchFile {
    /// Load a batch file from JSON
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| Error::FileRead {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(Error::Json)
    }

    /// Save the batch file to JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_profiles() {
        let s = SourceProfile::mscl_s();
        assert_eq!(s.extensions(), vec!["out", "raw"]);
        assert_eq!(s.trailing_columns, 1);
        assert_eq!(s.roles[1].read.drop_rows, vec![0, 1]);

        let xyz = SourceProfile::mscl_xyz();
        assert_eq!(xyz.trailing_columns, 0);
        assert_eq!(xyz.roles[0].read.header_rows, 2);

        let xrf = SourceProfile::xrf();
        assert_eq!(xrf.trailing_columns, 2);
        assert_eq!(xrf.ordering, UnitOrdering::CoreId);
    }

    #[test]
    fn test_with_separator() {
        let s = SourceProfile::mscl_s().with_separator("_part");
        assert_eq!(
            s.ordering,
            UnitOrdering::PartSuffix {
                tag: "mscl".to_string(),
                separator: "_part".to_string(),
            }
        );

        let xrf = SourceProfile::xrf().with_separator("_part");
        assert_eq!(xrf.ordering, UnitOrdering::CoreId);
    }

    #[test]
    fn test_batch_file_json() {
        let json = r#"{
            "jobs": [
                {"source": "mscl-s", "input_dir": "/data/s", "output_filename": "s.csv"},
                {"source": "xrf", "input_dir": "/data/x", "output_filename": "x", "excel": true, "split": true}
            ]
        }"#;

        let batch: BatchFile = serde_json::from_str(json).unwrap();

        assert_eq!(batch.jobs.len(), 2);
        assert_eq!(batch.jobs[0].source, DataSource::MsclS);
        assert!(!batch.jobs[0].config.excel);
        assert_eq!(batch.jobs[1].source, DataSource::Xrf);
        assert!(batch.jobs[1].config.split);
        assert_eq!(batch.jobs[1].config.separator, None);
    }

    #[test]
    fn test_batch_file_save_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("batch.json");
        let batch = BatchFile {
            jobs: vec![BatchJob {
                source: DataSource::MsclXyz,
                config: AggregateConfig {
                    input_dir: PathBuf::from("/data/xyz"),
                    output_filename: PathBuf::from("xyz.csv"),
                    filter_invalid: true,
                    ..AggregateConfig::default()
                },
            }],
        };

        batch.save(&path).unwrap();
        let loaded = BatchFile::load(&path).unwrap();

        assert_eq!(loaded.jobs[0].source, DataSource::MsclXyz);
        assert!(loaded.jobs[0].config.filter_invalid);
    }
}
