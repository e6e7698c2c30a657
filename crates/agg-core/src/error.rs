//! Error types for agg-core

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in agg-core
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse a delimited file
    #[error("failed to parse '{path}': {message}")]
    CsvParse { path: PathBuf, message: String },

    /// CSV parsing error from the csv crate
    #[error("CSV error in '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Failed to open or read a spreadsheet
    #[error("failed to read spreadsheet '{path}': {message}")]
    Spreadsheet { path: PathBuf, message: String },

    /// Spreadsheet writer error
    #[error("failed to write spreadsheet: {0}")]
    XlsxWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Directory traversal error
    #[error("failed to traverse directory: {0}")]
    WalkDir(#[from] walkdir::Error),

    /// A record-unit folder holds the wrong number of files for a role
    #[error(
        "{} than {expected} file(s) with extension {extensions} in folder '{}': {found} found, {expected} expected",
        if found > expected { "more" } else { "fewer" },
        folder.display()
    )]
    Discovery {
        folder: PathBuf,
        extensions: String,
        found: usize,
        expected: usize,
    },

    /// The input directory holds no record-unit folders
    #[error("no record-unit folders found in '{}'", .0.display())]
    NoRecordUnits(PathBuf),

    /// A record-unit folder holds no file at all for a required role
    #[error("no .{extension} file was found in folder '{}'", folder.display())]
    MissingInputFile { folder: PathBuf, extension: String },

    /// Paired files of one record unit disagree on row count after cleaning
    #[error("row count mismatch in '{unit}': {left} rows vs {right} rows")]
    RowCountMismatch {
        unit: String,
        left: usize,
        right: usize,
    },

    /// A required column is absent from a table
    #[error("column '{column}' not found in '{}'", path.display())]
    MissingColumn { column: String, path: PathBuf },

    /// Section number or depth column could not be located
    #[error("cannot find {role} column; rename it to one of {}", tried.join(", "))]
    ColumnResolution { role: String, tried: Vec<String> },

    /// Grouping column required for partitioning is absent
    #[error("cannot split output: column '{0}' not found")]
    PartitionKeyMissing(String),

    /// A folder name is not a valid CoreID
    #[error("invalid CoreID: {0}")]
    InvalidCoreId(String),

    /// A folder name has no numeric part index after its separator
    #[error("cannot read part index from folder name '{0}'")]
    InvalidPartIndex(String),

    /// Malformed core list line
    #[error("invalid core list line {line}: {message}")]
    CoreList { line: usize, message: String },

    /// A value could not be interpreted as a number where one is required
    #[error("invalid {column} '{value}' in data row {row}")]
    InvalidValue {
        row: usize,
        column: String,
        value: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovery_message_names_folder_and_counts() {
        let err = Error::Discovery {
            folder: PathBuf::from("CORE_mscl-p1"),
            extensions: ".out, .raw".to_string(),
            found: 3,
            expected: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("CORE_mscl-p1"));
        assert!(msg.contains("3 found, 2 expected"));
        assert!(msg.starts_with("more"));
    }

    #[test]
    fn test_no_record_units_names_directory() {
        let err = Error::NoRecordUnits(PathBuf::from("/data/lake"));
        assert_eq!(err.to_string(), "no record-unit folders found in '/data/lake'");
    }

    #[test]
    fn test_column_resolution_lists_candidates() {
        let err = Error::ColumnResolution {
            role: "section depth".to_string(),
            tried: vec!["Section Depth".to_string(), "SECT DEPTH".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "cannot find section depth column; rename it to one of Section Depth, SECT DEPTH"
        );
    }
}
