//! Reader and cleaner for instrument output files
//!
//! Every source file goes through the same steps: decode, skip leading
//! metadata lines, read one or two header lines, drop configured data rows
//! (units rows and device offsets), discard blank rows, and square every row
//! to the header width.

use crate::error::{Error, Result};
use crate::table::Table;
use calamine::{open_workbook_auto, Reader};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Text encoding of a delimited source file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextEncoding {
    /// UTF-8, with or without a byte order mark
    #[default]
    Utf8,
    /// Latin-1 as written by the Geotek software
    Latin1,
}

impl TextEncoding {
    fn decode(self, bytes: &[u8]) -> String {
        match self {
            TextEncoding::Utf8 => {
                let (text, _, _) = encoding_rs::UTF_8.decode(bytes);
                text.into_owned()
            }
            // ISO-8859-1: every byte is the code point of the same value
            TextEncoding::Latin1 => encoding_rs::mem::decode_latin1(bytes).into_owned(),
        }
    }
}

/// How to read and clean one kind of source file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadOptions {
    /// Field delimiter
    pub delimiter: char,
    /// Leading metadata lines to skip before the header
    pub skip_rows: usize,
    /// Number of header lines (1, or 2 for devices with a two-row header)
    pub header_rows: usize,
    /// Data rows to drop, zero-based after the header
    pub drop_rows: Vec<usize>,
    /// Source text encoding
    pub encoding: TextEncoding,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            delimiter: ',',
            skip_rows: 0,
            header_rows: 1,
            drop_rows: Vec::new(),
            encoding: TextEncoding::Utf8,
        }
    }
}

impl ReadOptions {
    /// Options for a tab-delimited file
    pub fn tab() -> Self {
        Self {
            delimiter: '\t',
            ..Self::default()
        }
    }
}

/// Read a delimited text file into a cleaned Table
pub fn read_delimited<P: AsRef<Path>>(path: P, opts: &ReadOptions) -> Result<Table> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let text = opts.encoding.decode(&bytes);
    parse_records(&text, path.to_path_buf(), opts)
}

/// Parse delimited content from a string (useful for testing)
pub fn parse_delimited_str(content: &str, source_name: &str, opts: &ReadOptions) -> Result<Table> {
    parse_records(content, PathBuf::from(source_name), opts)
}

fn parse_records(text: &str, path: PathBuf, opts: &ReadOptions) -> Result<Table> {
    let body = skip_lines(text, opts.skip_rows);

    let delimiter = u8::try_from(opts.delimiter).map_err(|_| Error::CsvParse {
        path: path.clone(),
        message: format!("unsupported delimiter {:?}", opts.delimiter),
    })?;

    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true) // Malformed files carry extra cells on some lines
        .from_reader(body.as_bytes());

    let mut records = Vec::new();
    for result in csv_reader.records() {
        let record = result.map_err(|e| Error::Csv {
            path: path.clone(),
            source: e,
        })?;
        records.push(record.iter().map(str::to_string).collect());
    }

    clean_records(path, records, opts)
}

/// Read the first worksheet of a spreadsheet into a cleaned Table.
///
/// `skip_rows` counts worksheet rows; the delimiter and encoding are unused.
pub fn read_spreadsheet<P: AsRef<Path>>(path: P, opts: &ReadOptions) -> Result<Table> {
    let path = path.as_ref();
    let spreadsheet_err = |message: String| Error::Spreadsheet {
        path: path.to_path_buf(),
        message,
    };

    let mut workbook = open_workbook_auto(path).map_err(|e| spreadsheet_err(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| spreadsheet_err("no worksheet found".to_string()))?
        .map_err(|e| spreadsheet_err(e.to_string()))?;

    let records: Vec<Vec<String>> = range
        .rows()
        .skip(opts.skip_rows)
        .map(|row| row.iter().map(|cell| cell.to_string()).collect())
        .collect();

    clean_records(path.to_path_buf(), records, opts)
}

/// Turn raw records (header lines first) into a cleaned Table
fn clean_records(path: PathBuf, records: Vec<Vec<String>>, opts: &ReadOptions) -> Result<Table> {
    let header_rows = opts.header_rows.max(1);
    if records.len() < header_rows {
        return Err(Error::CsvParse {
            path,
            message: "no header found".to_string(),
        });
    }

    let mut records = records.into_iter();
    let mut header: Vec<String> = records
        .next()
        .unwrap_or_default()
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    for _ in 1..header_rows {
        let next = records.next().unwrap_or_default();
        header = merge_header_rows(&header, &next);
    }

    if header.iter().all(String::is_empty) {
        return Err(Error::CsvParse {
            path,
            message: "no columns found".to_string(),
        });
    }

    let width = header.len();
    let mut malformed = 0;
    let rows: Vec<Vec<String>> = records
        .enumerate()
        .filter(|(i, _)| !opts.drop_rows.contains(i))
        .map(|(_, row)| row)
        .filter(|row| !row.iter().all(|c| c.trim().is_empty()))
        .inspect(|row| {
            if row.len() > width {
                malformed += 1;
            }
        })
        .collect();

    if malformed > 0 {
        debug!(
            "{} row(s) in {} wider than the header, truncated",
            malformed,
            path.display()
        );
    }

    Ok(Table::from_parts(path, header, rows))
}

/// Merge a two-row header: a blank cell in the first row takes the cell
/// below it.
pub fn merge_header_rows(first: &[String], second: &[String]) -> Vec<String> {
    let width = first.len().max(second.len());
    (0..width)
        .map(|i| {
            let top = first.get(i).map(|s| s.trim()).unwrap_or("");
            if top.is_empty() {
                second.get(i).map(|s| s.trim()).unwrap_or("").to_string()
            } else {
                top.to_string()
            }
        })
        .collect()
}

/// Slice off the first `n` lines of `text`
fn skip_lines(text: &str, n: usize) -> &str {
    let mut rest = text;
    for _ in 0..n {
        match rest.find('\n') {
            Some(pos) => rest = &rest[pos + 1..],
            None => return "",
        }
    }
    rest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_strips_header_whitespace_and_drops_units() {
        let content = "metadata line\n SECT NUM \tSECT DEPTH\tDen1 \n\tcm\tg/cc\n1\t0.5\t1.7\n1\t1.0\t1.8\n";
        let opts = ReadOptions {
            skip_rows: 1,
            drop_rows: vec![0],
            ..ReadOptions::tab()
        };

        let table = parse_delimited_str(content, "core.out", &opts).unwrap();

        let names: Vec<&str> = table.column_names().collect();
        assert_eq!(names, vec!["SECT NUM", "SECT DEPTH", "Den1"]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.get(0, "SECT DEPTH"), Some("0.5"));
    }

    #[test]
    fn test_parse_extra_row_drop_for_offset_file() {
        let content = "meta\nSECT NUM\tTemp\nunits\tC\n1\t20.1\n1\t20.2\n1\t20.3\n";
        let opts = ReadOptions {
            skip_rows: 1,
            drop_rows: vec![0, 1],
            ..ReadOptions::tab()
        };

        let table = parse_delimited_str(content, "core.raw", &opts).unwrap();

        assert_eq!(table.row_count(), 2);
        assert_eq!(table.get(0, "Temp"), Some("20.2"));
    }

    #[test]
    fn test_parse_squares_malformed_rows() {
        let content = "A,B,C\n1,2\n1,2,3,4,5\n";
        let table = parse_delimited_str(content, "bad.csv", &ReadOptions::default()).unwrap();

        assert_eq!(table.rows()[0].cells, vec!["1", "2", ""]);
        assert_eq!(table.rows()[1].cells, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_parse_empty_fields_are_empty_strings() {
        let content = "A,B\n,x\n";
        let table = parse_delimited_str(content, "t.csv", &ReadOptions::default()).unwrap();

        assert_eq!(table.get(0, "A"), Some(""));
    }

    #[test]
    fn test_parse_discards_blank_rows() {
        let content = "A,B\n1,2\n,\n\n3,4\n";
        let table = parse_delimited_str(content, "t.csv", &ReadOptions::default()).unwrap();

        assert_eq!(table.row_count(), 2);
        assert_eq!(table.get(1, "A"), Some("3"));
    }

    #[test]
    fn test_parse_two_row_header() {
        let content = "junk\njunk\nSection,CIE XYZ Colour Space,,\n,X,Y,Z\n1,0.1,0.2,0.3\n";
        let opts = ReadOptions {
            skip_rows: 2,
            header_rows: 2,
            ..ReadOptions::default()
        };

        let table = parse_delimited_str(content, "xyz.csv", &opts).unwrap();

        let names: Vec<&str> = table.column_names().collect();
        assert_eq!(names, vec!["Section", "CIE XYZ Colour Space", "Y", "Z"]);
        assert_eq!(table.get(0, "Z"), Some("0.3"));
    }

    #[test]
    fn test_merge_header_rows_prefers_first_row() {
        let first = vec!["A".to_string(), " ".to_string()];
        let second = vec!["x".to_string(), " B ".to_string(), "C".to_string()];

        assert_eq!(merge_header_rows(&first, &second), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_latin1_decoding() {
        let bytes = b"Temp \xb0C";
        assert_eq!(TextEncoding::Latin1.decode(bytes), "Temp °C");

        // C1 range maps to U+0080..U+009F, not to cp1252 punctuation
        let c1 = TextEncoding::Latin1.decode(b"\x80\x9F");
        assert_eq!(c1, "\u{80}\u{9F}");
    }

    #[test]
    fn test_utf8_bom_is_stripped() {
        let bytes = b"\xef\xbb\xbfA,B";
        assert_eq!(TextEncoding::Utf8.decode(bytes), "A,B");
    }

    #[test]
    fn test_missing_header_is_error() {
        let err = parse_delimited_str("only\n", "t.csv", &ReadOptions {
            skip_rows: 1,
            ..ReadOptions::default()
        });
        assert!(err.is_err());
    }
}
