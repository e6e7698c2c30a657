//! Core table types for instrument data
//!
//! Cells are kept as strings for their whole life in the pipeline. An empty
//! string is the only representation of a missing value; numeric meaning is
//! obtained on demand through [`parse_number`].

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A table read from a single source file, or the union of several
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Table {
    /// Column name -> cell position, in storage order
    columns: IndexMap<String, usize>,
    /// Row data; a row may be shorter than the column list
    rows: Vec<Row>,
    /// Source file path (empty for combined tables)
    pub source_path: PathBuf,
}

impl Table {
    /// Create a new empty table
    pub fn new(source_path: PathBuf) -> Self {
        Self {
            columns: IndexMap::new(),
            rows: Vec::new(),
            source_path,
        }
    }

    /// Build a table from a header and rows.
    ///
    /// Duplicate header names are disambiguated with a `.N` suffix so that
    /// every cell stays addressable by name. Rows are padded or truncated to
    /// the header width.
    pub fn from_parts(source_path: PathBuf, header: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let mut table = Self::new(source_path);
        for name in header {
            let mut candidate = name.clone();
            let mut n = 1;
            while table.columns.contains_key(&candidate) {
                candidate = format!("{}.{}", name, n);
                n += 1;
            }
            let idx = table.columns.len();
            table.columns.insert(candidate, idx);
        }

        let width = table.columns.len();
        table.rows = rows
            .into_iter()
            .map(|mut cells| {
                cells.resize(width, String::new());
                Row::new(cells)
            })
            .collect();
        table
    }

    /// Get the number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Column names in storage order
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Check whether a column exists
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Rows in order
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Get a cell by row index and column name; missing cells read as ""
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let idx = *self.columns.get(column)?;
        let row = self.rows.get(row)?;
        Some(row.get(idx).unwrap_or(""))
    }

    /// All values of a column, top to bottom
    pub fn column_values(&self, column: &str) -> Option<Vec<String>> {
        let idx = *self.columns.get(column)?;
        Some(
            self.rows
                .iter()
                .map(|r| r.get(idx).unwrap_or("").to_string())
                .collect(),
        )
    }

    /// Replace a column's values, adding the column at the end if it is new
    pub fn set_column(&mut self, column: &str, values: Vec<String>) {
        let idx = match self.columns.get(column) {
            Some(&idx) => idx,
            None => {
                let idx = self.columns.len();
                self.columns.insert(column.to_string(), idx);
                idx
            }
        };

        for (row, value) in self.rows.iter_mut().zip(values) {
            row.set(idx, value);
        }
    }

    /// Insert a column at the front, filled with one value for every row.
    /// Does nothing if the column already exists.
    pub fn prepend_column(&mut self, column: &str, value: &str) {
        if self.columns.contains_key(column) {
            return;
        }
        let idx = self.columns.len();
        self.columns.shift_insert(0, column.to_string(), idx);
        for row in &mut self.rows {
            row.set(idx, value.to_string());
        }
    }

    /// Append all rows of `other`, matching cells by column name.
    ///
    /// Columns unknown to `self` are added at the end of storage order.
    /// Cells for columns absent from `other` stay empty.
    pub fn append(&mut self, other: &Table) {
        // (cell position in `other`, cell position in `self`)
        let mapping: Vec<(usize, usize)> = other
            .columns
            .iter()
            .map(|(name, &src)| match self.columns.get(name) {
                Some(&dst) => (src, dst),
                None => {
                    let dst = self.columns.len();
                    self.columns.insert(name.to_string(), dst);
                    (src, dst)
                }
            })
            .collect();

        for row in &other.rows {
            let mut cells = vec![String::new(); self.columns.len()];
            for &(src, dst) in &mapping {
                if let Some(value) = row.get(src) {
                    cells[dst] = value.to_string();
                }
            }
            self.rows.push(Row::new(cells));
        }
    }

    /// Project rows onto an explicit column list; unknown names give empty cells
    pub fn project(&self, columns: &[String]) -> Vec<Vec<String>> {
        let positions: Vec<Option<usize>> = columns
            .iter()
            .map(|c| self.columns.get(c).copied())
            .collect();

        self.rows
            .iter()
            .map(|row| {
                positions
                    .iter()
                    .map(|pos| {
                        pos.and_then(|p| row.get(p))
                            .unwrap_or("")
                            .to_string()
                    })
                    .collect()
            })
            .collect()
    }
}

/// A row of data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Row {
    /// Cell values by column position
    pub cells: Vec<String>,
}

impl Row {
    /// Create a new row
    pub fn new(cells: Vec<String>) -> Self {
        Self { cells }
    }

    /// Get a cell value by column position
    pub fn get(&self, index: usize) -> Option<&str> {
        self.cells.get(index).map(String::as_str)
    }

    /// Set a cell, growing the row with empty cells as needed
    pub fn set(&mut self, index: usize, value: String) {
        if self.cells.len() <= index {
            self.cells.resize(index + 1, String::new());
        }
        self.cells[index] = value;
    }
}

/// Final export-ready table: header, units row, then data in column order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputTable {
    /// Readable column headers
    pub columns: Vec<String>,
    /// Unit string for each column
    pub units: Vec<String>,
    /// Data rows, one cell per column
    pub rows: Vec<Vec<String>>,
}

impl OutputTable {
    /// Position of a column by header
    pub fn position(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Keep only the columns whose position satisfies `keep`
    pub fn retain_columns<F: Fn(usize) -> bool>(&mut self, keep: F) {
        let kept: Vec<usize> = (0..self.columns.len()).filter(|&i| keep(i)).collect();
        let pick = |v: &Vec<String>| kept.iter().map(|&i| v[i].clone()).collect::<Vec<_>>();

        self.columns = pick(&self.columns);
        self.units = pick(&self.units);
        self.rows = self.rows.iter().map(pick).collect();
    }
}

/// Interpret a cell as a number.
///
/// Never fails loudly: empty and non-numeric cells become `None`, which the
/// caller treats as missing.
pub fn parse_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Drop trailing fractional zeros from a plain decimal cell.
///
/// `"1.50"` -> `"1.5"`, `"2.0"` -> `"2"`. Anything else, including integers
/// like `"007"`, exponent forms and text, passes through unchanged, so a
/// written cell always reads back as the same value.
pub fn format_number(s: &str) -> String {
    let trimmed = s.trim();
    let unsigned = trimmed.strip_prefix(['-', '+']).unwrap_or(trimmed);
    let Some((int, frac)) = unsigned.split_once('.') else {
        return s.to_string();
    };
    let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if int.is_empty() || !all_digits(int) || !all_digits(frac) {
        return s.to_string();
    }

    let sign = &trimmed[..trimmed.len() - unsigned.len()];
    let frac = frac.trim_end_matches('0');
    if frac.is_empty() {
        format!("{}{}", sign, int)
    } else {
        format!("{}{}.{}", sign, int, frac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_from_parts_pads_and_truncates() {
        let table = Table::from_parts(
            PathBuf::from("t.csv"),
            strings(&["A", "B", "C"]),
            vec![strings(&["1"]), strings(&["1", "2", "3", "4"])],
        );

        assert_eq!(table.rows()[0].cells, strings(&["1", "", ""]));
        assert_eq!(table.rows()[1].cells, strings(&["1", "2", "3"]));
    }

    #[test]
    fn test_from_parts_disambiguates_duplicate_headers() {
        let table = Table::from_parts(
            PathBuf::from("t.csv"),
            strings(&["X", "X", "X"]),
            vec![strings(&["1", "2", "3"])],
        );

        let names: Vec<&str> = table.column_names().collect();
        assert_eq!(names, vec!["X", "X.1", "X.2"]);
        assert_eq!(table.get(0, "X.2"), Some("3"));
    }

    #[test]
    fn test_append_unions_columns() {
        let mut a = Table::from_parts(
            PathBuf::new(),
            strings(&["A", "B"]),
            vec![strings(&["1", "2"])],
        );
        let b = Table::from_parts(
            PathBuf::new(),
            strings(&["B", "C"]),
            vec![strings(&["3", "4"])],
        );

        a.append(&b);

        assert_eq!(a.column_count(), 3);
        assert_eq!(a.get(0, "C"), Some(""));
        assert_eq!(a.get(1, "A"), Some(""));
        assert_eq!(a.get(1, "B"), Some("3"));
        assert_eq!(a.get(1, "C"), Some("4"));
    }

    #[test]
    fn test_prepend_column() {
        let mut table = Table::from_parts(
            PathBuf::new(),
            strings(&["Fe", "Ti"]),
            vec![strings(&["1", "2"]), strings(&["3", "4"])],
        );

        table.prepend_column("SectionID", "P-L19-1A-1P-1");
        table.prepend_column("Fe", "ignored");

        let names: Vec<&str> = table.column_names().collect();
        assert_eq!(names, vec!["SectionID", "Fe", "Ti"]);
        assert_eq!(table.get(1, "SectionID"), Some("P-L19-1A-1P-1"));
        assert_eq!(table.get(1, "Fe"), Some("3"));
    }

    #[test]
    fn test_append_after_prepend_keeps_cells_aligned() {
        let mut section = Table::from_parts(
            PathBuf::new(),
            strings(&["Fe", "Ti"]),
            vec![strings(&["1", "2"])],
        );
        section.prepend_column("SectionID", "P-L19-1A-1P-1");

        let mut combined = Table::default();
        combined.append(&section);
        combined.append(&section);

        let names: Vec<&str> = combined.column_names().collect();
        assert_eq!(names, vec!["SectionID", "Fe", "Ti"]);
        for row in 0..2 {
            assert_eq!(combined.get(row, "SectionID"), Some("P-L19-1A-1P-1"));
            assert_eq!(combined.get(row, "Fe"), Some("1"));
            assert_eq!(combined.get(row, "Ti"), Some("2"));
        }
    }

    #[test]
    fn test_project_unknown_column_is_empty() {
        let table = Table::from_parts(
            PathBuf::new(),
            strings(&["A", "B"]),
            vec![strings(&["1", "2"])],
        );

        let rows = table.project(&strings(&["B", "Z", "A"]));
        assert_eq!(rows, vec![strings(&["2", "", "1"])]);
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("42"), Some(42.0));
        assert_eq!(parse_number(" -2.5 "), Some(-2.5));
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("abc"), None);
        assert_eq!(parse_number("NaN"), None);
    }

    #[test]
    fn test_format_number_shortest() {
        assert_eq!(format_number("1.50"), "1.5");
        assert_eq!(format_number("2.000"), "2");
        assert_eq!(format_number("007"), "007");
        assert_eq!(format_number("Fe"), "Fe");
        assert_eq!(format_number(""), "");
        assert_eq!(format_number("-3.10"), "-3.1");
    }

    #[test]
    fn test_format_number_keeps_non_plain_decimals() {
        assert_eq!(format_number("2E1"), "2E1");
        assert_eq!(format_number("1e-3"), "1e-3");
        assert_eq!(format_number("0.123456789012345678"), "0.123456789012345678");
        assert_eq!(format_number(".5"), ".5");
        assert_eq!(format_number("1.2.3"), "1.2.3");
        assert_eq!(format_number("P-1.0"), "P-1.0");
    }

    #[test]
    fn test_output_retain_columns() {
        let mut out = OutputTable {
            columns: strings(&["A", "B", "C"]),
            units: strings(&["m", "", "cm"]),
            rows: vec![strings(&["1", "", "3"])],
        };

        out.retain_columns(|i| i != 1);

        assert_eq!(out.columns, strings(&["A", "C"]));
        assert_eq!(out.units, strings(&["m", "cm"]));
        assert_eq!(out.rows, vec![strings(&["1", "3"])]);
    }
}
