//! Merge engine for combining record-unit tables
//!
//! Tables are folded in discovery order. Rows are appended as-is (schema
//! union), while a separate [`ColumnOrder`] decides the export layout: the
//! first table fixes the initial order, later tables can only insert columns
//! that were never seen before, just ahead of the trailing columns.

use crate::error::{Error, Result};
use crate::table::Table;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info};

/// Canonical, append-only column order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnOrder {
    columns: Vec<String>,
    /// Number of always-last columns new ones are inserted in front of
    trailing: usize,
}

impl ColumnOrder {
    /// Create an empty order that keeps `trailing` columns last
    pub fn new(trailing: usize) -> Self {
        Self {
            columns: Vec::new(),
            trailing,
        }
    }

    /// Columns in order
    pub fn as_slice(&self) -> &[String] {
        &self.columns
    }

    /// Get the number of columns
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Check if no columns are known yet
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Check if a column is known
    pub fn contains(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    /// Take in the columns of the next table.
    ///
    /// The first call adopts the columns as given. Later calls insert the
    /// unseen columns, in encounter order, before the last `trailing`
    /// columns. Returns the columns that were added.
    pub fn extend<'a, I>(&mut self, columns: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut known: HashSet<&str> = self.columns.iter().map(String::as_str).collect();
        let mut fresh: Vec<String> = Vec::new();
        for name in columns {
            if known.insert(name) {
                fresh.push(name.to_string());
            }
        }

        if fresh.is_empty() {
            return fresh;
        }

        if self.columns.is_empty() {
            self.columns = fresh.clone();
        } else {
            let at = self.columns.len().saturating_sub(self.trailing);
            self.columns.splice(at..at, fresh.iter().cloned());
        }
        fresh
    }

    /// Remove a column; returns whether it was present
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.columns.len();
        self.columns.retain(|c| c != name);
        self.columns.len() != before
    }
}

/// Result of folding all record units together
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedTable {
    /// Export column order (machine names)
    pub order: ColumnOrder,
    /// Row union of every unit
    pub table: Table,
    /// Files that contributed, in merge order
    pub sources: Vec<PathBuf>,
}

impl MergedTable {
    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.table.row_count()
    }
}

/// Incremental merge of record-unit tables
#[derive(Debug, Clone)]
pub struct MergeEngine {
    order: ColumnOrder,
    combined: Table,
    sources: Vec<PathBuf>,
}

impl MergeEngine {
    /// Create an engine keeping `trailing_columns` columns last
    pub fn new(trailing_columns: usize) -> Self {
        Self {
            order: ColumnOrder::new(trailing_columns),
            combined: Table::default(),
            sources: Vec::new(),
        }
    }

    /// Fold one table in; returns the columns it introduced (empty for the
    /// first table, whose columns become the initial order)
    pub fn push(&mut self, table: &Table) -> Vec<String> {
        let first = self.order.is_empty();
        let added = self.order.extend(table.column_names());
        self.combined.append(table);
        self.sources.push(table.source_path.clone());

        if first {
            return Vec::new();
        }
        if !added.is_empty() {
            info!(
                "Additional column{} found in '{}':\n\t{}",
                if added.len() > 1 { "s" } else { "" },
                table.source_path.display(),
                added.join(", ")
            );
        }
        added
    }

    /// Current column order
    pub fn order(&self) -> &ColumnOrder {
        &self.order
    }

    /// Finish merging
    pub fn finish(self) -> MergedTable {
        info!("All data combined ({} rows).", self.combined.row_count());
        MergedTable {
            order: self.order,
            table: self.combined,
            sources: self.sources,
        }
    }
}

/// Merge tables in the given order
pub fn merge_tables(tables: &[Table], trailing_columns: usize) -> MergedTable {
    let mut engine = MergeEngine::new(trailing_columns);
    for table in tables {
        engine.push(table);
    }
    engine.finish()
}

/// Copy `column` from `source` into `target`, matching rows by index.
///
/// Both tables must have the same number of rows after cleaning.
pub fn join_column(target: &mut Table, source: &Table, column: &str, unit: &str) -> Result<()> {
    if target.row_count() != source.row_count() {
        return Err(Error::RowCountMismatch {
            unit: unit.to_string(),
            left: target.row_count(),
            right: source.row_count(),
        });
    }

    let values = source
        .column_values(column)
        .ok_or_else(|| Error::MissingColumn {
            column: column.to_string(),
            path: source.source_path.clone(),
        })?;

    debug!(
        "Joining '{}' from {} into {}",
        column,
        source.source_path.display(),
        target.source_path.display()
    );
    target.set_column(column, values);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_delimited_str, ReadOptions};

    fn table(csv: &str, name: &str) -> Table {
        parse_delimited_str(csv, name, &ReadOptions::default()).unwrap()
    }

    fn names(order: &ColumnOrder) -> Vec<&str> {
        order.as_slice().iter().map(String::as_str).collect()
    }

    #[test]
    fn test_merge_single_table() {
        let t = table("A,B,Temp\n1,2,3\n4,5,6\n", "p1.out");
        let merged = merge_tables(&[t], 1);

        assert_eq!(names(&merged.order), vec!["A", "B", "Temp"]);
        assert_eq!(merged.row_count(), 2);
    }

    #[test]
    fn test_new_columns_go_before_trailing() {
        let a = table("A,B,Temp\n1,2,3\n", "p1.out");
        let b = table("A,C,D,B,Temp\n1,x,y,2,3\n", "p2.out");

        let merged = merge_tables(&[a, b], 1);

        assert_eq!(names(&merged.order), vec!["A", "B", "C", "D", "Temp"]);
    }

    #[test]
    fn test_new_columns_two_trailing() {
        let a = table("ID,Fe,cps,MSE\n1,2,3,4\n", "a.xlsx");
        let b = table("ID,Fe,Ti,cps,MSE\n1,2,5,3,4\n", "b.xlsx");

        let merged = merge_tables(&[a, b], 2);

        assert_eq!(names(&merged.order), vec!["ID", "Fe", "Ti", "cps", "MSE"]);
    }

    #[test]
    fn test_new_columns_appended_when_no_trailing() {
        let a = table("A,B\n1,2\n", "a.csv");
        let b = table("C,A\n3,1\n", "b.csv");

        let merged = merge_tables(&[a, b], 0);

        assert_eq!(names(&merged.order), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_subset_does_not_change_order() {
        let mut order = ColumnOrder::new(1);
        order.extend(["A", "B", "C"]);
        let added = order.extend(["C", "A"]);

        assert!(added.is_empty());
        assert_eq!(names(&order), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_trailing_larger_than_order_inserts_at_front() {
        let mut order = ColumnOrder::new(5);
        order.extend(["A", "B"]);
        order.extend(["C"]);

        assert_eq!(names(&order), vec!["C", "A", "B"]);
    }

    #[test]
    fn test_rows_union_leaves_missing_cells_empty() {
        let a = table("A,B\n1,2\n", "a.csv");
        let b = table("A,C\n3,4\n", "b.csv");

        let merged = merge_tables(&[a, b], 0);

        assert_eq!(merged.table.get(0, "C"), Some(""));
        assert_eq!(merged.table.get(1, "B"), Some(""));
        assert_eq!(merged.table.get(1, "C"), Some("4"));
        assert_eq!(merged.sources.len(), 2);
    }

    #[test]
    fn test_remove_column() {
        let mut order = ColumnOrder::new(0);
        order.extend(["A", "SB DEPTH", "B"]);

        assert!(order.remove("SB DEPTH"));
        assert!(!order.remove("missing"));
        assert_eq!(names(&order), vec!["A", "B"]);
    }

    #[test]
    fn test_join_column() {
        let mut out = table("SECT NUM,Den1\n1,1.5\n1,1.6\n", "p1.out");
        let raw = table("SECT NUM,Temp\n1,20\n1,21\n", "p1.raw");

        join_column(&mut out, &raw, "Temp", "p1").unwrap();

        assert_eq!(out.get(1, "Temp"), Some("21"));
        let cols: Vec<&str> = out.column_names().collect();
        assert_eq!(cols.last(), Some(&"Temp"));
    }

    #[test]
    fn test_join_column_row_mismatch() {
        let mut out = table("A\n1\n2\n", "p1.out");
        let raw = table("Temp\n1\n", "p1.raw");

        let err = join_column(&mut out, &raw, "Temp", "p1").unwrap_err();
        assert!(matches!(
            err,
            Error::RowCountMismatch { left: 2, right: 1, .. }
        ));
    }

    #[test]
    fn test_join_column_missing() {
        let mut out = table("A\n1\n", "p1.out");
        let raw = table("B\n1\n", "p1.raw");

        let err = join_column(&mut out, &raw, "Temp", "p1").unwrap_err();
        assert!(matches!(err, Error::MissingColumn { .. }));
    }
}
