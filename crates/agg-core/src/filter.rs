//! Value filtering and output partitioning

use crate::error::{Error, Result};
use crate::table::{parse_number, OutputTable};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Comparison applied by a [`FilterRule`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl Comparison {
    fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Comparison::Lt => value < threshold,
            Comparison::Le => value <= threshold,
            Comparison::Gt => value > threshold,
            Comparison::Ge => value >= threshold,
            Comparison::Eq => value == threshold,
            Comparison::Ne => value != threshold,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
        };
        f.write_str(s)
    }
}

/// Blank out values of `column` that satisfy `comparison` against `threshold`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRule {
    pub column: String,
    pub comparison: Comparison,
    pub threshold: f64,
}

impl FilterRule {
    pub fn new(column: impl Into<String>, comparison: Comparison, threshold: f64) -> Self {
        Self {
            column: column.into(),
            comparison,
            threshold,
        }
    }
}

/// Apply filter rules to the data rows; returns the number of cells blanked.
///
/// The rule's column is treated as numeric: non-numeric cells become
/// missing as well. Rows are never removed. Rules naming an absent column
/// are skipped with a warning.
pub fn apply_filters(table: &mut OutputTable, rules: &[FilterRule]) -> usize {
    let mut masked = 0;
    for rule in rules {
        let Some(col) = table.position(&rule.column) else {
            warn!("cannot filter: column '{}' not found", rule.column);
            continue;
        };

        let mut rule_masked = 0;
        for row in &mut table.rows {
            let cell = &mut row[col];
            let keep = match parse_number(cell.as_str()) {
                Some(v) => !rule.comparison.holds(v, rule.threshold),
                None => false,
            };
            if !keep && !cell.is_empty() {
                cell.clear();
                rule_masked += 1;
            }
        }

        debug!(
            "Removed {} value(s) where {} {} {}",
            rule_masked, rule.column, rule.comparison, rule.threshold
        );
        masked += rule_masked;
    }
    masked
}

/// One slice of the output sharing a grouping key
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// Grouping key, e.g. a SiteHole such as `1A`
    pub key: String,
    /// Rows of this group, with all-empty columns removed
    pub table: OutputTable,
    /// Columns removed because they were empty within this group
    pub dropped: Vec<String>,
}

/// Grouping key: the `token`-th dash-delimited token of an identifier
pub fn group_key(value: &str, token: usize) -> Option<&str> {
    value.trim().split('-').nth(token).filter(|t| !t.is_empty())
}

/// Split a table by the `token`-th dash-delimited token of `column`.
///
/// Partitions come out in order of first appearance. Each partition drops
/// the columns that are completely empty within it.
pub fn partition(table: &OutputTable, column: &str, token: usize) -> Result<Vec<Partition>> {
    let col = table
        .position(column)
        .ok_or_else(|| Error::PartitionKeyMissing(column.to_string()))?;

    let mut groups: IndexMap<String, Vec<Vec<String>>> = IndexMap::new();
    for row in &table.rows {
        let key = match group_key(&row[col], token) {
            Some(key) => key.to_string(),
            None => {
                warn!("no group key in '{}', row assigned to 'unassigned'", row[col]);
                "unassigned".to_string()
            }
        };
        groups.entry(key).or_default().push(row.clone());
    }

    let partitions = groups
        .into_iter()
        .map(|(key, rows)| {
            let mut part = OutputTable {
                columns: table.columns.clone(),
                units: table.units.clone(),
                rows,
            };

            let empty: Vec<bool> = (0..part.columns.len())
                .map(|i| part.rows.iter().all(|r| r[i].trim().is_empty()))
                .collect();
            let dropped: Vec<String> = part
                .columns
                .iter()
                .zip(&empty)
                .filter(|(_, e)| **e)
                .map(|(c, _)| c.clone())
                .collect();
            part.retain_columns(|i| !empty[i]);

            if !dropped.is_empty() {
                debug!(
                    "Dropped empty column{} from {}: {}",
                    if dropped.len() > 1 { "s" } else { "" },
                    key,
                    dropped.join(", ")
                );
            }

            Partition {
                key,
                table: part,
                dropped,
            }
        })
        .collect();

    Ok(partitions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn single_column(name: &str, values: &[&str]) -> OutputTable {
        OutputTable {
            columns: strings(&[name]),
            units: strings(&[""]),
            rows: values.iter().map(|v| strings(&[*v])).collect(),
        }
    }

    #[test]
    fn test_filter_masks_below_threshold() {
        let mut table = single_column("MS", &["-60", "-10", "5"]);
        let rules = vec![FilterRule::new("MS", Comparison::Lt, -50.0)];

        let masked = apply_filters(&mut table, &rules);

        assert_eq!(masked, 1);
        assert_eq!(
            table.rows,
            vec![strings(&[""]), strings(&["-10"]), strings(&["5"])]
        );
    }

    #[test]
    fn test_filter_blanks_non_numeric() {
        let mut table = single_column("MS", &["abc", "", "1.50"]);
        let rules = vec![FilterRule::new("MS", Comparison::Lt, -50.0)];

        let masked = apply_filters(&mut table, &rules);

        assert_eq!(masked, 1);
        assert_eq!(
            table.rows,
            vec![strings(&[""]), strings(&[""]), strings(&["1.50"])]
        );
    }

    #[test]
    fn test_filter_missing_column_is_skipped() {
        let mut table = single_column("Other", &["-60"]);
        let rules = vec![FilterRule::new("MS", Comparison::Lt, -50.0)];

        assert_eq!(apply_filters(&mut table, &rules), 0);
        assert_eq!(table.rows, vec![strings(&["-60"])]);
    }

    #[test]
    fn test_comparison_serde() {
        let rule: FilterRule =
            serde_json::from_str(r#"{"column":"MS","comparison":"<","threshold":-50}"#).unwrap();
        assert_eq!(rule.comparison, Comparison::Lt);
        assert_eq!(rule.threshold, -50.0);
    }

    #[test]
    fn test_group_key() {
        assert_eq!(group_key("CASQ-VUO19-1A-2P-3", 2), Some("1A"));
        assert_eq!(group_key("CASQ-VUO19", 2), None);
    }

    #[test]
    fn test_partition_two_groups_drops_empty_columns() {
        let table = OutputTable {
            columns: strings(&["SectionID", "Fe", "Ti"]),
            units: strings(&["", "cts", "cts"]),
            rows: vec![
                strings(&["P-L-A1-1P-1", "10", ""]),
                strings(&["P-L-A2-1P-1", "", "5"]),
                strings(&["P-L-A1-1P-2", "11", ""]),
            ],
        };

        let parts = partition(&table, "SectionID", 2).unwrap();

        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].key, "A1");
        assert_eq!(parts[0].table.columns, strings(&["SectionID", "Fe"]));
        assert_eq!(parts[0].table.units, strings(&["", "cts"]));
        assert_eq!(parts[0].table.row_count(), 2);
        assert_eq!(parts[0].dropped, strings(&["Ti"]));

        assert_eq!(parts[1].key, "A2");
        assert_eq!(parts[1].table.columns, strings(&["SectionID", "Ti"]));
        assert_eq!(parts[1].dropped, strings(&["Fe"]));
    }

    #[test]
    fn test_partition_missing_column() {
        let table = single_column("Fe", &["1"]);
        let err = partition(&table, "SectionID", 2).unwrap_err();
        assert!(matches!(err, Error::PartitionKeyMissing(c) if c == "SectionID"));
    }
}
