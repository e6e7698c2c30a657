//! CoreID renamer
//!
//! Replaces the machine section numbers of an aggregated file with core
//! names from an external core list. Both sides are keyed as
//! `"{segment}_{section}"`, where the segment counter advances whenever the
//! section numbering starts over:
//!
//! - in the core list, when an entry's number is not greater than the
//!   previous one;
//! - in the data, when the section number drops, or stays the same while
//!   the section depth drops.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Header spellings tried for the section number column, in priority order
pub const SECTION_COLUMN_NAMES: &[&str] = &["SECT NUM", "Section", "SectionID"];

/// Header spellings tried for the section depth column, in priority order
pub const DEPTH_COLUMN_NAMES: &[&str] = &["Section Depth", "SECT DEPTH"];

/// Header of the extra key column in the unmatched output
pub const KEY_COLUMN: &str = "Part_Section";

const UNNAMED_MARKER: &str = "_unnamed";
const MATCHED_SUFFIX: &str = "_coreID";
const UNMATCHED_SUFFIX: &str = "_unmatched";
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// One line of the core list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoreListEntry {
    /// Section number as the logger numbers it
    pub number: i64,
    /// Core name to assign
    pub name: String,
}

/// Options for a renamer run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenameOptions {
    /// Zero-based section number column, overriding header lookup
    pub section_column: Option<usize>,
    /// Zero-based section depth column, overriding header lookup
    pub depth_column: Option<usize>,
    /// Matched output file, overriding the derived name
    pub output: Option<PathBuf>,
}

/// Outcome of a renamer run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenameReport {
    /// Rows that received a core name
    pub matched: usize,
    /// Rows whose key had no core list entry
    pub unmatched: usize,
    /// Core names listed more than once, with their count
    pub duplicate_names: Vec<(String, usize)>,
    /// Core names never assigned to any row
    pub unused_names: Vec<String>,
    /// Where matched rows were written
    pub matched_path: PathBuf,
    /// Where unmatched rows were written, if any
    pub unmatched_path: Option<PathBuf>,
}

/// Matched and unmatched rows, before writing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenameOutcome {
    /// Rows with the section column replaced by the core name
    pub matched: Vec<Vec<String>>,
    /// Rows without a match, with their key appended
    pub unmatched: Vec<Vec<String>>,
}

/// Parse `number,name` lines
pub fn parse_core_list(content: &str) -> Result<Vec<CoreListEntry>> {
    let mut entries = Vec::new();
    for (i, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (number, name) = line.split_once(',').ok_or_else(|| Error::CoreList {
            line: i + 1,
            message: format!("expected 'number,name', found '{}'", line),
        })?;
        let number = number.trim().parse::<i64>().map_err(|_| Error::CoreList {
            line: i + 1,
            message: format!("'{}' is not a core number", number.trim()),
        })?;
        entries.push(CoreListEntry {
            number,
            name: name.trim().to_string(),
        });
    }
    Ok(entries)
}

/// Read a core list file (UTF-8, optional BOM)
pub fn load_core_list<P: AsRef<Path>>(path: P) -> Result<Vec<CoreListEntry>> {
    parse_core_list(&read_text(path.as_ref())?)
}

/// Segment keys for the core list, paired with their core names
pub fn core_list_keys(entries: &[CoreListEntry]) -> Vec<(String, String)> {
    let mut segment = 1;
    let mut previous: Option<i64> = None;
    entries
        .iter()
        .map(|entry| {
            if previous.is_some_and(|p| entry.number <= p) {
                segment += 1;
            }
            previous = Some(entry.number);
            (format!("{}_{}", segment, entry.number), entry.name.clone())
        })
        .collect()
}

/// Segment keys for data rows given as `(section number, section depth)`
pub fn data_row_keys(rows: &[(i64, f64)]) -> Vec<String> {
    let mut segment = 1;
    let mut previous: Option<(i64, f64)> = None;
    rows.iter()
        .map(|&(section, depth)| {
            if let Some((prev_section, prev_depth)) = previous {
                if section < prev_section || (section == prev_section && depth < prev_depth) {
                    segment += 1;
                }
            }
            previous = Some((section, depth));
            format!("{}_{}", segment, section)
        })
        .collect()
}

/// Locate a column by override index or by the first matching header name
pub fn resolve_column(
    header: &[String],
    override_index: Option<usize>,
    candidates: &[&str],
    role: &str,
) -> Result<usize> {
    if let Some(idx) = override_index {
        if idx < header.len() {
            debug!("{} column passed explicitly: {}", role, idx);
            return Ok(idx);
        }
        warn!("{} column {} is out of range, searching by name", role, idx);
    }

    for name in candidates {
        if let Some(idx) = header.iter().position(|h| h.trim() == *name) {
            debug!("{} column found in column {} with name '{}'", role, idx, name);
            return Ok(idx);
        }
    }

    Err(Error::ColumnResolution {
        role: role.to_string(),
        tried: candidates.iter().map(|c| format!("'{}'", c)).collect(),
    })
}

/// Assign core names to data rows.
///
/// `rows` are the data rows only (no header or units row); they are
/// expected to be at least as wide as the section and depth columns.
pub fn assign_names(
    rows: Vec<Vec<String>>,
    section_column: usize,
    depth_column: usize,
    entries: &[CoreListEntry],
) -> Result<RenameOutcome> {
    let lookup: HashMap<String, String> = core_list_keys(entries).into_iter().collect();

    let mut positions = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        positions.push((
            parse_cell::<i64>(row, section_column, i, "section number")?,
            parse_cell::<f64>(row, depth_column, i, "section depth")?,
        ));
    }
    let keys = data_row_keys(&positions);

    let mut outcome = RenameOutcome::default();
    for (mut row, key) in rows.into_iter().zip(keys) {
        match lookup.get(&key) {
            Some(name) => {
                row[section_column] = name.clone();
                outcome.matched.push(row);
            }
            None => {
                row.push(key);
                outcome.unmatched.push(row);
            }
        }
    }
    Ok(outcome)
}

fn parse_cell<T: std::str::FromStr>(
    row: &[String],
    column: usize,
    index: usize,
    role: &str,
) -> Result<T> {
    let value = row.get(column).map(|v| v.trim()).unwrap_or("");
    value.parse::<T>().map_err(|_| Error::InvalidValue {
        row: index + 1,
        column: role.to_string(),
        value: value.to_string(),
    })
}

/// Matched output name: explicit override, else the input name with its
/// `_unnamed` marker removed, else `<stem>_coreID.csv`
pub fn matched_output_path(input: &Path, output: Option<&Path>) -> PathBuf {
    if let Some(output) = output {
        return output.to_path_buf();
    }

    let file_name = input
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    if file_name.contains(UNNAMED_MARKER) {
        return input.with_file_name(file_name.replace(UNNAMED_MARKER, ""));
    }
    with_suffix(input, MATCHED_SUFFIX)
}

/// Unmatched output name: `<stem>_unmatched.csv` next to the input
pub fn unmatched_output_path(input: &Path) -> PathBuf {
    with_suffix(input, UNMATCHED_SUFFIX)
}

fn with_suffix(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    input.with_file_name(format!("{}{}.csv", stem, suffix))
}

/// Run the renamer over an aggregated CSV file and write the results
pub fn apply_names<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    core_list: Q,
    options: &RenameOptions,
) -> Result<RenameReport> {
    let input = input.as_ref();
    let core_list = core_list.as_ref();

    let mut records = read_records(input)?;
    if records.len() < 2 {
        return Err(Error::CsvParse {
            path: input.to_path_buf(),
            message: "expected a header row and a units row".to_string(),
        });
    }
    let data = records.split_off(2);
    let units = records.pop().unwrap_or_default();
    let header = records.pop().unwrap_or_default();

    let section_column = resolve_column(
        &header,
        options.section_column,
        SECTION_COLUMN_NAMES,
        "section number",
    )?;
    let depth_column = resolve_column(
        &header,
        options.depth_column,
        DEPTH_COLUMN_NAMES,
        "section depth",
    )?;

    let entries = load_core_list(core_list)?;
    let width = header.len().max(section_column.max(depth_column) + 1);
    let data: Vec<Vec<String>> = data
        .into_iter()
        .filter(|row| !row.iter().all(|c| c.trim().is_empty()))
        .map(|mut row| {
            row.resize(width.max(row.len()), String::new());
            row
        })
        .collect();

    let outcome = assign_names(data, section_column, depth_column, &entries)?;

    let matched_path = matched_output_path(input, options.output.as_deref());
    write_rows(&matched_path, &header, &units, &outcome.matched)?;

    let unmatched_path = if outcome.unmatched.is_empty() {
        None
    } else {
        let path = unmatched_output_path(input);
        let mut header = header.clone();
        header.push(KEY_COLUMN.to_string());
        let mut units = units.clone();
        units.push(String::new());
        write_rows(&path, &header, &units, &outcome.unmatched)?;
        Some(path)
    };

    let report = build_report(&outcome, section_column, &entries, matched_path, unmatched_path);
    log_report(&report, core_list);
    Ok(report)
}

fn build_report(
    outcome: &RenameOutcome,
    section_column: usize,
    entries: &[CoreListEntry],
    matched_path: PathBuf,
    unmatched_path: Option<PathBuf>,
) -> RenameReport {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for entry in entries {
        *counts.entry(entry.name.as_str()).or_default() += 1;
    }
    let duplicate_names = counts
        .iter()
        .filter(|(_, n)| **n > 1)
        .map(|(name, n)| (name.to_string(), *n))
        .collect();

    let used: BTreeSet<&str> = outcome
        .matched
        .iter()
        .map(|row| row[section_column].as_str())
        .collect();
    let unused_names = counts
        .keys()
        .filter(|name| !used.contains(*name))
        .map(|name| name.to_string())
        .collect();

    RenameReport {
        matched: outcome.matched.len(),
        unmatched: outcome.unmatched.len(),
        duplicate_names,
        unused_names,
        matched_path,
        unmatched_path,
    }
}

fn log_report(report: &RenameReport, core_list: &Path) {
    for (name, count) in &report.duplicate_names {
        warn!(
            "Core {} appears in {} {} times.",
            name,
            core_list.display(),
            count
        );
    }

    if !report.unused_names.is_empty() {
        warn!(
            "Not all cores in {} were used. The following {} core {} not used: {}",
            core_list.display(),
            report.unused_names.len(),
            if report.unused_names.len() == 1 { "name was" } else { "names were" },
            report.unused_names.join(", ")
        );
    }

    info!(
        "{} rows had section names assigned, {} unmatched",
        report.matched, report.unmatched
    );
}

fn read_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    let (text, _, _) = encoding_rs::UTF_8.decode(&bytes);
    Ok(text.into_owned())
}

fn read_records(path: &Path) -> Result<Vec<Vec<String>>> {
    let text = read_text(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| Error::Csv {
            path: path.to_path_buf(),
            source: e,
        })?;
        records.push(record.iter().map(|c| c.trim().to_string()).collect());
    }
    Ok(records)
}

fn write_rows(
    path: &Path,
    header: &[String],
    units: &[String],
    rows: &[Vec<String>],
) -> Result<()> {
    let csv_err = |e: csv::Error| Error::Csv {
        path: path.to_path_buf(),
        source: e,
    };

    let mut file = File::create(path)?;
    file.write_all(UTF8_BOM)?;

    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(header).map_err(csv_err)?;
    writer.write_record(units).map_err(csv_err)?;
    for row in rows {
        writer.write_record(row).map_err(csv_err)?;
    }
    writer.flush()?;
    Ok(())
}
