//! Export of the final table to CSV or Excel

use crate::error::{Error, Result};
use crate::table::{format_number, parse_number, OutputTable};
use rust_xlsxwriter::{Workbook, XlsxError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Output file format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Excel,
}

impl ExportFormat {
    /// Pick the format from the excel flag
    pub fn from_excel_flag(excel: bool) -> Self {
        if excel {
            ExportFormat::Excel
        } else {
            ExportFormat::Csv
        }
    }

    fn accepts(self, extension: &str) -> bool {
        let ext = extension.to_ascii_lowercase();
        match self {
            ExportFormat::Csv => ext == "csv",
            ExportFormat::Excel => ext == "xlsx" || ext == "xls",
        }
    }

    fn default_extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Excel => "xlsx",
        }
    }
}

/// Make the file extension agree with the export format.
///
/// A valid extension for the format is kept; any other extension is
/// replaced, and a missing one is added.
pub fn normalize_export_path(path: &Path, format: ExportFormat) -> PathBuf {
    let valid = path
        .extension()
        .is_some_and(|ext| format.accepts(&ext.to_string_lossy()));

    if valid {
        path.to_path_buf()
    } else {
        path.with_extension(format.default_extension())
    }
}

/// Path for one partition: `<stem>_<key>.<ext>` next to `base`
pub fn partition_path(base: &Path, key: &str) -> PathBuf {
    let stem = base
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let name = match base.extension() {
        Some(ext) => format!("{}_{}.{}", stem, key, ext.to_string_lossy()),
        None => format!("{}_{}", stem, key),
    };
    base.with_file_name(name)
}

/// Write a table in the given format; `path` must already be normalized
pub fn export_table(table: &OutputTable, path: &Path, format: ExportFormat) -> Result<()> {
    info!("Exporting combined data to '{}'", path.display());
    match format {
        ExportFormat::Csv => write_csv(table, path),
        ExportFormat::Excel => write_xlsx(table, path),
    }?;
    info!("Exported combined data to '{}'", path.display());
    Ok(())
}

/// Write header, units row, and data as CSV
pub fn write_csv(table: &OutputTable, path: &Path) -> Result<()> {
    let csv_err = |e: csv::Error| Error::Csv {
        path: path.to_path_buf(),
        source: e,
    };

    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    writer.write_record(&table.columns).map_err(csv_err)?;
    writer.write_record(&table.units).map_err(csv_err)?;
    for row in &table.rows {
        writer
            .write_record(row.iter().map(|cell| format_number(cell)))
            .map_err(csv_err)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write header, units row, and data to a single-sheet workbook.
///
/// Numeric-looking cells are stored as numbers.
pub fn write_xlsx(table: &OutputTable, path: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name("Sheet1")?;

    for (c, (name, unit)) in table.columns.iter().zip(&table.units).enumerate() {
        let col = u16::try_from(c).map_err(|_| XlsxError::RowColumnLimitError)?;
        sheet.write_string(0, col, name)?;
        if !unit.is_empty() {
            sheet.write_string(1, col, unit)?;
        }
    }

    for (r, row) in table.rows.iter().enumerate() {
        let row_num = u32::try_from(r + 2).map_err(|_| XlsxError::RowColumnLimitError)?;
        for (c, cell) in row.iter().enumerate() {
            if cell.is_empty() {
                continue;
            }
            let col = u16::try_from(c).map_err(|_| XlsxError::RowColumnLimitError)?;
            match parse_number(cell) {
                Some(v) => sheet.write_number(row_num, col, v)?,
                None => sheet.write_string(row_num, col, cell)?,
            };
        }
    }

    workbook.save(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{read_delimited, ReadOptions};
    use calamine::{open_workbook_auto, Data, Reader};

    #[test]
    fn test_normalize_csv() {
        let p = |s: &str| normalize_export_path(Path::new(s), ExportFormat::Csv);
        assert_eq!(p("out.csv"), PathBuf::from("out.csv"));
        assert_eq!(p("out.CSV"), PathBuf::from("out.CSV"));
        assert_eq!(p("out"), PathBuf::from("out.csv"));
        assert_eq!(p("out.xlsx"), PathBuf::from("out.csv"));
    }

    #[test]
    fn test_normalize_excel() {
        let p = |s: &str| normalize_export_path(Path::new(s), ExportFormat::Excel);
        assert_eq!(p("out.xlsx"), PathBuf::from("out.xlsx"));
        assert_eq!(p("out.xls"), PathBuf::from("out.xls"));
        assert_eq!(p("out.csv"), PathBuf::from("out.xlsx"));
        assert_eq!(p("out"), PathBuf::from("out.xlsx"));
    }

    #[test]
    fn test_partition_path() {
        assert_eq!(
            partition_path(Path::new("/data/LAKE_XRF.csv"), "1A"),
            PathBuf::from("/data/LAKE_XRF_1A.csv")
        );
    }

    #[test]
    fn test_write_csv_header_units_and_shortest_numbers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let table = OutputTable {
            columns: vec!["SectionID".into(), "Section Depth".into()],
            units: vec!["".into(), "cm".into()],
            rows: vec![vec!["1".into(), "0.50".into()], vec!["2".into(), "".into()]],
        };

        write_csv(&table, &path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "SectionID,Section Depth\n,cm\n1,0.5\n2,\n");
    }

    #[test]
    fn test_write_xlsx_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        let table = OutputTable {
            columns: vec!["SectionID".into(), "Fe".into()],
            units: vec!["".into(), "cts".into()],
            rows: vec![vec!["P-L-1A-1P-1".into(), "120".into()]],
        };

        write_xlsx(&table, &path).unwrap();

        let mut workbook = open_workbook_auto(&path).unwrap();
        let range = workbook.worksheet_range("Sheet1").unwrap();
        assert_eq!(range.get_value((0, 0)), Some(&Data::String("SectionID".into())));
        assert_eq!(range.get_value((1, 1)), Some(&Data::String("cts".into())));
        assert_eq!(
            range.get_value((2, 0)),
            Some(&Data::String("P-L-1A-1P-1".into()))
        );
        assert_eq!(range.get_value((2, 1)), Some(&Data::Float(120.0)));
    }

    #[test]
    fn test_write_csv_text_cells_read_back_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let cells = ["2E1", "0.123456789012345678", "1e-3", "007", "1.10"];
        let table = OutputTable {
            columns: cells.iter().enumerate().map(|(i, _)| format!("c{}", i)).collect(),
            units: vec!["u".to_string(); cells.len()],
            rows: vec![cells.iter().map(|c| c.to_string()).collect()],
        };

        write_csv(&table, &path).unwrap();

        let opts = ReadOptions {
            drop_rows: vec![0],
            ..ReadOptions::default()
        };
        let back = read_delimited(&path, &opts).unwrap();
        assert_eq!(back.get(0, "c0"), Some("2E1"));
        assert_eq!(back.get(0, "c1"), Some("0.123456789012345678"));
        assert_eq!(back.get(0, "c2"), Some("1e-3"));
        assert_eq!(back.get(0, "c3"), Some("007"));
        assert_eq!(back.get(0, "c4"), Some("1.1"));
    }
}
