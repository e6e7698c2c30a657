//! Schema registry: machine column names to readable headers and units

use crate::error::{Error, Result};
use crate::merger::MergedTable;
use crate::table::OutputTable;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use tracing::warn;

/// One registry entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaEntry {
    pub machine: String,
    pub readable: String,
    pub unit: String,
}

/// Mapping from machine-emitted column names to readable names and units
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaRegistry {
    entries: IndexMap<String, SchemaEntry>,
}

impl SchemaRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entry
    pub fn insert(&mut self, machine: &str, readable: &str, unit: &str) {
        self.entries.insert(
            machine.to_string(),
            SchemaEntry {
                machine: machine.to_string(),
                readable: readable.to_string(),
                unit: unit.to_string(),
            },
        );
    }

    /// Look up a machine column name
    pub fn get(&self, machine: &str) -> Option<&SchemaEntry> {
        self.entries.get(machine)
    }

    /// Get the number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Load a registry from a text file of `machine,readable,unit` lines.
    ///
    /// The unit may be omitted. Blank lines and lines starting with `#` are
    /// ignored.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .comment(Some(b'#'))
            .from_reader(file);

        let mut registry = Self::new();
        for (line, result) in reader.records().enumerate() {
            let record = result.map_err(|e| Error::Csv {
                path: path.to_path_buf(),
                source: e,
            })?;

            let machine = record.get(0).unwrap_or("").trim();
            if machine.is_empty() {
                continue;
            }
            let readable = record.get(1).map(str::trim).ok_or_else(|| Error::CsvParse {
                path: path.to_path_buf(),
                message: format!("line {}: missing readable name for '{}'", line + 1, machine),
            })?;
            let unit = record.get(2).unwrap_or("").trim();
            registry.insert(machine, readable, unit);
        }

        Ok(registry)
    }

    /// Geotek MSCL-S whole-core logger
    pub fn mscl_s() -> Self {
        Self::from_rows(&[
            ("SECT NUM", "SectionID", ""),
            ("SECT DEPTH", "Section Depth", "cm"),
            ("CT", "Sediment Thickness", "cm"),
            ("PWAmp", "pWave Amplitude", ""),
            ("PWVel", "pWave Velocity", "m/s"),
            ("Den1", "Gamma Density", "g/cm³"),
            ("MS1", "MS Loop", "SI x 10^-5"),
            ("Imp", "Impedance", ""),
            ("FP", "Fractional Porosity", ""),
            ("NGAM", "Natural Gamma Radiation", "CPS"),
            ("RES", "Electrical Resistivity", "Ohm-m"),
            ("Temp", "Temperature in Logging Room", "°C"),
        ])
    }

    /// Geotek MSCL-XYZ split-core logger
    pub fn mscl_xyz() -> Self {
        let mut registry = Self::from_rows(&[
            ("Section", "Section", ""),
            ("Section Depth", "Section Depth", "cm"),
            ("Laser Profiler", "Laser Profiler", "mm"),
            ("Magnetic Susceptibility", "Magnetic Susceptibility", "SI x 10^-5"),
            ("Greyscale Reflectance", "Greyscale Reflectance", ""),
            ("CIE XYZ Colour Space", "CIE X", ""),
            ("Y", "CIE Y", ""),
            ("Z", "CIE Z", ""),
            ("CIE L*a*b* Colour Space", "CIE L*", ""),
            ("a*", "CIE a*", ""),
            ("b*", "CIE b*", ""),
            ("Reflectance (nm)", "360", "nm"),
        ]);
        for wavelength in (370..=740).step_by(10) {
            let name = wavelength.to_string();
            registry.insert(&name, &name, "nm");
        }
        registry
    }

    /// XRF core scanner
    pub fn xrf() -> Self {
        let mut registry = Self::from_rows(&[
            ("SectionID", "SectionID", ""),
            ("position (mm)", "Position", "mm"),
            ("sample surface", "Sample Surface", ""),
            ("validity", "Validity", ""),
            ("E-gain", "E-gain", ""),
            ("E-offset", "E-offset", ""),
            ("F-slope", "F-slope", ""),
            ("F-offset", "F-offset", ""),
            ("Dt", "Dead Time", ""),
            ("cps", "CPS", "cps"),
            ("MSE", "MSE", ""),
        ]);
        for element in [
            "Mg", "Al", "Si", "P", "S", "Cl", "Ar", "K", "Ca", "Sc", "Ti", "V", "Cr", "Mn", "Fe",
            "Co", "Ni", "Cu", "Zn", "Ga", "Ge", "As", "Se", "Br", "Rb", "Sr", "Y", "Zr", "Nb",
            "Mo", "Ba", "Pb", "Th", "U",
        ] {
            registry.insert(element, element, "cts");
        }
        registry
    }

    fn from_rows(rows: &[(&str, &str, &str)]) -> Self {
        let mut registry = Self::new();
        for (machine, readable, unit) in rows {
            registry.insert(machine, readable, unit);
        }
        registry
    }
}

/// Drop unwanted columns, then rename the rest and attach their units.
///
/// Columns missing from the registry keep their machine name and get an
/// empty unit; their names are returned so callers can report the gap.
pub fn apply_registry(
    merged: &MergedTable,
    registry: &SchemaRegistry,
    drop_columns: &[String],
) -> (OutputTable, Vec<String>) {
    let mut order = merged.order.clone();
    for column in drop_columns {
        order.remove(column);
    }

    let mut columns = Vec::with_capacity(order.len());
    let mut units = Vec::with_capacity(order.len());
    let mut gaps = Vec::new();

    for machine in order.as_slice() {
        match registry.get(machine) {
            Some(entry) => {
                columns.push(entry.readable.clone());
                units.push(entry.unit.clone());
            }
            None => {
                warn!("no associated units or readable header for header '{}'", machine);
                columns.push(machine.clone());
                units.push(String::new());
                gaps.push(machine.clone());
            }
        }
    }

    let rows = merged.table.project(order.as_slice());

    (OutputTable { columns, units, rows }, gaps)
}
