//! Directory scanner for discovering record units
//!
//! A record unit is one folder under the input directory holding the files
//! of a single scan: an `.out`/`.raw` pair, one `.csv`, or one `.xlsx`.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info};
use walkdir::WalkDir;

/// How record-unit folders are recognised and ordered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnitOrdering {
    /// Folder name contains `tag` and `separator`; ordered by the number
    /// after the last separator (`CORE_MSCL-p1.5` -> 1.5)
    PartSuffix { tag: String, separator: String },
    /// Folder name is a CoreID; ordered by its parsed components
    CoreId,
}

/// A discovered record unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordUnit {
    /// Folder name
    pub name: String,
    /// Full path to the folder
    pub folder: PathBuf,
    /// One file per required extension, in the order the extensions were given
    pub files: Vec<PathBuf>,
}

/// Structured core identifier: `PROJECT-LAKEYEAR-SiteHole-CoreTool-Section`
///
/// Ordering compares components as
/// `(project, lake_year, site, hole, core, tool, section)`, so `1A-10P`
/// sorts after `1A-9P` and site `10` after site `9`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CoreId {
    pub project: String,
    pub lake_year: String,
    pub site: u32,
    pub hole: char,
    pub core: u32,
    pub tool: char,
    pub section: u32,
}

fn core_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^([A-Za-z0-9]+)-([A-Za-z0-9]+)-(\d+)([A-Za-z])-(\d+)([A-Za-z])-(\d+)(?:[^0-9].*)?$",
        )
        .expect("valid CoreID regex")
    })
}

impl CoreId {
    /// Parse a CoreID such as `CASQ-VUO19-1A-2P-3`
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || Error::InvalidCoreId(s.to_string());
        let caps = core_id_regex().captures(s.trim()).ok_or_else(invalid)?;

        let num = |i: usize| caps[i].parse::<u32>().map_err(|_| invalid());
        let letter = |i: usize| caps[i].chars().next().ok_or_else(invalid);

        Ok(Self {
            project: caps[1].to_string(),
            lake_year: caps[2].to_string(),
            site: num(3)?,
            hole: letter(4)?,
            core: num(5)?,
            tool: letter(6)?,
            section: num(7)?,
        })
    }

    /// Site and hole, e.g. `1A`
    pub fn site_hole(&self) -> String {
        format!("{}{}", self.site, self.hole)
    }
}

impl fmt::Display for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}{}-{}{}-{}",
            self.project, self.lake_year, self.site, self.hole, self.core, self.tool, self.section
        )
    }
}

/// Sort key for a folder
#[derive(Debug, Clone, PartialEq)]
enum UnitKey {
    Part(f64),
    Core(CoreId),
}

impl UnitKey {
    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (UnitKey::Part(a), UnitKey::Part(b)) => a.total_cmp(b),
            (UnitKey::Core(a), UnitKey::Core(b)) => a.cmp(b),
            (UnitKey::Part(_), UnitKey::Core(_)) => Ordering::Less,
            (UnitKey::Core(_), UnitKey::Part(_)) => Ordering::Greater,
        }
    }
}

/// Parse the number following the last `separator` in a folder name
pub fn part_index(name: &str, separator: &str) -> Result<f64> {
    let lower = name.to_lowercase();
    let separator = separator.to_lowercase();
    lower
        .rsplit(separator.as_str())
        .next()
        .filter(|_| lower.contains(separator.as_str()))
        .and_then(|token| token.trim().parse::<f64>().ok())
        .ok_or_else(|| Error::InvalidPartIndex(name.to_string()))
}

fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

/// List visible entries directly inside `dir`, sorted by name
fn list_entries(dir: &Path) -> Result<Vec<walkdir::DirEntry>> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;
        if !is_hidden(&entry.file_name().to_string_lossy()) {
            entries.push(entry);
        }
    }
    Ok(entries)
}

/// Scan `root` for record-unit folders and collect their files.
///
/// Each folder must hold exactly one file for every extension in
/// `extensions`; any other count is fatal. With a `file_tag`, only file
/// names containing it (case-insensitive) are considered.
pub fn discover_units<P: AsRef<Path>>(
    root: P,
    ordering: &UnitOrdering,
    extensions: &[String],
    file_tag: Option<&str>,
) -> Result<Vec<RecordUnit>> {
    let root = root.as_ref();
    let mut keyed: Vec<(UnitKey, PathBuf, String)> = Vec::new();

    for entry in list_entries(root)? {
        if !entry.file_type().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();

        let key = match ordering {
            UnitOrdering::PartSuffix { tag, separator } => {
                let lower = name.to_lowercase();
                if !lower.contains(&tag.to_lowercase()) || !lower.contains(&separator.to_lowercase())
                {
                    debug!("Ignoring folder '{}'", name);
                    continue;
                }
                UnitKey::Part(part_index(&name, separator)?)
            }
            UnitOrdering::CoreId => match CoreId::parse(&name) {
                Ok(id) => UnitKey::Core(id),
                Err(_) => {
                    debug!("Ignoring folder '{}' (not a CoreID)", name);
                    continue;
                }
            },
        };

        keyed.push((key, entry.path().to_path_buf(), name));
    }

    keyed.sort_by(|a, b| a.0.compare(&b.0));

    let mut units = Vec::with_capacity(keyed.len());
    for (_, folder, name) in keyed {
        let files = collect_unit_files(&folder, extensions, file_tag)?;
        units.push(RecordUnit {
            name,
            folder,
            files,
        });
    }

    info!("Found data in {} folders to join.", units.len());
    for unit in &units {
        debug!("\t{}", unit.name);
    }

    Ok(units)
}

/// Pick exactly one file per extension from a record-unit folder
fn collect_unit_files(
    folder: &Path,
    extensions: &[String],
    file_tag: Option<&str>,
) -> Result<Vec<PathBuf>> {
    let tag = file_tag.map(str::to_lowercase);
    let files: Vec<PathBuf> = list_entries(folder)?
        .into_iter()
        .filter(|e| e.file_type().is_file())
        .filter(|e| match &tag {
            Some(tag) => e.file_name().to_string_lossy().to_lowercase().contains(tag.as_str()),
            None => true,
        })
        .map(|e| e.path().to_path_buf())
        .collect();

    let has_ext = |path: &Path, ext: &str| {
        path.extension()
            .is_some_and(|e| e.to_string_lossy().eq_ignore_ascii_case(ext))
    };

    let matching: Vec<&PathBuf> = files
        .iter()
        .filter(|f| extensions.iter().any(|ext| has_ext(f, ext)))
        .collect();

    if matching.len() > extensions.len() {
        return Err(Error::Discovery {
            folder: folder.to_path_buf(),
            extensions: format_extensions(extensions),
            found: matching.len(),
            expected: extensions.len(),
        });
    }

    let mut picked = Vec::with_capacity(extensions.len());
    for ext in extensions {
        let role: Vec<&&PathBuf> = matching.iter().filter(|f| has_ext(f, ext)).collect();
        match role.as_slice() {
            [only] => picked.push(only.to_path_buf()),
            [] => {
                return Err(Error::MissingInputFile {
                    folder: folder.to_path_buf(),
                    extension: ext.clone(),
                })
            }
            many => {
                return Err(Error::Discovery {
                    folder: folder.to_path_buf(),
                    extensions: format_extensions(std::slice::from_ref(ext)),
                    found: many.len(),
                    expected: 1,
                })
            }
        }
    }

    Ok(picked)
}

fn format_extensions(extensions: &[String]) -> String {
    extensions
        .iter()
        .map(|e| format!(".{}", e))
        .collect::<Vec<_>>()
        .join(", ")
}
