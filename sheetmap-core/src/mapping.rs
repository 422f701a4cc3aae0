//! Declarative attribute -> field mapping table

use anyhow::{Context, Result};
use log::{debug, info};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::InputFormatError;
use crate::normalize::normalize_str;
use crate::profile::SheetSelector;
use crate::reader::{CellValue, RawTable, SourceWorkbook};

/// One row of the mapping sheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingRule {
    /// Normalized attribute key
    pub attribute: String,
    pub field_name: String,
    pub mandatory: String,
    pub field_type: String,
    /// Emit an extra output column under `field_name`
    pub duplicate: bool,
}

/// Mapping rules plus the optional list of known client names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingTable {
    rules: Vec<MappingRule>,
    client_names: Vec<String>,
}

const COL_ATTRIBUTES: &str = "attributes";
const COL_FIELD_NAME: &str = "fieldname";
const COL_MANDATORY: &str = "mandatoryornot";
const COL_FIELD_TYPE: &str = "fieldtype";
const COL_DUPLICATES: &str = "duplicatestobecreated";

impl MappingTable {
    pub fn new(rules: Vec<MappingRule>) -> Self {
        Self {
            rules,
            client_names: Vec::new(),
        }
    }

    /// Load a mapping workbook from a file path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path)
            .with_context(|| format!("Failed to read mapping table: {}", path.display()))?;
        Self::from_bytes(&bytes)
            .with_context(|| format!("Failed to load mapping table: {}", path.display()))
    }

    /// Load a mapping workbook from raw bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut workbook = SourceWorkbook::from_bytes(bytes)?;

        let sheet = workbook
            .find_sheet("mapping")
            .ok_or(InputFormatError::MappingSheetMissing)?;
        let grid = workbook.read_grid(&SheetSelector::Name(sheet))?;
        let rules = parse_rules(&grid)?;

        let client_names = match workbook.find_sheet("mappedclientname") {
            Some(sheet) => flatten_names(&workbook.read_grid(&SheetSelector::Name(sheet))?),
            None => Vec::new(),
        };

        info!(
            "Loaded mapping table: {} rules, {} client names",
            rules.len(),
            client_names.len()
        );
        Ok(Self { rules, client_names })
    }

    pub fn rules(&self) -> &[MappingRule] {
        &self.rules
    }

    /// Every rule whose attribute key equals the normalized header, in table order
    pub fn rules_for<'a>(&'a self, header: &str) -> impl Iterator<Item = &'a MappingRule> + 'a {
        let key = normalize_str(header);
        self.rules.iter().filter(move |r| r.attribute == key)
    }

    pub fn client_names(&self) -> &[String] {
        &self.client_names
    }
}

fn parse_rules(grid: &RawTable) -> Result<Vec<MappingRule>> {
    let header_index = grid
        .rows
        .iter()
        .position(|row| row.iter().any(|c| !c.is_blank()))
        .ok_or(InputFormatError::MappingColumnMissing(COL_ATTRIBUTES))?;
    let header: Vec<String> = grid.rows[header_index]
        .iter()
        .map(|c| normalize_str(&c.to_text()))
        .collect();

    let find = |name: &'static str| -> Result<usize> {
        header
            .iter()
            .position(|h| h.contains(name))
            .ok_or_else(|| InputFormatError::MappingColumnMissing(name).into())
    };
    let attr_col = find(COL_ATTRIBUTES)?;
    let field_col = find(COL_FIELD_NAME)?;
    let mandatory_col = find(COL_MANDATORY)?;
    let type_col = find(COL_FIELD_TYPE)?;
    let dup_col = find(COL_DUPLICATES)?;

    let cell = |row: &[CellValue], col: usize| -> String {
        row.get(col).map(CellValue::to_trimmed_text).unwrap_or_default()
    };

    let rules = grid.rows[header_index + 1..]
        .iter()
        .filter_map(|row| {
            let attribute = normalize_str(&cell(row, attr_col));
            if attribute.is_empty() {
                return None;
            }
            Some(MappingRule {
                attribute,
                field_name: cell(row, field_col),
                mandatory: cell(row, mandatory_col),
                field_type: cell(row, type_col),
                duplicate: normalize_str(&cell(row, dup_col)).starts_with("yes"),
            })
        })
        .collect();

    Ok(rules)
}

fn flatten_names(grid: &RawTable) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for value in grid.rows.iter().flatten() {
        let name = value.to_trimmed_text();
        if !name.is_empty() && !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

/// Lazily loads one mapping table and keeps it for the process lifetime
#[derive(Debug)]
pub struct MappingStore {
    path: PathBuf,
    table: OnceLock<MappingTable>,
}

impl MappingStore {
    /// Store that loads from `path` on first use
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            table: OnceLock::new(),
        }
    }

    /// Store wrapping an already-loaded table
    pub fn preloaded(table: MappingTable) -> Self {
        let store = Self::from_path(PathBuf::new());
        let _ = store.table.set(table);
        store
    }

    pub fn get(&self) -> Result<&MappingTable> {
        if let Some(table) = self.table.get() {
            return Ok(table);
        }

        let table = MappingTable::from_file(&self.path)?;
        debug!("Caching mapping table from {}", self.path.display());
        Ok(self.table.get_or_init(|| table))
    }
}
