//! Header/data region extraction from an uploaded sheet

use anyhow::{Context, Result};
use log::{debug, warn};

use crate::error::InputFormatError;
use crate::normalize::{dedupe, normalize_str};
use crate::profile::{MarketplaceProfile, SheetSelector};
use crate::reader::{CellValue, RawTable, SourceTable, SourceWorkbook};

/// Call-time layout overrides, honoured only by profiles that allow them
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overrides {
    pub sheet: Option<SheetSelector>,
    pub header_row: Option<usize>,
    pub data_row: Option<usize>,
}

impl Overrides {
    pub fn is_empty(&self) -> bool {
        self.sheet.is_none() && self.header_row.is_none() && self.data_row.is_none()
    }
}

/// Effective sheet and rows after applying overrides to a profile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub sheet: SheetSelector,
    pub header_row: usize,
    pub data_row: usize,
}

impl Layout {
    pub fn resolve(profile: &MarketplaceProfile, overrides: &Overrides) -> Result<Self> {
        let mut layout = Layout {
            sheet: profile.sheet.clone(),
            header_row: profile.header_row,
            data_row: profile.data_row,
        };

        if profile.allow_overrides {
            if let Some(sheet) = &overrides.sheet {
                layout.sheet = sheet.clone();
            }
            if let Some(header_row) = overrides.header_row {
                layout.header_row = header_row;
            }
            if let Some(data_row) = overrides.data_row {
                layout.data_row = data_row;
            }
        } else if !overrides.is_empty() {
            warn!(
                "Marketplace '{}' has a fixed layout; ignoring sheet/row overrides",
                profile.name
            );
        }

        if layout.header_row == 0 || layout.data_row <= layout.header_row {
            return Err(InputFormatError::InvalidRowLayout {
                header_row: layout.header_row,
                data_row: layout.data_row,
            }
            .into());
        }

        Ok(layout)
    }
}

/// Extract a [`SourceTable`] from raw workbook bytes
pub fn extract(bytes: &[u8], profile: &MarketplaceProfile, overrides: &Overrides) -> Result<SourceTable> {
    let layout = Layout::resolve(profile, overrides)?;
    let mut workbook = SourceWorkbook::from_bytes(bytes).context("Failed to open uploaded workbook")?;
    let grid = workbook.read_grid(&layout.sheet)?;

    debug!(
        "Read sheet {} for '{}': {} grid rows",
        layout.sheet,
        profile.name,
        grid.row_count()
    );

    let mut table = extract_from_grid(&grid, layout.header_row, layout.data_row)?;

    if profile.drop_parent_rows {
        let dropped = drop_parent_rows(&mut table);
        debug!("Dropped {} parent rows", dropped);
    }

    Ok(table)
}

/// Slice header and data rows out of a grid (rows are 1-indexed).
///
/// Columns that are blank across every data row are removed.
pub fn extract_from_grid(grid: &RawTable, header_row: usize, data_row: usize) -> Result<SourceTable> {
    if header_row == 0 || data_row <= header_row {
        return Err(InputFormatError::InvalidRowLayout { header_row, data_row }.into());
    }
    if grid.row_count() < header_row {
        return Err(InputFormatError::HeaderRowOutOfBounds {
            header_row,
            grid_rows: grid.row_count(),
        }
        .into());
    }

    let data_rows: &[Vec<CellValue>] = grid.rows.get(data_row - 1..).unwrap_or(&[]);
    let header_cells = &grid.rows[header_row - 1];

    let width = data_rows
        .iter()
        .map(Vec::len)
        .chain(std::iter::once(header_cells.len()))
        .max()
        .unwrap_or(0);

    let labels: Vec<String> = (0..width)
        .map(|c| header_cells.get(c).map(CellValue::to_trimmed_text).unwrap_or_default())
        .collect();
    let names = dedupe(&labels);

    let keep: Vec<usize> = (0..width)
        .filter(|&c| {
            data_rows
                .iter()
                .any(|row| row.get(c).is_some_and(|v| !v.is_blank()))
        })
        .collect();

    let columns = keep.iter().map(|&c| names[c].clone()).collect();
    let rows = data_rows
        .iter()
        .map(|row| {
            keep.iter()
                .map(|&c| row.get(c).cloned().unwrap_or_default())
                .collect()
        })
        .collect();

    Ok(SourceTable::new(columns, rows))
}

/// Remove parent-SKU rows (Amazon "Parentage Level" == parent).
/// Returns how many rows were dropped.
pub fn drop_parent_rows(table: &mut SourceTable) -> usize {
    let Some(col) = table
        .columns
        .iter()
        .position(|c| normalize_str(c).contains("parentagelevel"))
    else {
        return 0;
    };

    let before = table.row_count();
    table.retain_rows(|row| {
        row.get(col)
            .map(|v| normalize_str(&v.to_text()) != "parent")
            .unwrap_or(true)
    });
    before - table.row_count()
}
