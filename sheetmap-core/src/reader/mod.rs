//! Excel/ODS grid reader using calamine

use anyhow::{Context, Result};
use calamine::{Data, Range, Reader, Sheets, open_workbook_auto_from_rs};
use chrono::{NaiveDateTime, NaiveTime};
use std::io::Cursor;

pub mod table;

use crate::error::InputFormatError;
use crate::profile::SheetSelector;
pub use table::{CellValue, RawTable, SourceTable};

/// An in-memory workbook opened from uploaded bytes (xlsx, xls or ods)
pub struct SourceWorkbook {
    sheets: Sheets<Cursor<Vec<u8>>>,
}

impl SourceWorkbook {
    /// Open a workbook from raw bytes, detecting the container format
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let sheets = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
            .map_err(|e| InputFormatError::Unreadable(e.to_string()))?;
        Ok(Self { sheets })
    }

    /// Get all sheet names in workbook order
    pub fn sheet_names(&self) -> Vec<String> {
        self.sheets.sheet_names()
    }

    /// Resolve a selector to a concrete sheet name
    pub fn resolve_sheet(&self, selector: &SheetSelector) -> Result<String> {
        let names = self.sheet_names();
        match selector {
            SheetSelector::Name(name) => names
                .iter()
                .find(|n| *n == name)
                .cloned()
                .ok_or_else(|| InputFormatError::SheetNotFound(name.clone(), names.join(", ")).into()),
            SheetSelector::Index(index) => names
                .get(*index)
                .cloned()
                .ok_or_else(|| InputFormatError::SheetIndexOutOfRange(*index, names.len()).into()),
        }
    }

    /// Read one sheet as an untyped grid, anchored at A1
    pub fn read_grid(&mut self, selector: &SheetSelector) -> Result<RawTable> {
        let name = self.resolve_sheet(selector)?;
        let range = self
            .sheets
            .worksheet_range(&name)
            .map_err(|e| InputFormatError::Unreadable(format!("sheet '{}': {}", name, e)))
            .with_context(|| format!("Failed to read sheet '{}'", name))?;
        Ok(range_to_grid(&range))
    }

    /// First sheet whose normalized name contains `needle`
    pub fn find_sheet(&self, needle: &str) -> Option<String> {
        self.sheet_names()
            .into_iter()
            .find(|n| crate::normalize::normalize_str(n).contains(needle))
    }
}

/// calamine trims leading empty rows/columns; pad them back so that row and
/// column positions match what a spreadsheet user sees.
fn range_to_grid(range: &Range<Data>) -> RawTable {
    let (row_offset, col_offset) = match range.start() {
        Some((r, c)) => (r as usize, c as usize),
        None => return RawTable::default(),
    };

    let mut rows: Vec<Vec<CellValue>> = vec![Vec::new(); row_offset];
    for row in range.rows() {
        let mut cells = vec![CellValue::Empty; col_offset];
        cells.extend(row.iter().map(convert_data));
        rows.push(cells);
    }

    RawTable::new(rows)
}

/// Convert a calamine cell into a [`CellValue`]
pub fn convert_data(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Bool(b) => CellValue::Boolean(*b),
        Data::DateTime(dt) if dt.is_duration() => CellValue::Number(dt.as_f64()),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(datetime) => CellValue::DateTime {
                serial: dt.as_f64(),
                text: render_datetime(&datetime),
            },
            None => CellValue::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Text(e.to_string()),
    }
}

/// `2023-07-16` for midnight values, `2023-07-16 09:30:00` otherwise
fn render_datetime(datetime: &NaiveDateTime) -> String {
    if datetime.time() == NaiveTime::MIN {
        datetime.date().to_string()
    } else {
        datetime.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}
