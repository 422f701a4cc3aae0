//! Typed failure kinds carried inside `anyhow::Error`
//!
//! Callers that need to distinguish a bad upload from a bad template can
//! recover these with `anyhow::Error::downcast_ref`.

use thiserror::Error;

/// The uploaded workbook (or the mapping table) cannot be interpreted
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InputFormatError {
    #[error("unreadable workbook: {0}")]
    Unreadable(String),

    #[error("sheet '{0}' not found (available: {1})")]
    SheetNotFound(String, String),

    #[error("sheet index {0} out of range (workbook has {1} sheets)")]
    SheetIndexOutOfRange(usize, usize),

    #[error("header row {header_row} is beyond the sheet, which has {grid_rows} rows")]
    HeaderRowOutOfBounds { header_row: usize, grid_rows: usize },

    #[error("data row {data_row} must come after header row {header_row}")]
    InvalidRowLayout { header_row: usize, data_row: usize },

    #[error("unknown marketplace '{0}'")]
    UnknownMarketplace(String),

    #[error("mapping table has no sheet whose name contains 'mapping'")]
    MappingSheetMissing,

    #[error("mapping table is missing required column '{0}'")]
    MappingColumnMissing(&'static str),

    #[error("mapping mode requires a mapping table")]
    MappingTableRequired,

    #[error("identifier column '{0}' does not exist in the uploaded sheet")]
    IdentifierColumnMissing(String),
}

/// The output template cannot be populated without risking existing content
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("template is not a readable spreadsheet package: {0}")]
    Unreadable(String),

    #[error("template has no sheet named '{0}'")]
    SheetMissing(&'static str),

    #[error("no run of {width} empty columns in sheet '{sheet}' within the first {limit} columns")]
    NoFreeColumns {
        sheet: &'static str,
        width: u32,
        limit: u32,
    },

    #[error("malformed worksheet XML in '{0}': {1}")]
    MalformedSheet(String, String),
}
