//! Template writer: fills the `Values` and `Types` sheets of the output
//! template without touching anything already there.
//!
//! All output columns are laid out as one contiguous block. The block is
//! placed at the first run of columns wide enough to hold it in which every
//! probed row is blank, and the same relative layout is used on both sheets.

mod grid;
mod package;
mod styles;

pub use grid::{NewCell, SheetGrid, column_letters, parse_cell_ref};
pub use package::Package;

use anyhow::Result;
use log::{debug, info, warn};

use crate::classify::{ColumnMeta, MANDATORY, NON_MANDATORY, TYPE_SELECT, TYPE_STRING};
use crate::config::WriterConfig;
use crate::error::TemplateError;
use crate::identifiers::IdentifierSeries;
use crate::normalize::clean_label;
use crate::options::{OPTION_1, OPTION_2, OptionSeries};
use crate::reader::{CellValue, SourceTable};

pub const VALUES_SHEET: &str = "Values";
pub const TYPES_SHEET: &str = "Types";
pub const BATCH_COLUMN: &str = "BatchID";

const VALUES_PROBE_ROWS: &[u32] = &[1];
const TYPES_PROBE_ROWS: &[u32] = &[1, 2, 3, 4];

/// First data row in `Values`
const VALUES_DATA_ROW: u32 = 2;
/// First validation-list row in `Types`
const TYPES_LIST_ROW: u32 = 5;

/// Everything one run writes into the template
#[derive(Debug, Clone, Copy)]
pub struct WriteRequest<'a> {
    pub table: &'a SourceTable,
    pub columns: &'a [ColumnMeta],
    pub options: &'a OptionSeries,
    pub identifiers: &'a IdentifierSeries,
    pub batch_id: Option<u64>,
}

/// Serialized workbook plus where the block landed
#[derive(Debug, Clone)]
pub struct WrittenTemplate {
    pub bytes: Vec<u8>,
    /// 0-based start column of the block in `Values`
    pub values_start: u32,
    /// 0-based start column of the block in `Types`
    pub types_start: u32,
    /// Number of columns in the block, gap included
    pub width: u32,
}

/// One output column, described once and rendered into both sheets
#[derive(Debug, Clone)]
struct OutputColumn {
    label: String,
    mandatory: String,
    value_type: String,
    /// `Values` rows 2.., `None` for a blank cell
    values: Vec<Option<NewCell>>,
    /// `Types` rows 5..
    list: Vec<String>,
}

impl OutputColumn {
    fn new(label: &str, mandatory: &str, value_type: &str, values: Vec<Option<NewCell>>) -> Self {
        Self {
            label: clean_label(Some(label)),
            mandatory: mandatory.to_string(),
            value_type: value_type.to_string(),
            values,
            list: Vec::new(),
        }
    }
}

fn source_cell(value: &CellValue, force_text: bool) -> Option<NewCell> {
    if value.is_blank() {
        return None;
    }
    if force_text {
        return Some(NewCell::forced_text(value.to_text()));
    }
    match value {
        CellValue::Empty => None,
        CellValue::Number(n) => Some(NewCell::Number(*n)),
        CellValue::Boolean(b) => Some(NewCell::Boolean(*b)),
        CellValue::Text(s) => Some(NewCell::text(s.as_str())),
        // Templates carry no date style
        CellValue::DateTime { text, .. } => Some(NewCell::text(text.as_str())),
    }
}

fn text_cells(values: &[String], force_text: bool) -> Vec<Option<NewCell>> {
    values
        .iter()
        .map(|v| match (v.is_empty(), force_text) {
            (true, _) => None,
            (false, true) => Some(NewCell::forced_text(v.as_str())),
            (false, false) => Some(NewCell::text(v.as_str())),
        })
        .collect()
}

/// Lay out the block: classified columns, options, gap, identifiers, batch
fn plan_columns(request: &WriteRequest<'_>, config: &WriterConfig) -> Vec<Option<OutputColumn>> {
    let mut plan = Vec::new();

    for meta in request.columns {
        let Some(index) = request.table.column_index(&meta.source) else {
            warn!("Column '{}' is not in the extracted table; skipped", meta.source);
            continue;
        };
        let force_text = meta.forces_text();
        let values = request
            .table
            .column_values(index)
            .map(|v| source_cell(v, force_text))
            .collect();
        plan.push(Some(OutputColumn::new(
            &meta.output,
            &meta.mandatory,
            &meta.value_type,
            values,
        )));
    }

    for (label, values, list) in [
        (OPTION_1, &request.options.option1, request.options.distinct_option1()),
        (OPTION_2, &request.options.option2, request.options.distinct_option2()),
    ] {
        let mut column = OutputColumn::new(label, NON_MANDATORY, TYPE_SELECT, text_cells(values, false));
        column.list = list;
        plan.push(Some(column));
    }

    let identifiers = request.identifiers.writable();
    if !identifiers.is_empty() {
        plan.extend((0..config.identifier_gap).map(|_| None));
        for (label, identifier) in identifiers {
            plan.push(Some(OutputColumn::new(
                label,
                MANDATORY,
                TYPE_STRING,
                text_cells(&identifier.values, true),
            )));
        }
    }

    if let Some(batch_id) = request.batch_id {
        let batch = batch_id.to_string();
        let values = (0..request.table.row_count())
            .map(|_| Some(NewCell::forced_text(batch.as_str())))
            .collect();
        plan.push(Some(OutputColumn::new(BATCH_COLUMN, NON_MANDATORY, TYPE_STRING, values)));
    }

    plan
}

fn load_grid(package: &Package, part: &str) -> Result<SheetGrid> {
    let xml = package.part_str(part)?;
    SheetGrid::parse(xml)
        .map_err(|e| TemplateError::MalformedSheet(part.to_string(), e.to_string()).into())
}

fn reserve(
    grid: &SheetGrid,
    sheet: &'static str,
    probe_rows: &[u32],
    width: u32,
    limit: u32,
) -> Result<u32> {
    grid.first_empty_run(probe_rows, width, limit)
        .ok_or_else(|| TemplateError::NoFreeColumns { sheet, width, limit }.into())
}

fn fill_values(grid: &mut SheetGrid, start: u32, plan: &[Option<OutputColumn>]) {
    for (col, column) in (start..).zip(plan) {
        let Some(column) = column else { continue };
        grid.set(1, col, NewCell::text(column.label.as_str()));
        for (row, cell) in (VALUES_DATA_ROW..).zip(&column.values) {
            if let Some(cell) = cell {
                grid.set(row, col, cell.clone());
            }
        }
    }
}

fn fill_types(grid: &mut SheetGrid, start: u32, plan: &[Option<OutputColumn>]) {
    for (col, column) in (start..).zip(plan) {
        let Some(column) = column else { continue };
        grid.set(1, col, NewCell::text(column.label.as_str()));
        grid.set(2, col, NewCell::text(column.label.as_str()));
        grid.set(3, col, NewCell::text(column.mandatory.as_str()));
        grid.set(4, col, NewCell::text(column.value_type.as_str()));
        for (row, value) in (TYPES_LIST_ROW..).zip(&column.list) {
            grid.set(row, col, NewCell::text(value.as_str()));
        }
    }
}

/// Register the text cell style if any written cell needs it
fn text_style(package: &mut Package, needed: bool) -> Result<Option<u32>> {
    if !needed {
        return Ok(None);
    }
    let Some(data) = package.part(package::STYLES_PART) else {
        warn!("Template has no styles part; text cells are written without the '@' format");
        return Ok(None);
    };
    let xml = std::str::from_utf8(data)
        .map_err(|e| TemplateError::MalformedSheet(package::STYLES_PART.to_string(), e.to_string()))?;

    match styles::add_text_style(xml)? {
        Some((rewritten, index)) => {
            package.replace(package::STYLES_PART, rewritten);
            debug!("Registered text cell style at index {}", index);
            Ok(Some(index))
        }
        None => {
            warn!("Template styles have no cellXfs; text cells are written without the '@' format");
            Ok(None)
        }
    }
}

/// Populate a copy of the template and return the new workbook bytes.
///
/// The template bytes are never modified. Fails when either sheet is
/// missing or has no room for the block within `max_columns`.
pub fn write_template(
    template: &[u8],
    request: &WriteRequest<'_>,
    config: &WriterConfig,
) -> Result<WrittenTemplate> {
    let mut package = Package::from_bytes(template)?;

    let values_part = package.sheet_part(VALUES_SHEET)?;
    let types_part = package.sheet_part(TYPES_SHEET)?;
    let mut values = load_grid(&package, &values_part)?;
    let mut types = load_grid(&package, &types_part)?;

    let plan = plan_columns(request, config);
    let width = plan.len() as u32;

    let values_start = reserve(&values, VALUES_SHEET, VALUES_PROBE_ROWS, width, config.max_columns)?;
    let types_start = reserve(&types, TYPES_SHEET, TYPES_PROBE_ROWS, width, config.max_columns)?;
    info!(
        "Writing {} columns at {}:{} and {}:{}",
        width,
        VALUES_SHEET,
        column_letters(values_start),
        TYPES_SHEET,
        column_letters(types_start)
    );

    fill_values(&mut values, values_start, &plan);
    fill_types(&mut types, types_start, &plan);

    let style = text_style(&mut package, values.uses_text_format() || types.uses_text_format())?;
    package.replace(&values_part, values.to_xml(style)?);
    package.replace(&types_part, types.to_xml(style)?);

    Ok(WrittenTemplate {
        bytes: package.to_bytes()?,
        values_start,
        types_start,
        width,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{NOT_FOUND, TYPE_IMAGE_URL_ARRAY};
    use crate::identifiers::Identifier;

    fn meta(name: &str, value_type: &str) -> ColumnMeta {
        ColumnMeta {
            source: name.to_string(),
            output: name.to_string(),
            mandatory: MANDATORY.to_string(),
            value_type: value_type.to_string(),
        }
    }

    fn sample_table() -> SourceTable {
        SourceTable::new(
            vec!["SKU".into(), "Qty".into()],
            vec![
                vec![CellValue::Number(123.0), CellValue::Number(4.0)],
                vec![CellValue::Text("  ".into()), CellValue::Empty],
            ],
        )
    }

    #[test]
    fn test_source_cell_typing() {
        assert_eq!(
            source_cell(&CellValue::Number(123.0), true),
            Some(NewCell::forced_text("123"))
        );
        assert_eq!(source_cell(&CellValue::Number(4.0), false), Some(NewCell::Number(4.0)));
        assert_eq!(source_cell(&CellValue::Text(" ".into()), true), None);
        assert_eq!(source_cell(&CellValue::Empty, false), None);

        let date = CellValue::DateTime {
            serial: 45123.0,
            text: "2023-07-16".into(),
        };
        assert_eq!(source_cell(&date, true), Some(NewCell::forced_text("2023-07-16")));
        assert_eq!(source_cell(&date, false), Some(NewCell::text("2023-07-16")));
    }

    #[test]
    fn test_plan_order_without_identifiers() {
        let table = sample_table();
        let columns = vec![meta("SKU", TYPE_STRING), meta("Qty", NOT_FOUND)];
        let options = OptionSeries {
            option1: vec!["M".into(), "".into()],
            option2: vec!["".into(), "".into()],
            ..Default::default()
        };
        let identifiers = IdentifierSeries::default();
        let request = WriteRequest {
            table: &table,
            columns: &columns,
            options: &options,
            identifiers: &identifiers,
            batch_id: None,
        };

        let plan = plan_columns(&request, &WriterConfig::default());
        let labels: Vec<_> = plan.iter().map(|c| c.as_ref().unwrap().label.as_str()).collect();
        assert_eq!(labels, vec!["SKU", "Qty", "Option 1", "Option 2"]);

        let sku = plan[0].as_ref().unwrap();
        assert_eq!(sku.values, vec![Some(NewCell::forced_text("123")), None]);
        let qty = plan[1].as_ref().unwrap();
        assert_eq!(qty.values[0], Some(NewCell::Number(4.0)));

        let option1 = plan[2].as_ref().unwrap();
        assert_eq!(option1.value_type, TYPE_SELECT);
        assert_eq!(option1.mandatory, NON_MANDATORY);
        assert_eq!(option1.list, vec!["M"]);
    }

    #[test]
    fn test_plan_gap_identifiers_and_batch() {
        let table = sample_table();
        let columns = vec![meta("SKU", TYPE_IMAGE_URL_ARRAY)];
        let options = OptionSeries {
            option1: vec!["".into(); 2],
            option2: vec!["".into(); 2],
            ..Default::default()
        };
        let identifiers = IdentifierSeries {
            variant: Some(Identifier {
                source: "SKU".into(),
                values: vec!["0042".into(), "".into()],
            }),
            product: None,
        };
        let request = WriteRequest {
            table: &table,
            columns: &columns,
            options: &options,
            identifiers: &identifiers,
            batch_id: Some(7),
        };

        let config = WriterConfig {
            identifier_gap: 2,
            ..Default::default()
        };
        let plan = plan_columns(&request, &config);
        assert_eq!(plan.len(), 1 + 2 + 2 + 1 + 1);
        assert!(plan[3].is_none() && plan[4].is_none());

        let variant = plan[5].as_ref().unwrap();
        assert_eq!(variant.label, "variantId");
        assert_eq!(variant.values, vec![Some(NewCell::forced_text("0042")), None]);

        let batch = plan[6].as_ref().unwrap();
        assert_eq!(batch.label, BATCH_COLUMN);
        assert_eq!(batch.values, vec![Some(NewCell::forced_text("7")); 2]);
    }
}
