//! In-memory model of one worksheet part
//!
//! Everything outside `<sheetData>` is kept byte-for-byte. Rows and cells
//! inside it are parsed just enough to know which positions hold a value,
//! so new cells can be merged in column order without disturbing the
//! template's own content.

use anyhow::{Result, anyhow};
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use std::collections::BTreeMap;
use std::io::Write;

/// Parse a cell reference like "B3" into (row, col): 1-based row, 0-based col
pub fn parse_cell_ref(cell_ref: &str) -> Option<(u32, u32)> {
    let mut col = 0u32;
    let mut row_str = String::new();

    for ch in cell_ref.chars() {
        if ch.is_ascii_alphabetic() {
            col = col * 26 + (ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
        } else if ch.is_ascii_digit() {
            row_str.push(ch);
        }
    }

    let row = row_str.parse::<u32>().ok()?;
    if col == 0 || row == 0 {
        return None;
    }
    Some((row, col - 1))
}

/// Convert a 0-based column number to letters (0 -> A, 26 -> AA)
pub fn column_letters(mut col: u32) -> String {
    let mut result = String::new();
    loop {
        result.insert(0, (b'A' + (col % 26) as u8) as char);
        if col < 26 {
            break;
        }
        col = col / 26 - 1;
    }
    result
}

/// A value to be written into the grid
#[derive(Debug, Clone, PartialEq)]
pub enum NewCell {
    Text { value: String, text_format: bool },
    Number(f64),
    Boolean(bool),
}

impl NewCell {
    pub fn text(value: impl Into<String>) -> Self {
        NewCell::Text {
            value: value.into(),
            text_format: false,
        }
    }

    pub fn forced_text(value: impl Into<String>) -> Self {
        NewCell::Text {
            value: value.into(),
            text_format: true,
        }
    }
}

#[derive(Debug, Clone)]
enum GridCell {
    /// Original cell XML, copied verbatim on output
    Existing { xml: Vec<u8>, filled: bool },
    New(NewCell),
}

impl GridCell {
    fn is_filled(&self) -> bool {
        match self {
            GridCell::Existing { filled, .. } => *filled,
            GridCell::New(NewCell::Text { value, .. }) => !value.is_empty(),
            GridCell::New(_) => true,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct GridRow {
    /// Original `<row>` tag without its `spans` hint
    start: Option<BytesStart<'static>>,
    cells: BTreeMap<u32, GridCell>,
}

/// Parsed worksheet: rows keyed by 1-based number, cells by 0-based column
#[derive(Debug, Clone)]
pub struct SheetGrid {
    head: Vec<u8>,
    has_dimension: bool,
    middle: Vec<u8>,
    tail: Vec<u8>,
    /// Namespace prefix of the sheetData element, including the colon
    prefix: String,
    rows: BTreeMap<u32, GridRow>,
}

#[derive(PartialEq)]
enum Stage {
    Head,
    Middle,
    Tail,
}

impl SheetGrid {
    /// Parse a worksheet XML part
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        let mut head = Writer::new(Vec::new());
        let mut middle = Writer::new(Vec::new());
        let mut tail = Writer::new(Vec::new());

        let mut stage = Stage::Head;
        let mut has_dimension = false;
        let mut found_sheet_data = false;
        let mut prefix = String::new();
        let mut rows = BTreeMap::new();

        loop {
            let event = reader
                .read_event()
                .map_err(|e| anyhow!("XML parsing error at {}: {}", reader.error_position(), e))?;
            match event {
                Event::Eof => break,
                Event::Empty(e) if stage == Stage::Head && e.local_name().as_ref() == b"dimension" => {
                    has_dimension = true;
                    stage = Stage::Middle;
                }
                Event::Start(e) if stage != Stage::Tail && e.local_name().as_ref() == b"sheetData" => {
                    prefix = element_prefix(&e);
                    rows = parse_rows(&mut reader)?;
                    found_sheet_data = true;
                    stage = Stage::Tail;
                }
                Event::Empty(e) if stage != Stage::Tail && e.local_name().as_ref() == b"sheetData" => {
                    prefix = element_prefix(&e);
                    found_sheet_data = true;
                    stage = Stage::Tail;
                }
                event => {
                    let writer = match stage {
                        Stage::Head => &mut head,
                        Stage::Middle => &mut middle,
                        Stage::Tail => &mut tail,
                    };
                    writer.write_event(event)?;
                }
            }
        }

        if !found_sheet_data {
            return Err(anyhow!("worksheet has no sheetData element"));
        }

        Ok(Self {
            head: head.into_inner(),
            has_dimension,
            middle: middle.into_inner(),
            tail: tail.into_inner(),
            prefix,
            rows,
        })
    }

    /// Whether the cell holds a value (style-only cells count as blank)
    pub fn is_filled(&self, row: u32, col: u32) -> bool {
        self.rows
            .get(&row)
            .and_then(|r| r.cells.get(&col))
            .is_some_and(GridCell::is_filled)
    }

    fn column_is_empty(&self, col: u32, probe_rows: &[u32]) -> bool {
        probe_rows.iter().all(|&row| !self.is_filled(row, col))
    }

    /// First column within `limit` whose probe rows are all blank
    pub fn first_empty_column(&self, probe_rows: &[u32], limit: u32) -> Option<u32> {
        (0..limit).find(|&col| self.column_is_empty(col, probe_rows))
    }

    /// First start column of `width` consecutive columns whose probe rows are
    /// all blank, with the whole run inside `limit`
    pub fn first_empty_run(&self, probe_rows: &[u32], width: u32, limit: u32) -> Option<u32> {
        if width == 0 {
            return self.first_empty_column(probe_rows, limit);
        }
        let mut run_start = 0;
        let mut run_len = 0;
        for col in 0..limit {
            if self.column_is_empty(col, probe_rows) {
                if run_len == 0 {
                    run_start = col;
                }
                run_len += 1;
                if run_len == width {
                    return Some(run_start);
                }
            } else {
                run_len = 0;
            }
        }
        None
    }

    /// Put a value at (1-based row, 0-based col), replacing what was there
    pub fn set(&mut self, row: u32, col: u32, cell: NewCell) {
        self.rows
            .entry(row)
            .or_default()
            .cells
            .insert(col, GridCell::New(cell));
    }

    /// Whether any written cell needs the text number format
    pub fn uses_text_format(&self) -> bool {
        self.rows.values().flat_map(|r| r.cells.values()).any(|c| {
            matches!(
                c,
                GridCell::New(NewCell::Text {
                    text_format: true,
                    ..
                })
            )
        })
    }

    /// Used range as an A1 reference
    fn dimension(&self) -> String {
        let mut max_row = 0;
        let mut max_col = 0;
        for (&row, grid_row) in &self.rows {
            if let Some((&col, _)) = grid_row.cells.iter().next_back() {
                max_row = max_row.max(row);
                max_col = max_col.max(col);
            }
        }
        if max_row == 0 {
            "A1".to_string()
        } else {
            format!("A1:{}{}", column_letters(max_col), max_row)
        }
    }

    /// Serialize back to worksheet XML. `text_style` is the cellXfs index
    /// applied to text-forced cells, when the template has one.
    pub fn to_xml(&self, text_style: Option<u32>) -> Result<Vec<u8>> {
        let mut writer = Writer::new(Vec::new());
        writer.get_mut().write_all(&self.head)?;

        if self.has_dimension {
            let mut dimension = BytesStart::new(self.name("dimension"));
            dimension.push_attribute(("ref", self.dimension().as_str()));
            writer.write_event(Event::Empty(dimension))?;
        }
        writer.get_mut().write_all(&self.middle)?;

        let sheet_data = self.name("sheetData");
        if self.rows.is_empty() {
            writer.write_event(Event::Empty(BytesStart::new(sheet_data.as_str())))?;
        } else {
            writer.write_event(Event::Start(BytesStart::new(sheet_data.as_str())))?;
            for (&row, grid_row) in &self.rows {
                self.write_row(&mut writer, row, grid_row, text_style)?;
            }
            writer.write_event(Event::End(BytesEnd::new(sheet_data.as_str())))?;
        }

        writer.get_mut().write_all(&self.tail)?;
        Ok(writer.into_inner())
    }

    fn name(&self, local: &str) -> String {
        format!("{}{}", self.prefix, local)
    }

    fn write_row(
        &self,
        writer: &mut Writer<Vec<u8>>,
        row: u32,
        grid_row: &GridRow,
        text_style: Option<u32>,
    ) -> Result<()> {
        let start = match &grid_row.start {
            Some(start) => start.clone(),
            None => {
                let mut start = BytesStart::new(self.name("row"));
                start.push_attribute(("r", row.to_string().as_str()));
                start
            }
        };

        if grid_row.cells.is_empty() {
            writer.write_event(Event::Empty(start))?;
            return Ok(());
        }

        let end = start.to_end().into_owned();
        writer.write_event(Event::Start(start))?;
        for (&col, cell) in &grid_row.cells {
            match cell {
                GridCell::Existing { xml, .. } => writer.get_mut().write_all(xml)?,
                GridCell::New(new) => self.write_cell(writer, row, col, new, text_style)?,
            }
        }
        writer.write_event(Event::End(end))?;
        Ok(())
    }

    fn write_cell(
        &self,
        writer: &mut Writer<Vec<u8>>,
        row: u32,
        col: u32,
        cell: &NewCell,
        text_style: Option<u32>,
    ) -> Result<()> {
        let cell_name = self.name("c");
        let mut start = BytesStart::new(cell_name.as_str());
        start.push_attribute(("r", format!("{}{}", column_letters(col), row).as_str()));

        match cell {
            NewCell::Number(n) if n.is_finite() => {
                writer.write_event(Event::Start(start))?;
                self.write_leaf(writer, "v", &n.to_string())?;
            }
            NewCell::Number(n) => {
                start.push_attribute(("t", "inlineStr"));
                writer.write_event(Event::Start(start))?;
                self.write_inline_string(writer, &n.to_string())?;
            }
            NewCell::Boolean(b) => {
                start.push_attribute(("t", "b"));
                writer.write_event(Event::Start(start))?;
                self.write_leaf(writer, "v", if *b { "1" } else { "0" })?;
            }
            NewCell::Text { value, text_format } => {
                start.push_attribute(("t", "inlineStr"));
                if let (true, Some(style)) = (*text_format, text_style) {
                    start.push_attribute(("s", style.to_string().as_str()));
                }
                writer.write_event(Event::Start(start))?;
                self.write_inline_string(writer, value)?;
            }
        }

        writer.write_event(Event::End(BytesEnd::new(cell_name.as_str())))?;
        Ok(())
    }

    fn write_leaf(&self, writer: &mut Writer<Vec<u8>>, local: &str, text: &str) -> Result<()> {
        let name = self.name(local);
        writer.write_event(Event::Start(BytesStart::new(name.as_str())))?;
        writer.write_event(Event::Text(BytesText::new(text)))?;
        writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
        Ok(())
    }

    fn write_inline_string(&self, writer: &mut Writer<Vec<u8>>, text: &str) -> Result<()> {
        let is = self.name("is");
        let t = self.name("t");
        writer.write_event(Event::Start(BytesStart::new(is.as_str())))?;
        let mut t_start = BytesStart::new(t.as_str());
        t_start.push_attribute(("xml:space", "preserve"));
        writer.write_event(Event::Start(t_start))?;
        writer.write_event(Event::Text(BytesText::new(text)))?;
        writer.write_event(Event::End(BytesEnd::new(t.as_str())))?;
        writer.write_event(Event::End(BytesEnd::new(is.as_str())))?;
        Ok(())
    }
}

fn element_prefix(e: &BytesStart<'_>) -> String {
    match e.name().prefix() {
        Some(prefix) => format!("{}:", String::from_utf8_lossy(prefix.as_ref())),
        None => String::new(),
    }
}

fn attribute_value(e: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Copy a `<row>` tag, dropping the `spans` hint that new cells would invalidate
fn row_start_without_spans(e: &BytesStart<'_>) -> Result<BytesStart<'static>> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut start = BytesStart::new(name);
    for attr in e.attributes() {
        let attr = attr?;
        if attr.key.local_name().as_ref() != b"spans" {
            start.push_attribute(attr);
        }
    }
    Ok(start)
}

fn parse_rows(reader: &mut Reader<&[u8]>) -> Result<BTreeMap<u32, GridRow>> {
    let mut rows = BTreeMap::new();
    let mut last_row = 0;

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"row" => {
                let row = row_number(&e, last_row)?;
                let start = row_start_without_spans(&e)?;
                let cells = parse_cells(reader, row)?;
                rows.insert(row, GridRow { start: Some(start), cells });
                last_row = row;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"row" => {
                let row = row_number(&e, last_row)?;
                let start = row_start_without_spans(&e)?;
                rows.insert(row, GridRow { start: Some(start), cells: BTreeMap::new() });
                last_row = row;
            }
            Event::End(e) if e.local_name().as_ref() == b"sheetData" => break,
            Event::Eof => return Err(anyhow!("unterminated sheetData")),
            _ => {}
        }
    }

    Ok(rows)
}

fn row_number(e: &BytesStart<'_>, last_row: u32) -> Result<u32> {
    match attribute_value(e, b"r")? {
        Some(r) => r
            .trim()
            .parse::<u32>()
            .map_err(|_| anyhow!("invalid row number '{}'", r)),
        None => Ok(last_row + 1),
    }
}

fn cell_column(e: &BytesStart<'_>, next_col: u32) -> Result<u32> {
    match attribute_value(e, b"r")? {
        Some(r) => parse_cell_ref(&r)
            .map(|(_, col)| col)
            .ok_or_else(|| anyhow!("invalid cell reference '{}'", r)),
        None => Ok(next_col),
    }
}

fn parse_cells(reader: &mut Reader<&[u8]>, row: u32) -> Result<BTreeMap<u32, GridCell>> {
    let mut cells = BTreeMap::new();
    let mut next_col = 0;

    loop {
        match reader.read_event()? {
            Event::Start(e) if e.local_name().as_ref() == b"c" => {
                let col = cell_column(&e, next_col)?;
                let mut writer = Writer::new(Vec::new());
                writer.write_event(Event::Start(e))?;

                let mut depth = 1;
                let mut filled = false;
                while depth > 0 {
                    let event = reader.read_event()?;
                    match &event {
                        Event::Start(inner) => {
                            depth += 1;
                            if inner.local_name().as_ref() == b"f" {
                                filled = true;
                            }
                        }
                        Event::Empty(inner) if inner.local_name().as_ref() == b"f" => filled = true,
                        Event::Text(text) if !text.iter().all(u8::is_ascii_whitespace) => filled = true,
                        Event::CData(_) => filled = true,
                        Event::End(_) => depth -= 1,
                        Event::Eof => return Err(anyhow!("unterminated cell in row {}", row)),
                        _ => {}
                    }
                    writer.write_event(event)?;
                }

                cells.insert(col, GridCell::Existing { xml: writer.into_inner(), filled });
                next_col = col + 1;
            }
            Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                let col = cell_column(&e, next_col)?;
                let mut writer = Writer::new(Vec::new());
                writer.write_event(Event::Empty(e))?;
                cells.insert(col, GridCell::Existing { xml: writer.into_inner(), filled: false });
                next_col = col + 1;
            }
            Event::End(e) if e.local_name().as_ref() == b"row" => break,
            Event::Eof => return Err(anyhow!("unterminated row {}", row)),
            _ => {}
        }
    }

    Ok(cells)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><dimension ref="A1:B2"/><sheetViews><sheetView workbookViewId="0"/></sheetViews><sheetData><row r="1" spans="1:2"><c r="A1" t="inlineStr"><is><t>Handle</t></is></c><c r="B1" s="3"/></row><row r="2"><c r="A2"><v>7</v></c><c r="C2"><f>A2*2</f></c></row></sheetData><pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/></worksheet>"#;

    fn xml_string(grid: &SheetGrid, style: Option<u32>) -> String {
        String::from_utf8(grid.to_xml(style).unwrap()).unwrap()
    }

    #[test]
    fn test_parse_cell_ref() {
        assert_eq!(parse_cell_ref("A1"), Some((1, 0)));
        assert_eq!(parse_cell_ref("B2"), Some((2, 1)));
        assert_eq!(parse_cell_ref("AA10"), Some((10, 26)));
        assert_eq!(parse_cell_ref("A"), None);
        assert_eq!(column_letters(0), "A");
        assert_eq!(column_letters(27), "AB");
        assert_eq!(column_letters(701), "ZZ");
    }

    #[test]
    fn test_occupancy() {
        let grid = SheetGrid::parse(SHEET).unwrap();
        assert!(grid.is_filled(1, 0));
        // style-only cell is blank
        assert!(!grid.is_filled(1, 1));
        // formula without cached value still counts
        assert!(grid.is_filled(2, 2));
        assert!(!grid.is_filled(3, 0));
    }

    #[test]
    fn test_first_empty_column_and_run() {
        let grid = SheetGrid::parse(SHEET).unwrap();
        assert_eq!(grid.first_empty_column(&[1], 10), Some(1));
        assert_eq!(grid.first_empty_column(&[1, 2], 10), Some(1));
        assert_eq!(grid.first_empty_run(&[1, 2], 2, 10), Some(3));
        assert_eq!(grid.first_empty_run(&[1], 3, 3), None);
        assert_eq!(grid.first_empty_column(&[1], 1), None);
    }

    #[test]
    fn test_round_trip_preserves_content() {
        let grid = SheetGrid::parse(SHEET).unwrap();
        let out = xml_string(&grid, None);
        assert!(out.contains(r#"<c r="A1" t="inlineStr"><is><t>Handle</t></is></c>"#));
        assert!(out.contains(r#"<c r="C2"><f>A2*2</f></c>"#));
        assert!(out.contains("<pageMargins"));
        assert!(out.contains(r#"<dimension ref="A1:C2"/>"#));
        assert!(!out.contains("spans"));
    }

    #[test]
    fn test_set_merges_in_column_order() {
        let mut grid = SheetGrid::parse(SHEET).unwrap();
        grid.set(1, 1, NewCell::forced_text("00123"));
        grid.set(2, 1, NewCell::Number(4.5));
        grid.set(4, 0, NewCell::Boolean(true));

        assert!(grid.uses_text_format());
        let out = xml_string(&grid, Some(9));
        let a1 = out.find(r#"r="A1""#).unwrap();
        let b1 = out.find(r#"r="B1""#).unwrap();
        assert!(a1 < b1);
        assert!(out.contains(
            r#"<c r="B1" t="inlineStr" s="9"><is><t xml:space="preserve">00123</t></is></c>"#
        ));
        assert!(out.contains(r#"<c r="B2"><v>4.5</v></c>"#));
        assert!(out.contains(r#"<row r="4"><c r="A4" t="b"><v>1</v></c></row>"#));
        assert!(out.contains(r#"<dimension ref="A1:C4"/>"#));
    }

    #[test]
    fn test_empty_sheet_data() {
        let xml = r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData/></worksheet>"#;
        let mut grid = SheetGrid::parse(xml).unwrap();
        assert_eq!(grid.first_empty_column(&[1, 2, 3, 4], 5), Some(0));

        grid.set(1, 0, NewCell::text("a & b"));
        let out = xml_string(&grid, None);
        assert!(out.contains("<sheetData><row r=\"1\">"));
        assert!(out.contains("a &amp; b"));
        assert!(out.ends_with("</sheetData></worksheet>"));
    }

    #[test]
    fn test_missing_sheet_data() {
        assert!(SheetGrid::parse("<worksheet/>").is_err());
    }

    #[test]
    fn test_prefixed_namespace() {
        let xml = r#"<x:worksheet xmlns:x="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><x:sheetData><x:row r="1"><x:c r="A1"><x:v>1</x:v></x:c></x:row></x:sheetData></x:worksheet>"#;
        let mut grid = SheetGrid::parse(xml).unwrap();
        assert!(grid.is_filled(1, 0));
        grid.set(1, 1, NewCell::Number(2.0));
        let out = xml_string(&grid, None);
        assert!(out.contains(r#"<x:c r="B1"><x:v>2</x:v></x:c>"#));
    }
}
