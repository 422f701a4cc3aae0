use calamine::{Data, Range, Reader, open_workbook_auto_from_rs};
use rust_xlsxwriter::{Format, Workbook};
use sheetmap_core::batch::FileBatchCounter;
use sheetmap_core::{
    ClassifyMode, InputFormatError, MapRequest, Mapper, MapperConfig, MappingStore, MappingTable,
    Overrides, TemplateError,
};
use std::fs;
use std::io::{Cursor, Read};
use tempfile::TempDir;

#[derive(Clone, Copy)]
enum V {
    S(&'static str),
    N(f64),
    /// Serial number with a date format
    D(f64),
    E,
}

fn strings(rows: &[&[&'static str]]) -> Vec<Vec<V>> {
    rows.iter()
        .map(|row| {
            row.iter()
                .map(|s| if s.is_empty() { V::E } else { V::S(s) })
                .collect()
        })
        .collect()
}

// Build an xlsx file in memory with one entry per sheet
fn build_workbook(sheets: &[(&str, Vec<Vec<V>>)]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    let date_format = Format::new().set_num_format("yyyy-mm-dd");
    for (name, rows) in sheets {
        let sheet = workbook.add_worksheet();
        sheet.set_name(*name).unwrap();
        for (r, row) in rows.iter().enumerate() {
            for (c, value) in row.iter().enumerate() {
                match value {
                    V::S(s) => {
                        sheet.write_string(r as u32, c as u16, *s).unwrap();
                    }
                    V::N(n) => {
                        sheet.write_number(r as u32, c as u16, *n).unwrap();
                    }
                    V::D(n) => {
                        sheet
                            .write_number_with_format(r as u32, c as u16, *n, &date_format)
                            .unwrap();
                    }
                    V::E => {}
                }
            }
        }
    }
    workbook.save_to_buffer().unwrap()
}

fn empty_template() -> Vec<u8> {
    build_workbook(&[("Values", vec![]), ("Types", vec![])])
}

fn read_sheet(bytes: &[u8], name: &str) -> Range<Data> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).unwrap();
    workbook.worksheet_range(name).unwrap()
}

fn cell(range: &Range<Data>, row: u32, col: u32) -> String {
    range
        .get_value((row, col))
        .map(|d| d.to_string())
        .unwrap_or_default()
}

fn row_text(range: &Range<Data>, row: u32, cols: std::ops::Range<u32>) -> Vec<String> {
    cols.map(|c| cell(range, row, c)).collect()
}

fn mapper(dir: &TempDir, config: MapperConfig) -> Mapper {
    let counter = FileBatchCounter::new(dir.path().join("counter.txt"), 41);
    Mapper::new(config, Box::new(counter))
}

fn general_request(input: Vec<u8>) -> MapRequest {
    MapRequest {
        input,
        marketplace: "General".to_string(),
        ..Default::default()
    }
}

fn general_input() -> Vec<u8> {
    build_workbook(&[(
        "Sheet1",
        strings(&[
            &["SKU", "Color", "Size", "ImageURL"],
            &["A1", "Red", "M", "http://x/a.jpg"],
            &["A2", "Blue", "L", "http://x/b.png"],
            &["A3", "Red", "M", "http://x/c.jpg"],
        ]),
    )])
}

#[test]
fn test_end_to_end_auto_general() {
    let dir = TempDir::new().unwrap();
    let mut mapper = mapper(&dir, MapperConfig::default());

    let report = mapper
        .run_with_template(&general_request(general_input()), &empty_template())
        .unwrap();

    assert_eq!(report.row_count, 3);
    assert_eq!(report.file_name, "output_template.xlsx");
    assert!(report.unmapped.is_empty());
    assert_eq!(report.batch_id, None);
    assert_eq!(report.option_values.0, vec!["M", "L"]);
    assert_eq!(report.option_values.1, vec!["Red", "Blue"]);

    let values = read_sheet(&report.output, "Values");
    assert_eq!(
        row_text(&values, 0, 0..6),
        vec!["SKU", "Color", "Size", "ImageURL", "Option 1", "Option 2"]
    );
    assert_eq!(
        row_text(&values, 1, 0..6),
        vec!["A1", "Red", "M", "http://x/a.jpg", "M", "Red"]
    );
    assert_eq!(row_text(&values, 3, 4..6), vec!["M", "Red"]);

    let types = read_sheet(&report.output, "Types");
    assert_eq!(row_text(&types, 0, 0..6), row_text(&types, 1, 0..6));
    assert_eq!(
        row_text(&types, 2, 0..6),
        vec!["mandatory", "mandatory", "mandatory", "mandatory", "non mandatory", "non mandatory"]
    );
    assert_eq!(
        row_text(&types, 3, 0..6),
        vec!["string", "string", "string", "imageurlarray", "select", "select"]
    );
    // Distinct option values, first occurrence order
    assert_eq!(row_text(&types, 4, 4..6), vec!["M", "Red"]);
    assert_eq!(row_text(&types, 5, 4..6), vec!["L", "Blue"]);
    assert_eq!(row_text(&types, 6, 4..6), vec!["", ""]);
}

#[test]
fn test_dates_written_as_iso_text() {
    let dir = TempDir::new().unwrap();
    let mut mapper = mapper(&dir, MapperConfig::default());
    let input = build_workbook(&[(
        "Sheet1",
        vec![
            vec![V::S("SKU"), V::S("Launch")],
            vec![V::S("A1"), V::D(45123.0)],
            vec![V::S("A2"), V::E],
        ],
    )]);

    let report = mapper
        .run_with_template(&general_request(input), &empty_template())
        .unwrap();

    let values = read_sheet(&report.output, "Values");
    assert_eq!(row_text(&values, 0, 0..2), vec!["SKU", "Launch"]);
    assert_eq!(
        values.get_value((1, 1)),
        Some(&Data::String("2023-07-16".to_string()))
    );
    assert_eq!(cell(&values, 2, 1), "");
}

#[test]
fn test_numeric_codes_stay_text() {
    let dir = TempDir::new().unwrap();
    let mut mapper = mapper(&dir, MapperConfig::default());
    let input = build_workbook(&[(
        "Sheet1",
        vec![
            vec![V::S("SKU"), V::S("Weight")],
            vec![V::N(1001.0), V::N(2.5)],
            vec![V::S("00123"), V::E],
        ],
    )]);

    let report = mapper
        .run_with_template(&general_request(input), &empty_template())
        .unwrap();

    let values = read_sheet(&report.output, "Values");
    assert_eq!(values.get_value((1, 0)), Some(&Data::String("1001".to_string())));
    assert_eq!(values.get_value((2, 0)), Some(&Data::String("00123".to_string())));
    // Blank source cell stays blank
    assert_eq!(cell(&values, 2, 1), "");

    // Text cells carry the '@' number format
    let mut archive = zip::ZipArchive::new(Cursor::new(report.output.clone())).unwrap();
    let mut styles = String::new();
    archive
        .by_name("xl/styles.xml")
        .unwrap()
        .read_to_string(&mut styles)
        .unwrap();
    assert!(styles.contains(r#"numFmtId="49""#));
}

#[test]
fn test_appends_after_existing_content() {
    let dir = TempDir::new().unwrap();
    let mut mapper = mapper(&dir, MapperConfig::default());
    let template = build_workbook(&[
        ("Values", strings(&[&["Handle", "", "Notes"]])),
        (
            "Types",
            strings(&[&["Handle"], &["Handle"], &["mandatory"], &["string"]]),
        ),
    ]);
    let input = build_workbook(&[(
        "Sheet1",
        strings(&[&["SKU", "Color"], &["A1", "Red"]]),
    )]);

    let report = mapper
        .run_with_template(&general_request(input.clone()), &template)
        .unwrap();

    // Values: B is a one-column hole, so the 4-wide block starts at D
    let values = read_sheet(&report.output, "Values");
    assert_eq!(
        row_text(&values, 0, 0..7),
        vec!["Handle", "", "Notes", "SKU", "Color", "Option 1", "Option 2"]
    );
    assert_eq!(cell(&values, 1, 3), "A1");

    // Types: only A is occupied
    let types = read_sheet(&report.output, "Types");
    assert_eq!(
        row_text(&types, 0, 0..5),
        vec!["Handle", "SKU", "Color", "Option 1", "Option 2"]
    );
    assert_eq!(row_text(&types, 3, 0..3), vec!["string", "string", "string"]);

    // Reusing the output as the next template appends another block
    let second = mapper
        .run_with_template(&general_request(input), &report.output)
        .unwrap();
    let values = read_sheet(&second.output, "Values");
    assert_eq!(row_text(&values, 0, 7..9), vec!["SKU", "Color"]);
    assert_eq!(cell(&values, 0, 3), "SKU");
}

#[test]
fn test_amazon_identifiers_and_batch() {
    let dir = TempDir::new().unwrap();
    let mut mapper = mapper(&dir, MapperConfig::default());
    let input = build_workbook(&[
        ("Instructions", strings(&[&["Read me"]])),
        (
            "Template",
            strings(&[
                &["Amazon listing template"],
                &[],
                &[],
                &["Seller SKU", "Parent SKU", "Parentage Level", "Colour", "Size"],
                &["Unique id", "Parent id", "parent or child"],
                &["Example", "", ""],
                &["P-1", "P-1", "Parent", "", ""],
                &["00123", "P-1", "Child", "Red", "S"],
                &["00124", "P-1", "Child", "Blue", "M"],
            ]),
        ),
    ]);

    let request = MapRequest {
        input,
        marketplace: "amazon".to_string(),
        with_batch: true,
        ..Default::default()
    };
    let report = mapper.run_with_template(&request, &empty_template()).unwrap();

    assert_eq!(report.row_count, 2);
    assert_eq!(report.batch_id, Some(41));
    assert_eq!(report.file_name, "output_template_batch41.xlsx");
    assert_eq!(report.identifiers_written, vec!["variantId", "productId"]);
    assert_eq!(
        fs::read_to_string(dir.path().join("counter.txt")).unwrap(),
        "42"
    );

    let values = read_sheet(&report.output, "Values");
    assert_eq!(
        row_text(&values, 0, 0..12),
        vec![
            "Seller SKU",
            "Parent SKU",
            "Parentage Level",
            "Colour",
            "Size",
            "Option 1",
            "Option 2",
            "",
            "",
            "variantId",
            "productId",
            "BatchID",
        ]
    );
    assert_eq!(row_text(&values, 1, 9..12), vec!["00123", "P-1", "41"]);
    assert_eq!(row_text(&values, 2, 9..12), vec!["00124", "P-1", "41"]);
    assert_eq!(row_text(&values, 1, 5..7), vec!["S", "Red"]);

    let types = read_sheet(&report.output, "Types");
    assert_eq!(
        row_text(&types, 2, 9..12),
        vec!["mandatory", "mandatory", "non mandatory"]
    );
    assert_eq!(row_text(&types, 3, 9..12), vec!["string", "string", "string"]);
    assert_eq!(row_text(&types, 2, 7..9), vec!["", ""]);
}

#[test]
fn test_general_overrides_and_explicit_identifiers() {
    let dir = TempDir::new().unwrap();
    let mut mapper = mapper(&dir, MapperConfig::default());
    let input = build_workbook(&[
        ("Cover", strings(&[&["nothing here"]])),
        (
            "Products",
            strings(&[
                &["Catalogue export"],
                &["Style", "Variant", "Shade"],
                &["ST-1", "V-1", "Green"],
            ]),
        ),
    ]);

    let request = MapRequest {
        input,
        marketplace: "General".to_string(),
        overrides: Overrides {
            sheet: Some("Products".parse().unwrap()),
            header_row: Some(2),
            data_row: Some(3),
        },
        variant_column: Some("Variant".to_string()),
        product_column: Some("Style".to_string()),
        ..Default::default()
    };
    let report = mapper.run_with_template(&request, &empty_template()).unwrap();

    assert_eq!(report.row_count, 1);
    assert_eq!(report.identifiers_written, vec!["variantId", "productId"]);

    let values = read_sheet(&report.output, "Values");
    // 3 columns, 2 options, 2 gap columns, then identifiers
    assert_eq!(row_text(&values, 0, 7..9), vec!["variantId", "productId"]);
    assert_eq!(row_text(&values, 1, 7..9), vec!["V-1", "ST-1"]);
}

#[test]
fn test_mapping_mode() {
    let dir = TempDir::new().unwrap();
    let mapping_bytes = build_workbook(&[
        (
            "Attribute Mapping",
            strings(&[
                &[],
                &[
                    "Attributes",
                    "Field Name",
                    "Mandatory or Not",
                    "Field Type",
                    "Duplicates to be created",
                ],
                &["SKU", "SKU", "mandatory", "string", "No"],
                &["Size", "Size", "non mandatory", "select", "No"],
                &["Size", "option1", "non mandatory", "select", "Yes"],
            ]),
        ),
        ("Mapped Client Name", strings(&[&["Acme", "Zeta"], &["Acme"]])),
    ]);
    let table = MappingTable::from_bytes(&mapping_bytes).unwrap();
    assert_eq!(table.client_names(), ["Acme", "Zeta"]);

    let mut mapper =
        mapper(&dir, MapperConfig::default()).with_mapping(MappingStore::preloaded(table));
    let input = build_workbook(&[(
        "Sheet1",
        vec![
            vec![V::S("SKU"), V::S("Size"), V::S("Fabric")],
            vec![V::N(1001.0), V::S("M"), V::S("Cotton")],
        ],
    )]);
    let request = MapRequest {
        mode: ClassifyMode::Mapping,
        ..general_request(input)
    };

    let report = mapper.run_with_template(&request, &empty_template()).unwrap();
    assert_eq!(report.unmapped, vec!["Fabric"]);

    let values = read_sheet(&report.output, "Values");
    assert_eq!(
        row_text(&values, 0, 0..6),
        vec!["SKU", "Size", "option1", "Fabric", "Option 1", "Option 2"]
    );
    assert_eq!(row_text(&values, 1, 0..4), vec!["1001", "M", "M", "Cotton"]);

    let types = read_sheet(&report.output, "Types");
    assert_eq!(
        row_text(&types, 2, 0..4),
        vec!["mandatory", "non mandatory", "non mandatory", "Not Found"]
    );
    assert_eq!(
        row_text(&types, 3, 0..4),
        vec!["string", "select", "select", "Not Found"]
    );
}

#[test]
fn test_mapping_mode_without_mapping_file() {
    let dir = TempDir::new().unwrap();
    let mut config = MapperConfig::default();
    config.paths.mapping = dir.path().join("missing.xlsx");
    let mut mapper = mapper(&dir, config);

    let request = MapRequest {
        mode: ClassifyMode::Mapping,
        ..general_request(general_input())
    };
    assert!(mapper.run_with_template(&request, &empty_template()).is_err());
}

#[test]
fn test_template_without_types_sheet() {
    let dir = TempDir::new().unwrap();
    let mut mapper = mapper(&dir, MapperConfig::default());
    let template = build_workbook(&[("Values", vec![])]);

    let err = mapper
        .run_with_template(&general_request(general_input()), &template)
        .unwrap_err();
    assert_eq!(
        err.downcast_ref::<TemplateError>(),
        Some(&TemplateError::SheetMissing("Types"))
    );
}

#[test]
fn test_no_room_in_probe_window() {
    let dir = TempDir::new().unwrap();
    let mut config = MapperConfig::default();
    config.writer.max_columns = 5;
    let mut mapper = mapper(&dir, config);

    let err = mapper
        .run_with_template(&general_request(general_input()), &empty_template())
        .unwrap_err();
    assert_eq!(
        err.downcast_ref::<TemplateError>(),
        Some(&TemplateError::NoFreeColumns {
            sheet: "Values",
            width: 6,
            limit: 5,
        })
    );
}

#[test]
fn test_input_errors() {
    let dir = TempDir::new().unwrap();
    let mut mapper = mapper(&dir, MapperConfig::default());

    let request = MapRequest {
        overrides: Overrides {
            header_row: Some(10),
            data_row: Some(11),
            ..Default::default()
        },
        ..general_request(general_input())
    };
    let err = mapper.run_with_template(&request, &empty_template()).unwrap_err();
    assert_eq!(
        err.downcast_ref::<InputFormatError>(),
        Some(&InputFormatError::HeaderRowOutOfBounds {
            header_row: 10,
            grid_rows: 4,
        })
    );

    let request = MapRequest {
        marketplace: "Etsy".to_string(),
        ..general_request(general_input())
    };
    let err = mapper.run_with_template(&request, &empty_template()).unwrap_err();
    assert_eq!(
        err.downcast_ref::<InputFormatError>(),
        Some(&InputFormatError::UnknownMarketplace("Etsy".to_string()))
    );

    // Flipkart reads the third sheet
    let request = MapRequest {
        marketplace: "Flipkart".to_string(),
        ..general_request(general_input())
    };
    let err = mapper.run_with_template(&request, &empty_template()).unwrap_err();
    assert_eq!(
        err.downcast_ref::<InputFormatError>(),
        Some(&InputFormatError::SheetIndexOutOfRange(2, 1))
    );
}

#[test]
fn test_run_reads_template_from_config() {
    let dir = TempDir::new().unwrap();
    let template_path = dir.path().join("sku-template.xlsx");
    fs::write(&template_path, empty_template()).unwrap();

    let mut config = MapperConfig::default();
    config.paths.template = template_path.clone();
    let mut mapper = mapper(&dir, config);

    let before = fs::read(&template_path).unwrap();
    let report = mapper.run(&general_request(general_input())).unwrap();
    assert!(!report.output.is_empty());
    assert_eq!(fs::read(&template_path).unwrap(), before);
}
