//! Column classification: output name, mandatory flag and value-type tag

use anyhow::Result;
use log::{debug, warn};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

use crate::error::InputFormatError;
use crate::mapping::MappingTable;
use crate::normalize::normalize_str;
use crate::reader::SourceTable;

pub const MANDATORY: &str = "mandatory";
pub const NON_MANDATORY: &str = "non mandatory";
pub const NOT_FOUND: &str = "Not Found";

pub const TYPE_STRING: &str = "string";
pub const TYPE_IMAGE_URL_ARRAY: &str = "imageurlarray";
pub const TYPE_SELECT: &str = "select";

/// Header substrings that mark a column as image URLs
const IMAGE_KEYWORDS: &[&str] = &[
    "image",
    "img",
    "picture",
    "photo",
    "thumbnail",
    "thumb",
    "hero",
    "front",
    "back",
    "url",
];

const SAMPLE_SIZE: usize = 20;
/// Minimum share of sampled values with an image extension, in percent
const IMAGE_RATIO_PERCENT: usize = 30;

/// How columns are classified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifyMode {
    /// Header keywords and content sampling
    #[default]
    Auto,
    /// Declarative mapping table lookup
    Mapping,
}

/// Classification of one output column sourced from one input column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMeta {
    pub source: String,
    pub output: String,
    pub mandatory: String,
    pub value_type: String,
}

impl ColumnMeta {
    fn new(source: &str, output: &str, mandatory: &str, value_type: &str) -> Self {
        Self {
            source: source.to_string(),
            output: output.to_string(),
            mandatory: mandatory.to_string(),
            value_type: value_type.to_string(),
        }
    }

    /// Whether written values must be stored as text
    pub fn forces_text(&self) -> bool {
        is_text_type(&self.value_type)
    }

    /// Passed through without a mapping table entry
    pub fn is_unmapped(&self) -> bool {
        self.mandatory == NOT_FOUND
    }
}

/// `string` and `imageurlarray` values are always written as text
pub fn is_text_type(value_type: &str) -> bool {
    let key = normalize_str(value_type);
    key == TYPE_STRING || key == TYPE_IMAGE_URL_ARRAY
}

/// Classify every column of the table, in column order
pub fn classify(
    table: &SourceTable,
    mode: ClassifyMode,
    mapping: Option<&MappingTable>,
) -> Result<Vec<ColumnMeta>> {
    let metas = match mode {
        ClassifyMode::Auto => classify_auto(table),
        ClassifyMode::Mapping => {
            let mapping = mapping.ok_or(InputFormatError::MappingTableRequired)?;
            classify_mapped(table, mapping)
        }
    };

    let unmapped = metas.iter().filter(|m| m.is_unmapped()).count();
    if unmapped > 0 {
        warn!("{} columns have no mapping entry and pass through unmapped", unmapped);
    }
    debug!("Classified {} columns into {} outputs", table.columns.len(), metas.len());

    Ok(metas)
}

fn classify_mapped(table: &SourceTable, mapping: &MappingTable) -> Vec<ColumnMeta> {
    let mut metas = Vec::new();

    for source in &table.columns {
        let mut rules = mapping.rules_for(source).peekable();

        let Some(first) = rules.peek() else {
            metas.push(ColumnMeta::new(source, source, NOT_FOUND, NOT_FOUND));
            continue;
        };
        metas.push(ColumnMeta::new(source, source, &first.mandatory, &first.field_type));

        // Exact comparison: a target differing only in case is its own output
        for rule in rules {
            let field_name = rule.field_name.trim();
            if rule.duplicate && !field_name.is_empty() && field_name != source.trim() {
                metas.push(ColumnMeta::new(
                    source,
                    field_name,
                    &rule.mandatory,
                    &rule.field_type,
                ));
            }
        }
    }

    metas
}

fn classify_auto(table: &SourceTable) -> Vec<ColumnMeta> {
    table
        .columns
        .iter()
        .enumerate()
        .map(|(index, source)| {
            let sample: Vec<String> = table
                .column_values(index)
                .filter(|v| !v.is_blank())
                .take(SAMPLE_SIZE)
                .map(|v| v.to_trimmed_text())
                .collect();

            let value_type = if is_image_column(source, &sample) {
                TYPE_IMAGE_URL_ARRAY
            } else {
                TYPE_STRING
            };
            ColumnMeta::new(source, source, MANDATORY, value_type)
        })
        .collect()
}

/// Image-URL heuristic: header keyword, or at least 30% of the sample ends
/// in an image file extension.
pub fn is_image_column<S: AsRef<str>>(header: &str, sample: &[S]) -> bool {
    let key = normalize_str(header);
    if IMAGE_KEYWORDS.iter().any(|k| key.contains(k)) {
        return true;
    }
    if sample.is_empty() {
        return false;
    }

    let matches = sample
        .iter()
        .filter(|v| has_image_extension(v.as_ref()))
        .count();
    matches * 100 >= sample.len() * IMAGE_RATIO_PERCENT
}

fn has_image_extension(value: &str) -> bool {
    static IMAGE_EXTENSION: OnceLock<Regex> = OnceLock::new();
    let re = IMAGE_EXTENSION
        .get_or_init(|| Regex::new(r"(?i)\.(jpe?g|png|gif|bmp|webp|tiff?)$").unwrap());
    re.is_match(value.trim())
}
