//! Variant option columns derived from size- and color-like columns

use log::debug;
use serde::Serialize;

use crate::normalize::normalize_str;
use crate::reader::SourceTable;

pub const OPTION_1: &str = "Option 1";
pub const OPTION_2: &str = "Option 2";

/// `Option 1` (size) and `Option 2` (color), one value per source row
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OptionSeries {
    pub option1: Vec<String>,
    pub option2: Vec<String>,
    /// Source column feeding Option 1
    pub size_column: Option<String>,
    /// Source column feeding Option 2
    pub color_column: Option<String>,
}

impl OptionSeries {
    /// Distinct non-blank Option 1 values, in order of first appearance
    pub fn distinct_option1(&self) -> Vec<String> {
        distinct(&self.option1)
    }

    /// Distinct non-blank Option 2 values, in order of first appearance
    pub fn distinct_option2(&self) -> Vec<String> {
        distinct(&self.option2)
    }
}

fn is_size_header(key: &str) -> bool {
    key.contains("size")
}

fn is_color_header(key: &str) -> bool {
    key.contains("color") || key.contains("colour")
}

/// Build both option series from the first size-like and color-like columns.
///
/// Slots are never swapped: a table with only a color column fills Option 2
/// and leaves Option 1 blank.
pub fn derive_options(table: &SourceTable) -> OptionSeries {
    let keys: Vec<String> = table.columns.iter().map(|c| normalize_str(c)).collect();

    let size_index = keys.iter().position(|k| is_size_header(k));
    let color_index = keys
        .iter()
        .enumerate()
        .find(|(i, k)| is_color_header(k) && Some(*i) != size_index)
        .map(|(i, _)| i);

    let series = |index: Option<usize>| -> Vec<String> {
        match index {
            Some(i) => table.column_values(i).map(|v| v.to_trimmed_text()).collect(),
            None => vec![String::new(); table.row_count()],
        }
    };

    let options = OptionSeries {
        option1: series(size_index),
        option2: series(color_index),
        size_column: size_index.map(|i| table.columns[i].clone()),
        color_column: color_index.map(|i| table.columns[i].clone()),
    };

    debug!(
        "Options derived from size={:?} color={:?}",
        options.size_column, options.color_column
    );
    options
}

fn distinct(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for value in values {
        if !value.is_empty() && !out.contains(value) {
            out.push(value.clone());
        }
    }
    out
}
