//! Product/variant identifier resolution

use anyhow::Result;
use log::{debug, warn};
use serde::Serialize;

use crate::error::InputFormatError;
use crate::normalize::normalize_str;
use crate::profile::IdentifierRoles;
use crate::reader::SourceTable;

pub const VARIANT_ID: &str = "variantId";
pub const PRODUCT_ID: &str = "productId";

/// Where identifier columns come from
#[derive(Debug, Clone, Copy)]
pub enum IdentifierSelection<'a> {
    /// Caller-named source columns (General mode)
    Explicit {
        variant: Option<&'a str>,
        product: Option<&'a str>,
    },
    /// Marketplace role table, matched against the actual headers
    Roles(&'a IdentifierRoles),
    /// No identifiers at all
    Nothing,
}

/// One resolved identifier column
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identifier {
    pub source: String,
    pub values: Vec<String>,
}

impl Identifier {
    fn has_values(&self) -> bool {
        self.values.iter().any(|v| !v.is_empty())
    }
}

/// Zero, one or two identifier columns
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IdentifierSeries {
    pub variant: Option<Identifier>,
    pub product: Option<Identifier>,
}

impl IdentifierSeries {
    /// Columns to write, `variantId` first. Series with no non-blank value
    /// are left out.
    pub fn writable(&self) -> Vec<(&'static str, &Identifier)> {
        [(VARIANT_ID, &self.variant), (PRODUCT_ID, &self.product)]
            .into_iter()
            .filter_map(|(label, id)| id.as_ref().filter(|i| i.has_values()).map(|i| (label, i)))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.writable().is_empty()
    }
}

/// Find the column that best matches a role name: exact (trimmed), then
/// normalized equality, then normalized substring.
pub fn match_column(table: &SourceTable, role: &str) -> Option<usize> {
    let role = role.trim();
    if role.is_empty() {
        return None;
    }
    let role_key = normalize_str(role);

    table
        .columns
        .iter()
        .position(|c| c.trim() == role)
        .or_else(|| table.columns.iter().position(|c| normalize_str(c) == role_key))
        .or_else(|| {
            table
                .columns
                .iter()
                .position(|c| normalize_str(c).contains(&role_key))
        })
}

fn series_from(table: &SourceTable, index: usize) -> Identifier {
    Identifier {
        source: table.columns[index].clone(),
        values: table
            .column_values(index)
            .map(|v| v.to_trimmed_text())
            .collect(),
    }
}

/// Resolve identifier columns for one run
pub fn resolve_identifiers(table: &SourceTable, selection: IdentifierSelection<'_>) -> Result<IdentifierSeries> {
    let series = match selection {
        IdentifierSelection::Nothing => IdentifierSeries::default(),
        IdentifierSelection::Explicit { variant, product } => {
            let pick = |name: Option<&str>| -> Result<Option<Identifier>> {
                match name {
                    None => Ok(None),
                    Some(name) => {
                        let index = table
                            .column_index(name)
                            .ok_or_else(|| InputFormatError::IdentifierColumnMissing(name.to_string()))?;
                        Ok(Some(series_from(table, index)))
                    }
                }
            };
            IdentifierSeries {
                variant: pick(variant)?,
                product: pick(product)?,
            }
        }
        IdentifierSelection::Roles(roles) => {
            let resolve = |role: &str, label: &str| -> Option<Identifier> {
                let found = match_column(table, role).map(|i| series_from(table, i));
                if found.is_none() {
                    warn!("No column matches {} source '{}'; {} omitted", label, role, label);
                }
                found
            };
            IdentifierSeries {
                variant: resolve(&roles.variant_id, VARIANT_ID),
                product: resolve(&roles.product_id, PRODUCT_ID),
            }
        }
    };

    debug!(
        "Identifiers: variant={:?} product={:?}",
        series.variant.as_ref().map(|i| &i.source),
        series.product.as_ref().map(|i| &i.source)
    );
    Ok(series)
}
