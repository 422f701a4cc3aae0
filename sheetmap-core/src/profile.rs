//! Marketplace profiles and identifier role table
//!
//! Header/data row numbers are contracts with each marketplace's own
//! listing template. They live here as data so that adding or re-pinning a
//! marketplace never touches the pipeline; `sheetmap.toml` can override or
//! extend every entry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::normalize::normalize_str;

/// Name of the free-form profile that accepts caller overrides
pub const GENERAL: &str = "General";

/// How to pick the worksheet inside an uploaded workbook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SheetSelector {
    /// 0-based position in workbook sheet order
    Index(usize),
    /// Exact sheet name
    Name(String),
}

impl Default for SheetSelector {
    fn default() -> Self {
        SheetSelector::Index(0)
    }
}

impl FromStr for SheetSelector {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().parse::<usize>() {
            Ok(index) => SheetSelector::Index(index),
            Err(_) => SheetSelector::Name(s.to_string()),
        })
    }
}

impl fmt::Display for SheetSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetSelector::Index(i) => write!(f, "#{}", i),
            SheetSelector::Name(n) => write!(f, "\"{}\"", n),
        }
    }
}

/// Sheet selection and row layout of one marketplace template format.
///
/// Rows are 1-indexed; `data_row` is the first row after the header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarketplaceProfile {
    pub name: String,
    pub sheet: SheetSelector,
    pub header_row: usize,
    pub data_row: usize,
    /// Drop rows whose "Parentage Level" is `parent`
    pub drop_parent_rows: bool,
    /// Caller may override sheet and rows at call time
    pub allow_overrides: bool,
}

impl MarketplaceProfile {
    fn fixed(name: &str, sheet: SheetSelector, header_row: usize, data_row: usize) -> Self {
        Self {
            name: name.to_string(),
            sheet,
            header_row,
            data_row,
            drop_parent_rows: false,
            allow_overrides: false,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.header_row >= 1 && self.data_row > self.header_row
    }
}

/// A `[profiles.*]` entry from `sheetmap.toml`. Unset fields keep the
/// built-in value when the name matches a built-in profile.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileEntry {
    pub sheet: Option<SheetSelector>,
    pub header_row: Option<usize>,
    pub data_row: Option<usize>,
    pub drop_parent_rows: Option<bool>,
    pub allow_overrides: Option<bool>,
}

impl ProfileEntry {
    pub fn apply(self, profile: &mut MarketplaceProfile) {
        if let Some(sheet) = self.sheet {
            profile.sheet = sheet;
        }
        if let Some(header_row) = self.header_row {
            profile.header_row = header_row;
        }
        if let Some(data_row) = self.data_row {
            profile.data_row = data_row;
        }
        if let Some(drop) = self.drop_parent_rows {
            profile.drop_parent_rows = drop;
        }
        if let Some(allow) = self.allow_overrides {
            profile.allow_overrides = allow;
        }
    }

    /// New profile; `None` unless both row numbers are given
    pub fn into_profile(self, name: &str) -> Option<MarketplaceProfile> {
        let mut profile = MarketplaceProfile::fixed(
            name,
            SheetSelector::default(),
            self.header_row?,
            self.data_row?,
        );
        self.apply(&mut profile);
        Some(profile)
    }
}

/// Canonical source headers for the product/variant identifier roles
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentifierRoles {
    pub product_id: String,
    pub variant_id: String,
}

impl IdentifierRoles {
    fn new(product_id: &str, variant_id: &str) -> Self {
        Self {
            product_id: product_id.to_string(),
            variant_id: variant_id.to_string(),
        }
    }
}

/// An `[identifiers.*]` entry; unset roles keep the built-in header
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentifierEntry {
    pub product_id: Option<String>,
    pub variant_id: Option<String>,
}

impl IdentifierEntry {
    pub fn apply(self, roles: &mut IdentifierRoles) {
        if let Some(product_id) = self.product_id {
            roles.product_id = product_id;
        }
        if let Some(variant_id) = self.variant_id {
            roles.variant_id = variant_id;
        }
    }

    pub fn into_roles(self) -> Option<IdentifierRoles> {
        Some(IdentifierRoles {
            product_id: self.product_id?,
            variant_id: self.variant_id?,
        })
    }
}

/// Built-in profiles, keyed by marketplace name
pub fn builtin_profiles() -> BTreeMap<String, MarketplaceProfile> {
    let mut amazon =
        MarketplaceProfile::fixed("Amazon", SheetSelector::Name("Template".into()), 4, 7);
    amazon.drop_parent_rows = true;

    let mut general = MarketplaceProfile::fixed(GENERAL, SheetSelector::Index(0), 1, 2);
    general.allow_overrides = true;

    [
        amazon,
        MarketplaceProfile::fixed("Flipkart", SheetSelector::Index(2), 1, 5),
        MarketplaceProfile::fixed("Myntra", SheetSelector::Index(0), 3, 4),
        MarketplaceProfile::fixed("Ajio", SheetSelector::Index(0), 1, 2),
        MarketplaceProfile::fixed("TataCliq", SheetSelector::Index(0), 1, 2),
        MarketplaceProfile::fixed("Zivame", SheetSelector::Index(0), 1, 2),
        MarketplaceProfile::fixed("Celio", SheetSelector::Index(0), 1, 2),
        general,
    ]
    .into_iter()
    .map(|p| (p.name.clone(), p))
    .collect()
}

/// Built-in identifier roles. General has none: the caller picks columns.
pub fn builtin_identifier_roles() -> BTreeMap<String, IdentifierRoles> {
    [
        ("Amazon", IdentifierRoles::new("Parent SKU", "Seller SKU")),
        ("Flipkart", IdentifierRoles::new("Style Code", "Seller SKU ID")),
        ("Myntra", IdentifierRoles::new("styleGroupId", "vendorSkuCode")),
        ("Ajio", IdentifierRoles::new("Style Code", "EAN")),
        ("TataCliq", IdentifierRoles::new("Style Code", "Seller Article SKU")),
        ("Zivame", IdentifierRoles::new("Style Code", "SKU Code")),
        ("Celio", IdentifierRoles::new("Style Number", "EAN")),
    ]
    .into_iter()
    .map(|(name, roles)| (name.to_string(), roles))
    .collect()
}

/// The key in `table` that `name` refers to, or `name` itself if none does
pub fn canonical_name<T>(table: &BTreeMap<String, T>, name: &str) -> String {
    let key = normalize_str(name);
    table
        .keys()
        .find(|k| normalize_str(k) == key)
        .cloned()
        .unwrap_or_else(|| name.to_string())
}

/// Case- and space-insensitive lookup in a name-keyed table
pub fn lookup<'a, T>(table: &'a BTreeMap<String, T>, name: &str) -> Option<&'a T> {
    let key = normalize_str(name);
    table
        .iter()
        .find(|(k, _)| normalize_str(k) == key)
        .map(|(_, v)| v)
}
