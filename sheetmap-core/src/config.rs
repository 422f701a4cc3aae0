//! Configuration system for the mapping pipeline

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::InputFormatError;
use crate::profile::{self, IdentifierEntry, IdentifierRoles, MarketplaceProfile, ProfileEntry};

/// Main pipeline configuration
#[derive(Debug, Clone, Serialize)]
pub struct MapperConfig {
    pub paths: PathsConfig,
    pub batch: BatchConfig,
    pub writer: WriterConfig,
    /// Built-in profiles with `[profiles.*]` layered on top
    pub profiles: BTreeMap<String, MarketplaceProfile>,
    /// Built-in identifier roles with `[identifiers.*]` layered on top
    pub identifiers: BTreeMap<String, IdentifierRoles>,
}

/// On-disk shape of `sheetmap.toml`
#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    paths: PathsConfig,
    #[serde(default)]
    batch: BatchConfig,
    #[serde(default)]
    writer: WriterConfig,
    #[serde(default)]
    profiles: BTreeMap<String, ProfileEntry>,
    #[serde(default)]
    identifiers: BTreeMap<String, IdentifierEntry>,
}

impl MapperConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml(&content)
    }

    /// Parse TOML, layering user entries over the built-in tables.
    ///
    /// Entry names match built-ins case- and space-insensitively, so
    /// `[profiles.amazon]` edits `Amazon` rather than adding a second one.
    pub fn from_toml(content: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content)?;

        let mut profiles = profile::builtin_profiles();
        for (name, entry) in file.profiles {
            let name = profile::canonical_name(&profiles, &name);
            if let Some(existing) = profiles.get_mut(&name) {
                entry.apply(existing);
                continue;
            }
            let Some(new_profile) = entry.into_profile(&name) else {
                anyhow::bail!(
                    "Configuration error: profile '{}' needs header_row and data_row",
                    name
                );
            };
            profiles.insert(name, new_profile);
        }

        let mut identifiers = profile::builtin_identifier_roles();
        for (name, entry) in file.identifiers {
            let name = profile::canonical_name(&identifiers, &name);
            if let Some(existing) = identifiers.get_mut(&name) {
                entry.apply(existing);
                continue;
            }
            let Some(roles) = entry.into_roles() else {
                anyhow::bail!(
                    "Configuration error: identifiers '{}' needs product_id and variant_id",
                    name
                );
            };
            identifiers.insert(name, roles);
        }

        let config = Self {
            paths: file.paths,
            batch: file.batch,
            writer: file.writer,
            profiles,
            identifiers,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate profile row layouts and writer limits
    pub fn validate(&self) -> Result<()> {
        for (name, profile) in &self.profiles {
            if !profile.is_valid() {
                anyhow::bail!(
                    "Configuration error: profile '{}' has header row {} and data row {}",
                    name,
                    profile.header_row,
                    profile.data_row
                );
            }
        }

        if self.writer.max_columns == 0 {
            anyhow::bail!("Configuration error: writer.max_columns must be positive");
        }

        Ok(())
    }

    /// Look up a marketplace profile by case/space-insensitive name
    pub fn profile(&self, marketplace: &str) -> Result<&MarketplaceProfile> {
        profile::lookup(&self.profiles, marketplace)
            .ok_or_else(|| InputFormatError::UnknownMarketplace(marketplace.to_string()).into())
    }

    /// Identifier roles for a marketplace, if it has any
    pub fn identifier_roles(&self, marketplace: &str) -> Option<&IdentifierRoles> {
        profile::lookup(&self.identifiers, marketplace)
    }
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            batch: BatchConfig::default(),
            writer: WriterConfig::default(),
            profiles: profile::builtin_profiles(),
            identifiers: profile::builtin_identifier_roles(),
        }
    }
}

/// Default locations of the template and mapping workbooks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_template_path")]
    pub template: PathBuf,
    #[serde(default = "default_mapping_path")]
    pub mapping: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            template: default_template_path(),
            mapping: default_mapping_path(),
        }
    }
}

fn default_template_path() -> PathBuf {
    PathBuf::from("sku-template.xlsx")
}

fn default_mapping_path() -> PathBuf {
    PathBuf::from("Mapping - Automation.xlsx")
}

/// Batch counter service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Remote sequence service; the local file is used alone when unset
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_fallback_path")]
    pub fallback_path: PathBuf,
    /// First id handed out when no counter exists yet
    #[serde(default = "default_start")]
    pub start: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_seconds: default_timeout(),
            fallback_path: default_fallback_path(),
            start: default_start(),
        }
    }
}

fn default_timeout() -> u64 {
    5
}

fn default_fallback_path() -> PathBuf {
    PathBuf::from("batch_counter.txt")
}

fn default_start() -> u64 {
    1
}

/// Template writer limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Columns probed when looking for free space
    #[serde(default = "default_max_columns")]
    pub max_columns: u32,
    /// Blank columns left between the option block and identifiers
    #[serde(default = "default_identifier_gap")]
    pub identifier_gap: u32,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            max_columns: default_max_columns(),
            identifier_gap: default_identifier_gap(),
        }
    }
}

fn default_max_columns() -> u32 {
    300
}

fn default_identifier_gap() -> u32 {
    2
}
