//! sheetmap-core: marketplace listing spreadsheet to output template mapper
//!
//! One run extracts the header/data region of an uploaded sheet, classifies
//! its columns, derives option and identifier columns, and appends the
//! result to the `Values` and `Types` sheets of an output template.

pub mod batch;
pub mod classify;
pub mod config;
pub mod error;
pub mod extract;
pub mod identifiers;
pub mod mapping;
pub mod normalize;
pub mod options;
pub mod profile;
pub mod reader;
pub mod writer;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Serialize;
use std::fs;

pub use batch::BatchCounter;
pub use classify::{ClassifyMode, ColumnMeta};
pub use config::MapperConfig;
pub use error::{InputFormatError, TemplateError};
pub use extract::Overrides;
pub use mapping::{MappingStore, MappingTable};
pub use profile::{MarketplaceProfile, SheetSelector};
pub use reader::{CellValue, SourceTable};

use identifiers::IdentifierSelection;
use writer::WriteRequest;

/// MIME type of the produced workbook
pub const OUTPUT_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Suggested file name for a run's output
pub fn output_file_name(batch_id: Option<u64>) -> String {
    match batch_id {
        Some(id) => format!("output_template_batch{}.xlsx", id),
        None => "output_template.xlsx".to_string(),
    }
}

/// One upload to process
#[derive(Debug, Clone, Default)]
pub struct MapRequest {
    /// Uploaded workbook bytes (xlsx, xls or ods)
    pub input: Vec<u8>,
    pub marketplace: String,
    pub mode: ClassifyMode,
    pub overrides: Overrides,
    /// Explicit identifier source columns, for profiles that take them
    pub variant_column: Option<String>,
    pub product_column: Option<String>,
    /// Claim a batch id and write the `BatchID` column
    pub with_batch: bool,
}

/// Result of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    #[serde(skip)]
    pub output: Vec<u8>,
    pub file_name: String,
    pub row_count: usize,
    pub columns: Vec<ColumnMeta>,
    /// Source columns passed through without a mapping entry
    pub unmapped: Vec<String>,
    /// Distinct Option 1 and Option 2 values
    pub option_values: (Vec<String>, Vec<String>),
    /// Identifier columns written, e.g. `variantId`
    pub identifiers_written: Vec<String>,
    pub batch_id: Option<u64>,
}

/// Main pipeline interface
pub struct Mapper {
    config: MapperConfig,
    mapping: MappingStore,
    counter: Box<dyn BatchCounter>,
}

impl Mapper {
    /// Create a mapper with an injected batch counter. The mapping table is
    /// loaded from `config.paths.mapping` on first use.
    pub fn new(config: MapperConfig, counter: Box<dyn BatchCounter>) -> Self {
        let mapping = MappingStore::from_path(config.paths.mapping.clone());
        Self {
            config,
            mapping,
            counter,
        }
    }

    /// Create a mapper with the counter chain described by the configuration
    pub fn from_config(config: MapperConfig) -> Self {
        let counter = batch::counter_from_config(&config.batch);
        Self::new(config, counter)
    }

    /// Replace the mapping table source
    pub fn with_mapping(mut self, mapping: MappingStore) -> Self {
        self.mapping = mapping;
        self
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    /// Mapping table, loading it on first call
    pub fn mapping_table(&self) -> Result<&MappingTable> {
        self.mapping.get()
    }

    /// Run against the template at `config.paths.template`
    pub fn run(&mut self, request: &MapRequest) -> Result<RunReport> {
        let path = &self.config.paths.template;
        let template = fs::read(path)
            .with_context(|| format!("Failed to read template: {}", path.display()))?;
        self.run_with_template(request, &template)
    }

    /// Run against in-memory template bytes
    pub fn run_with_template(&mut self, request: &MapRequest, template: &[u8]) -> Result<RunReport> {
        let profile = self.config.profile(&request.marketplace)?.clone();

        let table = extract::extract(&request.input, &profile, &request.overrides)?;
        info!(
            "Extracted {} rows x {} columns for {}",
            table.row_count(),
            table.columns.len(),
            profile.name
        );

        let mapping = match request.mode {
            ClassifyMode::Mapping => Some(self.mapping.get().context("Failed to load mapping table")?),
            ClassifyMode::Auto => None,
        };
        let columns = classify::classify(&table, request.mode, mapping)?;
        let options = options::derive_options(&table);

        let selection = if profile.allow_overrides {
            IdentifierSelection::Explicit {
                variant: request.variant_column.as_deref(),
                product: request.product_column.as_deref(),
            }
        } else {
            match self.config.identifier_roles(&profile.name) {
                Some(roles) => IdentifierSelection::Roles(roles),
                None => IdentifierSelection::Nothing,
            }
        };
        let identifiers = identifiers::resolve_identifiers(&table, selection)?;

        let batch_id = if request.with_batch {
            match self.counter.claim() {
                Ok(id) => Some(id),
                Err(e) => {
                    warn!("Could not claim a batch id ({:#}); writing without BatchID", e);
                    None
                }
            }
        } else {
            None
        };

        let written = writer::write_template(
            template,
            &WriteRequest {
                table: &table,
                columns: &columns,
                options: &options,
                identifiers: &identifiers,
                batch_id,
            },
            &self.config.writer,
        )?;

        let unmapped = columns
            .iter()
            .filter(|c| c.is_unmapped())
            .map(|c| c.source.clone())
            .collect();
        let identifiers_written = identifiers
            .writable()
            .into_iter()
            .map(|(label, _)| label.to_string())
            .collect();

        Ok(RunReport {
            output: written.bytes,
            file_name: output_file_name(batch_id),
            row_count: table.row_count(),
            columns,
            unmapped,
            option_values: (options.distinct_option1(), options.distinct_option2()),
            identifiers_written,
            batch_id,
        })
    }
}
