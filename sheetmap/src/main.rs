use anyhow::{Context, Result};
use clap::{ArgAction, Parser, ValueEnum};
use sheetmap_core::{ClassifyMode, MapRequest, Mapper, MapperConfig, Overrides, SheetSelector};
use std::fs;
use std::path::PathBuf;

mod formatter;

#[derive(Parser)]
#[command(name = "sheetmap")]
#[command(about = "Remap a marketplace listing spreadsheet onto a Values/Types template", long_about = None)]
#[command(version)]
struct Cli {
    /// Uploaded listing spreadsheet (xlsx, xls or ods)
    #[arg(value_name = "INPUT", required_unless_present_any = ["list_marketplaces", "list_clients"])]
    input: Option<PathBuf>,

    /// Marketplace profile (Amazon, Flipkart, Myntra, Ajio, TataCliq, Zivame, Celio, General)
    #[arg(short, long, default_value = "General")]
    marketplace: String,

    /// Column classification mode
    #[arg(long, value_enum, default_value = "auto")]
    mode: Mode,

    /// Output template workbook (overrides config)
    #[arg(short, long, value_name = "FILE")]
    template: Option<PathBuf>,

    /// Mapping table workbook (overrides config)
    #[arg(long, value_name = "FILE")]
    mapping: Option<PathBuf>,

    /// Sheet name or 0-based index (General only)
    #[arg(long, value_name = "NAME|INDEX")]
    sheet: Option<String>,

    /// 1-indexed header row (General only)
    #[arg(long, value_name = "N")]
    header_row: Option<usize>,

    /// 1-indexed first data row (General only)
    #[arg(long, value_name = "N")]
    data_row: Option<usize>,

    /// Source column for variantId (General only)
    #[arg(long, value_name = "COLUMN")]
    variant_column: Option<String>,

    /// Source column for productId (General only)
    #[arg(long, value_name = "COLUMN")]
    product_column: Option<String>,

    /// Claim a batch id and append a BatchID column
    #[arg(short, long)]
    batch: bool,

    /// Output file (default: output_template[_batch{N}].xlsx)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Report format
    #[arg(short, long, value_enum, default_value = "human")]
    format: OutputFormat,

    /// Print the marketplace profile table and exit
    #[arg(long)]
    list_marketplaces: bool,

    /// Print client names from the mapping table and exit
    #[arg(long)]
    list_clients: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, ValueEnum)]
enum Mode {
    /// Header keywords and content sampling
    Auto,
    /// Mapping table lookup
    Mapping,
}

impl From<Mode> for ClassifyMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Auto => ClassifyMode::Auto,
            Mode::Mapping => ClassifyMode::Mapping,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON output
    Json,
}

fn load_config(path: Option<&PathBuf>) -> Result<MapperConfig> {
    if let Some(config_path) = path {
        return MapperConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()));
    }

    // Try to load default config from current directory if it exists
    let default_config_path = PathBuf::from("sheetmap.toml");
    if default_config_path.exists() {
        MapperConfig::from_file(&default_config_path).with_context(|| {
            format!(
                "Failed to load config from {}",
                default_config_path.display()
            )
        })
    } else {
        Ok(MapperConfig::default())
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = load_config(cli.config.as_ref())?;
    if let Some(template) = &cli.template {
        config.paths.template = template.clone();
    }
    if let Some(mapping) = &cli.mapping {
        config.paths.mapping = mapping.clone();
    }

    if cli.list_marketplaces {
        formatter::print_marketplaces(&config);
        return Ok(());
    }

    let mut mapper = Mapper::from_config(config);

    if cli.list_clients {
        let table = mapper.mapping_table()?;
        formatter::print_clients(table.client_names());
        return Ok(());
    }

    // clap guarantees INPUT when no listing flag is set
    let Some(input_path) = cli.input else {
        anyhow::bail!("INPUT is required");
    };
    let input = fs::read(&input_path)
        .with_context(|| format!("Failed to read input: {}", input_path.display()))?;

    let request = MapRequest {
        input,
        marketplace: cli.marketplace,
        mode: cli.mode.into(),
        overrides: Overrides {
            sheet: cli
                .sheet
                .as_deref()
                .map(|s| s.parse::<SheetSelector>().unwrap_or_default()),
            header_row: cli.header_row,
            data_row: cli.data_row,
        },
        variant_column: cli.variant_column,
        product_column: cli.product_column,
        with_batch: cli.batch,
    };

    let report = mapper
        .run(&request)
        .with_context(|| format!("Failed to map {}", input_path.display()))?;

    let output_path = cli
        .output
        .unwrap_or_else(|| PathBuf::from(&report.file_name));
    fs::write(&output_path, &report.output)
        .with_context(|| format!("Failed to write output: {}", output_path.display()))?;

    match cli.format {
        OutputFormat::Human => formatter::print_human(&input_path, &output_path, &report),
        OutputFormat::Json => formatter::print_json(&input_path, &output_path, &report)?,
    }

    Ok(())
}
