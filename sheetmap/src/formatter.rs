//! Output formatters for run reports

use anyhow::Result;
use colored::*;
use sheetmap_core::classify::NOT_FOUND;
use sheetmap_core::{MapperConfig, RunReport};
use std::path::Path;

/// Print a run report in human-readable format with colors
pub fn print_human(input: &Path, output: &Path, report: &RunReport) {
    println!("{}", format!("Mapping: {}", input.display()).bold());
    println!();

    println!(
        "{} {} rows, {} output columns",
        "Extracted:".bold(),
        report.row_count,
        report.columns.len()
    );

    println!("{}", "Columns:".bold().underline());
    for column in &report.columns {
        let mandatory = if column.mandatory == NOT_FOUND {
            column.mandatory.yellow()
        } else {
            column.mandatory.normal()
        };
        let name = if column.output == column.source {
            column.output.cyan()
        } else {
            format!("{} <- {}", column.output, column.source).cyan()
        };
        println!(
            "  {} [{}] {}",
            name,
            mandatory,
            column.value_type.bright_black()
        );
    }
    println!();

    let (option1, option2) = &report.option_values;
    println!("{} {}", "Option 1:".bold(), list_or_dash(option1));
    println!("{} {}", "Option 2:".bold(), list_or_dash(option2));
    println!(
        "{} {}",
        "Identifiers:".bold(),
        list_or_dash(&report.identifiers_written)
    );
    match report.batch_id {
        Some(id) => println!("{} {}", "Batch:".bold(), id),
        None => println!("{} -", "Batch:".bold()),
    }
    println!();

    if !report.unmapped.is_empty() {
        println!(
            "{} {} columns passed through unmapped:",
            "WARN".yellow().bold(),
            report.unmapped.len()
        );
        for column in &report.unmapped {
            println!("  {}", column.yellow());
        }
        println!();
    }

    println!(
        "{} {}",
        "✓ Written:".green().bold(),
        output.display()
    );
}

fn list_or_dash(values: &[String]) -> String {
    if values.is_empty() {
        "-".to_string()
    } else {
        values.join(", ")
    }
}

/// Print a run report in JSON format
pub fn print_json(input: &Path, output: &Path, report: &RunReport) -> Result<()> {
    let json = serde_json::json!({
        "input": input.display().to_string(),
        "output": output.display().to_string(),
        "report": report,
        "summary": {
            "rows": report.row_count,
            "columns": report.columns.len(),
            "unmapped": report.unmapped.len(),
        }
    });

    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

/// Print the marketplace profile table
pub fn print_marketplaces(config: &MapperConfig) {
    println!("{}", "Marketplaces:".bold().underline());
    for (name, profile) in &config.profiles {
        let mut notes = Vec::new();
        if profile.drop_parent_rows {
            notes.push("parent rows dropped");
        }
        if profile.allow_overrides {
            notes.push("overridable");
        }
        let notes = if notes.is_empty() {
            String::new()
        } else {
            format!(" ({})", notes.join(", "))
        };

        println!(
            "  {} sheet {} header {} data {}{}",
            name.cyan().bold(),
            profile.sheet,
            profile.header_row,
            profile.data_row,
            notes.bright_black()
        );
        if let Some(roles) = config.identifier_roles(name) {
            println!(
                "    productId <- {}, variantId <- {}",
                roles.product_id, roles.variant_id
            );
        }
    }
}

/// Print known client names
pub fn print_clients(names: &[String]) {
    if names.is_empty() {
        println!("{}", "No client names in mapping table".yellow());
        return;
    }
    for name in names {
        println!("{}", name);
    }
}
