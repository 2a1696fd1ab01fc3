//! Catalog command - prints reliability coefficients and bands.

use anyhow::Result;
use colored::Colorize;
use serde_json::json;
use std::path::Path;

use sw_core::reliability::{normalize_category, ReliabilityCatalog};

use crate::OutputFormat;

pub fn run(category: Option<&str>, overrides: &Path, format: OutputFormat) -> Result<()> {
    let catalog = ReliabilityCatalog::new();
    let summary = catalog.load_overrides(overrides);
    let overridden = |c: &str| summary.applied.iter().any(|a| a == c);

    if let Some(category) = category {
        let key = normalize_category(category);
        let coefficient = catalog.coefficient_for(category);
        let band = catalog.category_band(category);
        let source = if overridden(&key) {
            "override"
        } else if catalog.contains(category) {
            "built-in"
        } else {
            "fallback"
        };

        if format == OutputFormat::Json {
            let value = json!({
                "category": key,
                "coefficient": coefficient,
                "band": band.as_str(),
                "source": source,
            });
            println!("{}", serde_json::to_string_pretty(&value)?);
        } else {
            println!("{} {}", "Category:".bold(), key.cyan());
            println!("  Coefficient: {:.4}", coefficient);
            println!("  Band:        {}", band);
            println!("  Source:      {}", source);
        }
        return Ok(());
    }

    let entries = catalog.entries();
    if format == OutputFormat::Json {
        let values: Vec<_> = entries
            .iter()
            .map(|e| {
                json!({
                    "category": e.category,
                    "coefficient": e.coefficient,
                    "band": catalog.category_band(&e.category).as_str(),
                    "overridden": overridden(&e.category),
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&values)?);
        return Ok(());
    }

    println!("{}", "Reliability Catalog".bold());
    println!("───────────────────");
    for entry in &entries {
        let marker = if overridden(&entry.category) { "*" } else { " " };
        println!(
            "  {}{:<22} {:.4}  {}",
            marker,
            entry.category,
            entry.coefficient,
            catalog.category_band(&entry.category)
        );
    }
    if !summary.applied.is_empty() {
        println!();
        println!("* overridden by {}", overrides.display());
    }
    if !summary.rejected.is_empty() {
        println!(
            "{} rejected out-of-range override(s): {}",
            "Warning:".yellow(),
            summary.rejected.join(", ")
        );
    }
    Ok(())
}
