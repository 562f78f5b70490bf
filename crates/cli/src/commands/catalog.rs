use std::path::PathBuf;

use packfill_core::cpq::catalog::Catalog;
use packfill_core::cpq::pricing::seed_price;
use packfill_core::errors::ApplicationError;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::commands::{load_config, success_with_report, CommandResult, RuntimeArgs};

const COMMAND: &str = "catalog";

#[derive(Debug, Serialize)]
struct CatalogSummary {
    path: String,
    products: usize,
    names: Vec<String>,
    entries: Vec<CatalogEntry>,
}

#[derive(Debug, Serialize)]
struct CatalogEntry {
    name: String,
    variant: String,
    base_price: Decimal,
    seed_price: Decimal,
    tiers: Vec<u32>,
    largest_tier: Option<u32>,
}

pub fn run(catalog: Option<PathBuf>, config_file: Option<PathBuf>) -> CommandResult {
    let args = RuntimeArgs { config_file, catalog, seed: None };

    let result = (|| -> Result<(PathBuf, Catalog), ApplicationError> {
        let config = load_config(&args)?;
        let catalog = Catalog::from_path(&config.catalog.path)?;
        Ok((config.catalog.path, catalog))
    })();

    match result {
        Ok((path, catalog)) => {
            let summary = summarize(&path, &catalog);
            let message = format!(
                "catalog `{}` is valid: {} products under {} names",
                summary.path,
                summary.products,
                summary.names.len()
            );
            success_with_report(COMMAND, message, &summary)
        }
        Err(error) => CommandResult::from_interface(COMMAND, &error.into_interface(COMMAND)),
    }
}

fn summarize(path: &std::path::Path, catalog: &Catalog) -> CatalogSummary {
    CatalogSummary {
        path: path.display().to_string(),
        products: catalog.len(),
        names: catalog.distinct_names().into_iter().map(str::to_string).collect(),
        entries: catalog
            .products()
            .iter()
            .map(|product| CatalogEntry {
                name: product.id.name.clone(),
                variant: product.id.variant.clone(),
                base_price: product.base_price,
                seed_price: seed_price(product).unit_price,
                tiers: product.tiers.keys().copied().collect(),
                largest_tier: product.largest_tier(),
            })
            .collect(),
    }
}
