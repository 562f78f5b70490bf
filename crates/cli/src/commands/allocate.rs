use clap::Args;
use packfill_core::cpq::allocator::Allocator;
use packfill_core::cpq::resolver::{parse_product_hints, SimilarityResolver};
use packfill_core::domain::allocation::{Allocation, LineItem};
use packfill_core::errors::ApplicationError;
use packfill_core::invoice::{parse_amount, InvoiceError};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::commands::{prepare, success_with_report, CommandResult, RuntimeArgs};

const COMMAND: &str = "allocate";

#[derive(Debug, Clone, Args)]
pub struct AllocateArgs {
    #[arg(long, help = "Target amount, or free text containing it (\"£480 please\")")]
    pub target: String,
    #[arg(long, default_value = "", help = "Comma-separated product names; `.` for any")]
    pub products: String,
    #[arg(long, help = "Seed the random source for a reproducible allocation")]
    pub seed: Option<u64>,
    #[arg(long, help = "Catalog file (.toml or .json); overrides catalog.path")]
    pub catalog: Option<std::path::PathBuf>,
    #[arg(long, help = "Config file to load instead of packfill.toml; must exist")]
    pub config_file: Option<std::path::PathBuf>,
}

#[derive(Debug, Serialize)]
struct AllocateReport<'a> {
    seed: u64,
    product_hints: Vec<String>,
    product_total: Decimal,
    total: Decimal,
    shortfall: Decimal,
    unmatched: bool,
    lines: Vec<&'a LineItem>,
    allocation: &'a Allocation,
}

pub fn run(args: AllocateArgs) -> CommandResult {
    let runtime_args = RuntimeArgs {
        config_file: args.config_file.clone(),
        catalog: args.catalog.clone(),
        seed: args.seed,
    };
    let runtime = match prepare(&runtime_args) {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::from_interface(
                COMMAND,
                &error.into_interface(format!("{COMMAND}-unseeded")),
            );
        }
    };
    let correlation_id = runtime.correlation_id(COMMAND);

    let result = (|| -> Result<(Allocation, Vec<String>), ApplicationError> {
        let target = parse_amount(&args.target)
            .ok_or_else(|| InvoiceError::MissingAmount(args.target.clone()))?;
        let hints = parse_product_hints(&args.products);
        let allocator =
            Allocator::with_settings(SimilarityResolver, runtime.config.allocator.clone())?;
        let allocation = allocator.allocate(&runtime.catalog, &hints, target, &mut runtime.rng())?;
        Ok((allocation, hints))
    })();

    match result {
        Ok((allocation, product_hints)) => {
            let message = if allocation.is_unmatched() {
                format!("no catalog product matched; delivery only ({})", allocation.total())
            } else {
                let product_lines =
                    allocation.line_items().filter(|line| !line.is_delivery()).count();
                format!(
                    "allocated {} of {} across {product_lines} product lines",
                    allocation.total(),
                    allocation.target,
                )
            };
            let report = AllocateReport {
                seed: runtime.seed,
                product_hints,
                product_total: allocation.product_total(),
                total: allocation.total(),
                shortfall: allocation.shortfall(),
                unmatched: allocation.is_unmatched(),
                lines: allocation.line_items().collect(),
                allocation: &allocation,
            };
            success_with_report(COMMAND, message, &report)
        }
        Err(error) => {
            CommandResult::from_interface(COMMAND, &error.into_interface(correlation_id))
        }
    }
}
