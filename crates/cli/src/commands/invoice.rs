use clap::Args;
use packfill_core::cpq::allocator::Allocator;
use packfill_core::cpq::resolver::SimilarityResolver;
use packfill_core::errors::ApplicationError;
use packfill_core::invoice::{InvoiceDraft, InvoiceRequest};
use serde::Serialize;

use crate::commands::{prepare, success_with_report, CommandResult, RuntimeArgs};

const COMMAND: &str = "invoice";

#[derive(Debug, Clone, Args)]
pub struct InvoiceArgs {
    #[arg(long, help = "VAT-inclusive payment amount, or free text containing it")]
    pub amount: String,
    #[arg(long, help = "Invoice number to issue; the next number is reported back")]
    pub invoice_number: String,
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
struct InvoiceReport<'a> {
    seed: u64,
    currency_symbol: &'a str,
    unmatched: bool,
    draft: &'a InvoiceDraft,
}

pub fn run(args: InvoiceArgs) -> CommandResult {
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

    let request = InvoiceRequest {
        amount_text: args.amount,
        products_text: args.products,
        invoice_number: args.invoice_number,
        vat_rate: runtime.config.invoice.vat_rate,
    };

    let result = (|| -> Result<InvoiceDraft, ApplicationError> {
        let allocator =
            Allocator::with_settings(SimilarityResolver, runtime.config.allocator.clone())?;
        let draft =
            InvoiceDraft::build(&allocator, &runtime.catalog, &request, &mut runtime.rng())?;
        Ok(draft)
    })();

    match result {
        Ok(draft) => {
            let symbol = runtime.config.invoice.currency_symbol.as_str();
            let message = format!(
                "invoice {} drafted: {symbol}{} net + {symbol}{} VAT, next number {}",
                draft.invoice_number, draft.vat.net, draft.vat.vat, draft.next_invoice_number
            );
            let report = InvoiceReport {
                seed: runtime.seed,
                currency_symbol: symbol,
                unmatched: draft.allocation.is_unmatched(),
                draft: &draft,
            };
            success_with_report(COMMAND, message, &report)
        }
        Err(error) => {
            CommandResult::from_interface(COMMAND, &error.into_interface(correlation_id))
        }
    }
}
