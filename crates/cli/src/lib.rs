pub mod commands;
pub mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "packfill",
    about = "Packfill invoice allocation CLI",
    long_about = concat!(
        "Fill a target invoice amount with catalog products at tiered prices, ",
        "draft VAT invoices, and inspect catalogs and configuration."
    ),
    after_help = concat!(
        "Examples:\n",
        "  packfill allocate --target 480 --products \"elf bar\" --seed 7\n",
        "  packfill invoice --amount \"£600\" --invoice-number INV-041\n",
        "  packfill catalog --catalog stock.toml\n",
        "  packfill config --config-file ops/packfill.toml"
    )
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Allocate products and delivery against a target amount")]
    Allocate(commands::allocate::AllocateArgs),
    #[command(about = "Draft an invoice from a VAT-inclusive payment amount")]
    Invoice(commands::invoice::InvoiceArgs),
    #[command(about = "Validate the product catalog and summarize its contents")]
    Catalog {
        #[arg(long, help = "Catalog file (.toml or .json); overrides catalog.path")]
        catalog: Option<PathBuf>,
        #[arg(long, help = "Config file to load instead of packfill.toml; must exist")]
        config_file: Option<PathBuf>,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config {
        #[arg(long, help = "Config file to load instead of packfill.toml; must exist")]
        config_file: Option<PathBuf>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Allocate(args) => commands::allocate::run(args),
        Command::Invoice(args) => commands::invoice::run(args),
        Command::Catalog { catalog, config_file } => commands::catalog::run(catalog, config_file),
        Command::Config { config_file } => commands::config::run(config_file),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
