use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use packfill_core::config::{AppConfig, LoadOptions};
use packfill_core::errors::ApplicationError;
use toml::Value;

use crate::commands::CommandResult;

const COMMAND: &str = "config";

pub fn run(config_file: Option<PathBuf>) -> CommandResult {
    let options = LoadOptions {
        config_path: config_file.clone(),
        require_file: config_file.is_some(),
        ..LoadOptions::default()
    };
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            let error = ApplicationError::from(error).into_interface(COMMAND);
            return CommandResult::from_interface(COMMAND, &error);
        }
    };

    let config_file_path = config_file.or_else(detect_config_path);
    let (config_file_doc, file_note) = match load_config_file_doc(config_file_path.as_deref()) {
        Ok(doc) => (doc, None),
        Err(error) => (None, Some(format!("note: {error:#}"))),
    };

    let allocator = &config.allocator;
    let seed = config.random.seed.map(|seed| seed.to_string());
    let fields = vec![
        field("catalog.path", config.catalog.path.display(), &["PACKFILL_CATALOG_PATH"]),
        field(
            "allocator.min_seed_products",
            allocator.min_seed_products,
            &["PACKFILL_ALLOCATOR_MIN_SEED_PRODUCTS"],
        ),
        field(
            "allocator.max_seed_products",
            allocator.max_seed_products,
            &["PACKFILL_ALLOCATOR_MAX_SEED_PRODUCTS"],
        ),
        field(
            "allocator.seed_pack_quantity",
            allocator.seed_pack_quantity,
            &["PACKFILL_ALLOCATOR_SEED_PACK_QUANTITY"],
        ),
        field(
            "allocator.units_per_pack",
            allocator.units_per_pack,
            &["PACKFILL_ALLOCATOR_UNITS_PER_PACK"],
        ),
        field(
            "allocator.quantity_step",
            allocator.quantity_step,
            &["PACKFILL_ALLOCATOR_QUANTITY_STEP"],
        ),
        field(
            "allocator.max_pack_quantity",
            allocator.max_pack_quantity,
            &["PACKFILL_ALLOCATOR_MAX_PACK_QUANTITY"],
        ),
        field(
            "allocator.delivery_cap",
            allocator.delivery_cap,
            &["PACKFILL_ALLOCATOR_DELIVERY_CAP"],
        ),
        field("invoice.vat_rate", config.invoice.vat_rate, &["PACKFILL_INVOICE_VAT_RATE"]),
        field(
            "invoice.currency_symbol",
            &config.invoice.currency_symbol,
            &["PACKFILL_INVOICE_CURRENCY_SYMBOL"],
        ),
        field("random.seed", seed.as_deref().unwrap_or("<unset>"), &["PACKFILL_RANDOM_SEED"]),
        field(
            "logging.level",
            &config.logging.level,
            &["PACKFILL_LOGGING_LEVEL", "PACKFILL_LOG_LEVEL"],
        ),
        field(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["PACKFILL_LOGGING_FORMAT", "PACKFILL_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields {
        let source = field_source(
            field.key_path,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key_path, &field.value, source));
    }
    lines.extend(file_note);

    CommandResult::success(COMMAND, lines.join("\n"))
}

struct Field {
    key_path: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

fn field(
    key_path: &'static str,
    value: impl std::fmt::Display,
    env_keys: &'static [&'static str],
) -> Field {
    Field { key_path, value: value.to_string(), env_keys }
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("packfill.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/packfill.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> anyhow::Result<Option<Value>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("could not read `{}` for source attribution", path.display()))?;
    let doc = raw
        .parse::<Value>()
        .with_context(|| format!("could not parse `{}` for source attribution", path.display()))?;
    Ok(Some(doc))
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
