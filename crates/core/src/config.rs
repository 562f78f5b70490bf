use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cpq::allocator::AllocatorSettings;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub catalog: CatalogConfig,
    pub allocator: AllocatorSettings,
    pub invoice: InvoiceConfig,
    pub random: RandomConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct CatalogConfig {
    pub path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct InvoiceConfig {
    pub vat_rate: Decimal,
    pub currency_symbol: String,
}

#[derive(Clone, Debug, Default)]
pub struct RandomConfig {
    /// Fixed seed for reproducible allocations; entropy-seeded when unset.
    pub seed: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub catalog_path: Option<PathBuf>,
    pub log_level: Option<String>,
    pub random_seed: Option<u64>,
    pub vat_rate: Option<Decimal>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            catalog: CatalogConfig { path: PathBuf::from("catalog.toml") },
            allocator: AllocatorSettings::default(),
            invoice: InvoiceConfig {
                vat_rate: Decimal::new(20, 2),
                currency_symbol: "£".to_string(),
            },
            random: RandomConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("packfill.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(catalog) = patch.catalog {
            if let Some(path) = catalog.path {
                self.catalog.path = path;
            }
        }

        if let Some(allocator) = patch.allocator {
            if let Some(value) = allocator.min_seed_products {
                self.allocator.min_seed_products = value;
            }
            if let Some(value) = allocator.max_seed_products {
                self.allocator.max_seed_products = value;
            }
            if let Some(value) = allocator.seed_pack_quantity {
                self.allocator.seed_pack_quantity = value;
            }
            if let Some(value) = allocator.units_per_pack {
                self.allocator.units_per_pack = value;
            }
            if let Some(value) = allocator.quantity_step {
                self.allocator.quantity_step = value;
            }
            if let Some(value) = allocator.max_pack_quantity {
                self.allocator.max_pack_quantity = value;
            }
            if let Some(value) = allocator.delivery_cap {
                self.allocator.delivery_cap = value;
            }
        }

        if let Some(invoice) = patch.invoice {
            if let Some(vat_rate) = invoice.vat_rate {
                self.invoice.vat_rate = vat_rate;
            }
            if let Some(currency_symbol) = invoice.currency_symbol {
                self.invoice.currency_symbol = currency_symbol;
            }
        }

        if let Some(random) = patch.random {
            if let Some(seed) = random.seed {
                self.random.seed = Some(seed);
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("PACKFILL_CATALOG_PATH") {
            self.catalog.path = PathBuf::from(value);
        }

        if let Some(value) = read_env("PACKFILL_ALLOCATOR_MIN_SEED_PRODUCTS") {
            self.allocator.min_seed_products =
                parse_u32("PACKFILL_ALLOCATOR_MIN_SEED_PRODUCTS", &value)?;
        }
        if let Some(value) = read_env("PACKFILL_ALLOCATOR_MAX_SEED_PRODUCTS") {
            self.allocator.max_seed_products =
                parse_u32("PACKFILL_ALLOCATOR_MAX_SEED_PRODUCTS", &value)?;
        }
        if let Some(value) = read_env("PACKFILL_ALLOCATOR_SEED_PACK_QUANTITY") {
            self.allocator.seed_pack_quantity =
                parse_u32("PACKFILL_ALLOCATOR_SEED_PACK_QUANTITY", &value)?;
        }
        if let Some(value) = read_env("PACKFILL_ALLOCATOR_UNITS_PER_PACK") {
            self.allocator.units_per_pack =
                parse_u32("PACKFILL_ALLOCATOR_UNITS_PER_PACK", &value)?;
        }
        if let Some(value) = read_env("PACKFILL_ALLOCATOR_QUANTITY_STEP") {
            self.allocator.quantity_step = parse_u32("PACKFILL_ALLOCATOR_QUANTITY_STEP", &value)?;
        }
        if let Some(value) = read_env("PACKFILL_ALLOCATOR_MAX_PACK_QUANTITY") {
            self.allocator.max_pack_quantity =
                parse_u32("PACKFILL_ALLOCATOR_MAX_PACK_QUANTITY", &value)?;
        }
        if let Some(value) = read_env("PACKFILL_ALLOCATOR_DELIVERY_CAP") {
            self.allocator.delivery_cap = parse_decimal("PACKFILL_ALLOCATOR_DELIVERY_CAP", &value)?;
        }

        if let Some(value) = read_env("PACKFILL_INVOICE_VAT_RATE") {
            self.invoice.vat_rate = parse_decimal("PACKFILL_INVOICE_VAT_RATE", &value)?;
        }
        if let Some(value) = read_env("PACKFILL_INVOICE_CURRENCY_SYMBOL") {
            self.invoice.currency_symbol = value;
        }

        if let Some(value) = read_env("PACKFILL_RANDOM_SEED") {
            self.random.seed = Some(parse_u64("PACKFILL_RANDOM_SEED", &value)?);
        }

        let log_level =
            read_env("PACKFILL_LOGGING_LEVEL").or_else(|| read_env("PACKFILL_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PACKFILL_LOGGING_FORMAT").or_else(|| read_env("PACKFILL_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(catalog_path) = overrides.catalog_path {
            self.catalog.path = catalog_path;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(seed) = overrides.random_seed {
            self.random.seed = Some(seed);
        }
        if let Some(vat_rate) = overrides.vat_rate {
            self.invoice.vat_rate = vat_rate;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_catalog(&self.catalog)?;
        self.allocator
            .validate()
            .map_err(|error| ConfigError::Validation(format!("allocator: {error}")))?;
        validate_invoice(&self.invoice)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("packfill.toml"), PathBuf::from("config/packfill.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_catalog(catalog: &CatalogConfig) -> Result<(), ConfigError> {
    if catalog.path.as_os_str().is_empty() {
        return Err(ConfigError::Validation("catalog.path must not be empty".to_string()));
    }
    Ok(())
}

fn validate_invoice(invoice: &InvoiceConfig) -> Result<(), ConfigError> {
    if invoice.vat_rate < Decimal::ZERO || invoice.vat_rate >= Decimal::ONE {
        return Err(ConfigError::Validation(
            "invoice.vat_rate must be a fraction in range 0..1 (e.g. 0.20)".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.trim().parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_decimal(key: &str, value: &str) -> Result<Decimal, ConfigError> {
    value.trim().parse::<Decimal>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    catalog: Option<CatalogPatch>,
    allocator: Option<AllocatorPatch>,
    invoice: Option<InvoicePatch>,
    random: Option<RandomPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogPatch {
    path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct AllocatorPatch {
    min_seed_products: Option<u32>,
    max_seed_products: Option<u32>,
    seed_pack_quantity: Option<u32>,
    units_per_pack: Option<u32>,
    quantity_step: Option<u32>,
    max_pack_quantity: Option<u32>,
    delivery_cap: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
struct InvoicePatch {
    vat_rate: Option<Decimal>,
    currency_symbol: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RandomPatch {
    seed: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
