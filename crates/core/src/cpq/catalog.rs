use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::product::{Product, ProductId};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("could not read catalog file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("unsupported catalog format `{extension}` (expected toml|json)")]
    UnsupportedFormat { extension: String },
    #[error("malformed catalog: {0}")]
    Malformed(String),
    #[error("duplicate catalog product `{0}`")]
    DuplicateProduct(ProductId),
    #[error("product `{product}` has non-monotonic price tiers: {detail}")]
    NonMonotonicTiers { product: ProductId, detail: String },
}

/// Read-only product table. Built once per allocation request and shared by
/// reference; entries are unique by `(name, variant)`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Catalog {
    products: Vec<Product>,
}

impl Catalog {
    pub fn new(products: Vec<Product>) -> Result<Self, CatalogError> {
        let mut seen = HashSet::with_capacity(products.len());
        for product in &products {
            validate_product(product)?;
            if !seen.insert(&product.id) {
                return Err(CatalogError::DuplicateProduct(product.id.clone()));
            }
        }

        Ok(Self { products })
    }

    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let extension = path
            .extension()
            .and_then(|extension| extension.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        let raw = match extension.as_str() {
            "toml" | "json" => fs::read_to_string(path)
                .map_err(|source| CatalogError::ReadFile { path: path.to_path_buf(), source })?,
            _ => return Err(CatalogError::UnsupportedFormat { extension }),
        };

        let catalog = if extension == "toml" {
            Self::from_toml_str(&raw)?
        } else {
            Self::from_json_str(&raw)?
        };

        debug!(
            event_name = "catalog.loaded",
            path = %path.display(),
            products = catalog.len(),
            distinct_names = catalog.distinct_names().len(),
            "catalog loaded"
        );
        Ok(catalog)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, CatalogError> {
        let document = toml::from_str::<CatalogDocument>(raw)
            .map_err(|error| CatalogError::Malformed(error.message().to_string()))?;
        document.into_catalog()
    }

    pub fn from_json_str(raw: &str) -> Result<Self, CatalogError> {
        let document = serde_json::from_str::<CatalogDocument>(raw)
            .map_err(|error| CatalogError::Malformed(error.to_string()))?;
        document.into_catalog()
    }

    pub fn products(&self) -> &[Product] {
        &self.products
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Distinct product names in first-seen order.
    pub fn distinct_names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.products
            .iter()
            .map(Product::name)
            .filter(|name| seen.insert(*name))
            .collect()
    }

    /// Every variant of every product whose name is in `names`.
    pub fn filter_by_names(&self, names: &[String]) -> Vec<&Product> {
        self.products
            .iter()
            .filter(|product| names.iter().any(|name| name == product.name()))
            .collect()
    }
}

fn validate_product(product: &Product) -> Result<(), CatalogError> {
    if product.id.name.trim().is_empty() {
        return Err(CatalogError::Malformed("product name must not be empty".to_string()));
    }
    if product.base_price <= Decimal::ZERO {
        return Err(CatalogError::Malformed(format!(
            "product `{}` must have a positive price",
            product.id
        )));
    }
    if product.tiers.contains_key(&0) {
        return Err(CatalogError::Malformed(format!(
            "product `{}` has a tier at quantity 0",
            product.id
        )));
    }
    if let Some((quantity, _)) = product.tiers.iter().find(|(_, price)| **price <= Decimal::ZERO) {
        return Err(CatalogError::Malformed(format!(
            "product `{}` has a non-positive price at tier {quantity}",
            product.id
        )));
    }
    if let Some((quantity, below, price)) = product.first_price_increase() {
        return Err(CatalogError::NonMonotonicTiers {
            product: product.id.clone(),
            detail: format!("tier {quantity} costs {price}, more than {below} below it"),
        });
    }

    Ok(())
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    products: Vec<ProductRecord>,
}

#[derive(Debug, Deserialize)]
struct ProductRecord {
    name: String,
    #[serde(alias = "flavour", alias = "flavor")]
    variant: String,
    price: Decimal,
    #[serde(default)]
    tiers: BTreeMap<String, Decimal>,
}

impl CatalogDocument {
    fn into_catalog(self) -> Result<Catalog, CatalogError> {
        let products =
            self.products.into_iter().map(ProductRecord::into_product).collect::<Result<_, _>>()?;
        Catalog::new(products)
    }
}

impl ProductRecord {
    fn into_product(self) -> Result<Product, CatalogError> {
        let mut product = Product::new(self.name.trim(), self.variant.trim(), self.price);
        for (key, price) in self.tiers {
            let quantity = key.trim().parse::<u32>().map_err(|_| {
                CatalogError::Malformed(format!(
                    "product `{}` has a non-numeric tier key `{key}`",
                    product.id
                ))
            })?;
            product = product.with_tier(quantity, price);
        }
        Ok(product)
    }
}
