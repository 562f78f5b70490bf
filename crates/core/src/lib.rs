pub mod config;
pub mod cpq;
pub mod domain;
pub mod errors;
pub mod invoice;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};
pub use cpq::allocator::{AllocationError, Allocator, AllocatorSettings};
pub use cpq::catalog::{Catalog, CatalogError};
pub use cpq::resolver::{parse_product_hints, NameResolver, SimilarityResolver};
pub use domain::allocation::{Allocation, LineItem};
pub use domain::product::{Product, ProductId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use invoice::{InvoiceDraft, InvoiceError, InvoiceRequest, VatSplit};
