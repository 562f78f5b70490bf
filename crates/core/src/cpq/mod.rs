//! Catalog pricing and quantity allocation.
//!
//! `catalog` loads and validates the product table, `pricing` answers tier
//! lookups, `resolver` maps free-text hints onto catalog names, and
//! `allocator` fills a target amount with line items built from all three.

pub mod allocator;
pub mod catalog;
pub mod pricing;
pub mod resolver;
