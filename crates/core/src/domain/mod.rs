pub mod allocation;
pub mod product;
