//! Catalog data model.

mod exercise;

pub use exercise::*;
