//! Catalog API client and payload types.

mod client;
mod types;

pub use client::{CatalogClient, CatalogSource};
pub use types::{
    CatalogCreator, CatalogImage, CatalogModel, CatalogVersion, Fetched, LookupOutcome,
};
