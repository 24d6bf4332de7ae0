//! Flat re-export surface for every error type in the crate.

pub use crate::model::asset::AssetResolveError;
pub use crate::prices::{HistoricalPricesError, PriceError};
