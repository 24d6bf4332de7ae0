use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::{self, Display};
use thiserror::Error;

/// An asset symbol, e.g. `"BTC"` or `"EUR"`.
///
/// Symbols are kept verbatim from the input history. Whether a symbol is
/// actually known to the accounting run is decided by the [`AssetRegistry`],
/// not by this type.
#[derive(Clone, Debug, Default, Deserialize, Serialize, Eq, Hash, PartialEq)]
#[serde(transparent)]
pub struct Asset(String);

impl Asset {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    pub fn symbol(&self) -> &str {
        &self.0
    }

    /// Native currency burned as gas by Ethereum transactions.
    pub fn eth() -> Self {
        Self("ETH".to_string())
    }

    /// Loan-settlement currency. Settlement buys are economically disposals
    /// of this asset.
    pub fn btc() -> Self {
        Self("BTC".to_string())
    }

    /// Exchange-internal fee token. Movements of this asset carry no value
    /// outside the exchange and are never accounted.
    pub fn kfee() -> Self {
        Self("KFEE".to_string())
    }
}

impl Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Asset {
    fn from(symbol: &str) -> Self {
        Self(symbol.to_string())
    }
}

/// Asset resolution failures. All three are per-action recoverable: the
/// engine reports them and skips the action.
#[cfg_attr(test, derive(Eq, PartialEq))]
#[derive(Debug, Error)]
pub enum AssetResolveError {
    #[error("Unknown asset {0}")]
    Unknown(Asset),

    #[error("Unsupported asset {0}")]
    Unsupported(Asset),

    #[error("Malformed asset symbol {0:?}")]
    Malformed(String),
}

/// Decides which asset symbols an accounting run accepts.
///
/// Resolution runs before the ignored-assets check, so a malformed or unknown
/// symbol is reported even when the user would have ignored it.
#[derive(Clone, Debug, Default)]
pub struct AssetRegistry {
    known: HashSet<Asset>,
    unsupported: HashSet<Asset>,
}

impl AssetRegistry {
    pub fn new(known: impl IntoIterator<Item = Asset>) -> Self {
        Self {
            known: known.into_iter().collect(),
            unsupported: HashSet::new(),
        }
    }

    /// Mark a symbol as recognized but not priceable by any oracle.
    pub fn mark_unsupported(&mut self, asset: Asset) {
        self.unsupported.insert(asset);
    }

    pub fn insert(&mut self, asset: Asset) {
        self.known.insert(asset);
    }

    pub fn resolve(&self, symbol: &str) -> Result<Asset, AssetResolveError> {
        if symbol.is_empty() || !symbol.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(AssetResolveError::Malformed(symbol.to_string()));
        }

        let asset = Asset::from(symbol);
        if self.unsupported.contains(&asset) {
            Err(AssetResolveError::Unsupported(asset))
        } else if self.known.contains(&asset) {
            Ok(asset)
        } else {
            Err(AssetResolveError::Unknown(asset))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> AssetRegistry {
        let mut registry = AssetRegistry::new([Asset::btc(), Asset::eth(), Asset::from("EUR")]);
        registry.mark_unsupported(Asset::from("DASH"));
        registry
    }

    #[test]
    fn resolves_known_symbols() {
        assert_eq!(registry().resolve("BTC"), Ok(Asset::btc()));
    }

    #[test]
    fn rejects_unknown_symbols() {
        assert_eq!(
            registry().resolve("NOPE"),
            Err(AssetResolveError::Unknown(Asset::from("NOPE")))
        );
    }

    #[test]
    fn rejects_unsupported_symbols() {
        assert_eq!(
            registry().resolve("DASH"),
            Err(AssetResolveError::Unsupported(Asset::from("DASH")))
        );
    }

    #[test]
    fn rejects_malformed_symbols() {
        assert_eq!(
            registry().resolve(""),
            Err(AssetResolveError::Malformed(String::new()))
        );
        assert_eq!(
            registry().resolve("B/TC"),
            Err(AssetResolveError::Malformed("B/TC".to_string()))
        );
    }
}
