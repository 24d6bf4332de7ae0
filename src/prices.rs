use crate::model::asset::Asset;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use thiserror::Error;
use tracing::warn;

/// Historical price lookup failures.
///
/// All three are per-action recoverable from the engine's point of view: the
/// offending action is reported and skipped, the run continues.
#[cfg_attr(test, derive(Eq, PartialEq))]
#[derive(Debug, Error)]
pub enum PriceError {
    #[error("No price oracle supports {0}")]
    UnsupportedAsset(Asset),

    #[error("No {0} price found for {1}")]
    NoPriceForTimestamp(Asset, DateTime<Utc>),

    #[error("Price service unreachable: {0}")]
    RemoteError(String),
}

/// Resolves a historical conversion rate between two assets.
///
/// Implementations decide their own lookup tolerance; there is no retry or
/// timeout at this level.
pub trait PriceResolver {
    fn rate(&self, from: &Asset, to: &Asset, at: DateTime<Utc>) -> Result<Decimal, PriceError>;
}

#[derive(Debug, Error)]
pub enum HistoricalPricesError {
    #[error("CSV parsing error")]
    Csv(#[from] csv::Error),

    #[error("Lookback window must be at least one second")]
    InvalidLookback,
}

type QuoteMap = BTreeMap<i64, Decimal>;

#[derive(Debug, Deserialize)]
struct PriceRecord {
    base: String,
    quote: String,
    timestamp: i64,
    rate: Decimal,
}

/// In-memory price table keyed by asset pair and unix timestamp.
///
/// A query at time T matches the most recent quote at or before T within the
/// lookback window, so daily quote tables answer intra-day queries. A pair
/// with no table at all is unsupported; a pair with a table but no quote near
/// T has no price for that timestamp.
#[derive(Debug)]
pub struct HistoricalPrices {
    /// Seconds of history searched backwards from the query time, minus 1
    /// second so the lower bound stays exclusive of the previous bucket.
    lookback: i64,

    pairs: HashMap<(Asset, Asset), QuoteMap>,
}

pub const ONE_DAY: i64 = 60 * 60 * 24;

impl Default for HistoricalPrices {
    fn default() -> Self {
        Self {
            lookback: ONE_DAY - 1,
            pairs: HashMap::new(),
        }
    }
}

impl HistoricalPrices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lookback(lookback: i64) -> Result<Self, HistoricalPricesError> {
        if lookback < 1 {
            return Err(HistoricalPricesError::InvalidLookback);
        }

        Ok(Self {
            lookback: lookback - 1,
            pairs: HashMap::new(),
        })
    }

    pub fn insert(&mut self, base: Asset, quote: Asset, timestamp: i64, rate: Decimal) {
        self.pairs
            .entry((base, quote))
            .or_default()
            .insert(timestamp, rate);
    }

    /// Load quotes from a CSV of `base,quote,timestamp,rate` rows.
    pub fn read_csv<R: Read>(&mut self, reader: R) -> Result<(), HistoricalPricesError> {
        let mut rdr = csv::Reader::from_reader(reader);
        let mut count = 0_usize;
        for record in rdr.deserialize::<PriceRecord>() {
            let record = record?;
            self.insert(
                Asset::new(record.base),
                Asset::new(record.quote),
                record.timestamp,
                record.rate,
            );
            count += 1;
        }

        if count == 0 {
            warn!("Price CSV contained no quotes");
        }

        Ok(())
    }

    /// Every asset appearing on either side of a loaded pair. Useful for
    /// seeding an asset registry from the price table.
    pub fn known_assets(&self) -> impl Iterator<Item = &Asset> {
        self.pairs
            .keys()
            .flat_map(|(base, quote)| [base, quote])
    }

    fn lookup(&self, base: &Asset, quote: &Asset, at: DateTime<Utc>) -> Option<Option<Decimal>> {
        let map = self.pairs.get(&(base.clone(), quote.clone()))?;
        let end = at.timestamp();
        let start = end - self.lookback;

        Some(map.range(start..=end).next_back().map(|(_k, v)| *v))
    }
}

impl PriceResolver for HistoricalPrices {
    fn rate(&self, from: &Asset, to: &Asset, at: DateTime<Utc>) -> Result<Decimal, PriceError> {
        if from == to {
            return Ok(Decimal::ONE);
        }

        // Direct pair first, then the inverse.
        if let Some(found) = self.lookup(from, to, at) {
            return found.ok_or_else(|| PriceError::NoPriceForTimestamp(from.clone(), at));
        }
        if let Some(found) = self.lookup(to, from, at) {
            let rate = found.ok_or_else(|| PriceError::NoPriceForTimestamp(from.clone(), at))?;
            return Ok(Decimal::ONE / rate);
        }

        Err(PriceError::UnsupportedAsset(from.clone()))
    }
}
