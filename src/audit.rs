use crate::model::asset::Asset;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::io::Write;

/// What an audit record accounts for.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, Eq, PartialEq)]
pub enum AuditCategory {
    Buy,
    Sell,
    SettlementSell,
    LoanGain,
    MarginPosition,
    MovementFee,
    GasCost,
    DefiEvent,
}

impl AuditCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditCategory::Buy => "buy",
            AuditCategory::Sell => "sell",
            AuditCategory::SettlementSell => "settlement_sell",
            AuditCategory::LoanGain => "loan_gain",
            AuditCategory::MarginPosition => "margin_position",
            AuditCategory::MovementFee => "movement_fee",
            AuditCategory::GasCost => "gas_cost",
            AuditCategory::DefiEvent => "defi_event",
        }
    }
}

impl Display for AuditCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One accounted (non-skipped) action.
///
/// `rate` and `gain_or_loss` are reporting-currency denominated; `amount` is
/// in units of `asset`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AuditRecord {
    pub category: AuditCategory,
    pub location: String,
    pub asset: Asset,
    pub amount: Decimal,
    pub rate: Decimal,
    pub fee: Decimal,
    pub gain_or_loss: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Ordered log of every accounted action in a run.
///
/// The report embeds these records; totals in the report overview reconcile
/// exactly against them.
#[derive(Debug, Default)]
pub struct AuditTrail {
    records: Vec<AuditRecord>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard all records. Called at the start of every run.
    pub fn reset(&mut self) {
        self.records.clear();
    }

    pub fn record(&mut self, record: AuditRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[AuditRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<AuditRecord> {
        self.records
    }

    /// Serialize all records as CSV.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut wtr = csv::Writer::from_writer(writer);
        for record in &self.records {
            wtr.serialize(record)?;
        }
        wtr.flush()?;

        Ok(())
    }
}
