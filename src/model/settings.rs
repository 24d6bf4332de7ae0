use crate::model::asset::Asset;
use serde::{Deserialize, Serialize};

/// Policy toggles for one accounting run.
///
/// Read once at the start of `process_history` so the same settings apply to
/// the entire pass.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AccountingSettings {
    /// The single currency all profit/loss figures are expressed in.
    pub reporting_currency: Asset,

    /// When off, trades between two non-reporting-currency assets still build
    /// cost basis but their gains stay out of the taxable total.
    pub include_crypto2crypto: bool,

    /// Seconds after acquisition beyond which a disposal's gain is tax-free.
    /// `None` means every disposal is taxable regardless of holding period.
    pub taxfree_after_period: Option<i64>,

    /// When off, deposit/withdrawal fees are not accounted.
    pub account_for_movements: bool,

    /// When off, on-chain gas costs are not accounted.
    pub include_gas_costs: bool,
}

impl Default for AccountingSettings {
    fn default() -> Self {
        Self {
            reporting_currency: Asset::from("EUR"),
            include_crypto2crypto: true,
            taxfree_after_period: None,
            account_for_movements: true,
            include_gas_costs: true,
        }
    }
}
