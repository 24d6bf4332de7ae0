use crate::audit::AuditRecord;
use rust_decimal::Decimal;
use serde::Serialize;

/// Per-category profit/loss totals, stringified for lossless export.
#[derive(Clone, Debug, Serialize)]
pub struct Overview {
    pub loan_profit: String,
    pub defi_profit_loss: String,
    pub margin_positions_profit_loss: String,
    pub settlement_losses: String,
    pub ethereum_transaction_gas_costs: String,
    pub asset_movement_fees: String,
    pub general_trade_profit_loss: String,
    pub taxable_trade_profit_loss: String,
    pub total_taxable_profit_loss: String,
    pub total_profit_loss: String,
}

/// The result of one `process_history` run: the category overview plus the
/// full ordered audit trail it reconciles against.
#[derive(Clone, Debug, Serialize)]
pub struct ProfitLossReport {
    pub overview: Overview,
    pub all_events: Vec<AuditRecord>,
}

/// Raw decimal totals, summed by the engine before stringification.
#[derive(Clone, Copy, Debug, Default)]
pub struct Totals {
    pub loan_profit: Decimal,
    pub defi_pl: Decimal,
    pub margin_pl: Decimal,
    pub settlement_losses: Decimal,
    pub gas_costs: Decimal,
    pub movement_fees: Decimal,
    pub general_trade_pl: Decimal,
    pub taxable_trade_pl: Decimal,
}

impl Totals {
    /// Shared non-trade term of both grand totals.
    fn sum_other_actions(&self) -> Decimal {
        self.margin_pl + self.defi_pl + self.loan_profit
            - self.settlement_losses
            - self.movement_fees
            - self.gas_costs
    }

    pub fn total_taxable_pl(&self) -> Decimal {
        self.taxable_trade_pl + self.sum_other_actions()
    }

    pub fn total_pl(&self) -> Decimal {
        self.general_trade_pl + self.sum_other_actions()
    }
}

impl From<&Totals> for Overview {
    fn from(totals: &Totals) -> Self {
        Self {
            loan_profit: totals.loan_profit.to_string(),
            defi_profit_loss: totals.defi_pl.to_string(),
            margin_positions_profit_loss: totals.margin_pl.to_string(),
            settlement_losses: totals.settlement_losses.to_string(),
            ethereum_transaction_gas_costs: totals.gas_costs.to_string(),
            asset_movement_fees: totals.movement_fees.to_string(),
            general_trade_profit_loss: totals.general_trade_pl.to_string(),
            taxable_trade_profit_loss: totals.taxable_trade_pl.to_string(),
            total_taxable_profit_loss: totals.total_taxable_pl().to_string(),
            total_profit_loss: totals.total_pl().to_string(),
        }
    }
}
