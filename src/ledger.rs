use crate::messages::MessagesAggregator;
use crate::model::asset::Asset;
use crate::model::settings::AccountingSettings;
use crate::util::fifo::Fifo;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::debug;

/// A quantity of an asset acquired at a known rate and time, held until
/// consumed by a later disposal.
///
/// `rate` and `fee_rate` are reporting-currency per unit. After partial
/// consumption only `amount` changes.
#[derive(Clone, Debug, PartialEq)]
pub struct Lot {
    pub amount: Decimal,
    pub rate: Decimal,
    pub fee_rate: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Outcome of one disposal, for audit recording by the caller.
///
/// `profit_loss` is the general (pre-policy) realized figure; zero when the
/// disposal predates the taxed window and therefore counted toward no total.
#[derive(Clone, Copy, Debug, Default)]
pub struct Disposal {
    pub proceeds: Decimal,
    pub cost_basis: Decimal,
    pub profit_loss: Decimal,
}

/// Per-asset FIFO cost-basis ledger with running per-category totals.
///
/// The caller must feed actions in ascending timestamp order; lots are queued
/// in insertion order and disposals consume the oldest lots first. Nothing is
/// persisted across runs; [`reset`] rebuilds from scratch.
///
/// [`reset`]: Ledger::reset
#[derive(Debug, Default)]
pub struct Ledger {
    reporting_currency: Asset,
    include_crypto2crypto: bool,
    taxfree_after_period: Option<i64>,
    start_ts: DateTime<Utc>,

    lots: HashMap<Asset, Fifo<Lot>>,

    general_trade_pl: Decimal,
    taxable_trade_pl: Decimal,
    loan_profit: Decimal,
    margin_pl: Decimal,
    defi_pl: Decimal,
    settlement_losses: Decimal,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all state and apply this run's policy. Must be called before the
    /// first action of every run.
    pub fn reset(&mut self, settings: &AccountingSettings, start_ts: DateTime<Utc>) {
        self.reporting_currency = settings.reporting_currency.clone();
        self.include_crypto2crypto = settings.include_crypto2crypto;
        self.taxfree_after_period = settings.taxfree_after_period;
        self.start_ts = start_ts;
        self.lots.clear();
        self.general_trade_pl = Decimal::ZERO;
        self.taxable_trade_pl = Decimal::ZERO;
        self.loan_profit = Decimal::ZERO;
        self.margin_pl = Decimal::ZERO;
        self.defi_pl = Decimal::ZERO;
        self.settlement_losses = Decimal::ZERO;
    }

    pub fn general_trade_pl(&self) -> Decimal {
        self.general_trade_pl
    }

    pub fn taxable_trade_pl(&self) -> Decimal {
        self.taxable_trade_pl
    }

    pub fn loan_profit(&self) -> Decimal {
        self.loan_profit
    }

    pub fn margin_pl(&self) -> Decimal {
        self.margin_pl
    }

    pub fn defi_pl(&self) -> Decimal {
        self.defi_pl
    }

    pub fn settlement_losses(&self) -> Decimal {
        self.settlement_losses
    }

    /// Amount of `asset` the ledger says should be held after processing, or
    /// `None` if the asset never had a buy lot.
    pub fn calculated_asset_amount(&self, asset: &Asset) -> Option<Decimal> {
        self.lots
            .get(asset)
            .map(|lots| lots.iter().map(|lot| lot.amount).sum())
    }

    /// Queue a buy lot. `rate` and `fee_rate` are reporting-currency per unit
    /// at acquisition time.
    pub fn add_buy(
        &mut self,
        asset: &Asset,
        amount: Decimal,
        rate: Decimal,
        fee_rate: Decimal,
        timestamp: DateTime<Utc>,
    ) {
        debug!(%asset, %amount, %rate, "Adding buy lot");
        self.lots.entry(asset.clone()).or_default().push_back(Lot {
            amount,
            rate,
            fee_rate,
            timestamp,
        });
    }

    /// Account a BUY trade: a lot for the bought asset and, unless paying
    /// with the reporting currency itself, a simultaneous FIFO disposal of
    /// the asset paid with.
    ///
    /// `paid_with_rate` is the paid-with asset's reporting-currency rate at
    /// the trade timestamp; the bought asset's lot rate derives from it.
    #[allow(clippy::too_many_arguments)]
    pub fn add_buy_and_corresponding_sell(
        &mut self,
        msgs: &mut MessagesAggregator,
        bought_asset: &Asset,
        bought_amount: Decimal,
        paid_with_asset: &Asset,
        paid_with_rate: Decimal,
        trade_rate: Decimal,
        fee_in_reporting: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Disposal {
        let buy_rate = paid_with_rate * trade_rate;
        let fee_rate = if bought_amount.is_zero() {
            Decimal::ZERO
        } else {
            fee_in_reporting / bought_amount
        };
        self.add_buy(bought_asset, bought_amount, buy_rate, fee_rate, timestamp);

        if *paid_with_asset == self.reporting_currency {
            return Disposal::default();
        }

        // A buy is internally also a disposal of the quote asset, realized
        // through the same FIFO mechanism as an explicit sell.
        let sold_amount = bought_amount * trade_rate;
        self.dispose(
            msgs,
            paid_with_asset,
            sold_amount,
            paid_with_rate,
            Decimal::ZERO,
            timestamp,
            Some(bought_asset),
        )
    }

    /// Account a plain SELL trade: FIFO disposal of the sold asset and,
    /// unless receiving the reporting currency itself, a lot for the asset
    /// received.
    #[allow(clippy::too_many_arguments)]
    pub fn add_sell_and_corresponding_buy(
        &mut self,
        msgs: &mut MessagesAggregator,
        sold_asset: &Asset,
        sold_amount: Decimal,
        sold_rate: Decimal,
        receiving_asset: &Asset,
        receiving_rate: Decimal,
        trade_rate: Decimal,
        fee_in_reporting: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Disposal {
        let disposal = self.dispose(
            msgs,
            sold_asset,
            sold_amount,
            sold_rate,
            fee_in_reporting,
            timestamp,
            Some(receiving_asset),
        );

        if *receiving_asset != self.reporting_currency {
            let received_amount = sold_amount * trade_rate;
            self.add_buy(
                receiving_asset,
                received_amount,
                receiving_rate,
                Decimal::ZERO,
                timestamp,
            );
        }

        disposal
    }

    /// Account a settlement disposal: lots are consumed but the proceeds
    /// repay a loan, so no asset is acquired and the result lands in the
    /// settlement category instead of the trade totals.
    pub fn add_settlement_sell(
        &mut self,
        msgs: &mut MessagesAggregator,
        sold_asset: &Asset,
        sold_amount: Decimal,
        sold_rate: Decimal,
        fee_in_reporting: Decimal,
        timestamp: DateTime<Utc>,
    ) -> Disposal {
        let matched = self.consume_lots(msgs, sold_asset, sold_amount, sold_rate, timestamp);
        if timestamp < self.start_ts {
            return Disposal::default();
        }

        let profit_loss = matched.proceeds - matched.cost_basis - fee_in_reporting;
        self.settlement_losses += -profit_loss;
        debug!(
            %sold_asset,
            %sold_amount,
            %profit_loss,
            "Accounting for loan settlement disposal"
        );

        Disposal {
            proceeds: matched.proceeds,
            cost_basis: matched.cost_basis,
            profit_loss,
        }
    }

    /// Account a closed loan. `rate_at_close` is the loan currency's
    /// reporting-currency rate at close time. Does not touch FIFO lots.
    pub fn add_loan_gain(
        &mut self,
        currency: &Asset,
        gained_amount: Decimal,
        fee: Decimal,
        rate_at_close: Decimal,
        close_time: DateTime<Utc>,
    ) -> Decimal {
        if close_time < self.start_ts {
            return Decimal::ZERO;
        }

        let profit = (gained_amount - fee) * rate_at_close;
        self.loan_profit += profit;
        debug!(%currency, %gained_amount, %profit, "Accounting for loan gain");

        profit
    }

    /// Accumulate a pre-computed margin position profit/loss.
    pub fn add_margin_position(&mut self, profit_loss: Decimal, close_time: DateTime<Utc>) -> bool {
        if close_time < self.start_ts {
            return false;
        }

        self.margin_pl += profit_loss;
        true
    }

    /// Accumulate a pre-computed DeFi event profit/loss.
    pub fn add_defi_event(&mut self, profit_loss: Decimal, timestamp: DateTime<Utc>) -> bool {
        if timestamp < self.start_ts {
            return false;
        }

        self.defi_pl += profit_loss;
        true
    }

    /// FIFO disposal with trade-total accounting. `counterpart` is the asset
    /// on the other side of the trade, used for the crypto-to-crypto policy.
    #[allow(clippy::too_many_arguments)]
    fn dispose(
        &mut self,
        msgs: &mut MessagesAggregator,
        asset: &Asset,
        amount: Decimal,
        rate: Decimal,
        fee_in_reporting: Decimal,
        timestamp: DateTime<Utc>,
        counterpart: Option<&Asset>,
    ) -> Disposal {
        let matched = self.consume_lots(msgs, asset, amount, rate, timestamp);

        // Lots before the taxed window still had to be consumed; only the
        // monetary effect is skipped.
        if timestamp < self.start_ts {
            return Disposal::default();
        }

        let general_profit = matched.proceeds - matched.cost_basis - fee_in_reporting;
        let taxable_proceeds = rate * matched.taxable_amount;
        let taxable_profit = taxable_proceeds - matched.taxable_basis - fee_in_reporting;

        self.general_trade_pl += general_profit;

        let crypto2crypto = *asset != self.reporting_currency
            && counterpart.is_some_and(|other| *other != self.reporting_currency);
        if crypto2crypto && !self.include_crypto2crypto {
            debug!(%asset, "Excluding crypto-to-crypto disposal from taxable total");
        } else {
            self.taxable_trade_pl += taxable_profit;
        }

        Disposal {
            proceeds: matched.proceeds,
            cost_basis: matched.cost_basis,
            profit_loss: general_profit,
        }
    }

    /// Walk the asset's lot queue front-to-back, consuming `amount`. Whole
    /// lots are popped; a straddled lot is decremented in place. Each matched
    /// portion is classified taxable or tax-free by its own lot age.
    fn consume_lots(
        &mut self,
        msgs: &mut MessagesAggregator,
        asset: &Asset,
        amount: Decimal,
        rate: Decimal,
        timestamp: DateTime<Utc>,
    ) -> MatchedLots {
        let queue = self.lots.entry(asset.clone()).or_default();
        let taxfree_after_period = self.taxfree_after_period;

        let mut remaining = amount;
        let mut matched = MatchedLots {
            proceeds: rate * amount,
            ..MatchedLots::default()
        };

        while remaining > Decimal::ZERO {
            let Some(lot) = queue.front_mut() else {
                break;
            };

            let take = remaining.min(lot.amount);
            let portion_basis = take * (lot.rate + lot.fee_rate);
            matched.cost_basis += portion_basis;

            let taxfree = taxfree_after_period.is_some_and(|period| {
                (timestamp - lot.timestamp).num_seconds() > period
            });
            if !taxfree {
                matched.taxable_amount += take;
                matched.taxable_basis += portion_basis;
            }

            if take == lot.amount {
                queue.pop_front();
            } else {
                lot.amount -= take;
            }
            remaining -= take;
        }

        if remaining > Decimal::ZERO {
            // The shortfall has no acquisition history: zero cost basis,
            // fully taxable.
            matched.taxable_amount += remaining;
            msgs.add_warning(format!(
                "Disposing of {remaining} {asset} more than acquired at {timestamp}. \
                 Assuming zero cost basis for the unmatched amount.",
            ));
        }

        matched
    }
}

#[derive(Debug, Default)]
struct MatchedLots {
    proceeds: Decimal,
    cost_basis: Decimal,
    taxable_amount: Decimal,
    taxable_basis: Decimal,
}
