use crate::audit::{AuditCategory, AuditRecord, AuditTrail};
use crate::ledger::{Disposal, Ledger};
use crate::messages::MessagesAggregator;
use crate::model::actions::{
    Action, AssetMovement, DefiEvent, EthereumTransaction, Loan, MarginPosition, Trade, TradeType,
};
use crate::model::asset::{Asset, AssetRegistry, AssetResolveError};
use crate::model::report::{Overview, ProfitLossReport, Totals};
use crate::model::settings::AccountingSettings;
use crate::prices::{PriceError, PriceResolver};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashSet;
use tracing::{debug, error, info};

/// Gas price substituted for transactions with unreported gas prices until a
/// real observation is carried forward: 2 Gwei, in wei.
const DEFAULT_GAS_PRICE: u64 = 2_000_000_000;

const WEI_PER_ETH: u64 = 1_000_000_000_000_000_000;

const TIMESTAMP_FORMAT: &str = "%d/%m/%Y, %H:%M:%S";

/// The history-processing engine.
///
/// Walks one user's merged action history in timestamp order, maintains the
/// FIFO cost-basis [`Ledger`], and produces a per-category profit/loss report
/// with a reconciling audit trail. Price-resolution failures skip the
/// offending action; everything else in a run is deterministic.
#[derive(Debug)]
pub struct Accountant<P> {
    resolver: P,
    settings: AccountingSettings,
    registry: AssetRegistry,
    ignored_assets: HashSet<Asset>,

    ledger: Ledger,
    audit: AuditTrail,
    msgs: MessagesAggregator,

    // Run state, reset at the start of every process_history call.
    start_ts: DateTime<Utc>,
    end_ts: DateTime<Utc>,
    started_processing_timestamp: DateTime<Utc>,
    currently_processing_timestamp: DateTime<Utc>,
    last_gas_price: u64,
    asset_movement_fees: Decimal,
    eth_gas_costs: Decimal,
}

enum ShouldContinue {
    Yes,
    No,
}

impl<P: PriceResolver> Accountant<P> {
    pub fn new(
        resolver: P,
        settings: AccountingSettings,
        registry: AssetRegistry,
        ignored_assets: HashSet<Asset>,
    ) -> Self {
        Self {
            resolver,
            settings,
            registry,
            ignored_assets,
            ledger: Ledger::new(),
            audit: AuditTrail::new(),
            msgs: MessagesAggregator::new(),
            start_ts: DateTime::UNIX_EPOCH,
            end_ts: DateTime::UNIX_EPOCH,
            started_processing_timestamp: DateTime::UNIX_EPOCH,
            currently_processing_timestamp: DateTime::UNIX_EPOCH,
            last_gas_price: DEFAULT_GAS_PRICE,
            asset_movement_fees: Decimal::ZERO,
            eth_gas_costs: Decimal::ZERO,
        }
    }

    /// Timestamp of the action currently (or last) being processed.
    pub fn currently_processing_timestamp(&self) -> DateTime<Utc> {
        self.currently_processing_timestamp
    }

    pub fn started_processing_timestamp(&self) -> DateTime<Utc> {
        self.started_processing_timestamp
    }

    /// User-visible warnings and errors collected so far.
    pub fn messages(&self) -> &MessagesAggregator {
        &self.msgs
    }

    pub fn messages_mut(&mut self) -> &mut MessagesAggregator {
        &mut self.msgs
    }

    pub fn audit_trail(&self) -> &AuditTrail {
        &self.audit
    }

    /// Amount of `asset` accounting says should be held after the last run.
    pub fn calculated_asset_amount(&self, asset: &Asset) -> Option<Decimal> {
        self.ledger.calculated_asset_amount(asset)
    }

    /// Process the full history of actions to determine the rate and time at
    /// which every asset was obtained, and the general and taxable
    /// profit/loss per category.
    ///
    /// `start_ts` is where monetary effects start counting, not where
    /// processing starts: cost basis is always built from the very first
    /// action in the history. `end_ts` is a hard stop.
    pub fn process_history(
        &mut self,
        start_ts: DateTime<Utc>,
        end_ts: DateTime<Utc>,
        trades: Vec<Trade>,
        loans: Vec<Loan>,
        movements: Vec<AssetMovement>,
        transactions: Vec<EthereumTransaction>,
        defi_events: Vec<DefiEvent>,
        margin_positions: Vec<MarginPosition>,
    ) -> ProfitLossReport {
        info!(%start_ts, %end_ts, "Start of history processing");

        self.start_ts = start_ts;
        self.end_ts = end_ts;
        self.last_gas_price = DEFAULT_GAS_PRICE;
        self.asset_movement_fees = Decimal::ZERO;
        self.eth_gas_costs = Decimal::ZERO;
        self.ledger.reset(&self.settings, start_ts);
        self.audit.reset();

        let mut actions: Vec<Action> = trades.into_iter().map(Action::Trade).collect();
        actions.extend(loans.into_iter().map(Action::Loan));
        actions.extend(movements.into_iter().map(Action::AssetMovement));
        actions.extend(transactions.into_iter().map(Action::EthereumTransaction));
        actions.extend(defi_events.into_iter().map(Action::DefiEvent));
        actions.extend(margin_positions.into_iter().map(Action::MarginPosition));

        actions.sort_by_key(Action::timestamp);

        let first_ts = actions
            .first()
            .map(Action::timestamp)
            .unwrap_or(DateTime::UNIX_EPOCH);
        self.started_processing_timestamp = first_ts;
        self.currently_processing_timestamp = first_ts;

        let mut prev_time = DateTime::UNIX_EPOCH;
        for action in &actions {
            let should_continue = match self.process_action(action, &mut prev_time) {
                Ok(should_continue) => should_continue,
                Err(err) => {
                    self.report_skipped_action(action, err);
                    continue;
                }
            };

            if let ShouldContinue::No = should_continue {
                break;
            }
        }

        let totals = Totals {
            loan_profit: self.ledger.loan_profit(),
            defi_pl: self.ledger.defi_pl(),
            margin_pl: self.ledger.margin_pl(),
            settlement_losses: self.ledger.settlement_losses(),
            gas_costs: self.eth_gas_costs,
            movement_fees: self.asset_movement_fees,
            general_trade_pl: self.ledger.general_trade_pl(),
            taxable_trade_pl: self.ledger.taxable_trade_pl(),
        };

        ProfitLossReport {
            overview: Overview::from(&totals),
            all_events: self.audit.records().to_vec(),
        }
    }

    /// One warning/error per skipped action, naming the timestamp and reason.
    fn report_skipped_action(&mut self, action: &Action, err: PriceError) {
        let date = action.timestamp().format(TIMESTAMP_FORMAT);
        let reason = match &err {
            PriceError::UnsupportedAsset(_) => {
                "an asset not supported by the price oracle being involved"
            }
            PriceError::NoPriceForTimestamp(..) => {
                "inability to find a price at that point in time"
            }
            PriceError::RemoteError(_) => "inability to reach an external service",
        };

        self.msgs.add_error(format!(
            "Skipping {kind} at {date} during history processing due to {reason}. \
             Check the logs for more details",
            kind = action.kind(),
        ));
        error!(?action, %err, "Skipping action during history processing");
    }

    /// Process one action. Returns whether the loop should keep going.
    ///
    /// The only errors that escape are the three recoverable price-resolution
    /// failures; the caller converts them into a skip plus a message.
    fn process_action(
        &mut self,
        action: &Action,
        prev_time: &mut DateTime<Utc>,
    ) -> Result<ShouldContinue, PriceError> {
        let timestamp = action.timestamp();

        // Consistency check on the merge/sort step. A violation is a defect,
        // not user input to validate.
        assert!(
            timestamp >= *prev_time,
            "During history processing the actions are not in ascending order"
        );
        *prev_time = timestamp;

        // Ascending order makes everything after end_ts out of window too.
        if timestamp > self.end_ts {
            return Ok(ShouldContinue::No);
        }

        self.currently_processing_timestamp = timestamp;

        // Resolution runs before the ignore-list check so resolution failures
        // for ignored assets are still reported.
        let mut resolved = Vec::new();
        for asset in action.assets() {
            match self.registry.resolve(asset.symbol()) {
                Ok(asset) => resolved.push(asset),
                Err(err) => {
                    self.warn_unresolved(action, err);
                    return Ok(ShouldContinue::Yes);
                }
            }
        }

        if resolved
            .iter()
            .any(|asset| self.ignored_assets.contains(asset))
        {
            debug!(kind = action.kind(), ?resolved, "Ignoring action with ignored asset");
            return Ok(ShouldContinue::Yes);
        }

        match action {
            Action::Loan(loan) => self.account_loan_gain(loan)?,
            Action::AssetMovement(movement) => self.account_movement_fee(movement)?,
            Action::EthereumTransaction(tx) => self.account_gas_cost(tx)?,
            Action::MarginPosition(margin) => self.account_margin_position(margin),
            Action::DefiEvent(event) => self.account_defi_event(event),
            Action::Trade(trade) => self.account_trade(trade)?,
        }

        Ok(ShouldContinue::Yes)
    }

    fn warn_unresolved(&mut self, action: &Action, err: AssetResolveError) {
        let kind = action.kind();
        match err {
            AssetResolveError::Unknown(asset) => self.msgs.add_warning(format!(
                "At history processing found {kind} with unknown asset {asset}. \
                 Ignoring the action.",
            )),
            AssetResolveError::Unsupported(asset) => self.msgs.add_warning(format!(
                "At history processing found {kind} with unsupported asset {asset}. \
                 Ignoring the action.",
            )),
            AssetResolveError::Malformed(symbol) => self.msgs.add_error(format!(
                "At history processing found {kind} with malformed asset symbol {symbol:?}. \
                 Ignoring the action.",
            )),
        }
    }

    fn in_window(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start_ts
    }

    /// The reporting-currency rate of the fee of the given trade.
    fn fee_in_reporting_currency(&self, trade: &Trade) -> Result<Decimal, PriceError> {
        if trade.fee.is_zero() {
            return Ok(Decimal::ZERO);
        }

        let fee_rate = self.resolver.rate(
            &trade.fee_currency,
            &self.settings.reporting_currency,
            trade.timestamp,
        )?;

        Ok(fee_rate * trade.fee)
    }

    fn rate_in_reporting_currency(
        &self,
        asset: &Asset,
        timestamp: DateTime<Utc>,
    ) -> Result<Decimal, PriceError> {
        self.resolver
            .rate(asset, &self.settings.reporting_currency, timestamp)
    }

    fn account_loan_gain(&mut self, loan: &Loan) -> Result<(), PriceError> {
        let rate = self.rate_in_reporting_currency(&loan.currency, loan.close_time)?;
        let profit = self
            .ledger
            .add_loan_gain(&loan.currency, loan.earned, loan.fee, rate, loan.close_time);

        if self.in_window(loan.close_time) {
            self.audit.record(AuditRecord {
                category: AuditCategory::LoanGain,
                location: loan.location.clone(),
                asset: loan.currency.clone(),
                amount: loan.earned,
                rate,
                fee: loan.fee,
                gain_or_loss: profit,
                timestamp: loan.close_time,
            });
        }

        Ok(())
    }

    fn account_movement_fee(&mut self, movement: &AssetMovement) -> Result<(), PriceError> {
        if !self.in_window(movement.timestamp) {
            return Ok(());
        }

        // KFEE deposits have value only inside the exchange that issues them
        // and no oracle prices them.
        if movement.asset == Asset::kfee() || !self.settings.account_for_movements {
            return Ok(());
        }

        let fee_rate = self.rate_in_reporting_currency(&movement.fee_asset, movement.timestamp)?;
        let cost = movement.fee * fee_rate;
        self.asset_movement_fees += cost;

        debug!(
            category = movement.category.as_str(),
            asset = %movement.asset,
            %cost,
            location = %movement.location,
            "Accounting for asset movement"
        );

        self.audit.record(AuditRecord {
            category: AuditCategory::MovementFee,
            location: movement.location.clone(),
            asset: movement.fee_asset.clone(),
            amount: movement.fee,
            rate: fee_rate,
            fee: movement.fee,
            gain_or_loss: -cost,
            timestamp: movement.timestamp,
        });

        Ok(())
    }

    fn account_gas_cost(&mut self, tx: &EthereumTransaction) -> Result<(), PriceError> {
        if !self.settings.include_gas_costs {
            return Ok(());
        }
        if !self.in_window(tx.timestamp) {
            return Ok(());
        }

        // Carry the last observed real gas price forward over transactions
        // with unreported gas prices.
        let gas_price = match tx.gas_price {
            Some(gas_price) => {
                self.last_gas_price = gas_price;
                gas_price
            }
            None => self.last_gas_price,
        };

        let rate = self.rate_in_reporting_currency(&Asset::eth(), tx.timestamp)?;
        let eth_burned_as_gas =
            Decimal::from(tx.gas_used) * Decimal::from(gas_price) / Decimal::from(WEI_PER_ETH);
        let cost = eth_burned_as_gas * rate;
        self.eth_gas_costs += cost;

        debug!(
            gas_used = tx.gas_used,
            gas_price,
            tx_hash = %tx.tx_hash,
            "Accounting for ethereum transaction gas cost"
        );

        self.audit.record(AuditRecord {
            category: AuditCategory::GasCost,
            location: tx.tx_hash.clone(),
            asset: Asset::eth(),
            amount: eth_burned_as_gas,
            rate,
            fee: Decimal::ZERO,
            gain_or_loss: -cost,
            timestamp: tx.timestamp,
        });

        Ok(())
    }

    fn account_margin_position(&mut self, margin: &MarginPosition) {
        if self
            .ledger
            .add_margin_position(margin.profit_loss, margin.close_time)
        {
            self.audit.record(AuditRecord {
                category: AuditCategory::MarginPosition,
                location: margin.location.clone(),
                asset: margin.pl_currency.clone(),
                amount: margin.profit_loss,
                rate: Decimal::ONE,
                fee: Decimal::ZERO,
                gain_or_loss: margin.profit_loss,
                timestamp: margin.close_time,
            });
        }
    }

    fn account_defi_event(&mut self, event: &DefiEvent) {
        if self.ledger.add_defi_event(event.profit_loss, event.timestamp) {
            self.audit.record(AuditRecord {
                category: AuditCategory::DefiEvent,
                location: event.kind.clone(),
                asset: event.asset.clone(),
                amount: event.profit_loss,
                rate: Decimal::ONE,
                fee: Decimal::ZERO,
                gain_or_loss: event.profit_loss,
                timestamp: event.timestamp,
            });
        }
    }

    fn account_trade(&mut self, trade: &Trade) -> Result<(), PriceError> {
        match trade.trade_type {
            TradeType::Buy => self.trade_buy(trade),
            TradeType::Sell => self.trade_sell(trade, false),
            TradeType::SettlementSell => self.trade_sell(trade, true),
            TradeType::SettlementBuy => self.trade_settlement_buy(trade),
        }
    }

    /// When you buy, you pay with the quote asset and receive the base one.
    fn trade_buy(&mut self, trade: &Trade) -> Result<(), PriceError> {
        let fee_in_reporting = self.fee_in_reporting_currency(trade)?;
        let paid_with_rate = self.rate_in_reporting_currency(&trade.quote_asset, trade.timestamp)?;

        let disposal = self.ledger.add_buy_and_corresponding_sell(
            &mut self.msgs,
            &trade.base_asset,
            trade.amount,
            &trade.quote_asset,
            paid_with_rate,
            trade.rate,
            fee_in_reporting,
            trade.timestamp,
        );

        if self.in_window(trade.timestamp) {
            self.audit.record(AuditRecord {
                category: AuditCategory::Buy,
                location: trade.location.clone(),
                asset: trade.base_asset.clone(),
                amount: trade.amount,
                rate: paid_with_rate * trade.rate,
                fee: fee_in_reporting,
                gain_or_loss: disposal.profit_loss,
                timestamp: trade.timestamp,
            });
        }

        Ok(())
    }

    /// When you sell, you dispose of the base asset and receive the quote
    /// one. Valuation anchors on the receiving asset's rate.
    fn trade_sell(&mut self, trade: &Trade, loan_settlement: bool) -> Result<(), PriceError> {
        let receiving_rate =
            self.rate_in_reporting_currency(&trade.quote_asset, trade.timestamp)?;
        let selling_rate = receiving_rate * trade.rate;
        let fee_in_reporting = self.fee_in_reporting_currency(trade)?;

        let disposal = if loan_settlement {
            self.ledger.add_settlement_sell(
                &mut self.msgs,
                &trade.base_asset,
                trade.amount,
                selling_rate,
                fee_in_reporting,
                trade.timestamp,
            )
        } else {
            self.ledger.add_sell_and_corresponding_buy(
                &mut self.msgs,
                &trade.base_asset,
                trade.amount,
                selling_rate,
                &trade.quote_asset,
                receiving_rate,
                trade.rate,
                fee_in_reporting,
                trade.timestamp,
            )
        };

        if self.in_window(trade.timestamp) {
            self.record_sell_audit(trade, selling_rate, fee_in_reporting, disposal, loan_settlement);
        }

        Ok(())
    }

    /// A settlement buy acquires some asset with BTC to repay a loan, so it
    /// is economically a disposal of BTC: the sold amount is the cost
    /// (amount × rate) of the original buy, valued at BTC's own rate.
    fn trade_settlement_buy(&mut self, trade: &Trade) -> Result<(), PriceError> {
        let selling_asset = Asset::btc();
        let selling_rate = self.rate_in_reporting_currency(&selling_asset, trade.timestamp)?;
        let fee_in_reporting = self.fee_in_reporting_currency(trade)?;
        let selling_amount = trade.rate * trade.amount;

        let disposal = self.ledger.add_settlement_sell(
            &mut self.msgs,
            &selling_asset,
            selling_amount,
            selling_rate,
            fee_in_reporting,
            trade.timestamp,
        );

        if self.in_window(trade.timestamp) {
            self.audit.record(AuditRecord {
                category: AuditCategory::SettlementSell,
                location: trade.location.clone(),
                asset: selling_asset,
                amount: selling_amount,
                rate: selling_rate,
                fee: fee_in_reporting,
                gain_or_loss: disposal.profit_loss,
                timestamp: trade.timestamp,
            });
        }

        Ok(())
    }

    fn record_sell_audit(
        &mut self,
        trade: &Trade,
        rate: Decimal,
        fee: Decimal,
        disposal: Disposal,
        loan_settlement: bool,
    ) {
        let category = if loan_settlement {
            AuditCategory::SettlementSell
        } else {
            AuditCategory::Sell
        };

        self.audit.record(AuditRecord {
            category,
            location: trade.location.clone(),
            asset: trade.base_asset.clone(),
            amount: trade.amount,
            rate,
            fee,
            gain_or_loss: disposal.profit_loss,
            timestamp: trade.timestamp,
        });
    }
}
