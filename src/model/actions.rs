use crate::model::asset::Asset;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One entry in the user's action history.
///
/// The five source collections (trades, loans, movements, on-chain
/// transactions, DeFi events) are merged into a single stream of these before
/// processing. Dispatch is an exhaustive match, so adding a variant forces
/// every call site to handle it.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub enum Action {
    Trade(Trade),
    Loan(Loan),
    AssetMovement(AssetMovement),
    EthereumTransaction(EthereumTransaction),
    MarginPosition(MarginPosition),
    DefiEvent(DefiEvent),
}

impl Action {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Action::Trade(trade) => trade.timestamp,
            Action::Loan(loan) => loan.close_time,
            Action::AssetMovement(movement) => movement.timestamp,
            Action::EthereumTransaction(tx) => tx.timestamp,
            Action::MarginPosition(margin) => margin.close_time,
            Action::DefiEvent(event) => event.timestamp,
        }
    }

    /// Assets involved in this action, in need of resolution before dispatch.
    /// On-chain transactions carry no symbol of their own but burn the
    /// chain's native currency, so they involve ETH.
    pub fn assets(&self) -> Vec<Asset> {
        match self {
            Action::Trade(trade) => vec![trade.base_asset.clone(), trade.quote_asset.clone()],
            Action::Loan(loan) => vec![loan.currency.clone()],
            Action::AssetMovement(movement) => {
                vec![movement.asset.clone(), movement.fee_asset.clone()]
            }
            Action::EthereumTransaction(_) => vec![Asset::eth()],
            Action::MarginPosition(margin) => vec![margin.pl_currency.clone()],
            Action::DefiEvent(event) => vec![event.asset.clone()],
        }
    }

    /// Short tag for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Trade(_) => "trade",
            Action::Loan(_) => "loan",
            Action::AssetMovement(_) => "asset movement",
            Action::EthereumTransaction(_) => "ethereum transaction",
            Action::MarginPosition(_) => "margin position",
            Action::DefiEvent(_) => "defi event",
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, Eq, PartialEq)]
pub enum TradeType {
    Buy,
    Sell,
    /// Sell whose proceeds repay a loan. No asset is acquired.
    SettlementSell,
    /// Buy phrased by the exchange as an acquisition, but economically a
    /// disposal of BTC to repay a loan.
    SettlementBuy,
}

/// An exchange of `amount` of `base_asset` against `quote_asset` at `rate`
/// quote units per base unit.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Trade {
    pub base_asset: Asset,
    pub quote_asset: Asset,
    pub amount: Decimal,
    pub rate: Decimal,
    pub fee: Decimal,
    pub fee_currency: Asset,
    pub trade_type: TradeType,
    pub location: String,
    pub timestamp: DateTime<Utc>,
}

/// A closed lending position. Gains realize at `close_time`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Loan {
    pub currency: Asset,
    pub amount_lent: Decimal,
    pub earned: Decimal,
    pub fee: Decimal,
    pub open_time: DateTime<Utc>,
    pub close_time: DateTime<Utc>,
    pub location: String,
}

#[derive(Clone, Copy, Debug, Deserialize, Serialize, Eq, PartialEq)]
pub enum MovementCategory {
    Deposit,
    Withdrawal,
}

impl MovementCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementCategory::Deposit => "deposit",
            MovementCategory::Withdrawal => "withdrawal",
        }
    }
}

/// A deposit or withdrawal. Only its fee is accounted.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct AssetMovement {
    pub asset: Asset,
    pub fee_asset: Asset,
    pub fee: Decimal,
    pub category: MovementCategory,
    pub location: String,
    pub timestamp: DateTime<Utc>,
}

/// An on-chain transaction. Only its gas cost is accounted.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EthereumTransaction {
    pub tx_hash: String,
    pub gas_used: u64,
    /// `None` when the data source did not report a gas price. The engine
    /// substitutes the most recently observed real gas price.
    pub gas_price: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

/// A closed margin position with its profit/loss already expressed in the
/// reporting currency. The engine performs no price lookups for these.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct MarginPosition {
    pub pl_currency: Asset,
    pub profit_loss: Decimal,
    pub location: String,
    pub close_time: DateTime<Utc>,
}

/// A DeFi protocol event with its profit/loss already expressed in the
/// reporting currency.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct DefiEvent {
    pub kind: String,
    pub asset: Asset,
    pub profit_loss: Decimal,
    pub timestamp: DateTime<Utc>,
}
