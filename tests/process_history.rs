//! End-to-end `process_history` scenarios.

use chrono::{DateTime, Utc};
use gaincount::engine::Accountant;
use gaincount::model::actions::{
    AssetMovement, DefiEvent, EthereumTransaction, Loan, MarginPosition, MovementCategory, Trade,
    TradeType,
};
use gaincount::model::asset::{Asset, AssetRegistry};
use gaincount::model::report::ProfitLossReport;
use gaincount::model::settings::AccountingSettings;
use gaincount::prices::HistoricalPrices;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use similar_asserts::assert_eq as assert_similar_eq;
use std::collections::HashSet;

const DAY: i64 = 60 * 60 * 24;

fn ts(timestamp: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(timestamp, 0).unwrap()
}

fn eur() -> Asset {
    Asset::from("EUR")
}

/// BTC/EUR and ETH/EUR quotes for the first ten days after the epoch.
fn prices() -> HistoricalPrices {
    let mut prices = HistoricalPrices::new();
    for day in 0..10 {
        let at = day * DAY;
        prices.insert(Asset::btc(), eur(), at, dec!(100) + Decimal::from(day * 10));
        prices.insert(Asset::eth(), eur(), at, dec!(10) + Decimal::from(day));
    }
    prices
}

fn registry() -> AssetRegistry {
    AssetRegistry::new([Asset::btc(), Asset::eth(), eur()])
}

fn accountant() -> Accountant<HistoricalPrices> {
    Accountant::new(
        prices(),
        AccountingSettings::default(),
        registry(),
        HashSet::new(),
    )
}

fn buy(asset: Asset, amount: Decimal, rate: Decimal, at: i64) -> Trade {
    Trade {
        base_asset: asset,
        quote_asset: eur(),
        amount,
        rate,
        fee: Decimal::ZERO,
        fee_currency: eur(),
        trade_type: TradeType::Buy,
        location: "kraken".to_string(),
        timestamp: ts(at),
    }
}

fn sell(asset: Asset, amount: Decimal, rate: Decimal, at: i64) -> Trade {
    Trade {
        trade_type: TradeType::Sell,
        ..buy(asset, amount, rate, at)
    }
}

fn run(accountant: &mut Accountant<HistoricalPrices>, trades: Vec<Trade>) -> ProfitLossReport {
    run_window(accountant, trades, 0, 10 * DAY)
}

fn run_window(
    accountant: &mut Accountant<HistoricalPrices>,
    trades: Vec<Trade>,
    start: i64,
    end: i64,
) -> ProfitLossReport {
    accountant.process_history(
        ts(start),
        ts(end),
        trades,
        Vec::new(),
        Vec::new(),
        Vec::new(),
        Vec::new(),
        Vec::new(),
    )
}

fn total(value: &str) -> Decimal {
    value.parse().unwrap()
}

#[test]
fn single_buy_creates_lot_without_realized_pl() {
    let mut accountant = accountant();
    let report = run(&mut accountant, vec![buy(Asset::btc(), dec!(1), dec!(100), DAY)]);

    assert_eq!(total(&report.overview.general_trade_profit_loss), dec!(0));
    assert_eq!(total(&report.overview.taxable_trade_profit_loss), dec!(0));
    assert_eq!(accountant.calculated_asset_amount(&Asset::btc()), Some(dec!(1)));
    assert_eq!(report.all_events.len(), 1);
}

#[test]
fn buy_then_sell_realizes_the_difference() {
    let mut accountant = accountant();
    let report = run(
        &mut accountant,
        vec![
            buy(Asset::btc(), dec!(1), dec!(100), DAY),
            sell(Asset::btc(), dec!(1), dec!(150), 2 * DAY),
        ],
    );

    assert_eq!(total(&report.overview.general_trade_profit_loss), dec!(50));
    assert_eq!(total(&report.overview.taxable_trade_profit_loss), dec!(50));
    assert_eq!(total(&report.overview.total_profit_loss), dec!(50));
}

#[test]
fn fifo_consumes_oldest_lot_first() {
    let mut accountant = accountant();
    let report = run(
        &mut accountant,
        vec![
            buy(Asset::btc(), dec!(1), dec!(100), DAY),
            buy(Asset::btc(), dec!(1), dec!(200), 2 * DAY),
            // Consumes the older lot only: profit 150 - 100.
            sell(Asset::btc(), dec!(1), dec!(150), 3 * DAY),
        ],
    );

    assert_eq!(total(&report.overview.general_trade_profit_loss), dec!(50));
    assert_eq!(accountant.calculated_asset_amount(&Asset::btc()), Some(dec!(1)));
}

#[test]
fn rerun_with_identical_inputs_is_bit_identical() {
    let trades = vec![
        buy(Asset::btc(), dec!(2), dec!(100), DAY),
        sell(Asset::btc(), dec!(1), dec!(150), 2 * DAY),
        sell(Asset::btc(), dec!(1), dec!(170), 3 * DAY),
    ];

    let first = run(&mut accountant(), trades.clone());
    let second = run(&mut accountant(), trades);

    assert_similar_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn taxfree_disabled_keeps_taxable_equal_to_general() {
    let mut accountant = accountant();
    let report = run(
        &mut accountant,
        vec![
            buy(Asset::btc(), dec!(1), dec!(100), DAY),
            sell(Asset::btc(), dec!(1), dec!(150), 9 * DAY),
        ],
    );

    assert_eq!(
        report.overview.general_trade_profit_loss,
        report.overview.taxable_trade_profit_loss
    );
}

#[test]
fn gas_price_carries_forward_over_missing_values() {
    let mut accountant = accountant();
    let transactions = vec![
        // No observation yet: the 2 Gwei default applies.
        EthereumTransaction {
            tx_hash: "0xaa".to_string(),
            gas_used: 1_000_000_000,
            gas_price: None,
            timestamp: ts(DAY),
        },
        EthereumTransaction {
            tx_hash: "0xbb".to_string(),
            gas_used: 1_000_000_000,
            gas_price: Some(4_000_000_000),
            timestamp: ts(2 * DAY),
        },
        // Carries the 4 Gwei observation forward.
        EthereumTransaction {
            tx_hash: "0xcc".to_string(),
            gas_used: 1_000_000_000,
            gas_price: None,
            timestamp: ts(3 * DAY),
        },
    ];

    let report = accountant.process_history(
        ts(0),
        ts(10 * DAY),
        Vec::new(),
        Vec::new(),
        Vec::new(),
        transactions,
        Vec::new(),
        Vec::new(),
    );

    // ETH/EUR is 11, 12, and 13 on those days. Burned ETH is 2, 4, and 4.
    let expected = dec!(2) * dec!(11) + dec!(4) * dec!(12) + dec!(4) * dec!(13);
    assert_eq!(
        total(&report.overview.ethereum_transaction_gas_costs),
        expected
    );
    assert_eq!(report.all_events.len(), 3);
}

#[test]
fn unsupported_asset_warns_and_does_not_abort() {
    let mut registry = registry();
    registry.mark_unsupported(Asset::from("DASH"));
    let mut accountant = Accountant::new(
        prices(),
        AccountingSettings::default(),
        registry,
        HashSet::new(),
    );

    let report = run_window(
        &mut accountant,
        vec![
            buy(Asset::btc(), dec!(1), dec!(100), DAY),
            buy(Asset::from("DASH"), dec!(5), dec!(2), 2 * DAY),
            sell(Asset::btc(), dec!(1), dec!(150), 3 * DAY),
        ],
        0,
        10 * DAY,
    );

    assert_eq!(accountant.messages().warnings().len(), 1);
    assert_eq!(total(&report.overview.general_trade_profit_loss), dec!(50));
    // Only the two valid trades produced audit records.
    assert_eq!(report.all_events.len(), 2);
}

#[test]
fn missing_price_skips_only_the_offending_action() {
    let mut accountant = accountant();
    let report = run_window(
        &mut accountant,
        vec![
            buy(Asset::btc(), dec!(1), dec!(100), DAY),
            // BTC priced in ETH: needs an ETH quote at a time far past the
            // price table, so the lookup fails and the trade is skipped.
            Trade {
                quote_asset: Asset::eth(),
                fee_currency: Asset::eth(),
                ..buy(Asset::btc(), dec!(1), dec!(12), 20 * DAY)
            },
        ],
        0,
        30 * DAY,
    );

    assert_eq!(accountant.messages().errors().len(), 1);
    assert_eq!(report.all_events.len(), 1);
}

#[test]
fn processing_stops_at_end_ts() {
    let mut accountant = accountant();
    let report = run_window(
        &mut accountant,
        vec![
            buy(Asset::btc(), dec!(1), dec!(100), DAY),
            sell(Asset::btc(), dec!(1), dec!(150), 2 * DAY),
            // Sorted and present, but past the window.
            sell(Asset::btc(), dec!(1), dec!(180), 5 * DAY),
        ],
        0,
        3 * DAY,
    );

    assert_eq!(total(&report.overview.general_trade_profit_loss), dec!(50));
    assert_eq!(report.all_events.len(), 2);
    assert_eq!(accountant.currently_processing_timestamp(), ts(2 * DAY));
}

#[test]
fn effects_before_start_ts_are_not_counted() {
    let mut accountant = accountant();
    let movements = vec![
        AssetMovement {
            asset: Asset::btc(),
            fee_asset: Asset::btc(),
            fee: dec!(0.01),
            category: MovementCategory::Withdrawal,
            location: "kraken".to_string(),
            timestamp: ts(DAY),
        },
        AssetMovement {
            asset: Asset::btc(),
            fee_asset: Asset::btc(),
            fee: dec!(0.01),
            category: MovementCategory::Withdrawal,
            location: "kraken".to_string(),
            timestamp: ts(5 * DAY),
        },
    ];

    let report = accountant.process_history(
        ts(4 * DAY),
        ts(10 * DAY),
        Vec::new(),
        Vec::new(),
        movements,
        Vec::new(),
        Vec::new(),
        Vec::new(),
    );

    // Only the second movement counts: 0.01 BTC at 150 EUR.
    assert_eq!(total(&report.overview.asset_movement_fees), dec!(1.5));
    assert_eq!(report.all_events.len(), 1);
}

#[test]
fn lots_built_before_start_ts_provide_cost_basis() {
    let mut accountant = accountant();
    let report = run_window(
        &mut accountant,
        vec![
            // Acquired before the window; still the sell's basis.
            buy(Asset::btc(), dec!(1), dec!(100), DAY),
            sell(Asset::btc(), dec!(1), dec!(180), 5 * DAY),
        ],
        4 * DAY,
        10 * DAY,
    );

    assert_eq!(total(&report.overview.general_trade_profit_loss), dec!(80));
    // The pre-window buy produced no audit record.
    assert_eq!(report.all_events.len(), 1);
}

#[test]
fn settlement_sell_accumulates_settlement_losses() {
    let mut accountant = accountant();
    let report = run(
        &mut accountant,
        vec![
            buy(Asset::btc(), dec!(1), dec!(100), DAY),
            Trade {
                trade_type: TradeType::SettlementSell,
                ..sell(Asset::btc(), dec!(1), dec!(80), 2 * DAY)
            },
        ],
    );

    assert_eq!(total(&report.overview.settlement_losses), dec!(20));
    assert_eq!(total(&report.overview.general_trade_profit_loss), dec!(0));
    assert_eq!(total(&report.overview.total_profit_loss), dec!(-20));
}

#[test]
fn loan_margin_and_defi_feed_their_categories() {
    let mut accountant = accountant();
    let loans = vec![Loan {
        currency: Asset::btc(),
        amount_lent: dec!(10),
        earned: dec!(0.1),
        fee: dec!(0.01),
        open_time: ts(DAY),
        close_time: ts(2 * DAY),
        location: "poloniex".to_string(),
    }];
    let margin_positions = vec![MarginPosition {
        pl_currency: eur(),
        profit_loss: dec!(25),
        location: "bitmex".to_string(),
        close_time: ts(3 * DAY),
    }];
    let defi_events = vec![DefiEvent {
        kind: "compound interest".to_string(),
        asset: Asset::eth(),
        profit_loss: dec!(5),
        timestamp: ts(4 * DAY),
    }];

    let report = accountant.process_history(
        ts(0),
        ts(10 * DAY),
        Vec::new(),
        loans,
        Vec::new(),
        Vec::new(),
        defi_events,
        margin_positions,
    );

    // Loan: (0.1 - 0.01) BTC at the day-2 rate of 120.
    assert_eq!(total(&report.overview.loan_profit), dec!(10.8));
    assert_eq!(total(&report.overview.margin_positions_profit_loss), dec!(25));
    assert_eq!(total(&report.overview.defi_profit_loss), dec!(5));
    assert_eq!(total(&report.overview.total_taxable_profit_loss), dec!(40.8));
    assert_eq!(report.all_events.len(), 3);
}

#[test]
fn ignored_asset_is_skipped_silently() {
    let ignored: HashSet<Asset> = [Asset::eth()].into_iter().collect();
    let mut accountant = Accountant::new(
        prices(),
        AccountingSettings::default(),
        registry(),
        ignored,
    );

    let report = run(
        &mut accountant,
        vec![
            buy(Asset::eth(), dec!(10), dec!(11), DAY),
            buy(Asset::btc(), dec!(1), dec!(100), 2 * DAY),
        ],
    );

    assert!(accountant.messages().warnings().is_empty());
    assert!(accountant.messages().errors().is_empty());
    assert_eq!(report.all_events.len(), 1);
    assert_eq!(accountant.calculated_asset_amount(&Asset::eth()), None);
}

#[test]
fn ignored_eth_skips_gas_transactions() {
    let ignored: HashSet<Asset> = [Asset::eth()].into_iter().collect();
    let mut accountant = Accountant::new(
        prices(),
        AccountingSettings::default(),
        registry(),
        ignored,
    );

    let transactions = vec![EthereumTransaction {
        tx_hash: "0xaa".to_string(),
        gas_used: 1_000_000_000,
        gas_price: Some(4_000_000_000),
        timestamp: ts(DAY),
    }];

    let report = accountant.process_history(
        ts(0),
        ts(10 * DAY),
        Vec::new(),
        Vec::new(),
        Vec::new(),
        transactions,
        Vec::new(),
        Vec::new(),
    );

    assert_eq!(
        total(&report.overview.ethereum_transaction_gas_costs),
        dec!(0)
    );
    assert!(report.all_events.is_empty());
    assert!(accountant.messages().warnings().is_empty());
}

#[test]
fn ignored_asset_resolution_still_warns() {
    // The symbol is both unknown to the registry and on the ignore list;
    // resolution runs first, so the failure is still reported.
    let ignored: HashSet<Asset> = [Asset::from("SCAMCOIN")].into_iter().collect();
    let mut accountant = Accountant::new(
        prices(),
        AccountingSettings::default(),
        registry(),
        ignored,
    );

    run(
        &mut accountant,
        vec![buy(Asset::from("SCAMCOIN"), dec!(1), dec!(1), DAY)],
    );

    assert_eq!(accountant.messages().warnings().len(), 1);
}

#[test]
fn audit_trail_reconciles_with_trade_totals() {
    let mut accountant = accountant();
    let report = run(
        &mut accountant,
        vec![
            buy(Asset::btc(), dec!(2), dec!(100), DAY),
            sell(Asset::btc(), dec!(1), dec!(150), 2 * DAY),
            sell(Asset::btc(), dec!(1), dec!(170), 3 * DAY),
        ],
    );

    let recorded: Decimal = report
        .all_events
        .iter()
        .map(|record| record.gain_or_loss)
        .sum();
    assert_eq!(recorded, total(&report.overview.general_trade_profit_loss));
}
