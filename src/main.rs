#![forbid(unsafe_code)]

use error_iter::ErrorIter as _;
use gaincount::engine::Accountant;
use gaincount::model::actions::{
    AssetMovement, DefiEvent, EthereumTransaction, Loan, MarginPosition, Trade,
};
use gaincount::model::asset::{Asset, AssetRegistry};
use gaincount::model::settings::AccountingSettings;
use gaincount::prices::HistoricalPrices;
use is_terminal::IsTerminal as _;
use onlyargs::CliError;
use onlyargs_derive::OnlyArgs;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::{env, process::ExitCode};
use thiserror::Error;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::prelude::*;

#[derive(Debug, OnlyArgs)]
#[footer = "Additional environment variables:"]
#[footer = "  - RUST_LOG controls log verbosity, e.g. RUST_LOG=debug"]
#[footer = "  - TERM_COLOR accepts \"always\" to override automatic terminal sensing"]
struct Args {
    /// Read the action history from a JSON file.
    #[long]
    input_history: PathBuf,

    /// Read historical prices from a CSV file of base,quote,timestamp,rate
    /// rows. May be given multiple times.
    #[long]
    input_prices: Vec<PathBuf>,

    /// Unix timestamp where monetary effects start counting. Cost basis is
    /// always built from the very first action regardless.
    #[default(0)]
    start_ts: i64,

    /// Unix timestamp where processing stops. Defaults to now.
    end_ts: Option<i64>,

    /// The currency all profit/loss figures are expressed in.
    #[default("EUR")]
    reporting_currency: String,

    /// Exclude crypto-to-crypto trades from the taxable total.
    #[long]
    no_crypto2crypto: bool,

    /// Seconds after acquisition beyond which gains are tax-free.
    ///   The legacy value -1 means disabled (always taxable).
    taxfree_after_period: Option<i64>,

    /// Do not account deposit/withdrawal fees.
    #[long]
    no_movement_fees: bool,

    /// Do not account on-chain gas costs.
    #[long]
    no_gas_costs: bool,

    /// Asset symbols to skip entirely. May be given multiple times.
    #[long]
    ignored_asset: Vec<String>,

    /// Extra asset symbols to accept beyond those present in the price
    /// tables. May be given multiple times.
    #[long]
    known_asset: Vec<String>,

    /// Write the report JSON to this path instead of stdout.
    #[short('o')]
    output: Option<PathBuf>,

    /// Write the audit trail CSV to this path.
    #[long]
    output_audit: Option<PathBuf>,
}

/// Shape of the action-history JSON input.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HistoryFile {
    trades: Vec<Trade>,
    loans: Vec<Loan>,
    movements: Vec<AssetMovement>,
    transactions: Vec<EthereumTransaction>,
    defi_events: Vec<DefiEvent>,
    margin_positions: Vec<MarginPosition>,
}

#[derive(Debug, Error)]
enum Error {
    #[error("Argument parsing error")]
    Args(#[from] CliError),

    #[error("I/O error")]
    Io(#[from] std::io::Error),

    #[error("Unable to parse history JSON {0:?}")]
    History(PathBuf, #[source] serde_json::Error),

    #[error("Unable to load prices from {0:?}")]
    Prices(PathBuf, #[source] gaincount::errors::HistoricalPricesError),

    #[error("Unable to write audit CSV {0:?}")]
    AuditCsv(PathBuf, #[source] csv::Error),

    #[error("Unable to serialize the report")]
    Report(#[from] serde_json::Error),
}

fn main() -> ExitCode {
    // Uses the `RUST_LOG` environment var for configuration.
    // E.g. `RUST_LOG=debug cargo run`
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    let term_color = env::var("TERM_COLOR")
        .map(|color| color == "always")
        .unwrap_or_else(|_| std::io::stdout().is_terminal());
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_ansi(term_color))
        .with(env_filter)
        .init();

    match run(onlyargs::parse()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            for source in err.sources().skip(1) {
                eprintln!("  Caused by: {source}");
            }

            ExitCode::FAILURE
        }
    }
}

fn run(args: Result<Args, CliError>) -> Result<(), Error> {
    let args = args?;

    let history: HistoryFile = {
        let file = File::open(&args.input_history)?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|err| Error::History(args.input_history.clone(), err))?
    };

    let mut prices = HistoricalPrices::new();
    for path in &args.input_prices {
        let file = File::open(path)?;
        prices
            .read_csv(BufReader::new(file))
            .map_err(|err| Error::Prices(path.clone(), err))?;
    }

    let reporting_currency = Asset::new(args.reporting_currency);
    let mut registry = AssetRegistry::new(prices.known_assets().cloned());
    registry.insert(reporting_currency.clone());
    for symbol in &args.known_asset {
        registry.insert(Asset::new(symbol.as_str()));
    }

    let ignored_assets: HashSet<Asset> = args
        .ignored_asset
        .iter()
        .map(|symbol| Asset::new(symbol.as_str()))
        .collect();

    let settings = AccountingSettings {
        reporting_currency,
        include_crypto2crypto: !args.no_crypto2crypto,
        // -1 is the legacy "disabled" value; the library only knows None.
        taxfree_after_period: args.taxfree_after_period.filter(|period| *period >= 0),
        account_for_movements: !args.no_movement_fees,
        include_gas_costs: !args.no_gas_costs,
    };

    let start_ts = chrono::DateTime::from_timestamp(args.start_ts, 0)
        .unwrap_or(chrono::DateTime::UNIX_EPOCH);
    let end_ts = args
        .end_ts
        .and_then(|end| chrono::DateTime::from_timestamp(end, 0))
        .unwrap_or_else(chrono::Utc::now);

    let mut accountant = Accountant::new(prices, settings, registry, ignored_assets);
    let report = accountant.process_history(
        start_ts,
        end_ts,
        history.trades,
        history.loans,
        history.movements,
        history.transactions,
        history.defi_events,
        history.margin_positions,
    );

    if let Some(path) = &args.output_audit {
        let file = File::create(path)?;
        accountant
            .audit_trail()
            .write_csv(BufWriter::new(file))
            .map_err(|err| Error::AuditCsv(path.clone(), err))?;
    }

    let json = serde_json::to_string_pretty(&report)?;
    match &args.output {
        Some(path) => {
            let mut file = BufWriter::new(File::create(path)?);
            file.write_all(json.as_bytes())?;
            file.write_all(b"\n")?;
        }
        None => println!("{json}"),
    }

    Ok(())
}
