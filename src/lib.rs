#![forbid(unsafe_code)]

pub mod audit;
pub mod engine;
pub mod errors;
pub mod ledger;
pub mod messages;
pub mod model;
pub mod prices;
pub mod util;
