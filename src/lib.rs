#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![cfg_attr(feature = "fail-on-warnings", deny(clippy::all))]

pub mod app;
pub mod balance;
pub mod batch;
pub mod batcher;
pub mod cli;
pub mod event_log;
pub mod fees;
pub mod ingest;
pub mod ledger;
mod macros;
pub mod node;
pub mod payout;
pub mod primitives;
pub mod signing_client;
mod tracing;
pub mod utxo;
