//! In-process ledger hosting forwarders and services.
//!
//! Implements just enough of a chain to run the forwarding protocol end to
//! end: balances, gas accounting, receipts and call dispatch to registered
//! Rust services. It is not a general execution environment.

pub mod config;
pub mod gas;
mod local;

pub use config::LocalLedgerConfig;
pub use local::LocalLedger;
