#![forbid(unsafe_code)]

pub mod ledger;
pub mod repo;

pub use ledger::{LedgerError, LedgerReportCounters, LedgerStore};
