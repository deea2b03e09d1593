#![forbid(unsafe_code)]

pub mod account;
pub mod collab;
pub mod common;
pub mod provider_secrets;
pub mod style;
pub mod usage;
pub mod waitlist;

pub use common::{ContractViolation, MonotonicTimeNs, ReasonCodeId, SchemaVersion, Validate};
