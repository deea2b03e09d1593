#![forbid(unsafe_code)]

pub mod approval;
pub mod credit_gate;
pub mod revocation;
