#![forbid(unsafe_code)]

pub mod vault_cli;
