#![forbid(unsafe_code)]

pub mod code_mint;
pub mod collab;
pub mod provider_vault;
