//! M-Pesa (Daraja) request/result reconciliation engine.
//!
//! The crate initiates money-movement requests against the Daraja gateway,
//! records every attempt in a transaction ledger and reconciles the delayed
//! asynchronous results back onto the ledger by correlation id. Charges are
//! priced from a versioned table of tariff bands.

pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod payments;
pub mod services;

pub use config::DarajaConfig;
pub use error::{DarajaError, DarajaResult};
pub use payments::requests::Daraja;
pub use payments::types::CredentialContext;
