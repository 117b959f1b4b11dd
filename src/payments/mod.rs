//! Daraja gateway integration
//!
//! - [`client`] authenticated HTTP calls and the token cache wiring
//! - [`requests`] one builder per transaction family
//! - [`reconciler`] applies asynchronous results to ledger records
//! - [`result_codes`] customer messages and retry hints per result code

pub mod client;
pub mod error;
pub mod reconciler;
pub mod requests;
pub mod response;
pub mod result_codes;
pub mod security;
pub mod token;
pub mod types;
pub mod utils;

pub use client::{DarajaClient, Endpoint};
pub use error::{CredentialError, GatewayError, GatewayErrorCode, GatewayResult};
pub use reconciler::ResultReconciler;
pub use requests::{Daraja, RequestOptions};
pub use response::{Fault, GatewayResponse, SyncResponse};
pub use security::{PreEncryptedCredential, SecurityCredential};
pub use token::TokenCache;
pub use types::*;
