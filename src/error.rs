//! Crate level error type
//!
//! Request builders and the result reconciler return [`DarajaError`]. Gateway
//! failures only surface here from calls that do not record a transaction
//! (balance queries, token fetches); money-moving requests fold them into the
//! persisted record instead.

use thiserror::Error;

use crate::database::LedgerError;
use crate::payments::error::{CredentialError, GatewayError};
use crate::services::charge_bands::ChargeError;

pub type DarajaResult<T> = Result<T, DarajaError>;

#[derive(Debug, Error)]
pub enum DarajaError {
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Charge(#[from] ChargeError),

    #[error("Security credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Invalid amount {amount}: {reason}")]
    InvalidAmount { amount: i64, reason: String },

    #[error("Invalid callback payload: {0}")]
    InvalidPayload(String),
}

impl DarajaError {
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        DarajaError::InvalidPayload(message.into())
    }

    /// Stable machine readable code.
    pub fn code(&self) -> &'static str {
        match self {
            DarajaError::Gateway(_) => "GATEWAY_ERROR",
            DarajaError::Ledger(_) => "LEDGER_ERROR",
            DarajaError::Charge(ChargeError::NoBand { .. }) => "CHARGE_BAND_MISSING",
            DarajaError::Charge(ChargeError::Overflow { .. }) => "CHARGE_OVERFLOW",
            DarajaError::Charge(_) => "CHARGE_TABLE_ERROR",
            DarajaError::Credential(_) => "SECURITY_CREDENTIAL_ERROR",
            DarajaError::InvalidAmount { .. } => "INVALID_AMOUNT",
            DarajaError::InvalidPayload(_) => "INVALID_PAYLOAD",
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            DarajaError::Gateway(err) => err.is_retryable(),
            DarajaError::Ledger(err) => err.is_retryable(),
            DarajaError::Charge(err) => err.is_retryable(),
            DarajaError::Credential(_) => false,
            DarajaError::InvalidAmount { .. } => false,
            DarajaError::InvalidPayload(_) => false,
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            DarajaError::Gateway(_) => "M-Pesa is temporarily unavailable".to_string(),
            DarajaError::Ledger(_) => "Unable to record the transaction".to_string(),
            DarajaError::Charge(_) => "Unable to determine the M-Pesa charge".to_string(),
            DarajaError::Credential(_) => "M-Pesa credentials are misconfigured".to_string(),
            DarajaError::InvalidAmount { reason, .. } => reason.clone(),
            DarajaError::InvalidPayload(_) => "Malformed M-Pesa result".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::charge_bands::ChargeCategory;
    use chrono::NaiveDate;

    #[test]
    fn test_charge_errors_are_not_retryable() {
        let err = DarajaError::from(ChargeError::NoBand {
            amount: 4950,
            category: ChargeCategory::Business,
            as_of: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
        });
        assert!(!err.is_retryable());
        assert_eq!(err.code(), "CHARGE_BAND_MISSING");
        assert!(err.to_string().contains("Kshs. 49.50"));
    }

    #[test]
    fn test_gateway_retry_flag_is_forwarded() {
        let err = DarajaError::from(GatewayError::http(503, "unavailable", None));
        assert!(err.is_retryable());

        let err = DarajaError::from(GatewayError::http(401, "unauthorized", None));
        assert!(!err.is_retryable());
    }
}
