//! Transaction ledger
//!
//! The ledger stores disbursement records, STK push fundings and balance
//! snapshots. Request builders and the result reconciler only talk to the
//! [`TransactionLedger`] trait; [`memory::MemoryLedger`] and, with the
//! `database` feature, [`postgres::PgLedger`] implement it.

pub mod memory;
#[cfg(feature = "database")]
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::payments::types::{
    BalanceSnapshot, FundingRecord, FundingUpdate, MpesaTransaction, TransactionCategory,
    TransactionUpdate,
};

pub use memory::MemoryLedger;
#[cfg(feature = "database")]
pub use postgres::{PgChargeTable, PgLedger};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Storage failure: {0}")]
    Storage(String),
}

impl LedgerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Storage(_))
    }

    #[cfg(feature = "database")]
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => LedgerError::NotFound(err.to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                LedgerError::Duplicate(db.message().to_string())
            }
            _ => LedgerError::Storage(err.to_string()),
        }
    }
}

/// How to find a single transaction record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionLookup {
    CorrelationId(Uuid),
    /// The id echoed back by the gateway in results.
    OriginatorConversationId(String),
    /// Most recent record for a payment among `categories`.
    LatestPayment {
        payment_id: String,
        categories: Vec<TransactionCategory>,
    },
}

#[async_trait]
pub trait TransactionLedger: Send + Sync {
    async fn create_transaction(&self, record: &MpesaTransaction) -> Result<(), LedgerError>;

    async fn find_transaction(
        &self,
        lookup: &TransactionLookup,
    ) -> Result<Option<MpesaTransaction>, LedgerError>;

    /// Apply a partial update and return the stored record. Status only ever
    /// moves forward.
    async fn update_transaction(
        &self,
        correlation_id: Uuid,
        update: TransactionUpdate,
    ) -> Result<MpesaTransaction, LedgerError>;

    async fn create_funding(&self, record: &FundingRecord) -> Result<(), LedgerError>;

    async fn find_funding_by_merchant_request_id(
        &self,
        merchant_request_id: &str,
    ) -> Result<Option<FundingRecord>, LedgerError>;

    async fn update_funding(
        &self,
        correlation_id: Uuid,
        update: FundingUpdate,
    ) -> Result<FundingRecord, LedgerError>;

    /// Most recent snapshot for `short_code`.
    async fn latest_balance(&self, short_code: &str)
        -> Result<Option<BalanceSnapshot>, LedgerError>;

    async fn record_balance(&self, snapshot: &BalanceSnapshot) -> Result<(), LedgerError>;
}
