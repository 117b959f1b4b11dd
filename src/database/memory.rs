use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{LedgerError, TransactionLedger, TransactionLookup};
use crate::payments::types::{
    BalanceSnapshot, FundingRecord, FundingUpdate, MpesaTransaction, TransactionUpdate,
};

/// Ledger kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    transactions: RwLock<HashMap<Uuid, MpesaTransaction>>,
    fundings: RwLock<HashMap<Uuid, FundingRecord>>,
    balances: RwLock<Vec<BalanceSnapshot>>,
    transaction_creates: AtomicUsize,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `create_transaction` calls, successful or not.
    pub fn transaction_creates(&self) -> usize {
        self.transaction_creates.load(Ordering::SeqCst)
    }

    pub async fn transactions(&self) -> Vec<MpesaTransaction> {
        let mut records: Vec<_> = self.transactions.read().await.values().cloned().collect();
        records.sort_by_key(|r| (r.created_at, r.correlation_id));
        records
    }

    pub async fn fundings(&self) -> Vec<FundingRecord> {
        let mut records: Vec<_> = self.fundings.read().await.values().cloned().collect();
        records.sort_by_key(|r| (r.created_at, r.correlation_id));
        records
    }
}

#[async_trait]
impl TransactionLedger for MemoryLedger {
    async fn create_transaction(&self, record: &MpesaTransaction) -> Result<(), LedgerError> {
        self.transaction_creates.fetch_add(1, Ordering::SeqCst);

        let mut transactions = self.transactions.write().await;
        if transactions.contains_key(&record.correlation_id) {
            return Err(LedgerError::Duplicate(record.correlation_id.to_string()));
        }
        transactions.insert(record.correlation_id, record.clone());
        Ok(())
    }

    async fn find_transaction(
        &self,
        lookup: &TransactionLookup,
    ) -> Result<Option<MpesaTransaction>, LedgerError> {
        let transactions = self.transactions.read().await;

        let found = match lookup {
            TransactionLookup::CorrelationId(id) => transactions.get(id),
            TransactionLookup::OriginatorConversationId(id) => transactions
                .values()
                .filter(|r| r.originator_conversation_id.as_deref() == Some(id.as_str()))
                .max_by_key(|r| (r.created_at, r.correlation_id)),
            TransactionLookup::LatestPayment {
                payment_id,
                categories,
            } => transactions
                .values()
                .filter(|r| {
                    r.payment_id.as_deref() == Some(payment_id.as_str())
                        && categories.contains(&r.category)
                })
                .max_by_key(|r| (r.created_at, r.correlation_id)),
        };

        Ok(found.cloned())
    }

    async fn update_transaction(
        &self,
        correlation_id: Uuid,
        update: TransactionUpdate,
    ) -> Result<MpesaTransaction, LedgerError> {
        let mut transactions = self.transactions.write().await;
        let record = transactions
            .get_mut(&correlation_id)
            .ok_or_else(|| LedgerError::NotFound(correlation_id.to_string()))?;

        update.apply(record);
        Ok(record.clone())
    }

    async fn create_funding(&self, record: &FundingRecord) -> Result<(), LedgerError> {
        let mut fundings = self.fundings.write().await;
        if fundings.contains_key(&record.correlation_id) {
            return Err(LedgerError::Duplicate(record.correlation_id.to_string()));
        }
        fundings.insert(record.correlation_id, record.clone());
        Ok(())
    }

    async fn find_funding_by_merchant_request_id(
        &self,
        merchant_request_id: &str,
    ) -> Result<Option<FundingRecord>, LedgerError> {
        Ok(self
            .fundings
            .read()
            .await
            .values()
            .filter(|r| r.merchant_request_id.as_deref() == Some(merchant_request_id))
            .max_by_key(|r| (r.created_at, r.correlation_id))
            .cloned())
    }

    async fn update_funding(
        &self,
        correlation_id: Uuid,
        update: FundingUpdate,
    ) -> Result<FundingRecord, LedgerError> {
        let mut fundings = self.fundings.write().await;
        let record = fundings
            .get_mut(&correlation_id)
            .ok_or_else(|| LedgerError::NotFound(correlation_id.to_string()))?;

        update.apply(record);
        Ok(record.clone())
    }

    async fn latest_balance(
        &self,
        short_code: &str,
    ) -> Result<Option<BalanceSnapshot>, LedgerError> {
        // max_by_key keeps the last of equal maxima, i.e. the latest insert
        Ok(self
            .balances
            .read()
            .await
            .iter()
            .filter(|s| s.short_code == short_code)
            .max_by_key(|s| s.captured_at)
            .cloned())
    }

    async fn record_balance(&self, snapshot: &BalanceSnapshot) -> Result<(), LedgerError> {
        self.balances.write().await.push(snapshot.clone());
        Ok(())
    }
}
