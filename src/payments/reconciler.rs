//! Applies the gateway's asynchronous results to pending ledger records.
//!
//! Results arrive as `{Result: {..., ResultParameters: {ResultParameter: [{Key, Value}]}}}`
//! for every family except STK push, which posts
//! `{Body: {stkCallback: {..., CallbackMetadata: {Item: [{Name, Value}]}}}}`.
//! Both parameter lists are flattened into a map before use. A record that has
//! already been finalized is returned untouched, so duplicate deliveries are
//! harmless.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};
use uuid::Uuid;

use crate::database::{TransactionLedger, TransactionLookup};
use crate::error::{DarajaError, DarajaResult};
use crate::payments::result_codes::{CollectionStatusCode, DisbursementResultCode};
use crate::payments::types::{
    BalanceSnapshot, FundingRecord, FundingUpdate, MpesaTransaction, Reconciliation,
    TransactionStatus, TransactionUpdate,
};
use crate::payments::utils::{decimal_to_minor, parse_provider_time, value_to_string};

const SUCCESS: &str = "0";

/// Balance embedded in business payment results as
/// `{Amount={CurrencyCode=KES, MinimumAmount=618683, BasicAmount=6186.83}}`.
/// Keys are matched by name; their order varies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedBalance {
    pub currency_code: Option<String>,
    pub minimum_amount: Option<String>,
    pub basic_amount: String,
}

impl EmbeddedBalance {
    pub fn parse(raw: &str) -> Option<Self> {
        static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
        let pattern = PATTERN
            .get_or_init(|| Regex::new(r"(\w+)=([^,{}=]+)").ok())
            .as_ref()?;

        let pairs: HashMap<&str, &str> = pattern
            .captures_iter(raw)
            .filter_map(|c| Some((c.get(1)?.as_str(), c.get(2)?.as_str().trim())))
            .collect();
        let field = |key: &str| pairs.get(key).map(|v| v.to_string());

        Some(Self {
            currency_code: field("CurrencyCode"),
            minimum_amount: field("MinimumAmount"),
            basic_amount: field("BasicAmount")?,
        })
    }

    /// `BasicAmount` in minor units.
    pub fn basic_amount_minor(&self) -> Option<i64> {
        decimal_to_minor(&self.basic_amount)
    }
}

/// The common `Result` envelope of non-STK results.
struct ResultEnvelope {
    result_type: Option<String>,
    result_code: String,
    result_description: Option<String>,
    originator_conversation_id: String,
    transaction_id: Option<String>,
    parameters: HashMap<String, String>,
}

impl ResultEnvelope {
    fn parse(payload: &JsonValue) -> DarajaResult<Self> {
        let result = payload
            .get("Result")
            .filter(|r| r.is_object())
            .ok_or_else(|| DarajaError::invalid_payload("missing Result object"))?;

        let field = |key: &str| result.get(key).and_then(value_to_string);

        let result_code =
            field("ResultCode").ok_or_else(|| DarajaError::invalid_payload("missing ResultCode"))?;
        let originator_conversation_id = field("OriginatorConversationID")
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| DarajaError::invalid_payload("missing OriginatorConversationID"))?;

        let parameters = result
            .get("ResultParameters")
            .and_then(|p| p.get("ResultParameter"))
            .map(|list| flatten(list, "Key", "Value"))
            .unwrap_or_default();

        Ok(Self {
            result_type: field("ResultType"),
            result_code,
            result_description: field("ResultDesc"),
            originator_conversation_id,
            transaction_id: field("TransactionID").filter(|id| !id.is_empty()),
            parameters,
        })
    }

    fn is_success(&self) -> bool {
        self.result_code.trim() == SUCCESS
    }

    fn param(&self, key: &str) -> Option<String> {
        self.parameters
            .get(key)
            .filter(|value| !value.is_empty())
            .cloned()
    }

    fn completed_at(&self, key: &str, now: DateTime<Utc>) -> DateTime<Utc> {
        parse_provider_time(self.param(key).as_deref(), now)
    }

    fn balance(&self, key: &str) -> Option<i64> {
        self.param(key).as_deref().and_then(decimal_to_minor)
    }

    /// Fields written for every result, successful or not.
    fn outcome_update(&self, raw: &JsonValue) -> TransactionUpdate {
        TransactionUpdate {
            status: Some(if self.is_success() {
                TransactionStatus::Completed
            } else {
                TransactionStatus::Failed
            }),
            result_type: self.result_type.clone(),
            result_code: Some(self.result_code.clone()),
            result_description: self.result_description.clone(),
            raw_result: Some(raw.clone()),
            ..Default::default()
        }
    }
}

/// Flatten a `[{Key, Value}]` list into a map. The gateway sends a single
/// object instead of a list when there is one parameter, and omits `Value`
/// for some entries.
fn flatten(list: &JsonValue, key_field: &str, value_field: &str) -> HashMap<String, String> {
    let entries: Vec<&JsonValue> = match list {
        JsonValue::Array(items) => items.iter().collect(),
        JsonValue::Object(_) => vec![list],
        _ => Vec::new(),
    };

    entries
        .into_iter()
        .filter_map(|entry| {
            let key = entry.get(key_field).and_then(value_to_string)?;
            let value = entry.get(value_field).and_then(value_to_string)?;
            Some((key, value))
        })
        .collect()
}

fn log_failure(kind: &str, record: &MpesaTransaction, code: &str) {
    let known = DisbursementResultCode::from_code(code);
    warn!(
        kind = kind,
        correlation_id = %record.correlation_id,
        result_code = %code,
        should_retry = known.map(|c| c.should_retry()).unwrap_or(false),
        customer_message = known.map(|c| c.customer_message()).unwrap_or("Unknown result code"),
        "M-Pesa result reported a failure"
    );
}

pub struct ResultReconciler {
    ledger: Arc<dyn TransactionLedger>,
}

impl ResultReconciler {
    pub fn new(ledger: Arc<dyn TransactionLedger>) -> Self {
        Self { ledger }
    }

    /// B2C disbursement results.
    pub async fn reconcile_disbursement(
        &self,
        payload: &JsonValue,
    ) -> DarajaResult<Reconciliation<MpesaTransaction>> {
        self.reconcile_result("disbursement", payload, |result, update, now| {
            update.transaction_id = result.transaction_id.clone();
            update.completed_at = Some(result.completed_at("TransactionCompletedDateTime", now));
            update.counterparty_name = result.param("ReceiverPartyPublicName");
            update.utility_balance = result.balance("B2CUtilityAccountAvailableFunds");
            update.working_balance = result.balance("B2CWorkingAccountAvailableFunds");
        })
        .await
    }

    /// Till, paybill, pochi and tax remittance results.
    pub async fn reconcile_business_transfer(
        &self,
        payload: &JsonValue,
    ) -> DarajaResult<Reconciliation<MpesaTransaction>> {
        self.reconcile_result("business transfer", payload, |result, update, now| {
            update.transaction_id = result.transaction_id.clone();
            update.completed_at = Some(result.completed_at("TransCompletedTime", now));
            update.counterparty_name = result.param("ReceiverPartyPublicName");
            update.working_balance = result
                .param("InitiatorAccountCurrentBalance")
                .as_deref()
                .and_then(EmbeddedBalance::parse)
                .and_then(|balance| balance.basic_amount_minor());
        })
        .await
    }

    pub async fn reconcile_reversal(
        &self,
        payload: &JsonValue,
    ) -> DarajaResult<Reconciliation<MpesaTransaction>> {
        self.reconcile_result("reversal", payload, |result, update, now| {
            update.transaction_id = result.transaction_id.clone();
            update.completed_at = Some(result.completed_at("TransCompletedTime", now));
            update.counterparty_name = result.param("CreditPartyPublicName");
        })
        .await
    }

    pub async fn reconcile_status(
        &self,
        payload: &JsonValue,
    ) -> DarajaResult<Reconciliation<MpesaTransaction>> {
        self.reconcile_result("status", payload, |result, update, now| {
            update.transaction_id = result.param("ReceiptNo");
            update.transaction_status = result.param("TransactionStatus");
            update.completed_at = Some(result.completed_at("FinalisedTime", now));
            update.counterparty_name = result
                .param("CreditPartyName")
                .or_else(|| result.param("ReceiverPartyPublicName"));
        })
        .await
    }

    /// Working/utility account movement results.
    pub async fn reconcile_funds_transfer(
        &self,
        payload: &JsonValue,
    ) -> DarajaResult<Reconciliation<MpesaTransaction>> {
        self.reconcile_result("funds transfer", payload, |result, update, now| {
            update.transaction_id = result.transaction_id.clone();
            update.completed_at = Some(result.completed_at("TransCompletedTime", now));
        })
        .await
    }

    /// STK push callbacks, matched on `MerchantRequestID`.
    pub async fn reconcile_collection(
        &self,
        payload: &JsonValue,
    ) -> DarajaResult<Reconciliation<FundingRecord>> {
        let callback = payload
            .get("Body")
            .and_then(|body| body.get("stkCallback"))
            .filter(|cb| cb.is_object())
            .ok_or_else(|| DarajaError::invalid_payload("missing Body.stkCallback"))?;

        let field = |key: &str| callback.get(key).and_then(value_to_string);

        let merchant_request_id = field("MerchantRequestID")
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| DarajaError::invalid_payload("missing MerchantRequestID"))?;
        let result_code =
            field("ResultCode").ok_or_else(|| DarajaError::invalid_payload("missing ResultCode"))?;

        let Some(record) = self
            .ledger
            .find_funding_by_merchant_request_id(&merchant_request_id)
            .await?
        else {
            warn!(
                merchant_request_id = %merchant_request_id,
                "no funding record matches STK callback"
            );
            return Ok(Reconciliation::NoMatch);
        };

        if record.status.is_settled() {
            info!(
                correlation_id = %record.correlation_id,
                status = %record.status,
                "STK callback already applied"
            );
            return Ok(Reconciliation::AlreadyFinal(record));
        }

        let success = result_code.trim() == SUCCESS;
        let mut update = FundingUpdate {
            status: Some(if success {
                TransactionStatus::Completed
            } else {
                TransactionStatus::Failed
            }),
            result_code: Some(result_code.clone()),
            result_description: field("ResultDesc"),
            raw_result: Some(payload.clone()),
            ..Default::default()
        };

        if success {
            let items = callback
                .get("CallbackMetadata")
                .and_then(|m| m.get("Item"))
                .map(|list| flatten(list, "Name", "Value"))
                .unwrap_or_default();

            update.mpesa_receipt_number = items.get("MpesaReceiptNumber").cloned();
            update.transaction_date = Some(parse_provider_time(
                items.get("TransactionDate").map(String::as_str),
                Utc::now(),
            ));
        } else {
            let known = CollectionStatusCode::from_code(&result_code);
            warn!(
                correlation_id = %record.correlation_id,
                result_code = %result_code,
                should_retry = known.map(|c| c.should_retry()).unwrap_or(false),
                customer_message = known.map(|c| c.customer_message()).unwrap_or("Unknown result code"),
                "STK push failed"
            );
        }

        let updated = self
            .ledger
            .update_funding(record.correlation_id, update)
            .await?;

        info!(
            correlation_id = %updated.correlation_id,
            status = %updated.status,
            receipt = updated.mpesa_receipt_number.as_deref().unwrap_or(""),
            "STK callback applied"
        );

        Ok(Reconciliation::Applied(updated))
    }

    /// Store the balances reported by an account balance result.
    ///
    /// Returns `None` when the gateway reports the query failed.
    pub async fn record_balance(
        &self,
        short_code: &str,
        payload: &JsonValue,
    ) -> DarajaResult<Option<BalanceSnapshot>> {
        let result = ResultEnvelope::parse(payload)?;

        if !result.is_success() {
            warn!(
                short_code = %short_code,
                result_code = %result.result_code,
                description = result.result_description.as_deref().unwrap_or(""),
                "balance query failed"
            );
            return Ok(None);
        }

        let raw = result
            .param("AccountBalance")
            .ok_or_else(|| DarajaError::invalid_payload("missing AccountBalance parameter"))?;
        let accounts = parse_accounts(&raw);

        let named = |name: &str| {
            accounts
                .iter()
                .position(|(account, _)| account.to_lowercase().contains(name))
        };
        let slots = [named("working"), named("utility"), named("uncleared")];
        // Reports without recognised names are read as working, utility, uncleared.
        let positional = slots.iter().all(Option::is_none);

        let pick = |slot: usize| -> Option<i64> {
            slots[slot]
                .or(positional.then_some(slot))
                .and_then(|index| accounts.get(index))
                .map(|(_, amount)| *amount)
        };
        let required = |slot: usize, name: &str| -> DarajaResult<i64> {
            pick(slot).ok_or_else(|| {
                DarajaError::invalid_payload(format!("AccountBalance has no {} account", name))
            })
        };

        let snapshot = BalanceSnapshot {
            short_code: short_code.to_string(),
            working_balance: required(0, "working")?,
            utility_balance: required(1, "utility")?,
            uncleared_balance: pick(2).unwrap_or(0),
            captured_at: Utc::now(),
        };

        self.ledger.record_balance(&snapshot).await?;

        info!(
            short_code = %short_code,
            utility = snapshot.utility_balance,
            working = snapshot.working_balance,
            "balance snapshot recorded"
        );

        Ok(Some(snapshot))
    }

    async fn reconcile_result<F>(
        &self,
        kind: &'static str,
        payload: &JsonValue,
        on_success: F,
    ) -> DarajaResult<Reconciliation<MpesaTransaction>>
    where
        F: FnOnce(&ResultEnvelope, &mut TransactionUpdate, DateTime<Utc>),
    {
        let result = ResultEnvelope::parse(payload)?;

        let Some(record) = self.find(&result.originator_conversation_id).await? else {
            warn!(
                kind = kind,
                originator_conversation_id = %result.originator_conversation_id,
                "no transaction matches M-Pesa result"
            );
            return Ok(Reconciliation::NoMatch);
        };

        if record.status.is_settled() {
            info!(
                kind = kind,
                correlation_id = %record.correlation_id,
                status = %record.status,
                "M-Pesa result already applied"
            );
            return Ok(Reconciliation::AlreadyFinal(record));
        }

        let mut update = result.outcome_update(payload);
        if result.is_success() {
            on_success(&result, &mut update, Utc::now());
        } else {
            log_failure(kind, &record, &result.result_code);
        }

        let updated = self
            .ledger
            .update_transaction(record.correlation_id, update)
            .await?;

        info!(
            kind = kind,
            correlation_id = %updated.correlation_id,
            status = %updated.status,
            transaction_id = updated.transaction_id.as_deref().unwrap_or(""),
            "M-Pesa result applied"
        );

        Ok(Reconciliation::Applied(updated))
    }

    /// Match on the echoed originator conversation id, falling back to the
    /// correlation id for records whose echo was never stored.
    async fn find(&self, originator_conversation_id: &str) -> DarajaResult<Option<MpesaTransaction>> {
        let by_echo = self
            .ledger
            .find_transaction(&TransactionLookup::OriginatorConversationId(
                originator_conversation_id.to_string(),
            ))
            .await?;
        if by_echo.is_some() {
            return Ok(by_echo);
        }

        match Uuid::parse_str(originator_conversation_id.trim()) {
            Ok(id) => Ok(self
                .ledger
                .find_transaction(&TransactionLookup::CorrelationId(id))
                .await?),
            Err(_) => Ok(None),
        }
    }
}

/// Split `Name|Currency|Amount|Available|Reserved|Uncleared&...` into
/// `(name, available)` pairs.
fn parse_accounts(raw: &str) -> Vec<(String, i64)> {
    raw.split('&')
        .filter_map(|account| {
            let fields: Vec<&str> = account.split('|').collect();
            let available = decimal_to_minor(fields.get(3)?)?;
            Some((fields.first()?.trim().to_string(), available))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryLedger;
    use crate::payments::types::TransactionCategory;
    use chrono::TimeZone;
    use serde_json::json;

    async fn pending(ledger: &MemoryLedger, category: TransactionCategory) -> MpesaTransaction {
        let mut record = MpesaTransaction::pending(
            Uuid::now_v7(),
            "600000",
            category,
            "254712345678",
            100_000,
            0,
            json!({}),
        );
        record.originator_conversation_id = Some(record.correlation_id.to_string());
        ledger.create_transaction(&record).await.unwrap();
        record
    }

    fn disbursement_result(id: &str, code: i64) -> JsonValue {
        json!({
            "Result": {
                "ResultType": 0,
                "ResultCode": code,
                "ResultDesc": "The service request is processed successfully.",
                "OriginatorConversationID": id,
                "ConversationID": "AG_20191219_00005797af5d7d75f652",
                "TransactionID": "NLJ41HAY6Q",
                "ResultParameters": {
                    "ResultParameter": [
                        {"Key": "TransactionAmount", "Value": 1000},
                        {"Key": "TransactionReceipt", "Value": "NLJ41HAY6Q"},
                        {"Key": "ReceiverPartyPublicName", "Value": "254708374149 - John Doe"},
                        {"Key": "TransactionCompletedDateTime", "Value": "19.12.2019 11:45:50"},
                        {"Key": "B2CUtilityAccountAvailableFunds", "Value": 10116.00},
                        {"Key": "B2CWorkingAccountAvailableFunds", "Value": 900000.00},
                        {"Key": "B2CRecipientIsRegisteredCustomer", "Value": "Y"}
                    ]
                }
            }
        })
    }

    #[test]
    fn test_embedded_balance_is_extracted() {
        let balance = EmbeddedBalance::parse(
            "{Amount={CurrencyCode=KES, MinimumAmount=618683, BasicAmount=6186.83}}",
        )
        .unwrap();
        assert_eq!(balance.currency_code.as_deref(), Some("KES"));
        assert_eq!(balance.minimum_amount.as_deref(), Some("618683"));
        assert_eq!(balance.basic_amount_minor(), Some(618_683));

        let reordered =
            EmbeddedBalance::parse("{Amount={BasicAmount=10.50, CurrencyCode=KES}}").unwrap();
        assert_eq!(reordered.basic_amount_minor(), Some(1_050));
        assert!(reordered.minimum_amount.is_none());

        assert!(EmbeddedBalance::parse("{Amount={CurrencyCode=KES}}").is_none());
    }

    #[test]
    fn test_single_parameter_object_is_flattened() {
        let params = flatten(&json!({"Key": "TransCompletedTime", "Value": 20240101120000u64}), "Key", "Value");
        assert_eq!(params.get("TransCompletedTime").map(String::as_str), Some("20240101120000"));

        let params = flatten(&json!([{"Name": "Balance"}, {"Name": "Amount", "Value": 1}]), "Name", "Value");
        assert_eq!(params.len(), 1);
    }

    #[tokio::test]
    async fn test_successful_disbursement_fills_result_fields() {
        let ledger = Arc::new(MemoryLedger::new());
        let record = pending(&ledger, TransactionCategory::SendMoney).await;
        let reconciler = ResultReconciler::new(ledger.clone());

        let outcome = reconciler
            .reconcile_disbursement(&disbursement_result(&record.correlation_id.to_string(), 0))
            .await
            .unwrap();

        let Reconciliation::Applied(updated) = outcome else {
            panic!("expected the result to apply");
        };
        assert_eq!(updated.status, TransactionStatus::Completed);
        assert_eq!(updated.transaction_id.as_deref(), Some("NLJ41HAY6Q"));
        assert_eq!(updated.counterparty_name.as_deref(), Some("254708374149 - John Doe"));
        assert_eq!(updated.utility_balance, Some(1_011_600));
        assert_eq!(updated.working_balance, Some(90_000_000));
        assert_eq!(
            updated.completed_at,
            Some(Utc.with_ymd_and_hms(2019, 12, 19, 8, 45, 50).unwrap())
        );
    }

    #[tokio::test]
    async fn test_failed_result_only_records_the_outcome() {
        let ledger = Arc::new(MemoryLedger::new());
        let record = pending(&ledger, TransactionCategory::SendMoney).await;
        let reconciler = ResultReconciler::new(ledger.clone());

        let outcome = reconciler
            .reconcile_disbursement(&disbursement_result(&record.correlation_id.to_string(), 2001))
            .await
            .unwrap();

        let updated = outcome.record().unwrap();
        assert_eq!(updated.status, TransactionStatus::Failed);
        assert_eq!(updated.result_code.as_deref(), Some("2001"));
        assert!(updated.transaction_id.is_none());
        assert!(updated.counterparty_name.is_none());
        assert!(updated.utility_balance.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_a_no_op() {
        let ledger = Arc::new(MemoryLedger::new());
        let record = pending(&ledger, TransactionCategory::SendMoney).await;
        let reconciler = ResultReconciler::new(ledger.clone());
        let payload = disbursement_result(&record.correlation_id.to_string(), 0);

        let first = reconciler.reconcile_disbursement(&payload).await.unwrap();
        let second = reconciler.reconcile_disbursement(&payload).await.unwrap();

        assert!(matches!(second, Reconciliation::AlreadyFinal(_)));
        assert_eq!(first.record(), second.record());
    }

    #[tokio::test]
    async fn test_unknown_conversation_is_no_match() {
        let ledger = Arc::new(MemoryLedger::new());
        let reconciler = ResultReconciler::new(ledger.clone());

        let outcome = reconciler
            .reconcile_reversal(&disbursement_result("AG_unknown", 0))
            .await
            .unwrap();

        assert_eq!(outcome, Reconciliation::NoMatch);
        assert!(ledger.transactions().await.is_empty());
    }

    #[tokio::test]
    async fn test_correlation_id_is_a_fallback_match() {
        let ledger = Arc::new(MemoryLedger::new());
        let record = MpesaTransaction::pending(
            Uuid::now_v7(),
            "600000",
            TransactionCategory::Reversal,
            "0",
            100_000,
            0,
            json!({}),
        );
        ledger.create_transaction(&record).await.unwrap();
        let reconciler = ResultReconciler::new(ledger.clone());

        let outcome = reconciler
            .reconcile_reversal(&json!({
                "Result": {
                    "ResultType": 0,
                    "ResultCode": "0",
                    "ResultDesc": "ok",
                    "OriginatorConversationID": record.correlation_id.to_string(),
                    "TransactionID": "OAB1234",
                    "ResultParameters": {"ResultParameter": [
                        {"Key": "CreditPartyPublicName", "Value": "600000 - Acme"},
                        {"Key": "TransCompletedTime", "Value": 20240301101500u64}
                    ]}
                }
            }))
            .await
            .unwrap();

        let updated = outcome.record().unwrap();
        assert_eq!(updated.counterparty_name.as_deref(), Some("600000 - Acme"));
        assert_eq!(updated.transaction_id.as_deref(), Some("OAB1234"));
    }

    #[tokio::test]
    async fn test_business_result_reads_embedded_balance() {
        let ledger = Arc::new(MemoryLedger::new());
        let record = pending(&ledger, TransactionCategory::PayBill).await;
        let reconciler = ResultReconciler::new(ledger.clone());

        let outcome = reconciler
            .reconcile_business_transfer(&json!({
                "Result": {
                    "ResultType": "0",
                    "ResultCode": "0",
                    "ResultDesc": "The service request is processed successfully",
                    "OriginatorConversationID": record.correlation_id.to_string(),
                    "TransactionID": "QKA81LK5CY",
                    "ResultParameters": {"ResultParameter": [
                        {"Key": "InitiatorAccountCurrentBalance",
                         "Value": "{Amount={CurrencyCode=KES, MinimumAmount=618683, BasicAmount=6186.83}}"},
                        {"Key": "TransCompletedTime", "Value": "20221110110717"},
                        {"Key": "ReceiverPartyPublicName", "Value": "000000 - Biller Companty"}
                    ]}
                }
            }))
            .await
            .unwrap();

        let updated = outcome.record().unwrap();
        assert_eq!(updated.working_balance, Some(618_683));
        assert!(updated.utility_balance.is_none());
        assert_eq!(updated.counterparty_name.as_deref(), Some("000000 - Biller Companty"));
    }

    #[tokio::test]
    async fn test_status_result_prefers_credit_party_name() {
        let ledger = Arc::new(MemoryLedger::new());
        let record = pending(&ledger, TransactionCategory::TransactionStatus).await;
        let reconciler = ResultReconciler::new(ledger.clone());

        let outcome = reconciler
            .reconcile_status(&json!({
                "Result": {
                    "ResultType": 0,
                    "ResultCode": 0,
                    "ResultDesc": "The service request is processed successfully.",
                    "OriginatorConversationID": record.correlation_id.to_string(),
                    "ResultParameters": {"ResultParameter": [
                        {"Key": "ReceiptNo", "Value": "LHG31AA5TX"},
                        {"Key": "TransactionStatus", "Value": "Completed"},
                        {"Key": "FinalisedTime", "Value": 20170727101415u64},
                        {"Key": "ReceiverPartyPublicName", "Value": "fallback"},
                        {"Key": "CreditPartyName", "Value": "254708374149 - John Doe"}
                    ]}
                }
            }))
            .await
            .unwrap();

        let updated = outcome.record().unwrap();
        assert_eq!(updated.transaction_id.as_deref(), Some("LHG31AA5TX"));
        assert_eq!(updated.transaction_status.as_deref(), Some("Completed"));
        assert_eq!(updated.counterparty_name.as_deref(), Some("254708374149 - John Doe"));
    }

    #[tokio::test]
    async fn test_malformed_payload_is_rejected() {
        let reconciler = ResultReconciler::new(Arc::new(MemoryLedger::new()));

        let err = reconciler
            .reconcile_funds_transfer(&json!({"Result": {"ResultCode": 0}}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_PAYLOAD");

        let err = reconciler
            .reconcile_collection(&json!({"Body": {}}))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_PAYLOAD");
    }

    #[tokio::test]
    async fn test_balance_accounts_are_matched_by_name() {
        let ledger = Arc::new(MemoryLedger::new());
        let reconciler = ResultReconciler::new(ledger.clone());

        let snapshot = reconciler
            .record_balance(
                "600000",
                &json!({
                    "Result": {
                        "ResultType": 0,
                        "ResultCode": 0,
                        "ResultDesc": "The service request is processed successfully.",
                        "OriginatorConversationID": "16917-22577599-3",
                        "ResultParameters": {"ResultParameter": [
                            {"Key": "AccountBalance",
                             "Value": "Working Account|KES|46713.00|46713.00|0.00|0.00&Float Account|KES|0.00|0.00|0.00|0.00&Utility Account|KES|49217.00|49217.00|0.00|0.00&Charges Paid Account|KES|-220.00|-220.00|0.00|0.00"},
                            {"Key": "BOCompletedTime", "Value": 20200109125710u64}
                        ]}
                    }
                }),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(snapshot.working_balance, 4_671_300);
        assert_eq!(snapshot.utility_balance, 4_921_700);
        assert_eq!(snapshot.uncleared_balance, 0);
        assert_eq!(ledger.latest_balance("600000").await.unwrap(), Some(snapshot));
    }

    #[tokio::test]
    async fn test_unnamed_balance_accounts_are_read_by_position() {
        let reconciler = ResultReconciler::new(Arc::new(MemoryLedger::new()));

        let snapshot = reconciler
            .record_balance(
                "600000",
                &json!({
                    "Result": {
                        "ResultType": 0,
                        "ResultCode": 0,
                        "OriginatorConversationID": "16917-22577599-4",
                        "ResultParameters": {"ResultParameter": {
                            "Key": "AccountBalance",
                            "Value": "MMF|KES|100.00|100.00|0.00|0.00&Float|KES|200.00|200.00|0.00|0.00&Held|KES|3.00|3.00|0.00|0.00"
                        }}
                    }
                }),
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(snapshot.working_balance, 10_000);
        assert_eq!(snapshot.utility_balance, 20_000);
        assert_eq!(snapshot.uncleared_balance, 300);
    }

    #[tokio::test]
    async fn test_named_report_without_utility_is_rejected() {
        let reconciler = ResultReconciler::new(Arc::new(MemoryLedger::new()));

        let err = reconciler
            .record_balance(
                "600000",
                &json!({
                    "Result": {
                        "ResultType": 0,
                        "ResultCode": 0,
                        "OriginatorConversationID": "16917-22577599-5",
                        "ResultParameters": {"ResultParameter": {
                            "Key": "AccountBalance",
                            "Value": "Working Account|KES|1.00|1.00|0.00|0.00&Float Account|KES|2.00|2.00|0.00|0.00"
                        }}
                    }
                }),
            )
            .await
            .unwrap_err();

        assert_eq!(err.code(), "INVALID_PAYLOAD");
    }
}
