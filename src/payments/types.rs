use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind}: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Gateway credentials of one tenant short code.
///
/// Built by the caller from its own credential store for every request; the
/// initiator password is the cleartext value at use time.
#[derive(Clone)]
pub struct CredentialContext {
    pub account_id: String,
    pub consumer_key: String,
    pub consumer_secret: String,
    pub short_code: String,
    pub initiator: String,
    pub initiator_password: String,
    pub pass_key: Option<String>,
    pub allow_identity_validation: bool,
}

impl fmt::Debug for CredentialContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialContext")
            .field("account_id", &self.account_id)
            .field("short_code", &self.short_code)
            .field("initiator", &self.initiator)
            .field("consumer_key", &"<redacted>")
            .field("consumer_secret", &"<redacted>")
            .field("initiator_password", &"<redacted>")
            .field("pass_key", &self.pass_key.as_ref().map(|_| "<redacted>"))
            .field("allow_identity_validation", &self.allow_identity_validation)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TransactionCategory {
    SendMoney,
    BuyGoods,
    PayBill,
    Pochi,
    Reversal,
    FundsTransfer,
    TransactionStatus,
    TaxRemittance,
}

impl TransactionCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionCategory::SendMoney => "SendMoney",
            TransactionCategory::BuyGoods => "BuyGoods",
            TransactionCategory::PayBill => "PayBill",
            TransactionCategory::Pochi => "Pochi",
            TransactionCategory::Reversal => "Reversal",
            TransactionCategory::FundsTransfer => "FundsTransfer",
            TransactionCategory::TransactionStatus => "TransactionStatus",
            TransactionCategory::TaxRemittance => "TaxRemittance",
        }
    }

    /// Categories a transaction status query may refer to.
    pub fn status_queryable() -> Vec<TransactionCategory> {
        vec![
            TransactionCategory::SendMoney,
            TransactionCategory::PayBill,
            TransactionCategory::BuyGoods,
        ]
    }
}

impl fmt::Display for TransactionCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionCategory {
    type Err = ParseEnumError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "SendMoney" => Ok(TransactionCategory::SendMoney),
            "BuyGoods" => Ok(TransactionCategory::BuyGoods),
            "PayBill" => Ok(TransactionCategory::PayBill),
            "Pochi" => Ok(TransactionCategory::Pochi),
            "Reversal" => Ok(TransactionCategory::Reversal),
            "FundsTransfer" => Ok(TransactionCategory::FundsTransfer),
            "TransactionStatus" => Ok(TransactionCategory::TransactionStatus),
            "TaxRemittance" => Ok(TransactionCategory::TaxRemittance),
            other => Err(ParseEnumError::new("transaction category", other)),
        }
    }
}

/// Lifecycle of a ledger record.
///
/// `Pending` moves to `Accepted` or `Rejected` on the synchronous response and
/// to `Completed` or `Failed` when the asynchronous result arrives. Status
/// never moves backwards.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Accepted,
    Rejected,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Accepted => "accepted",
            TransactionStatus::Rejected => "rejected",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        }
    }

    fn rank(&self) -> u8 {
        match self {
            TransactionStatus::Pending => 0,
            TransactionStatus::Accepted | TransactionStatus::Rejected => 1,
            TransactionStatus::Completed | TransactionStatus::Failed => 2,
        }
    }

    /// The asynchronous result has been applied.
    pub fn is_settled(&self) -> bool {
        self.rank() == 2
    }

    pub fn advance(self, next: TransactionStatus) -> TransactionStatus {
        if next.rank() > self.rank() {
            next
        } else {
            self
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = ParseEnumError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "pending" => Ok(TransactionStatus::Pending),
            "accepted" => Ok(TransactionStatus::Accepted),
            "rejected" => Ok(TransactionStatus::Rejected),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(ParseEnumError::new("transaction status", other)),
        }
    }
}

/// Identity document types accepted by validated disbursements.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum IdentificationType {
    #[serde(rename = "01")]
    NationalId,
    #[serde(rename = "02")]
    MilitaryId,
    #[serde(rename = "03")]
    AlienId,
    #[serde(rename = "04")]
    DiplomaticId,
    #[serde(rename = "05")]
    Passport,
}

impl IdentificationType {
    pub fn code(&self) -> &'static str {
        match self {
            IdentificationType::NationalId => "01",
            IdentificationType::MilitaryId => "02",
            IdentificationType::AlienId => "03",
            IdentificationType::DiplomaticId => "04",
            IdentificationType::Passport => "05",
        }
    }

    /// Resolve a document name such as `"passport"` or `" MILITARY_ID "`.
    /// Unrecognized names fall back to the national id.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_uppercase().as_str() {
            "MILITARY_ID" => IdentificationType::MilitaryId,
            "ALIEN_ID" => IdentificationType::AlienId,
            "DIPLOMATIC_ID" => IdentificationType::DiplomaticId,
            "PASSPORT" => IdentificationType::Passport,
            _ => IdentificationType::NationalId,
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "01" => Some(IdentificationType::NationalId),
            "02" => Some(IdentificationType::MilitaryId),
            "03" => Some(IdentificationType::AlienId),
            "04" => Some(IdentificationType::DiplomaticId),
            "05" => Some(IdentificationType::Passport),
            _ => None,
        }
    }
}

/// A money movement tracked in the ledger, keyed by `correlation_id`.
///
/// Amounts, charges and balances are integral minor units (cents).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MpesaTransaction {
    pub correlation_id: Uuid,
    pub payment_id: Option<String>,
    pub short_code: String,
    pub category: TransactionCategory,
    pub account_number: String,
    pub bill_reference: Option<String>,
    pub requester: Option<String>,
    pub amount: i64,
    pub charge: i64,
    pub identity_type: Option<IdentificationType>,
    pub identity_number: Option<String>,
    pub request_payload: JsonValue,
    pub status: TransactionStatus,
    pub originator_conversation_id: Option<String>,
    pub conversation_id: Option<String>,
    pub response_code: Option<String>,
    pub response_description: Option<String>,
    pub raw_response: Option<JsonValue>,
    pub result_type: Option<String>,
    pub result_code: Option<String>,
    pub result_description: Option<String>,
    pub transaction_id: Option<String>,
    pub transaction_status: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub counterparty_name: Option<String>,
    pub utility_balance: Option<i64>,
    pub working_balance: Option<i64>,
    pub raw_result: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MpesaTransaction {
    /// Fresh pending record; every response and result field starts empty.
    pub fn pending(
        correlation_id: Uuid,
        short_code: &str,
        category: TransactionCategory,
        account_number: &str,
        amount: i64,
        charge: i64,
        request_payload: JsonValue,
    ) -> Self {
        let now = Utc::now();
        Self {
            correlation_id,
            payment_id: None,
            short_code: short_code.to_string(),
            category,
            account_number: account_number.to_string(),
            bill_reference: None,
            requester: None,
            amount,
            charge,
            identity_type: None,
            identity_number: None,
            request_payload,
            status: TransactionStatus::Pending,
            originator_conversation_id: None,
            conversation_id: None,
            response_code: None,
            response_description: None,
            raw_response: None,
            result_type: None,
            result_code: None,
            result_description: None,
            transaction_id: None,
            transaction_status: None,
            completed_at: None,
            counterparty_name: None,
            utility_balance: None,
            working_balance: None,
            raw_result: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_accepted(&self) -> bool {
        is_accepted_code(self.response_code.as_deref())
    }
}

/// Whether a synchronous `ResponseCode` means the gateway took the request.
pub fn is_accepted_code(code: Option<&str>) -> bool {
    code.map(str::trim) == Some("0")
}

/// Partial update of an [`MpesaTransaction`]; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionUpdate {
    pub status: Option<TransactionStatus>,
    pub originator_conversation_id: Option<String>,
    pub conversation_id: Option<String>,
    pub response_code: Option<String>,
    pub response_description: Option<String>,
    pub raw_response: Option<JsonValue>,
    pub result_type: Option<String>,
    pub result_code: Option<String>,
    pub result_description: Option<String>,
    pub transaction_id: Option<String>,
    pub transaction_status: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub counterparty_name: Option<String>,
    pub utility_balance: Option<i64>,
    pub working_balance: Option<i64>,
    pub raw_result: Option<JsonValue>,
}

impl TransactionUpdate {
    pub fn apply(self, record: &mut MpesaTransaction) {
        if let Some(status) = self.status {
            record.status = record.status.advance(status);
        }
        if let Some(v) = self.originator_conversation_id {
            record.originator_conversation_id = Some(v);
        }
        if let Some(v) = self.conversation_id {
            record.conversation_id = Some(v);
        }
        if let Some(v) = self.response_code {
            record.response_code = Some(v);
        }
        if let Some(v) = self.response_description {
            record.response_description = Some(v);
        }
        if let Some(v) = self.raw_response {
            record.raw_response = Some(v);
        }
        if let Some(v) = self.result_type {
            record.result_type = Some(v);
        }
        if let Some(v) = self.result_code {
            record.result_code = Some(v);
        }
        if let Some(v) = self.result_description {
            record.result_description = Some(v);
        }
        if let Some(v) = self.transaction_id {
            record.transaction_id = Some(v);
        }
        if let Some(v) = self.transaction_status {
            record.transaction_status = Some(v);
        }
        if let Some(v) = self.completed_at {
            record.completed_at = Some(v);
        }
        if let Some(v) = self.counterparty_name {
            record.counterparty_name = Some(v);
        }
        if let Some(v) = self.utility_balance {
            record.utility_balance = Some(v);
        }
        if let Some(v) = self.working_balance {
            record.working_balance = Some(v);
        }
        if let Some(v) = self.raw_result {
            record.raw_result = Some(v);
        }
        record.updated_at = Utc::now();
    }
}

/// A customer-initiated collection (STK push), keyed by `correlation_id` and
/// matched to its callback by `merchant_request_id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FundingRecord {
    pub correlation_id: Uuid,
    pub payment_id: Option<String>,
    pub short_code: String,
    pub mobile_number: String,
    pub amount: i64,
    pub bill_reference: String,
    pub request_payload: JsonValue,
    pub status: TransactionStatus,
    pub merchant_request_id: Option<String>,
    pub checkout_request_id: Option<String>,
    pub response_code: Option<String>,
    pub response_description: Option<String>,
    pub customer_message: Option<String>,
    pub raw_response: Option<JsonValue>,
    pub result_code: Option<String>,
    pub result_description: Option<String>,
    pub mpesa_receipt_number: Option<String>,
    pub transaction_date: Option<DateTime<Utc>>,
    pub raw_result: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FundingRecord {
    pub fn pending(
        correlation_id: Uuid,
        short_code: &str,
        mobile_number: &str,
        amount: i64,
        bill_reference: &str,
        request_payload: JsonValue,
    ) -> Self {
        let now = Utc::now();
        Self {
            correlation_id,
            payment_id: None,
            short_code: short_code.to_string(),
            mobile_number: mobile_number.to_string(),
            amount,
            bill_reference: bill_reference.to_string(),
            request_payload,
            status: TransactionStatus::Pending,
            merchant_request_id: None,
            checkout_request_id: None,
            response_code: None,
            response_description: None,
            customer_message: None,
            raw_response: None,
            result_code: None,
            result_description: None,
            mpesa_receipt_number: None,
            transaction_date: None,
            raw_result: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FundingUpdate {
    pub status: Option<TransactionStatus>,
    pub merchant_request_id: Option<String>,
    pub checkout_request_id: Option<String>,
    pub response_code: Option<String>,
    pub response_description: Option<String>,
    pub customer_message: Option<String>,
    pub raw_response: Option<JsonValue>,
    pub result_code: Option<String>,
    pub result_description: Option<String>,
    pub mpesa_receipt_number: Option<String>,
    pub transaction_date: Option<DateTime<Utc>>,
    pub raw_result: Option<JsonValue>,
}

impl FundingUpdate {
    pub fn apply(self, record: &mut FundingRecord) {
        if let Some(status) = self.status {
            record.status = record.status.advance(status);
        }
        if let Some(v) = self.merchant_request_id {
            record.merchant_request_id = Some(v);
        }
        if let Some(v) = self.checkout_request_id {
            record.checkout_request_id = Some(v);
        }
        if let Some(v) = self.response_code {
            record.response_code = Some(v);
        }
        if let Some(v) = self.response_description {
            record.response_description = Some(v);
        }
        if let Some(v) = self.customer_message {
            record.customer_message = Some(v);
        }
        if let Some(v) = self.raw_response {
            record.raw_response = Some(v);
        }
        if let Some(v) = self.result_code {
            record.result_code = Some(v);
        }
        if let Some(v) = self.result_description {
            record.result_description = Some(v);
        }
        if let Some(v) = self.mpesa_receipt_number {
            record.mpesa_receipt_number = Some(v);
        }
        if let Some(v) = self.transaction_date {
            record.transaction_date = Some(v);
        }
        if let Some(v) = self.raw_result {
            record.raw_result = Some(v);
        }
        record.updated_at = Utc::now();
    }
}

/// Account balances of a short code as reported by the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BalanceSnapshot {
    pub short_code: String,
    pub utility_balance: i64,
    pub working_balance: i64,
    pub uncleared_balance: i64,
    pub captured_at: DateTime<Utc>,
}

/// Why a request builder declined to create a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotCreatedReason {
    InsufficientBalance { available: i64, required: i64 },
    IdentityValidationDisabled,
    OriginalNotFound { payment_id: String },
    Cancelled,
}

impl fmt::Display for NotCreatedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotCreatedReason::InsufficientBalance {
                available,
                required,
            } => write!(
                f,
                "insufficient balance: {} available, {} required",
                available, required
            ),
            NotCreatedReason::IdentityValidationDisabled => {
                f.write_str("disbursement identity validation is not enabled")
            }
            NotCreatedReason::OriginalNotFound { payment_id } => {
                write!(f, "no transaction found for payment {}", payment_id)
            }
            NotCreatedReason::Cancelled => f.write_str("request cancelled before submission"),
        }
    }
}

/// Outcome of a request builder call.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission<T> {
    Created(T),
    NotCreated(NotCreatedReason),
}

impl<T> Submission<T> {
    pub fn is_created(&self) -> bool {
        matches!(self, Submission::Created(_))
    }

    pub fn created(&self) -> Option<&T> {
        match self {
            Submission::Created(record) => Some(record),
            Submission::NotCreated(_) => None,
        }
    }

    pub fn into_created(self) -> Option<T> {
        match self {
            Submission::Created(record) => Some(record),
            Submission::NotCreated(_) => None,
        }
    }

    pub fn reason(&self) -> Option<&NotCreatedReason> {
        match self {
            Submission::Created(_) => None,
            Submission::NotCreated(reason) => Some(reason),
        }
    }
}

/// Outcome of applying an asynchronous result.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation<T> {
    Applied(T),
    /// The record had already been finalized; nothing was written.
    AlreadyFinal(T),
    NoMatch,
}

impl<T> Reconciliation<T> {
    pub fn is_match(&self) -> bool {
        !matches!(self, Reconciliation::NoMatch)
    }

    pub fn record(&self) -> Option<&T> {
        match self {
            Reconciliation::Applied(record) | Reconciliation::AlreadyFinal(record) => Some(record),
            Reconciliation::NoMatch => None,
        }
    }
}

/// Result of an operator (till / paybill) lookup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LookupOutcome {
    pub success: bool,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identification_type_resolves_names() {
        assert_eq!(
            IdentificationType::from_name(" passport "),
            IdentificationType::Passport
        );
        assert_eq!(
            IdentificationType::from_name("MILITARY_ID"),
            IdentificationType::MilitaryId
        );
        assert_eq!(
            IdentificationType::from_name("drivers_licence"),
            IdentificationType::NationalId
        );
        assert_eq!(IdentificationType::Passport.code(), "05");
        assert_eq!(
            serde_json::to_value(IdentificationType::AlienId).unwrap(),
            json!("03")
        );
    }

    #[test]
    fn test_status_never_moves_backwards() {
        let status = TransactionStatus::Completed;
        assert_eq!(
            status.advance(TransactionStatus::Accepted),
            TransactionStatus::Completed
        );
        assert_eq!(
            TransactionStatus::Pending.advance(TransactionStatus::Rejected),
            TransactionStatus::Rejected
        );
        assert_eq!(
            TransactionStatus::Rejected.advance(TransactionStatus::Failed),
            TransactionStatus::Failed
        );
    }

    #[test]
    fn test_category_round_trips_through_str() {
        for category in [
            TransactionCategory::SendMoney,
            TransactionCategory::TaxRemittance,
            TransactionCategory::FundsTransfer,
        ] {
            assert_eq!(category.as_str().parse::<TransactionCategory>(), Ok(category));
        }
        assert!("Airtime".parse::<TransactionCategory>().is_err());
    }

    #[test]
    fn test_update_leaves_unset_fields_alone() {
        let mut record = MpesaTransaction::pending(
            Uuid::now_v7(),
            "600000",
            TransactionCategory::SendMoney,
            "254712345678",
            1000,
            0,
            json!({}),
        );
        record.counterparty_name = Some("JANE DOE".to_string());

        TransactionUpdate {
            status: Some(TransactionStatus::Accepted),
            response_code: Some("0".to_string()),
            ..Default::default()
        }
        .apply(&mut record);

        assert!(record.is_accepted());
        assert_eq!(record.status, TransactionStatus::Accepted);

        record.response_code = Some(" 0 ".to_string());
        assert!(record.is_accepted());
        assert_eq!(record.counterparty_name.as_deref(), Some("JANE DOE"));
    }

    #[test]
    fn test_credential_debug_redacts_secrets() {
        let credentials = CredentialContext {
            account_id: "acc-1".to_string(),
            consumer_key: "key".to_string(),
            consumer_secret: "very-secret".to_string(),
            short_code: "600000".to_string(),
            initiator: "api".to_string(),
            initiator_password: "hunter2".to_string(),
            pass_key: Some("passkey".to_string()),
            allow_identity_validation: false,
        };
        let rendered = format!("{:?}", credentials);
        assert!(!rendered.contains("very-secret"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("600000"));
    }
}
