//! Gateway result code tables.
//!
//! Callers use these to decide what to show a customer and whether a failed
//! transaction is worth submitting again. Nothing here retries on its own.

/// Result codes of disbursement and business payment results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisbursementResultCode {
    Success,
    InsufficientBalance,
    SystemError,
    ExternalValidationFailed,
    ProductAssignmentError,
    UnresolvedReason,
    CreditPartyUnsupported,
    OrganizationNotChild,
    AccountNumberInvalid,
    OperatorNotExist,
    LimitRuleMinimum,
    LimitRuleMaximum,
    ReceiverInvalid,
    LimitRuleBalance,
    DebitPartyInvalid,
    CreditPartyInvalid,
    InitiatorNotAllowed,
    AccountReferenceInvalid,
    InitiatorInvalid,
    AccountRuleDeclined,
    InvalidAmountFormat,
    MsisdnInvalid,
    SecurityCredentialLocked,
    IdTypeNotFound,
    IdNumberMismatch,
}

impl DisbursementResultCode {
    pub fn from_code(code: &str) -> Option<Self> {
        use DisbursementResultCode::*;

        let code = match code.trim() {
            "0" => Success,
            "1" => InsufficientBalance,
            "2" => LimitRuleMinimum,
            "3" => LimitRuleMaximum,
            "7" => ReceiverInvalid,
            "8" => LimitRuleBalance,
            "11" => DebitPartyInvalid,
            "14" => CreditPartyInvalid,
            "17" => SystemError,
            "21" => InitiatorNotAllowed,
            "1005" => AccountReferenceInvalid,
            "2001" => InitiatorInvalid,
            "2006" => AccountRuleDeclined,
            "2007" => ExternalValidationFailed,
            "2020" => InvalidAmountFormat,
            "2028" => ProductAssignmentError,
            "2029" => UnresolvedReason,
            "2040" => CreditPartyUnsupported,
            "2043" => OrganizationNotChild,
            "2051" => MsisdnInvalid,
            "2202" => AccountNumberInvalid,
            "8006" => SecurityCredentialLocked,
            "SFC_IC0003" => OperatorNotExist,
            "R002" => IdTypeNotFound,
            "R003" => IdNumberMismatch,
            _ => return None,
        };
        Some(code)
    }

    pub fn customer_message(&self) -> &'static str {
        use DisbursementResultCode::*;

        match self {
            Success => "The transaction was successful.",
            InsufficientBalance => "You have insufficient balance for this transaction.",
            SystemError => "A system error occurred. Please try again later.",
            ExternalValidationFailed => "Transaction validation failed. Please check details.",
            ProductAssignmentError => "This transaction is not permitted for your account type.",
            UnresolvedReason => "An unknown error occurred. Please contact support.",
            CreditPartyUnsupported => "The recipient account type is not supported.",
            OrganizationNotChild => "Your organization is not linked to the initiator.",
            AccountNumberInvalid => "Invalid account number. Please check and retry.",
            OperatorNotExist => "The specified mobile/till/paybill number does not exist.",
            LimitRuleMinimum => "The amount is below the minimum transaction limit.",
            LimitRuleMaximum => "The amount exceeds the maximum transaction limit.",
            ReceiverInvalid => "Invalid recipient details. Please check and try again.",
            LimitRuleBalance => "Transaction would exceed the maximum account holding balance.",
            DebitPartyInvalid => "The sender account is in an invalid state.",
            CreditPartyInvalid => "The recipient account is in an invalid state.",
            InitiatorNotAllowed => "You are not authorized to perform this transaction.",
            AccountReferenceInvalid => "Invalid account reference provided.",
            InitiatorInvalid => "Your authentication credentials are incorrect.",
            AccountRuleDeclined => "Your account status does not allow this transaction.",
            InvalidAmountFormat => "Invalid amount format. Please enter a valid number.",
            MsisdnInvalid => "Invalid phone number format.",
            SecurityCredentialLocked => {
                "Your authentication credentials are locked. Contact support."
            }
            IdTypeNotFound => "ID type not found for the customer.",
            IdNumberMismatch => "Invalid ID number provided.",
        }
    }

    pub fn should_retry(&self) -> bool {
        matches!(
            self,
            DisbursementResultCode::SystemError | DisbursementResultCode::UnresolvedReason
        )
    }
}

/// Result codes of STK push collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionStatusCode {
    Success,
    InsufficientBalance,
    DailyLimitExceeded,
    DuplicateOriginatorConversationId,
    SystemInternalError,
    InitiatorNotAllowed,
    SystemBusy,
    TransactionInProgress,
    TransactionExpired,
    PushRequestError,
    RequestCancelledByUser,
    SmscAckTimeout,
    DsTimeoutUserUnreachable,
    InvalidPromptMessagePrefix,
    InvalidAuthenticationMessage,
    InvalidInitiatorInfo,
    AuthenticationFailed,
    ChannelSessionExpired,
    RequestNotPermitted,
    SecurityCredentialLocked,
    InternalError,
    StorageObjectSaveFailure,
}

impl CollectionStatusCode {
    pub fn from_code(code: &str) -> Option<Self> {
        use CollectionStatusCode::*;

        let code = match code.trim() {
            "0" => Success,
            "1" => InsufficientBalance,
            "4" => DailyLimitExceeded,
            "15" => DuplicateOriginatorConversationId,
            "17" => SystemInternalError,
            "21" => InitiatorNotAllowed,
            "26" => SystemBusy,
            "1001" => TransactionInProgress,
            "1019" => TransactionExpired,
            "1025" => PushRequestError,
            "1031" => RequestCancelledByUser,
            "1036" => SmscAckTimeout,
            "1037" => DsTimeoutUserUnreachable,
            "1101" => InvalidPromptMessagePrefix,
            "1102" => InvalidAuthenticationMessage,
            "2001" => InvalidInitiatorInfo,
            "2008" => AuthenticationFailed,
            "2026" => ChannelSessionExpired,
            "2028" => RequestNotPermitted,
            "8006" => SecurityCredentialLocked,
            "9999" => InternalError,
            "100000100" => StorageObjectSaveFailure,
            _ => return None,
        };
        Some(code)
    }

    pub fn customer_message(&self) -> &'static str {
        use CollectionStatusCode::*;

        match self {
            Success => "Request is processed successfully.",
            InsufficientBalance => "The balance is insufficient for the transaction.",
            DailyLimitExceeded => "Transaction would exceed the daily transfer limit.",
            DuplicateOriginatorConversationId => "Duplicate OriginatorConversationID.",
            SystemBusy => "System busy. The service request is rejected.",
            TransactionInProgress => {
                "Unable to lock subscriber, a transaction is already in process for the current subscriber."
            }
            TransactionExpired => "Transaction has expired.",
            PushRequestError => "Error Occurred while sending push request.",
            RequestCancelledByUser => "Request cancelled by user.",
            SmscAckTimeout | DsTimeoutUserUnreachable => {
                "Transaction failed. Session timed out, user cannot be reached."
            }
            InvalidInitiatorInfo => "The initiator information is invalid.",
            AuthenticationFailed => "Authentication Failed.",
            ChannelSessionExpired => "Transaction failed, session has expired.",
            RequestNotPermitted => "Transaction failed. We are unable to process this request.",
            SecurityCredentialLocked
            | SystemInternalError
            | InvalidPromptMessagePrefix
            | InvalidAuthenticationMessage
            | InitiatorNotAllowed
            | StorageObjectSaveFailure => {
                "Transaction failed. Unable to complete request due to a system error."
            }
            InternalError => "An error occurred while executing the transaction.",
        }
    }

    pub fn should_retry(&self) -> bool {
        use CollectionStatusCode::*;

        matches!(
            self,
            SystemInternalError
                | SystemBusy
                | SmscAckTimeout
                | DsTimeoutUserUnreachable
                | PushRequestError
                | ChannelSessionExpired
        )
    }
}
