use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use super::{echoed_record, Daraja, Funds, RequestOptions};
use crate::error::DarajaResult;
use crate::payments::client::Endpoint;
use crate::payments::types::{CredentialContext, MpesaTransaction, Submission, TransactionCategory};
use crate::payments::utils::{normalize_msisdn, to_major_units};
use crate::services::charge_bands::ChargeCategory;

/// Identifier type of a short code.
const SHORT_CODE: &str = "4";
/// Identifier type of a till number.
const TILL_NUMBER: &str = "2";

/// Business to business payments from the working account.
pub struct BusinessPayment<'a> {
    daraja: &'a Daraja,
    credentials: &'a CredentialContext,
}

/// One business payment, before pricing.
struct Order<'r> {
    category: TransactionCategory,
    recipient: String,
    amount: i64,
    requester: Option<&'r str>,
    account_reference: Option<&'r str>,
}

impl<'a> BusinessPayment<'a> {
    pub(super) fn new(daraja: &'a Daraja, credentials: &'a CredentialContext) -> Self {
        Self {
            daraja,
            credentials,
        }
    }

    /// Pay a till number (Buy Goods).
    pub async fn till(
        &self,
        till: &str,
        requester: &str,
        amount: i64,
        options: RequestOptions,
    ) -> DarajaResult<Submission<MpesaTransaction>> {
        let order = Order {
            category: TransactionCategory::BuyGoods,
            recipient: till.trim().to_string(),
            amount,
            requester: Some(requester),
            account_reference: None,
        };
        self.send(order, options).await
    }

    /// Pay a paybill number against `account_reference`.
    pub async fn paybill(
        &self,
        paybill: &str,
        requester: &str,
        amount: i64,
        account_reference: &str,
        options: RequestOptions,
    ) -> DarajaResult<Submission<MpesaTransaction>> {
        let order = Order {
            category: TransactionCategory::PayBill,
            recipient: paybill.trim().to_string(),
            amount,
            requester: Some(requester),
            account_reference: Some(account_reference),
        };
        self.send(order, options).await
    }

    /// Pay a Pochi la Biashara mobile wallet.
    pub async fn pochi(
        &self,
        recipient: &str,
        amount: i64,
        options: RequestOptions,
    ) -> DarajaResult<Submission<MpesaTransaction>> {
        let order = Order {
            category: TransactionCategory::Pochi,
            recipient: normalize_msisdn(recipient),
            amount,
            requester: None,
            account_reference: None,
        };
        self.send(order, options).await
    }

    async fn send(
        &self,
        order: Order<'_>,
        options: RequestOptions,
    ) -> DarajaResult<Submission<MpesaTransaction>> {
        let whole = to_major_units(order.amount)?;

        let charge = match self
            .daraja
            .check_funds(self.credentials, order.amount, ChargeCategory::Business)
            .await?
        {
            Funds::Covered { charge } => charge,
            Funds::Short(reason) => return Ok(Submission::NotCreated(reason)),
        };

        let correlation_id = Uuid::now_v7();
        let payload = self.payload(&order, whole, &correlation_id, &options)?;

        let mut record = echoed_record(
            MpesaTransaction::pending(
                correlation_id,
                &self.credentials.short_code,
                order.category,
                &order.recipient,
                order.amount,
                charge,
                payload,
            ),
            &options,
        );
        record.requester = order.requester.map(str::to_string);
        record.bill_reference = order.account_reference.map(str::to_string);

        self.daraja
            .submit(self.credentials, Endpoint::BusinessPayment, record, &options)
            .await
    }

    fn payload(
        &self,
        order: &Order<'_>,
        whole: i64,
        correlation_id: &Uuid,
        options: &RequestOptions,
    ) -> DarajaResult<JsonValue> {
        let callbacks = &self.daraja.config.callbacks;
        let credential = self.daraja.security_credential(self.credentials)?;

        let payload = match order.category {
            TransactionCategory::Pochi => json!({
                "OriginatorConversationID": correlation_id.to_string(),
                "InitiatorName": self.credentials.initiator,
                "SecurityCredential": credential,
                "CommandID": "BusinessPayToPochi",
                "Amount": whole,
                "PartyA": self.credentials.short_code,
                "PartyB": order.recipient,
                "Remarks": "pochi payment",
                "QueueTimeOutURL": callbacks.timeout,
                "ResultURL": self.daraja.result_url(&callbacks.mobile, correlation_id, true, options),
                "Occassion": "pochi payment",
            }),
            TransactionCategory::PayBill => json!({
                "OriginatorConversationID": correlation_id.to_string(),
                "Initiator": self.credentials.initiator,
                "SecurityCredential": credential,
                "CommandID": "BusinessPayBill",
                "SenderIdentifierType": SHORT_CODE,
                "RecieverIdentifierType": SHORT_CODE,
                "Amount": whole,
                "AccountReference": order.account_reference,
                "PartyA": self.credentials.short_code,
                "PartyB": order.recipient,
                "Requester": order.requester,
                "Remarks": "paybill payment",
                "QueueTimeOutURL": callbacks.timeout,
                "ResultURL": self.daraja.result_url(&callbacks.paybill, correlation_id, true, options),
            }),
            _ => json!({
                "OriginatorConversationID": correlation_id.to_string(),
                "Initiator": self.credentials.initiator,
                "SecurityCredential": credential,
                "CommandID": "BusinessBuyGoods",
                "SenderIdentifierType": SHORT_CODE,
                "RecieverIdentifierType": TILL_NUMBER,
                "Amount": whole,
                "PartyA": self.credentials.short_code,
                "PartyB": order.recipient,
                "Requester": order.requester,
                "Remarks": "till payment",
                "QueueTimeOutURL": callbacks.timeout,
                "ResultURL": self.daraja.result_url(&callbacks.till, correlation_id, true, options),
            }),
        };

        Ok(payload)
    }
}
