use serde_json::json;
use tracing::warn;
use uuid::Uuid;

use super::{with_options, Daraja, RequestOptions};
use crate::database::TransactionLookup;
use crate::error::DarajaResult;
use crate::payments::client::Endpoint;
use crate::payments::types::{
    CredentialContext, MpesaTransaction, NotCreatedReason, Submission, TransactionCategory,
};

/// Status query for an earlier payment, identified by its payment id.
pub struct StatusQuery<'a> {
    daraja: &'a Daraja,
    credentials: &'a CredentialContext,
}

impl<'a> StatusQuery<'a> {
    pub(super) fn new(daraja: &'a Daraja, credentials: &'a CredentialContext) -> Self {
        Self {
            daraja,
            credentials,
        }
    }

    /// Query the latest disbursement or business payment made for
    /// `payment_id`.
    pub async fn query(
        &self,
        payment_id: &str,
        options: RequestOptions,
    ) -> DarajaResult<Submission<MpesaTransaction>> {
        let original = self
            .daraja
            .ledger
            .find_transaction(&TransactionLookup::LatestPayment {
                payment_id: payment_id.to_string(),
                categories: TransactionCategory::status_queryable(),
            })
            .await?;

        let Some(original) = original else {
            warn!(payment_id = %payment_id, "no transaction to query status for");
            return Ok(Submission::NotCreated(NotCreatedReason::OriginalNotFound {
                payment_id: payment_id.to_string(),
            }));
        };

        let callbacks = &self.daraja.config.callbacks;
        let correlation_id = Uuid::now_v7();
        let original_conversation_id = original
            .originator_conversation_id
            .clone()
            .unwrap_or_else(|| original.correlation_id.to_string());

        let payload = json!({
            "Initiator": self.credentials.initiator,
            "SecurityCredential": self.daraja.security_credential(self.credentials)?,
            "CommandID": "TransactionStatusQuery",
            "TransactionID": "",
            "OriginalConversationID": original_conversation_id,
            "PartyA": self.credentials.short_code,
            "IdentifierType": "4",
            "ResultURL": self.daraja.result_url(
                &callbacks.transaction_query,
                &correlation_id,
                false,
                &options,
            ),
            "QueueTimeOutURL": callbacks.timeout,
            "Remarks": "OK",
            "Occasion": "OK",
        });

        let mut record = with_options(
            MpesaTransaction::pending(
                correlation_id,
                &self.credentials.short_code,
                TransactionCategory::TransactionStatus,
                &original.account_number,
                original.amount,
                0,
                payload,
            ),
            &options,
        );
        record.payment_id = Some(payment_id.to_string());

        self.daraja
            .submit(self.credentials, Endpoint::TransactionStatus, record, &options)
            .await
    }
}
