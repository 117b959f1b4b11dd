use serde_json::json;
use uuid::Uuid;

use super::{with_options, Daraja, RequestOptions};
use crate::error::DarajaResult;
use crate::payments::client::Endpoint;
use crate::payments::types::{CredentialContext, MpesaTransaction, Submission, TransactionCategory};
use crate::payments::utils::to_major_units;

/// Identifier type the gateway expects for the reversing organization.
const ORGANIZATION: &str = "11";

pub struct ReversalRequest<'a> {
    daraja: &'a Daraja,
    credentials: &'a CredentialContext,
}

impl<'a> ReversalRequest<'a> {
    pub(super) fn new(daraja: &'a Daraja, credentials: &'a CredentialContext) -> Self {
        Self {
            daraja,
            credentials,
        }
    }

    /// Reverse the M-Pesa transaction `transaction_id` of `amount` minor units.
    pub async fn request(
        &self,
        transaction_id: &str,
        amount: i64,
        options: RequestOptions,
    ) -> DarajaResult<Submission<MpesaTransaction>> {
        let whole = to_major_units(amount)?;
        let callbacks = &self.daraja.config.callbacks;
        let correlation_id = Uuid::now_v7();

        let payload = json!({
            "Initiator": self.credentials.initiator,
            "SecurityCredential": self.daraja.security_credential(self.credentials)?,
            "CommandID": "TransactionReversal",
            "TransactionID": transaction_id,
            "Amount": whole,
            "ReceiverParty": self.credentials.short_code,
            "RecieverIdentifierType": ORGANIZATION,
            "ResultURL": self.daraja.result_url(&callbacks.reversal, &correlation_id, false, &options),
            "QueueTimeOutURL": callbacks.timeout,
            "Remarks": "Reversal",
            "Occasion": "Reversal",
        });

        let record = with_options(
            MpesaTransaction::pending(
                correlation_id,
                &self.credentials.short_code,
                TransactionCategory::Reversal,
                "0",
                amount,
                0,
                payload,
            ),
            &options,
        );

        self.daraja
            .submit(self.credentials, Endpoint::Reversal, record, &options)
            .await
    }
}
