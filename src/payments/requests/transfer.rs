use serde_json::json;
use uuid::Uuid;

use super::{echoed_record, Daraja, RequestOptions};
use crate::error::DarajaResult;
use crate::payments::client::Endpoint;
use crate::payments::types::{CredentialContext, MpesaTransaction, Submission, TransactionCategory};
use crate::payments::utils::to_major_units;

const WORKING_TO_UTILITY: &str = "BusinessTransferFromMMFToUtility";
const UTILITY_TO_WORKING: &str = "OrgRevenueSettlement";

/// Moves between the working and utility accounts of the same short code.
pub struct FundsTransfer<'a> {
    daraja: &'a Daraja,
    credentials: &'a CredentialContext,
}

impl<'a> FundsTransfer<'a> {
    pub(super) fn new(daraja: &'a Daraja, credentials: &'a CredentialContext) -> Self {
        Self {
            daraja,
            credentials,
        }
    }

    pub async fn working_to_utility(
        &self,
        amount: i64,
        options: RequestOptions,
    ) -> DarajaResult<Submission<MpesaTransaction>> {
        self.send(WORKING_TO_UTILITY, amount, options).await
    }

    pub async fn utility_to_working(
        &self,
        amount: i64,
        options: RequestOptions,
    ) -> DarajaResult<Submission<MpesaTransaction>> {
        self.send(UTILITY_TO_WORKING, amount, options).await
    }

    async fn send(
        &self,
        command_id: &str,
        amount: i64,
        options: RequestOptions,
    ) -> DarajaResult<Submission<MpesaTransaction>> {
        let whole = to_major_units(amount)?;
        let callbacks = &self.daraja.config.callbacks;
        let short_code = &self.credentials.short_code;
        let correlation_id = Uuid::now_v7();

        let payload = json!({
            "OriginatorConversationID": correlation_id.to_string(),
            "Initiator": self.credentials.initiator,
            "SecurityCredential": self.daraja.security_credential(self.credentials)?,
            "CommandID": command_id,
            "SenderIdentifierType": "4",
            "RecieverIdentifierType": "4",
            "Amount": whole,
            "PartyA": short_code,
            "PartyB": short_code,
            "Remarks": "Funds movement",
            "QueueTimeOutURL": callbacks.timeout,
            "ResultURL": self.daraja.result_url(
                &callbacks.funds_transfer,
                &correlation_id,
                false,
                &options,
            ),
        });

        let record = echoed_record(
            MpesaTransaction::pending(
                correlation_id,
                short_code,
                TransactionCategory::FundsTransfer,
                short_code,
                amount,
                0,
                payload,
            ),
            &options,
        );

        self.daraja
            .submit(self.credentials, Endpoint::BusinessPayment, record, &options)
            .await
    }
}
