use serde_json::json;
use uuid::Uuid;

use super::{echoed_record, Daraja, Funds, RequestOptions};
use crate::error::DarajaResult;
use crate::payments::client::Endpoint;
use crate::payments::types::{
    CredentialContext, IdentificationType, MpesaTransaction, NotCreatedReason, Submission,
    TransactionCategory,
};
use crate::payments::utils::{normalize_msisdn, to_major_units};
use crate::services::charge_bands::ChargeCategory;

const COMMAND_ID: &str = "SalaryPayment";
const REMARKS: &str = "send to mobile";

/// Business to customer payouts, paid from the utility account.
pub struct Disbursement<'a> {
    daraja: &'a Daraja,
    credentials: &'a CredentialContext,
}

impl<'a> Disbursement<'a> {
    pub(super) fn new(daraja: &'a Daraja, credentials: &'a CredentialContext) -> Self {
        Self {
            daraja,
            credentials,
        }
    }

    /// Send `amount` (minor units) to `recipient`.
    pub async fn pay(
        &self,
        recipient: &str,
        amount: i64,
        options: RequestOptions,
    ) -> DarajaResult<Submission<MpesaTransaction>> {
        self.send(recipient, amount, None, options).await
    }

    /// Send `amount` to `recipient` only if the gateway can match the
    /// recipient to the given identity document. `id_type` is a document
    /// name such as `"PASSPORT"`; unknown names mean a national id.
    pub async fn pay_with_id(
        &self,
        recipient: &str,
        amount: i64,
        id_type: &str,
        id_number: &str,
        options: RequestOptions,
    ) -> DarajaResult<Submission<MpesaTransaction>> {
        if !self.credentials.allow_identity_validation {
            return Ok(Submission::NotCreated(
                NotCreatedReason::IdentityValidationDisabled,
            ));
        }

        let identity = (IdentificationType::from_name(id_type), id_number);
        self.send(recipient, amount, Some(identity), options).await
    }

    async fn send(
        &self,
        recipient: &str,
        amount: i64,
        identity: Option<(IdentificationType, &str)>,
        options: RequestOptions,
    ) -> DarajaResult<Submission<MpesaTransaction>> {
        let whole = to_major_units(amount)?;

        let charge = match self
            .daraja
            .check_funds(self.credentials, amount, ChargeCategory::Mobile)
            .await?
        {
            Funds::Covered { charge } => charge,
            Funds::Short(reason) => return Ok(Submission::NotCreated(reason)),
        };

        let correlation_id = Uuid::now_v7();
        let callbacks = &self.daraja.config.callbacks;
        let msisdn = normalize_msisdn(recipient);

        let mut payload = json!({
            "OriginatorConversationID": correlation_id.to_string(),
            "InitiatorName": self.credentials.initiator,
            "SecurityCredential": self.daraja.security_credential(self.credentials)?,
            "CommandID": COMMAND_ID,
            "Amount": whole,
            "PartyA": self.credentials.short_code,
            "PartyB": msisdn,
            "Remarks": REMARKS,
            "QueueTimeOutURL": callbacks.timeout,
            "ResultURL": self.daraja.result_url(&callbacks.mobile, &correlation_id, true, &options),
            "Occasion": REMARKS,
        });
        if let Some((id_type, id_number)) = identity {
            payload["IDType"] = json!(id_type.code());
            payload["IDNumber"] = json!(id_number);
        }

        let mut record = echoed_record(
            MpesaTransaction::pending(
                correlation_id,
                &self.credentials.short_code,
                TransactionCategory::SendMoney,
                &msisdn,
                amount,
                charge,
                payload,
            ),
            &options,
        );

        let endpoint = match identity {
            Some((id_type, id_number)) => {
                record.identity_type = Some(id_type);
                record.identity_number = Some(id_number.to_string());
                Endpoint::ValidatedDisbursement
            }
            None => Endpoint::Disbursement,
        };

        self.daraja
            .submit(self.credentials, endpoint, record, &options)
            .await
    }
}
