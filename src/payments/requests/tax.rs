use serde_json::json;
use uuid::Uuid;

use super::{echoed_record, Daraja, Funds, RequestOptions};
use crate::error::DarajaResult;
use crate::payments::client::Endpoint;
use crate::payments::types::{CredentialContext, MpesaTransaction, Submission, TransactionCategory};
use crate::payments::utils::to_major_units;
use crate::services::charge_bands::ChargeCategory;

/// KRA's collection short code.
pub const KRA_SHORT_CODE: &str = "572572";

/// Tax payments to KRA, paid from the working account.
pub struct TaxRemittance<'a> {
    daraja: &'a Daraja,
    credentials: &'a CredentialContext,
}

impl<'a> TaxRemittance<'a> {
    pub(super) fn new(daraja: &'a Daraja, credentials: &'a CredentialContext) -> Self {
        Self {
            daraja,
            credentials,
        }
    }

    /// Remit `amount` against the KRA payment registration number
    /// `account_reference`.
    pub async fn remit(
        &self,
        amount: i64,
        account_reference: &str,
        options: RequestOptions,
    ) -> DarajaResult<Submission<MpesaTransaction>> {
        let whole = to_major_units(amount)?;

        let charge = match self
            .daraja
            .check_funds(self.credentials, amount, ChargeCategory::Business)
            .await?
        {
            Funds::Covered { charge } => charge,
            Funds::Short(reason) => return Ok(Submission::NotCreated(reason)),
        };

        let callbacks = &self.daraja.config.callbacks;
        let correlation_id = Uuid::now_v7();

        let payload = json!({
            "OriginatorConversationID": correlation_id.to_string(),
            "Initiator": self.credentials.initiator,
            "SecurityCredential": self.daraja.security_credential(self.credentials)?,
            "CommandID": "PayTaxToKRA",
            "SenderIdentifierType": "4",
            "RecieverIdentifierType": "4",
            "Amount": whole,
            "AccountReference": account_reference,
            "PartyA": self.credentials.short_code,
            "PartyB": KRA_SHORT_CODE,
            "Remarks": "tax remittance",
            "QueueTimeOutURL": callbacks.timeout,
            "ResultURL": self.daraja.result_url(&callbacks.tax, &correlation_id, true, &options),
        });

        let mut record = echoed_record(
            MpesaTransaction::pending(
                correlation_id,
                &self.credentials.short_code,
                TransactionCategory::TaxRemittance,
                KRA_SHORT_CODE,
                amount,
                charge,
                payload,
            ),
            &options,
        );
        record.bill_reference = Some(account_reference.to_string());

        self.daraja
            .submit(self.credentials, Endpoint::RemitTax, record, &options)
            .await
    }
}
