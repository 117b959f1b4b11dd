use chrono::Utc;
use serde_json::json;
use uuid::Uuid;

use super::{Daraja, RequestOptions};
use crate::error::DarajaResult;
use crate::payments::error::CredentialError;
use crate::payments::types::{CredentialContext, FundingRecord, Submission};
use crate::payments::utils::{normalize_msisdn, stk_password, stk_timestamp, to_major_units};

/// Customer to business collections via STK push.
pub struct Collection<'a> {
    daraja: &'a Daraja,
    credentials: &'a CredentialContext,
}

impl<'a> Collection<'a> {
    pub(super) fn new(daraja: &'a Daraja, credentials: &'a CredentialContext) -> Self {
        Self {
            daraja,
            credentials,
        }
    }

    /// Prompt `mobile` to pay `amount` (minor units) into the short code.
    ///
    /// The funding is matched to its callback by the MerchantRequestID the
    /// gateway returns, so a rejected push is never reconciled.
    pub async fn send(
        &self,
        mobile: &str,
        amount: i64,
        account_reference: &str,
        options: RequestOptions,
    ) -> DarajaResult<Submission<FundingRecord>> {
        let whole = to_major_units(amount)?;
        let pass_key = self.credentials.pass_key.as_deref().ok_or_else(|| {
            CredentialError::Unavailable(format!(
                "no STK pass key for short code {}",
                self.credentials.short_code
            ))
        })?;

        let timestamp = stk_timestamp(Utc::now());
        let short_code = &self.credentials.short_code;
        let msisdn = normalize_msisdn(mobile);

        let payload = json!({
            "BusinessShortCode": short_code,
            "Password": stk_password(short_code, pass_key, &timestamp),
            "Timestamp": timestamp,
            "TransactionType": "CustomerPayBillOnline",
            "Amount": whole,
            "PartyA": msisdn,
            "PartyB": short_code,
            "PhoneNumber": msisdn,
            "CallBackURL": options
                .result_url
                .clone()
                .unwrap_or_else(|| self.daraja.config.callbacks.stk.clone()),
            "AccountReference": account_reference,
            "TransactionDesc": "top up",
        });

        let mut record = FundingRecord::pending(
            Uuid::now_v7(),
            short_code,
            &msisdn,
            amount,
            account_reference,
            payload,
        );
        record.payment_id = options.payment_id.clone();

        self.daraja
            .submit_funding(self.credentials, record, &options)
            .await
    }
}
