use serde_json::json;
use tracing::info;

use super::{Daraja, RequestOptions};
use crate::error::DarajaResult;
use crate::payments::client::Endpoint;
use crate::payments::response::SyncResponse;
use crate::payments::types::CredentialContext;

/// Account balance query. The balances arrive later as a result, see
/// [`ResultReconciler::record_balance`](crate::payments::ResultReconciler::record_balance).
pub struct BalanceQuery<'a> {
    daraja: &'a Daraja,
    credentials: &'a CredentialContext,
}

impl<'a> BalanceQuery<'a> {
    pub(super) fn new(daraja: &'a Daraja, credentials: &'a CredentialContext) -> Self {
        Self {
            daraja,
            credentials,
        }
    }

    /// Ask the gateway to post the current balances. Nothing is recorded;
    /// gateway failures are returned to the caller.
    pub async fn check(&self, options: RequestOptions) -> DarajaResult<SyncResponse> {
        let callbacks = &self.daraja.config.callbacks;
        let payload = json!({
            "Initiator": self.credentials.initiator,
            "SecurityCredential": self.daraja.security_credential(self.credentials)?,
            "CommandID": "AccountBalance",
            "PartyA": self.credentials.short_code,
            "IdentifierType": "4",
            "Remarks": "Account balance",
            "QueueTimeOutURL": callbacks.timeout,
            "ResultURL": options.result_url.as_deref().unwrap_or(&callbacks.balance),
        });

        let body = self
            .daraja
            .client
            .call(self.credentials, Endpoint::AccountBalance, Some(&payload))
            .await?;
        let response = SyncResponse::from_value(&body);

        info!(
            short_code = %self.credentials.short_code,
            accepted = response.is_accepted(),
            "balance query sent"
        );
        Ok(response)
    }
}
