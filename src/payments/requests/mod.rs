//! Request builders
//!
//! [`Daraja`] hands out one builder per transaction family. Money-moving
//! builders follow the same steps: price the charge, check the last known
//! balance, obtain a bearer token, record a pending transaction, call the
//! gateway and fold the synchronous acknowledgement into the record. Gateway failures end up on
//! the record as a rejection; only local failures are returned as errors.

mod balance;
mod business;
mod collection;
mod disbursement;
mod lookup;
mod reversal;
mod status;
mod tax;
mod transfer;

pub use balance::BalanceQuery;
pub use business::BusinessPayment;
pub use collection::Collection;
pub use disbursement::Disbursement;
pub use lookup::OperatorLookup;
pub use reversal::ReversalRequest;
pub use status::StatusQuery;
pub use tax::TaxRemittance;
pub use transfer::FundsTransfer;

use chrono::Utc;
use serde_json::{json, Value as JsonValue};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::DarajaConfig;
use crate::database::TransactionLedger;
use crate::error::{DarajaError, DarajaResult};
use crate::logging::mask_msisdn;
use crate::payments::client::{DarajaClient, Endpoint};
use crate::payments::error::{GatewayError, GatewayResult};
use crate::payments::reconciler::ResultReconciler;
use crate::payments::response::SyncResponse;
use crate::payments::security::SecurityCredential;
use crate::payments::token::TokenCache;
use crate::payments::types::{
    CredentialContext, FundingRecord, FundingUpdate, MpesaTransaction, NotCreatedReason,
    Submission, TransactionStatus, TransactionUpdate,
};
use crate::payments::utils;
use crate::services::charge_bands::{ChargeBandEngine, ChargeCategory};

/// Per-call options shared by all builders.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Caller's business reference, stored on the record.
    pub payment_id: Option<String>,
    /// Replaces the configured result URL for this call.
    pub result_url: Option<String>,
    pub cancel: Option<CancellationToken>,
}

impl RequestOptions {
    pub fn with_payment_id(mut self, payment_id: impl Into<String>) -> Self {
        self.payment_id = Some(payment_id.into());
        self
    }

    pub fn with_result_url(mut self, url: impl Into<String>) -> Self {
        self.result_url = Some(url.into());
        self
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|token| token.is_cancelled())
    }
}

/// Outcome of the pre-submission funds check.
enum Funds {
    Covered { charge: i64 },
    Short(NotCreatedReason),
}

/// Entry point for all gateway requests of a deployment.
#[derive(Clone)]
pub struct Daraja {
    client: Arc<DarajaClient>,
    ledger: Arc<dyn TransactionLedger>,
    charges: Arc<ChargeBandEngine>,
    security: Arc<dyn SecurityCredential>,
    config: Arc<DarajaConfig>,
}

impl Daraja {
    pub fn new(
        config: DarajaConfig,
        ledger: Arc<dyn TransactionLedger>,
        charges: Arc<ChargeBandEngine>,
        security: Arc<dyn SecurityCredential>,
    ) -> GatewayResult<Self> {
        let client = DarajaClient::new(&config, Arc::new(TokenCache::new()))?;
        Ok(Self {
            client: Arc::new(client),
            ledger,
            charges,
            security,
            config: Arc::new(config),
        })
    }

    pub fn client(&self) -> &Arc<DarajaClient> {
        &self.client
    }

    pub fn ledger(&self) -> &Arc<dyn TransactionLedger> {
        &self.ledger
    }

    pub fn charges(&self) -> &Arc<ChargeBandEngine> {
        &self.charges
    }

    pub fn config(&self) -> &DarajaConfig {
        &self.config
    }

    /// Reconciler over the same ledger.
    pub fn reconciler(&self) -> ResultReconciler {
        ResultReconciler::new(self.ledger.clone())
    }

    pub fn b2c<'a>(&'a self, credentials: &'a CredentialContext) -> Disbursement<'a> {
        Disbursement::new(self, credentials)
    }

    pub fn b2b<'a>(&'a self, credentials: &'a CredentialContext) -> BusinessPayment<'a> {
        BusinessPayment::new(self, credentials)
    }

    pub fn c2b<'a>(&'a self, credentials: &'a CredentialContext) -> Collection<'a> {
        Collection::new(self, credentials)
    }

    pub fn balance<'a>(&'a self, credentials: &'a CredentialContext) -> BalanceQuery<'a> {
        BalanceQuery::new(self, credentials)
    }

    pub fn reversal<'a>(&'a self, credentials: &'a CredentialContext) -> ReversalRequest<'a> {
        ReversalRequest::new(self, credentials)
    }

    pub fn transaction_status<'a>(&'a self, credentials: &'a CredentialContext) -> StatusQuery<'a> {
        StatusQuery::new(self, credentials)
    }

    pub fn transfer<'a>(&'a self, credentials: &'a CredentialContext) -> FundsTransfer<'a> {
        FundsTransfer::new(self, credentials)
    }

    pub fn tax<'a>(&'a self, credentials: &'a CredentialContext) -> TaxRemittance<'a> {
        TaxRemittance::new(self, credentials)
    }

    pub fn mno_lookup<'a>(&'a self, credentials: &'a CredentialContext) -> OperatorLookup<'a> {
        OperatorLookup::new(self, credentials)
    }

    fn security_credential(&self, credentials: &CredentialContext) -> DarajaResult<String> {
        Ok(self.security.encrypt(&credentials.initiator_password)?)
    }

    fn result_url(
        &self,
        base: &str,
        correlation_id: &Uuid,
        append: bool,
        options: &RequestOptions,
    ) -> String {
        let base = options.result_url.as_deref().unwrap_or(base);
        utils::result_url(
            base,
            correlation_id,
            append && self.config.append_correlation_to_result_url,
        )
    }

    /// Price `amount` and compare it with the account it is paid from.
    ///
    /// Uses the last recorded snapshot, which may already be stale; the
    /// gateway has the final say.
    async fn check_funds(
        &self,
        credentials: &CredentialContext,
        amount: i64,
        category: ChargeCategory,
    ) -> DarajaResult<Funds> {
        let charge = self
            .charges
            .charge_for(amount, category, Utc::now().date_naive())
            .await?;

        let snapshot = self.ledger.latest_balance(&credentials.short_code).await?;
        let available = snapshot
            .map(|s| match category {
                ChargeCategory::Mobile => s.utility_balance,
                ChargeCategory::Business => s.working_balance,
            })
            .unwrap_or(0);
        let required = amount
            .checked_add(charge)
            .ok_or_else(|| DarajaError::InvalidAmount {
                amount,
                reason: "amount plus charge exceeds the supported range".to_string(),
            })?;

        if available < required {
            warn!(
                short_code = %credentials.short_code,
                balance = available,
                required_amount = required,
                "Insufficient balance to process this request"
            );
            return Ok(Funds::Short(NotCreatedReason::InsufficientBalance {
                available,
                required,
            }));
        }

        Ok(Funds::Covered { charge })
    }

    /// Record `record` as pending, send its payload and apply the
    /// acknowledgement.
    async fn submit(
        &self,
        credentials: &CredentialContext,
        endpoint: Endpoint,
        record: MpesaTransaction,
        options: &RequestOptions,
    ) -> DarajaResult<Submission<MpesaTransaction>> {
        let token = match self.authorize(credentials, options).await {
            Some(token) => token,
            None => return Ok(Submission::NotCreated(NotCreatedReason::Cancelled)),
        };

        self.ledger.create_transaction(&record).await?;
        info!(
            correlation_id = %record.correlation_id,
            category = %record.category,
            short_code = %record.short_code,
            account = %mask_msisdn(&record.account_number),
            amount = record.amount,
            charge = record.charge,
            "recorded pending transaction"
        );

        let outcome = match self
            .send(credentials, token, endpoint, &record.request_payload, options)
            .await
        {
            Some(outcome) => outcome,
            None => {
                warn!(
                    correlation_id = %record.correlation_id,
                    "request cancelled in flight, awaiting gateway result"
                );
                return Ok(Submission::Created(record));
            }
        };

        let (response, raw) = acknowledgement(outcome, &record.correlation_id);
        let accepted = response.is_accepted();

        let mut update = TransactionUpdate {
            status: Some(if accepted {
                TransactionStatus::Accepted
            } else {
                TransactionStatus::Rejected
            }),
            response_code: response.response_code,
            response_description: response.response_description,
            raw_response: Some(raw),
            ..Default::default()
        };
        if accepted {
            update.conversation_id = response.conversation_id;
            update.originator_conversation_id = response.originator_conversation_id;
        }

        let updated = self
            .ledger
            .update_transaction(record.correlation_id, update)
            .await?;
        Ok(Submission::Created(updated))
    }

    /// Same as [`submit`](Self::submit) for STK push fundings.
    async fn submit_funding(
        &self,
        credentials: &CredentialContext,
        record: FundingRecord,
        options: &RequestOptions,
    ) -> DarajaResult<Submission<FundingRecord>> {
        let token = match self.authorize(credentials, options).await {
            Some(token) => token,
            None => return Ok(Submission::NotCreated(NotCreatedReason::Cancelled)),
        };

        self.ledger.create_funding(&record).await?;
        info!(
            correlation_id = %record.correlation_id,
            short_code = %record.short_code,
            mobile = %mask_msisdn(&record.mobile_number),
            amount = record.amount,
            "recorded pending funding"
        );

        let outcome = match self
            .send(
                credentials,
                token,
                Endpoint::StkPush,
                &record.request_payload,
                options,
            )
            .await
        {
            Some(outcome) => outcome,
            None => return Ok(Submission::Created(record)),
        };

        let (response, raw) = acknowledgement(outcome, &record.correlation_id);
        let accepted = response.is_accepted();

        let mut update = FundingUpdate {
            status: Some(if accepted {
                TransactionStatus::Accepted
            } else {
                TransactionStatus::Rejected
            }),
            response_code: response.response_code,
            response_description: response.response_description,
            raw_response: Some(raw),
            ..Default::default()
        };
        if accepted {
            update.merchant_request_id = response.merchant_request_id;
            update.checkout_request_id = response.checkout_request_id;
            update.customer_message = response.customer_message;
        }

        let updated = self
            .ledger
            .update_funding(record.correlation_id, update)
            .await?;
        Ok(Submission::Created(updated))
    }

    /// Bearer token for the request, or `None` if `options.cancel` fires
    /// before one is issued. Nothing has reached the gateway at that point.
    async fn authorize(
        &self,
        credentials: &CredentialContext,
        options: &RequestOptions,
    ) -> Option<GatewayResult<String>> {
        if options.is_cancelled() {
            return None;
        }
        until_cancelled(options, self.client.access_token(credentials)).await
    }

    /// Call the gateway unless `options.cancel` fires first. A failed token
    /// fetch is reported as the call's outcome.
    async fn send(
        &self,
        credentials: &CredentialContext,
        token: GatewayResult<String>,
        endpoint: Endpoint,
        payload: &JsonValue,
        options: &RequestOptions,
    ) -> Option<GatewayResult<JsonValue>> {
        let token = match token {
            Ok(token) => token,
            Err(err) => return Some(Err(err)),
        };

        until_cancelled(
            options,
            self.client
                .call_with_token(credentials, &token, endpoint, Some(payload)),
        )
        .await
    }
}

/// Run `work` until it finishes or `options.cancel` fires. `work` is polled
/// first, so a request that was already persisted is at least started.
async fn until_cancelled<F: Future>(options: &RequestOptions, work: F) -> Option<F::Output> {
    match &options.cancel {
        Some(token) => tokio::select! {
            biased;
            outcome = work => Some(outcome),
            _ = token.cancelled() => None,
        },
        None => Some(work.await),
    }
}

/// Pending record for a request that echoes `correlation_id` back as its
/// OriginatorConversationID.
fn echoed_record(mut record: MpesaTransaction, options: &RequestOptions) -> MpesaTransaction {
    record.originator_conversation_id = Some(record.correlation_id.to_string());
    with_options(record, options)
}

fn with_options(mut record: MpesaTransaction, options: &RequestOptions) -> MpesaTransaction {
    record.payment_id = options.payment_id.clone();
    record
}

/// Synchronous acknowledgement and the raw body to keep on the record.
fn acknowledgement(
    outcome: GatewayResult<JsonValue>,
    correlation_id: &Uuid,
) -> (SyncResponse, JsonValue) {
    match outcome {
        Ok(body) => (SyncResponse::from_value(&body), body),
        Err(err) => {
            warn!(
                correlation_id = %correlation_id,
                code = %err.code,
                error = %err,
                "gateway rejected request"
            );
            (SyncResponse::from_error(&err), error_body(&err))
        }
    }
}

fn error_body(err: &GatewayError) -> JsonValue {
    json!({
        "errorCode": err.response_code(),
        "errorMessage": err.message,
    })
}
