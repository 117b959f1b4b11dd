use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::DarajaConfig;
use crate::payments::error::{GatewayError, GatewayErrorCode, GatewayResult};
use crate::payments::response::{Fault, GatewayResponse};
use crate::payments::token::{IssuedToken, TokenCache};
use crate::payments::types::CredentialContext;
use crate::payments::utils::value_to_string;

/// Provider error code for an expired or unknown bearer token.
const INVALID_ACCESS_TOKEN: &str = "404.001.03";
/// Seconds shaved off the provider's stated token lifetime.
const TOKEN_EXPIRY_SKEW_SECS: u64 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Token,
    Disbursement,
    ValidatedDisbursement,
    BusinessPayment,
    StkPush,
    AccountBalance,
    Reversal,
    TransactionStatus,
    RemitTax,
    OperatorLookup,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Token => "oauth/v1/generate?grant_type=client_credentials",
            Endpoint::Disbursement => "mpesa/b2c/v3/paymentrequest",
            Endpoint::ValidatedDisbursement => "mpesa/b2cvalidate/v2/paymentrequest",
            Endpoint::BusinessPayment => "mpesa/b2b/v1/paymentrequest",
            Endpoint::StkPush => "mpesa/stkpush/v1/processrequest",
            Endpoint::AccountBalance => "mpesa/accountbalance/v1/query",
            Endpoint::Reversal => "mpesa/reversal/v1/request",
            Endpoint::TransactionStatus => "mpesa/transactionstatus/v1/query",
            Endpoint::RemitTax => "mpesa/b2b/v1/remittax",
            Endpoint::OperatorLookup => "sfcverify/v1/query/info",
        }
    }

    pub fn method(&self) -> Method {
        match self {
            Endpoint::Token => Method::GET,
            _ => Method::POST,
        }
    }
}

enum Auth<'a> {
    Basic { key: &'a str, secret: &'a str },
    Bearer(&'a str),
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<JsonValue>,
}

/// Authenticated HTTP client for the Daraja API.
#[derive(Clone)]
pub struct DarajaClient {
    http: Client,
    base_url: String,
    tokens: Arc<TokenCache>,
    token_ttl: Duration,
}

impl DarajaClient {
    pub fn new(config: &DarajaConfig, tokens: Arc<TokenCache>) -> GatewayResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(config.accept_invalid_certs())
            .build()
            .map_err(|e| GatewayError::transport(&e))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            tokens,
            token_ttl: config.token_ttl(),
        })
    }

    pub fn tokens(&self) -> &Arc<TokenCache> {
        &self.tokens
    }

    fn url(&self, endpoint: Endpoint) -> String {
        format!("{}/{}", self.base_url, endpoint.path())
    }

    /// Bearer token for the tenant, fetched on a cache miss.
    pub async fn access_token(&self, credentials: &CredentialContext) -> GatewayResult<String> {
        self.tokens
            .get_or_refresh(&credentials.short_code, || self.fetch_token(credentials))
            .await
    }

    async fn fetch_token(&self, credentials: &CredentialContext) -> GatewayResult<IssuedToken> {
        let body = self
            .send(
                Endpoint::Token,
                Auth::Basic {
                    key: &credentials.consumer_key,
                    secret: &credentials.consumer_secret,
                },
                None,
            )
            .await?;

        let token: TokenResponse = serde_json::from_value(body)
            .map_err(|e| GatewayError::decode(format!("invalid token response: {}", e)))?;

        let stated = token
            .expires_in
            .as_ref()
            .and_then(value_to_string)
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > TOKEN_EXPIRY_SKEW_SECS)
            .map(|secs| Duration::from_secs(secs - TOKEN_EXPIRY_SKEW_SECS));

        Ok(IssuedToken {
            access_token: token.access_token,
            valid_for: stated
                .map(|stated| stated.min(self.token_ttl))
                .unwrap_or(self.token_ttl),
        })
    }

    /// Call an authenticated endpoint and return its JSON body.
    pub async fn call(
        &self,
        credentials: &CredentialContext,
        endpoint: Endpoint,
        payload: Option<&JsonValue>,
    ) -> GatewayResult<JsonValue> {
        let token = self.access_token(credentials).await?;
        self.call_with_token(credentials, &token, endpoint, payload)
            .await
    }

    /// Call an authenticated endpoint with a token the caller already holds.
    pub async fn call_with_token(
        &self,
        credentials: &CredentialContext,
        token: &str,
        endpoint: Endpoint,
        payload: Option<&JsonValue>,
    ) -> GatewayResult<JsonValue> {
        let result = self.send(endpoint, Auth::Bearer(token), payload).await;

        if let Err(err) = &result {
            if err.code == GatewayErrorCode::Http(401)
                || err.provider_code.as_deref() == Some(INVALID_ACCESS_TOKEN)
            {
                debug!(
                    short_code = %credentials.short_code,
                    "discarding rejected access token"
                );
                self.tokens.invalidate(&credentials.short_code).await;
            }
        }

        result
    }

    async fn send(
        &self,
        endpoint: Endpoint,
        auth: Auth<'_>,
        payload: Option<&JsonValue>,
    ) -> GatewayResult<JsonValue> {
        let mut request = self.http.request(endpoint.method(), self.url(endpoint));
        request = match auth {
            Auth::Basic { key, secret } => request.basic_auth(key, Some(secret)),
            Auth::Bearer(token) => request.bearer_auth(token),
        };
        if let Some(body) = payload {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::transport(&e))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::transport(&e))?;

        let decoded = GatewayResponse::decode(
            status.as_u16(),
            &text,
            endpoint.path(),
            endpoint == Endpoint::OperatorLookup,
        )?;

        match decoded {
            GatewayResponse::Success(body) => Ok(body),
            GatewayResponse::Fault(fault) => Err(fault_error(endpoint, status, fault)),
        }
    }
}

fn fault_error(endpoint: Endpoint, status: StatusCode, fault: Fault) -> GatewayError {
    let transport_message = format!("HTTP {}", status);

    match fault {
        Fault::Unrecognized { raw } => {
            if status.is_server_error() {
                warn!(
                    endpoint = endpoint.path(),
                    status = status.as_u16(),
                    body = %raw,
                    "unexpected response shape from gateway"
                );
            }
            GatewayError::http(status.as_u16(), transport_message, None)
        }
        fault => {
            let provider_code = fault.error_code().map(str::to_string);
            let message = fault
                .message()
                .map(str::to_string)
                .unwrap_or(transport_message);
            GatewayError::http(status.as_u16(), message, provider_code)
        }
    }
}
