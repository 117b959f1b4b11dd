//! Access token caching against a mocked OAuth endpoint.

mod common;

use futures::future::join_all;
use httpmock::prelude::*;
use serde_json::json;
use std::time::Duration;

use common::{credentials, harness, TOKEN_PATH};

#[tokio::test]
async fn test_concurrent_callers_share_one_token_fetch() {
    let h = harness().await;
    let token = h
        .server
        .mock_async(|when, then| {
            when.method(GET)
                .path(TOKEN_PATH)
                .query_param("grant_type", "client_credentials");
            then.status(200)
                .delay(Duration::from_millis(200))
                .json_body(json!({"access_token": "shared-token", "expires_in": "3599"}));
        })
        .await;

    let creds = credentials();
    let client = h.daraja.client();
    let tokens = join_all((0..10).map(|_| client.access_token(&creds))).await;

    assert!(tokens
        .into_iter()
        .all(|t| t.unwrap() == "shared-token"));
    assert_eq!(token.hits_async().await, 1);

    client.access_token(&creds).await.unwrap();
    assert_eq!(token.hits_async().await, 1);
}

#[tokio::test]
async fn test_tokens_are_cached_per_short_code() {
    let h = harness().await;
    let token = h.mock_token().await;

    let first = credentials();
    let mut second = credentials();
    second.short_code = "600999".to_string();

    let client = h.daraja.client();
    client.access_token(&first).await.unwrap();
    client.access_token(&second).await.unwrap();
    client.access_token(&first).await.unwrap();

    assert_eq!(token.hits_async().await, 2);
    assert!(client.tokens().get("600999").await.is_some());
}

#[tokio::test]
async fn test_failed_fetch_is_not_cached() {
    let h = harness().await;
    let token = h
        .server
        .mock_async(|when, then| {
            when.method(GET).path(TOKEN_PATH);
            then.status(400).json_body(json!({
                "errorCode": "400.008.01",
                "errorMessage": "Invalid Authentication passed"
            }));
        })
        .await;

    let creds = credentials();
    let client = h.daraja.client();

    let err = client.access_token(&creds).await.unwrap_err();
    assert_eq!(err.response_code(), "400.008.01");
    assert!(!err.is_retryable());

    client.access_token(&creds).await.unwrap_err();
    assert_eq!(token.hits_async().await, 2);
    assert!(client.tokens().get(&creds.short_code).await.is_none());
}
