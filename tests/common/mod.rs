#![allow(dead_code)]

use chrono::{NaiveDate, Utc};
use httpmock::prelude::*;
use httpmock::Mock;
use std::sync::Arc;

use daraja_reconcile::database::{MemoryLedger, TransactionLedger};
use daraja_reconcile::payments::{BalanceSnapshot, PreEncryptedCredential};
use daraja_reconcile::services::charge_bands::{
    ChargeBand, ChargeBandEngine, ChargeCategory, MemoryChargeTable,
};
use daraja_reconcile::{CredentialContext, Daraja, DarajaConfig};

pub const SHORT_CODE: &str = "600000";
pub const TOKEN_PATH: &str = "/oauth/v1/generate";

pub struct Harness {
    pub server: MockServer,
    pub ledger: Arc<MemoryLedger>,
    pub daraja: Daraja,
}

pub fn credentials() -> CredentialContext {
    CredentialContext {
        account_id: "acc-1".to_string(),
        consumer_key: "consumer-key".to_string(),
        consumer_secret: "consumer-secret".to_string(),
        short_code: SHORT_CODE.to_string(),
        initiator: "testapi".to_string(),
        initiator_password: "Safaricom999!*!".to_string(),
        pass_key: Some("bfb279f9aa9bdbcf158e97dd71a467cd".to_string()),
        allow_identity_validation: false,
    }
}

/// Free band covering everything up to KES 100, effective from 2020.
pub fn flat_tariff() -> Vec<ChargeBand> {
    let effective_date = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    [ChargeCategory::Mobile, ChargeCategory::Business]
        .into_iter()
        .map(|category| ChargeBand {
            category,
            min_amount: 0,
            max_amount: Some(10_000),
            charge: 0,
            effective_date,
        })
        .collect()
}

pub async fn harness() -> Harness {
    harness_with(flat_tariff()).await
}

pub async fn harness_with(bands: Vec<ChargeBand>) -> Harness {
    let server = MockServer::start_async().await;
    let ledger = Arc::new(MemoryLedger::new());
    let charges = Arc::new(ChargeBandEngine::new(Arc::new(MemoryChargeTable::new(
        bands,
    ))));

    let daraja = Daraja::new(
        DarajaConfig::sandbox(server.base_url()),
        ledger.clone(),
        charges,
        Arc::new(PreEncryptedCredential::new("c2VjdXJpdHktY3JlZGVudGlhbA==")),
    )
    .unwrap();

    Harness {
        server,
        ledger,
        daraja,
    }
}

impl Harness {
    pub async fn mock_token(&self) -> Mock<'_> {
        self.server
            .mock_async(|when, then| {
                when.method(GET).path(TOKEN_PATH);
                then.status(200)
                    .header("content-type", "application/json")
                    .json_body(serde_json::json!({
                        "access_token": "c9SQxWWhmdVRlyh0zh8gZDTkubVF",
                        "expires_in": "3599"
                    }));
            })
            .await
    }

    pub async fn fund(&self, utility: i64, working: i64) {
        self.ledger
            .record_balance(&BalanceSnapshot {
                short_code: SHORT_CODE.to_string(),
                utility_balance: utility,
                working_balance: working,
                uncleared_balance: 0,
                captured_at: Utc::now(),
            })
            .await
            .unwrap();
    }
}
