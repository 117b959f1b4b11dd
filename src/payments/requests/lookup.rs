use serde_json::{json, Value as JsonValue};
use tracing::warn;

use super::Daraja;
use crate::payments::client::Endpoint;
use crate::payments::types::{CredentialContext, LookupOutcome};
use crate::payments::utils::value_to_string;

const FOUND: &str = "4000";

/// Resolves till and paybill numbers to the registered organization name.
pub struct OperatorLookup<'a> {
    daraja: &'a Daraja,
    credentials: &'a CredentialContext,
}

impl<'a> OperatorLookup<'a> {
    pub(super) fn new(daraja: &'a Daraja, credentials: &'a CredentialContext) -> Self {
        Self {
            daraja,
            credentials,
        }
    }

    pub async fn till(&self, till: &str) -> LookupOutcome {
        self.lookup("2", till, "Unable to get till details").await
    }

    pub async fn paybill(&self, paybill: &str) -> LookupOutcome {
        self.lookup("4", paybill, "Unable to get paybill business number details")
            .await
    }

    async fn lookup(
        &self,
        identifier_type: &str,
        identifier: &str,
        failure: &str,
    ) -> LookupOutcome {
        let payload = json!({
            "IdentifierType": identifier_type,
            "Identifier": identifier.trim(),
        });

        match self
            .daraja
            .client
            .call(self.credentials, Endpoint::OperatorLookup, Some(&payload))
            .await
        {
            Ok(body) => outcome(&body),
            Err(err) => {
                warn!(
                    identifier = %identifier,
                    error = %err,
                    "operator lookup failed"
                );
                LookupOutcome {
                    success: false,
                    message: failure.to_string(),
                }
            }
        }
    }
}

fn outcome(body: &JsonValue) -> LookupOutcome {
    let field = |key: &str| body.get(key).and_then(value_to_string);

    if field("ResponseCode").as_deref() == Some(FOUND) {
        return LookupOutcome {
            success: true,
            message: field("OrganizationName").unwrap_or_default(),
        };
    }

    LookupOutcome {
        success: false,
        message: field("ResponseMessage").unwrap_or_else(|| "Lookup failed".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_found_organization_is_a_success() {
        let result = outcome(&json!({
            "ResponseCode": 4000,
            "ResponseMessage": "Success",
            "OrganizationName": "JAVA HOUSE"
        }));
        assert!(result.success);
        assert_eq!(result.message, "JAVA HOUSE");
    }

    #[test]
    fn test_other_codes_surface_the_gateway_message() {
        let result = outcome(&json!({
            "ResponseCode": "4001",
            "ResponseMessage": "Invalid till number"
        }));
        assert!(!result.success);
        assert_eq!(result.message, "Invalid till number");

        assert_eq!(outcome(&json!({})).message, "Lookup failed");
    }
}
