//! Decoding of gateway response bodies.

use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::payments::error::GatewayError;
use crate::payments::types::is_accepted_code;
use crate::payments::utils::value_to_string;

/// A decoded gateway response body.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayResponse {
    Success(JsonValue),
    Fault(Fault),
}

impl GatewayResponse {
    /// Classify a response body by HTTP status.
    ///
    /// Success bodies must be non-empty JSON. Error bodies are matched against
    /// the known fault shapes; `allow_response_message` enables the extra
    /// `{ResponseMessage}` shape returned by operator lookup.
    pub fn decode(
        status: u16,
        body: &str,
        endpoint: &str,
        allow_response_message: bool,
    ) -> Result<GatewayResponse, GatewayError> {
        if (200..300).contains(&status) {
            if body.trim().is_empty() {
                return Err(GatewayError::empty_body(endpoint));
            }
            return serde_json::from_str(body)
                .map(GatewayResponse::Success)
                .map_err(|e| GatewayError::decode(format!("invalid JSON from {}: {}", endpoint, e)));
        }

        let fault = if status >= 500 {
            Fault::from_server_error(body, allow_response_message)
        } else if status >= 400 {
            Fault::from_client_error(body)
        } else {
            Fault::Unrecognized {
                raw: body.to_string(),
            }
        };
        Ok(GatewayResponse::Fault(fault))
    }
}

/// The error body shapes the gateway is known to return.
#[derive(Debug, Clone, PartialEq)]
pub enum Fault {
    /// `{"Envelope":{"Body":{"Fault":{"faultstring":..}}}}`
    Envelope { fault_string: String },
    /// `{"fault":{"faultstring":..,"detail":{"errorcode":..}}}`
    Flat {
        fault_string: String,
        error_code: Option<String>,
    },
    /// `{"errorCode":..,"errorMessage":..}` or, from operator lookup,
    /// `{"ResponseMessage":..}`
    Generic {
        message: String,
        error_code: Option<String>,
    },
    Unrecognized { raw: String },
}

impl Fault {
    pub fn message(&self) -> Option<&str> {
        match self {
            Fault::Envelope { fault_string } | Fault::Flat { fault_string, .. } => {
                Some(fault_string)
            }
            Fault::Generic { message, .. } => Some(message),
            Fault::Unrecognized { .. } => None,
        }
    }

    pub fn error_code(&self) -> Option<&str> {
        match self {
            Fault::Flat { error_code, .. } | Fault::Generic { error_code, .. } => {
                error_code.as_deref()
            }
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct EnvelopeFaultBody {
    #[serde(rename = "Envelope")]
    envelope: EnvelopeBody,
}

#[derive(Deserialize)]
struct EnvelopeBody {
    #[serde(rename = "Body")]
    body: EnvelopeFaultHolder,
}

#[derive(Deserialize)]
struct EnvelopeFaultHolder {
    #[serde(rename = "Fault")]
    fault: FaultString,
}

#[derive(Deserialize)]
struct FaultString {
    faultstring: String,
    #[serde(default)]
    detail: Option<FaultDetail>,
}

#[derive(Deserialize)]
struct FaultDetail {
    #[serde(default)]
    errorcode: Option<JsonValue>,
}

#[derive(Deserialize)]
struct FlatFaultBody {
    fault: FaultString,
}

#[derive(Deserialize)]
struct ErrorMessageBody {
    #[serde(rename = "errorCode", default)]
    error_code: Option<JsonValue>,
    #[serde(rename = "errorMessage")]
    error_message: String,
}

#[derive(Deserialize)]
struct ResponseMessageBody {
    #[serde(rename = "ResponseMessage")]
    response_message: String,
}

impl Fault {
    /// Match a 5xx body against the known fault shapes, in order.
    pub fn from_server_error(body: &str, allow_response_message: bool) -> Fault {
        if let Ok(parsed) = serde_json::from_str::<EnvelopeFaultBody>(body) {
            return Fault::Envelope {
                fault_string: parsed.envelope.body.fault.faultstring,
            };
        }

        if let Ok(parsed) = serde_json::from_str::<FlatFaultBody>(body) {
            return Fault::Flat {
                fault_string: parsed.fault.faultstring,
                error_code: parsed
                    .fault
                    .detail
                    .and_then(|d| d.errorcode)
                    .as_ref()
                    .and_then(value_to_string),
            };
        }

        if let Ok(parsed) = serde_json::from_str::<ErrorMessageBody>(body) {
            return Fault::Generic {
                message: parsed.error_message,
                error_code: parsed.error_code.as_ref().and_then(value_to_string),
            };
        }

        if allow_response_message {
            if let Ok(parsed) = serde_json::from_str::<ResponseMessageBody>(body) {
                return Fault::Generic {
                    message: parsed.response_message,
                    error_code: None,
                };
            }
        }

        Fault::Unrecognized {
            raw: body.to_string(),
        }
    }

    /// Match a 4xx body against `{errorCode, errorMessage}`.
    pub fn from_client_error(body: &str) -> Fault {
        match serde_json::from_str::<ErrorMessageBody>(body) {
            Ok(parsed) => Fault::Generic {
                message: parsed.error_message,
                error_code: parsed.error_code.as_ref().and_then(value_to_string),
            },
            Err(_) => Fault::Unrecognized {
                raw: body.to_string(),
            },
        }
    }
}

/// Synchronous acknowledgement folded into a ledger record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncResponse {
    pub response_code: Option<String>,
    pub response_description: Option<String>,
    pub conversation_id: Option<String>,
    pub originator_conversation_id: Option<String>,
    pub merchant_request_id: Option<String>,
    pub checkout_request_id: Option<String>,
    pub customer_message: Option<String>,
}

impl SyncResponse {
    pub fn from_value(value: &JsonValue) -> Self {
        let field = |key: &str| value.get(key).and_then(value_to_string);

        // A 200 can still carry an error body.
        if let Some(error_code) = field("errorCode") {
            return SyncResponse {
                response_code: Some(error_code),
                response_description: field("errorMessage"),
                ..Default::default()
            };
        }

        SyncResponse {
            response_code: field("ResponseCode"),
            response_description: field("ResponseDescription"),
            conversation_id: field("ConversationID"),
            originator_conversation_id: field("OriginatorConversationID"),
            merchant_request_id: field("MerchantRequestID"),
            checkout_request_id: field("CheckoutRequestID"),
            customer_message: field("CustomerMessage"),
        }
    }

    pub fn from_error(err: &GatewayError) -> Self {
        SyncResponse {
            response_code: Some(err.response_code()),
            response_description: Some(err.message.clone()),
            ..Default::default()
        }
    }

    /// The gateway accepted the request for processing. Codes are compared
    /// as strings since the gateway is inconsistent about their JSON type.
    pub fn is_accepted(&self) -> bool {
        is_accepted_code(self.response_code.as_deref())
    }
}
