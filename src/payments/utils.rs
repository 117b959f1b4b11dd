use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{DarajaError, DarajaResult};

/// Daraja timestamps are East Africa Time.
const PROVIDER_UTC_OFFSET_SECS: i32 = 3 * 3600;
const COMPACT_FORMAT: &str = "%Y%m%d%H%M%S";

fn provider_offset() -> FixedOffset {
    FixedOffset::east_opt(PROVIDER_UTC_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Normalize a Kenyan mobile number to `2547XXXXXXXX`.
pub fn normalize_msisdn(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.starts_with("254") {
        return digits;
    }
    format!("254{}", digits.trim_start_matches('0'))
}

/// Convert minor units to the whole currency units the gateway accepts.
pub fn to_major_units(amount: i64) -> DarajaResult<i64> {
    if amount <= 0 {
        return Err(DarajaError::InvalidAmount {
            amount,
            reason: "amount must be greater than zero".to_string(),
        });
    }
    if amount % 100 != 0 {
        return Err(DarajaError::InvalidAmount {
            amount,
            reason: "M-Pesa only moves whole shillings".to_string(),
        });
    }
    Ok(amount / 100)
}

/// Parse a decimal major-unit amount such as `"10116.00"` into minor units.
pub fn decimal_to_minor(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let value = Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()?;
    (value * Decimal::ONE_HUNDRED).round().to_i64()
}

/// Stringify a callback parameter value; `null` is treated as absent.
pub fn value_to_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Parse a gateway completion time.
///
/// Accepts the compact `YYYYMMDDHHMMSS` form and the dotted
/// `DD.MM.YYYY HH:MM:SS` form used by disbursement results. Absent, `"0"` or
/// unparseable values resolve to `now`.
pub fn parse_provider_time(raw: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    let raw = match raw.map(str::trim) {
        Some(value) if !value.is_empty() && value != "0" => value,
        _ => return now,
    };

    let naive = NaiveDateTime::parse_from_str(raw, "%d.%m.%Y %H:%M:%S").ok().or_else(|| {
        let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
        NaiveDateTime::parse_from_str(&digits, COMPACT_FORMAT).ok()
    });

    naive
        .and_then(|naive| provider_offset().from_local_datetime(&naive).single())
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or(now)
}

/// Timestamp of an STK push request, in gateway local time.
pub fn stk_timestamp(now: DateTime<Utc>) -> String {
    now.with_timezone(&provider_offset())
        .format(COMPACT_FORMAT)
        .to_string()
}

pub fn stk_password(short_code: &str, pass_key: &str, timestamp: &str) -> String {
    STANDARD.encode(format!("{}{}{}", short_code, pass_key, timestamp))
}

pub fn result_url(base: &str, correlation_id: &Uuid, append_correlation_id: bool) -> String {
    if append_correlation_id {
        format!("{}/{}", base.trim_end_matches('/'), correlation_id)
    } else {
        base.to_string()
    }
}
