//! Webhook authentication and parsing
//!
//! Signatures are hex HMAC-SHA256 over the raw body. Stripe-style headers
//! (`t=<unix>,v1=<hex>`) sign `"{t}.{body}"` instead and are rejected once the
//! timestamp is older than the tolerance.

use chrono::Utc;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use salon_core::{
    models::{WebhookEvent, WebhookSubject},
    AppError, AppResult,
};
use serde_json::Value;
use sha2::Sha256;

use super::status::StatusTable;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a timestamped signature
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Hex HMAC-SHA256 of `payload` under `secret`
pub fn sign(secret: &str, payload: &[u8]) -> AppResult<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Config("Invalid webhook secret".to_string()))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Check `signature` against `payload`
pub fn verify_signature(payload: &[u8], signature: &str, secret: &str) -> AppResult<()> {
    let signature = signature.trim();
    if signature.is_empty() {
        return Err(AppError::InvalidSignature("missing signature".to_string()));
    }

    let (signed, hex_sig) = match parse_timestamped(signature) {
        Some((timestamp, v1)) => {
            let ts: i64 = timestamp
                .parse()
                .map_err(|_| AppError::InvalidSignature("invalid timestamp".to_string()))?;
            if (Utc::now().timestamp() - ts).abs() > SIGNATURE_TOLERANCE_SECS {
                return Err(AppError::InvalidSignature("timestamp outside tolerance".to_string()));
            }

            let mut signed = Vec::with_capacity(timestamp.len() + 1 + payload.len());
            signed.extend_from_slice(timestamp.as_bytes());
            signed.push(b'.');
            signed.extend_from_slice(payload);
            (signed, v1)
        }
        None => (payload.to_vec(), signature),
    };

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Config("Invalid webhook secret".to_string()))?;
    mac.update(&signed);

    let sig_bytes = hex::decode(hex_sig)
        .map_err(|_| AppError::InvalidSignature("signature is not hex".to_string()))?;
    mac.verify_slice(&sig_bytes)
        .map_err(|_| AppError::InvalidSignature("signature mismatch".to_string()))
}

fn parse_timestamped(header: &str) -> Option<(&str, &str)> {
    let mut timestamp = None;
    let mut v1 = None;
    for part in header.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(v) = part.strip_prefix("v1=") {
            v1 = Some(v);
        }
    }
    Some((timestamp?, v1?))
}

/// Parse an authenticated body into a canonical event
pub fn parse_event(table: StatusTable, payload: &[u8]) -> AppResult<WebhookEvent> {
    match table {
        StatusTable::Generic => serde_json::from_slice(payload)
            .map_err(|e| AppError::Validation(format!("Malformed webhook body: {}", e))),
        StatusTable::Razorpay => parse_razorpay(&json_body(payload)?),
        StatusTable::Stripe => parse_stripe(&json_body(payload)?),
    }
}

fn json_body(payload: &[u8]) -> AppResult<Value> {
    serde_json::from_slice(payload)
        .map_err(|e| AppError::Validation(format!("Malformed webhook body: {}", e)))
}

fn str_field(value: &Value, pointer: &str) -> Option<String> {
    value.pointer(pointer).and_then(Value::as_str).map(str::to_string)
}

fn required(value: &Value, pointer: &str) -> AppResult<String> {
    str_field(value, pointer)
        .ok_or_else(|| AppError::Validation(format!("Webhook body missing {}", pointer)))
}

/// Minor currency units to a decimal amount
fn minor_units(value: &Value, pointer: &str) -> Option<Decimal> {
    value.pointer(pointer).and_then(Value::as_i64).map(|v| Decimal::new(v, 2))
}

// {"event": "payment.captured", "payload": {"payment": {"entity": {...}}, "refund": {...}}}
fn parse_razorpay(body: &Value) -> AppResult<WebhookEvent> {
    let event = required(body, "/event")?;

    if event.starts_with("refund.") {
        let refund_id = required(body, "/payload/refund/entity/id")?;
        let status = required(body, "/payload/refund/entity/status")?;
        return Ok(WebhookEvent {
            event_id: format!("{}:{}:{}", event, refund_id, status),
            subject: WebhookSubject::Refund,
            gateway_payment_id: required(body, "/payload/refund/entity/payment_id")?,
            gateway_refund_id: Some(refund_id),
            native_status: status,
            amount: minor_units(body, "/payload/refund/entity/amount"),
            payment_method: None,
            failure_reason: None,
        });
    }

    let payment_id = required(body, "/payload/payment/entity/id")?;
    let status = required(body, "/payload/payment/entity/status")?;
    Ok(WebhookEvent {
        event_id: format!("{}:{}:{}", event, payment_id, status),
        subject: WebhookSubject::Payment,
        gateway_payment_id: payment_id,
        gateway_refund_id: None,
        native_status: status,
        amount: minor_units(body, "/payload/payment/entity/amount"),
        payment_method: str_field(body, "/payload/payment/entity/method"),
        failure_reason: str_field(body, "/payload/payment/entity/error_description"),
    })
}

// {"id": "evt_..", "type": "payment_intent.succeeded", "data": {"object": {...}}}
fn parse_stripe(body: &Value) -> AppResult<WebhookEvent> {
    let event_id = required(body, "/id")?;
    let event_type = required(body, "/type")?;
    let object = body
        .pointer("/data/object")
        .ok_or_else(|| AppError::Validation("Webhook body missing /data/object".to_string()))?;

    if str_field(object, "/object").as_deref() == Some("refund") {
        return Ok(WebhookEvent {
            event_id,
            subject: WebhookSubject::Refund,
            gateway_payment_id: required(object, "/payment_intent")?,
            gateway_refund_id: Some(required(object, "/id")?),
            native_status: required(object, "/status")?,
            amount: minor_units(object, "/amount"),
            payment_method: None,
            failure_reason: str_field(object, "/failure_reason"),
        });
    }

    // Failed intents go back to requires_payment_method; the event type is authoritative
    let native_status = if event_type == "payment_intent.payment_failed" {
        "payment_failed".to_string()
    } else {
        required(object, "/status")?
    };

    Ok(WebhookEvent {
        event_id,
        subject: WebhookSubject::Payment,
        gateway_payment_id: required(object, "/id")?,
        gateway_refund_id: None,
        native_status,
        amount: minor_units(object, "/amount"),
        payment_method: str_field(object, "/payment_method_types/0"),
        failure_reason: str_field(object, "/last_payment_error/message"),
    })
}
