// handlers/click.rs
//
// The two Click.uz callbacks. Every outcome, including failure, is an
// HTTP 200 with the protocol's error code in the body; the gateway ignores
// transport-level status entirely.
use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap},
    response::Json,
};
use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize};
use tracing::{error, info, warn};

use crate::services::ledger::{arbitrate_prepare, PaymentLedger, PrepareDecision};
use crate::services::signature::{verify_sign, SignFields, SignMode};
use crate::services::subscription::{extract_user_id, update_user_subscription};
use crate::state::AppState;

// Click protocol error codes
const ERR_SUCCESS: i32 = 0;
const ERR_INVALID_SIGN: i32 = -1;
const ERR_INCORRECT_AMOUNT: i32 = -2;
const ERR_NOT_FOUND: i32 = -5;

const MERCHANT_TRANS_PREFIX: &str = "TG_";

/// Click sends numeric fields as JSON numbers in sandbox and as form strings
/// in production. Accept either and keep the literal text, since the
/// signature is computed over the string form.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    struct AnyString;

    impl serde::de::Visitor<'_> for AnyString {
        type Value = String;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or a number")
        }

        fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<String, E> {
            Ok(v.to_owned())
        }

        fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<String, E> {
            Ok(v.to_string())
        }

        fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<String, E> {
            Ok(v.to_string())
        }
    }

    deserializer.deserialize_any(AnyString)
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrepareRequest {
    #[serde(deserialize_with = "lenient_string")]
    pub click_trans_id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub service_id: String,
    pub merchant_trans_id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub amount: String,
    #[serde(deserialize_with = "lenient_string")]
    pub action: String,
    pub sign_time: String,
    pub sign_string: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompleteRequest {
    #[serde(deserialize_with = "lenient_string")]
    pub click_trans_id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub service_id: String,
    pub merchant_trans_id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub merchant_prepare_id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub click_paydoc_id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub amount: String,
    #[serde(deserialize_with = "lenient_string")]
    pub action: String,
    pub sign_time: String,
    pub sign_string: String,
}

impl PrepareRequest {
    fn sign_fields(&self) -> SignFields<'_> {
        SignFields {
            click_trans_id: &self.click_trans_id,
            service_id: &self.service_id,
            merchant_trans_id: &self.merchant_trans_id,
            merchant_prepare_id: None,
            amount: &self.amount,
            action: &self.action,
            sign_time: &self.sign_time,
            sign_string: &self.sign_string,
        }
    }
}

impl CompleteRequest {
    fn sign_fields(&self) -> SignFields<'_> {
        SignFields {
            click_trans_id: &self.click_trans_id,
            service_id: &self.service_id,
            merchant_trans_id: &self.merchant_trans_id,
            merchant_prepare_id: Some(&self.merchant_prepare_id),
            amount: &self.amount,
            action: &self.action,
            sign_time: &self.sign_time,
            sign_string: &self.sign_string,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PrepareResponse {
    pub error: i32,
    pub error_note: String,
    pub click_trans_id: String,
    pub merchant_trans_id: String,
    pub merchant_prepare_id: String,
}

#[derive(Debug, Serialize)]
pub struct CompleteResponse {
    pub error: i32,
    pub error_note: String,
    pub click_trans_id: String,
    pub merchant_trans_id: String,
    pub merchant_confirm_id: String,
}

impl PrepareResponse {
    // The prepare id echoed back is the merchant transaction id itself.
    fn ok(req: &PrepareRequest) -> Self {
        PrepareResponse {
            error: ERR_SUCCESS,
            error_note: "Success".to_string(),
            click_trans_id: req.click_trans_id.clone(),
            merchant_trans_id: req.merchant_trans_id.clone(),
            merchant_prepare_id: req.merchant_trans_id.clone(),
        }
    }

    fn err(req: &PrepareRequest, error: i32, error_note: &str) -> Self {
        PrepareResponse {
            error,
            error_note: error_note.to_string(),
            click_trans_id: req.click_trans_id.clone(),
            merchant_trans_id: req.merchant_trans_id.clone(),
            merchant_prepare_id: String::new(),
        }
    }

    fn unparseable() -> Self {
        PrepareResponse {
            error: ERR_INVALID_SIGN,
            error_note: "Invalid request".to_string(),
            click_trans_id: String::new(),
            merchant_trans_id: String::new(),
            merchant_prepare_id: String::new(),
        }
    }
}

impl CompleteResponse {
    fn ok(req: &CompleteRequest, error_note: &str) -> Self {
        CompleteResponse {
            error: ERR_SUCCESS,
            error_note: error_note.to_string(),
            click_trans_id: req.click_trans_id.clone(),
            merchant_trans_id: req.merchant_trans_id.clone(),
            merchant_confirm_id: req.merchant_trans_id.clone(),
        }
    }

    fn err(req: &CompleteRequest, error: i32, error_note: &str) -> Self {
        CompleteResponse {
            error,
            error_note: error_note.to_string(),
            click_trans_id: req.click_trans_id.clone(),
            merchant_trans_id: req.merchant_trans_id.clone(),
            merchant_confirm_id: String::new(),
        }
    }

    fn unparseable() -> Self {
        CompleteResponse {
            error: ERR_INVALID_SIGN,
            error_note: "Invalid request".to_string(),
            click_trans_id: String::new(),
            merchant_trans_id: String::new(),
            merchant_confirm_id: String::new(),
        }
    }
}

/// JSON body, falling back to form-encoding. Click posts
/// `application/x-www-form-urlencoded` in production and JSON from its
/// sandbox tooling.
pub(crate) fn parse_callback<T: DeserializeOwned>(
    content_type: Option<&str>,
    body: &[u8],
) -> Option<T> {
    let is_form = content_type
        .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);

    if is_form {
        serde_urlencoded::from_bytes(body).ok()
    } else {
        serde_json::from_slice(body)
            .ok()
            .or_else(|| serde_urlencoded::from_bytes(body).ok())
    }
}

fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
}

pub async fn click_prepare(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<PrepareResponse> {
    let req: PrepareRequest = match parse_callback(content_type(&headers), &body) {
        Some(req) => req,
        None => {
            warn!("Unparseable prepare callback body");
            return Json(PrepareResponse::unparseable());
        }
    };

    info!(
        "Prepare callback: click_trans_id={} merchant_trans_id={} amount={}",
        req.click_trans_id, req.merchant_trans_id, req.amount
    );

    if !verify_sign(
        &req.sign_fields(),
        SignMode::Prepare,
        &state.config.click_secret_key,
    ) {
        return Json(PrepareResponse::err(
            &req,
            ERR_INVALID_SIGN,
            "Invalid sign string",
        ));
    }

    if !req.merchant_trans_id.starts_with(MERCHANT_TRANS_PREFIX) {
        return Json(PrepareResponse::err(&req, ERR_NOT_FOUND, "Invalid format"));
    }

    let ledger = PaymentLedger::new(&state.db);
    let existing = match ledger.find(&req.merchant_trans_id).await {
        Ok(existing) => existing,
        Err(e) => {
            error!("Prepare lookup failed for {}: {}", req.merchant_trans_id, e);
            return Json(PrepareResponse::err(&req, ERR_INVALID_SIGN, "Internal error"));
        }
    };

    match arbitrate_prepare(existing.as_ref(), &req.amount) {
        PrepareDecision::AmountMismatch => {
            warn!(
                "Amount mismatch for {}: got {}",
                req.merchant_trans_id, req.amount
            );
            Json(PrepareResponse::err(
                &req,
                ERR_INCORRECT_AMOUNT,
                "Incorrect amount",
            ))
        }
        PrepareDecision::AlreadyPrepared => Json(PrepareResponse::ok(&req)),
        PrepareDecision::Create => {
            match ledger
                .insert_prepared(&req.merchant_trans_id, &req.click_trans_id, &req.amount)
                .await
            {
                Ok(_) => Json(PrepareResponse::ok(&req)),
                Err(e) => {
                    error!("Prepare insert failed for {}: {}", req.merchant_trans_id, e);
                    Json(PrepareResponse::err(&req, ERR_INVALID_SIGN, "Internal error"))
                }
            }
        }
    }
}

pub async fn click_complete(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Json<CompleteResponse> {
    let req: CompleteRequest = match parse_callback(content_type(&headers), &body) {
        Some(req) => req,
        None => {
            warn!("Unparseable complete callback body");
            return Json(CompleteResponse::unparseable());
        }
    };

    info!(
        "Complete callback: click_trans_id={} merchant_trans_id={} paydoc={}",
        req.click_trans_id, req.merchant_trans_id, req.click_paydoc_id
    );

    if !verify_sign(
        &req.sign_fields(),
        SignMode::Complete,
        &state.config.click_secret_key,
    ) {
        return Json(CompleteResponse::err(
            &req,
            ERR_INVALID_SIGN,
            "Invalid sign string",
        ));
    }

    let ledger = PaymentLedger::new(&state.db);
    match ledger.find(&req.merchant_trans_id).await {
        Ok(None) => {
            return Json(CompleteResponse::err(
                &req,
                ERR_NOT_FOUND,
                "Payment not found",
            ));
        }
        Ok(Some(_)) => {}
        Err(e) => {
            error!("Complete lookup failed for {}: {}", req.merchant_trans_id, e);
            return Json(CompleteResponse::err(&req, ERR_INVALID_SIGN, "Internal error"));
        }
    }

    match ledger
        .complete_if_pending(&req.merchant_trans_id, &req.click_paydoc_id)
        .await
    {
        // The transition happened here, so this request owns the one
        // entitlement trigger for this transaction.
        Ok(Some(_)) => {
            apply_entitlement(&state, &req.merchant_trans_id).await;
            Json(CompleteResponse::ok(&req, "Success"))
        }
        Ok(None) => {
            info!("Payment {} already completed", req.merchant_trans_id);
            Json(CompleteResponse::ok(&req, "Already completed"))
        }
        Err(e) => {
            error!(
                "Complete transition failed for {}: {}",
                req.merchant_trans_id, e
            );
            Json(CompleteResponse::err(&req, ERR_INVALID_SIGN, "Internal error"))
        }
    }
}

/// Entitlement failures are logged and swallowed: the gateway must get its
/// acknowledgement once the payment is recorded, whatever happens to the
/// user record.
async fn apply_entitlement(state: &AppState, merchant_trans_id: &str) {
    let Some(user_id) = extract_user_id(merchant_trans_id) else {
        error!("Could not extract user id from {}", merchant_trans_id);
        return;
    };

    if let Err(e) = update_user_subscription(&state.db, user_id, 1).await {
        error!("Subscription update failed for user {}: {}", user_id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_with_string_fields() {
        let body = br#"{
            "click_trans_id": "123456789",
            "service_id": "22222",
            "merchant_trans_id": "TG_12345_1700000000",
            "amount": "10000",
            "action": "0",
            "sign_time": "2023-11-14 12:00:00",
            "sign_string": "abc"
        }"#;
        let req: PrepareRequest =
            parse_callback(Some("application/json"), body).expect("parse json");
        assert_eq!(req.click_trans_id, "123456789");
        assert_eq!(req.amount, "10000");
    }

    #[test]
    fn parses_json_with_numeric_fields() {
        let body = br#"{
            "click_trans_id": 123456789,
            "service_id": 22222,
            "merchant_trans_id": "TG_12345_1700000000",
            "amount": 10000,
            "action": 0,
            "sign_time": "2023-11-14 12:00:00",
            "sign_string": "abc"
        }"#;
        let req: PrepareRequest =
            parse_callback(Some("application/json"), body).expect("parse json");
        assert_eq!(req.click_trans_id, "123456789");
        assert_eq!(req.service_id, "22222");
        assert_eq!(req.amount, "10000");
        assert_eq!(req.action, "0");
    }

    #[test]
    fn parses_form_encoded_body() {
        let body = b"click_trans_id=123456789&service_id=22222\
            &merchant_trans_id=TG_12345_1700000000&merchant_prepare_id=TG_12345_1700000000\
            &click_paydoc_id=99001122&amount=10000&action=1\
            &sign_time=2023-11-14+12%3A05%3A00&sign_string=abc";
        let req: CompleteRequest =
            parse_callback(Some("application/x-www-form-urlencoded"), body).expect("parse form");
        assert_eq!(req.merchant_prepare_id, "TG_12345_1700000000");
        assert_eq!(req.click_paydoc_id, "99001122");
        assert_eq!(req.sign_time, "2023-11-14 12:05:00");
    }

    #[test]
    fn falls_back_to_form_without_content_type() {
        let body = b"click_trans_id=1&service_id=2&merchant_trans_id=TG_1_1\
            &amount=500&action=0&sign_time=t&sign_string=s";
        let req: Option<PrepareRequest> = parse_callback(None, body);
        assert!(req.is_some());
    }

    #[test]
    fn missing_field_fails_to_parse() {
        let body = br#"{"click_trans_id": "1", "service_id": "2"}"#;
        let req: Option<PrepareRequest> = parse_callback(Some("application/json"), body);
        assert!(req.is_none());
    }

    #[test]
    fn garbage_body_fails_to_parse() {
        let req: Option<PrepareRequest> = parse_callback(Some("application/json"), b"not json");
        assert!(req.is_none());
    }

    fn prepare_request() -> PrepareRequest {
        PrepareRequest {
            click_trans_id: "123456789".to_string(),
            service_id: "22222".to_string(),
            merchant_trans_id: "TG_12345_1700000000".to_string(),
            amount: "10000".to_string(),
            action: "0".to_string(),
            sign_time: "2023-11-14 12:00:00".to_string(),
            sign_string: "abc".to_string(),
        }
    }

    #[test]
    fn success_response_echoes_ids_and_prepare_id() {
        let resp = serde_json::to_value(PrepareResponse::ok(&prepare_request())).unwrap();
        assert_eq!(resp["error"], 0);
        assert_eq!(resp["error_note"], "Success");
        assert_eq!(resp["click_trans_id"], "123456789");
        assert_eq!(resp["merchant_trans_id"], "TG_12345_1700000000");
        assert_eq!(resp["merchant_prepare_id"], "TG_12345_1700000000");
    }

    #[test]
    fn error_response_carries_protocol_code() {
        let resp = serde_json::to_value(PrepareResponse::err(
            &prepare_request(),
            ERR_INCORRECT_AMOUNT,
            "Incorrect amount",
        ))
        .unwrap();
        assert_eq!(resp["error"], -2);
        assert_eq!(resp["error_note"], "Incorrect amount");
        assert_eq!(resp["merchant_trans_id"], "TG_12345_1700000000");
    }

    #[test]
    fn complete_response_uses_confirm_id_field() {
        let req = CompleteRequest {
            click_trans_id: "123456789".to_string(),
            service_id: "22222".to_string(),
            merchant_trans_id: "TG_12345_1700000000".to_string(),
            merchant_prepare_id: "TG_12345_1700000000".to_string(),
            click_paydoc_id: "99001122".to_string(),
            amount: "10000".to_string(),
            action: "1".to_string(),
            sign_time: "2023-11-14 12:05:00".to_string(),
            sign_string: "abc".to_string(),
        };
        let resp = serde_json::to_value(CompleteResponse::ok(&req, "Already completed")).unwrap();
        assert_eq!(resp["error"], 0);
        assert_eq!(resp["error_note"], "Already completed");
        assert_eq!(resp["merchant_confirm_id"], "TG_12345_1700000000");
    }
}
