// src/api/webhooks.rs
//
// Gateway callbacks. The gateway calls these unauthenticated, either as a
// browser redirect (GET) or as a form/JSON post, so parameters are read from
// both the query string and the body.

use actix_web::http::header;
use actix_web::{route, web, HttpRequest, HttpResponse};
use serde_json::{Map, Value};

use crate::error::AppError;
use crate::payments::{CallbackOutcome, CallbackResult};
use crate::AppState;

/// Merges query string and body parameters. The query wins for keys present
/// in both.
pub fn callback_params(req: &HttpRequest, body: &[u8]) -> Map<String, Value> {
    let mut params = Map::new();

    if !body.is_empty() {
        let is_json = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.starts_with("application/json"))
            .unwrap_or(false);

        if is_json {
            match serde_json::from_slice::<Value>(body) {
                Ok(Value::Object(map)) => params.extend(map),
                Ok(other) => log::warn!("callback body is not an object: {other}"),
                Err(e) => log::warn!("callback body is not valid json: {e}"),
            }
        } else {
            match serde_urlencoded::from_bytes::<Vec<(String, String)>>(body) {
                Ok(pairs) => {
                    for (k, v) in pairs {
                        params.insert(k, Value::String(v));
                    }
                }
                Err(e) => log::warn!("callback body is not form encoded: {e}"),
            }
        }
    }

    match serde_urlencoded::from_str::<Vec<(String, String)>>(req.query_string()) {
        Ok(pairs) => {
            for (k, v) in pairs {
                params.insert(k, Value::String(v));
            }
        }
        Err(e) => log::warn!("callback query string unreadable: {e}"),
    }

    params
}

fn tran_id(params: &Map<String, Value>) -> Option<String> {
    match params.get("tran_id")? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Builds the dashboard redirect for a processed callback.
pub fn dashboard_location(dashboard_url: &str, outcome: CallbackOutcome, tran_id: Option<&str>) -> String {
    let separator = if dashboard_url.contains('?') { '&' } else { '?' };
    let mut location = format!("{dashboard_url}{separator}payment={}", outcome.as_str());
    if let (CallbackOutcome::Success, Some(id)) = (outcome, tran_id) {
        let encoded = serde_urlencoded::to_string([("tran_id", id)]).unwrap_or_default();
        if !encoded.is_empty() {
            location.push('&');
            location.push_str(&encoded);
        }
    }
    location
}

async fn handle_callback(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
    outcome: CallbackOutcome,
) -> Result<HttpResponse, AppError> {
    let params = callback_params(&req, &body);
    let tran_id = tran_id(&params);

    match tran_id.as_deref() {
        Some(id) => {
            let result = state
                .payments
                .apply_callback(id, outcome, Value::Object(params))
                .await?;
            match result {
                CallbackResult::Applied(tx) => {
                    log::info!(
                        "callback applied tran_id={} outcome={} status={}",
                        tx.transaction_ref,
                        outcome.as_str(),
                        tx.status.as_str()
                    );
                }
                CallbackResult::Duplicate(tx) => {
                    log::info!(
                        "duplicate callback tran_id={} outcome={}",
                        tx.transaction_ref,
                        outcome.as_str()
                    );
                }
                CallbackResult::Refused(_) | CallbackResult::Ignored => {}
            }
        }
        None if outcome == CallbackOutcome::Success => {
            log::warn!("success callback without tran_id");
            return Err(AppError::Validation("missing tran_id".to_string()));
        }
        None => {
            log::info!("{} callback without tran_id ignored", outcome.as_str());
        }
    }

    let location = dashboard_location(&state.dashboard_url, outcome, tran_id.as_deref());
    Ok(HttpResponse::Found()
        .insert_header((header::LOCATION, location))
        .finish())
}

#[utoipa::path(
    post,
    path = "/payment/success",
    tag = "webhooks",
    responses(
        (status = 302, description = "Recorded; redirects to the dashboard"),
        (status = 400, description = "Missing tran_id"),
        (status = 404, description = "Unknown tran_id")
    )
)]
#[route("/payment/success", method = "GET", method = "POST")]
pub async fn payment_success(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    handle_callback(req, body, state, CallbackOutcome::Success).await
}

#[utoipa::path(
    post,
    path = "/payment/fail",
    tag = "webhooks",
    responses((status = 302, description = "Recorded or ignored; redirects to the dashboard"))
)]
#[route("/payment/fail", method = "GET", method = "POST")]
pub async fn payment_fail(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    handle_callback(req, body, state, CallbackOutcome::Failed).await
}

#[utoipa::path(
    post,
    path = "/payment/cancel",
    tag = "webhooks",
    responses((status = 302, description = "Recorded or ignored; redirects to the dashboard"))
)]
#[route("/payment/cancel", method = "GET", method = "POST")]
pub async fn payment_cancel(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    handle_callback(req, body, state, CallbackOutcome::Cancelled).await
}
