// src/api/payments.rs

use actix_web::{post, web, HttpResponse};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::AppError;
use crate::models::Principal;
use crate::AppState;

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct InitiatePaymentRequest {
    /// Gateway payment type, e.g. `VISA`. Falls back to the configured default.
    pub payment_method: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InitiatePaymentResponse {
    pub transaction_ref: String,
    pub redirect_url: String,
}

/// Creates an `initiated` transaction and returns the gateway page the
/// caller should be sent to.
#[utoipa::path(
    post,
    path = "/api/initiate-payment",
    tag = "payments",
    request_body = InitiatePaymentRequest,
    responses(
        (status = 200, description = "Gateway payment page", body = InitiatePaymentResponse),
        (status = 400, description = "Gateway answered without a payment page"),
        (status = 502, description = "Gateway unreachable or returned an error")
    )
)]
#[post("/initiate-payment")]
pub async fn initiate_payment(
    state: web::Data<AppState>,
    principal: web::ReqData<Principal>,
    payload: Option<web::Json<InitiatePaymentRequest>>,
) -> Result<HttpResponse, AppError> {
    let request = payload.map(web::Json::into_inner).unwrap_or_default();

    let initiation = state
        .payments
        .initiate(&principal, request.payment_method.as_deref())
        .await?;

    log::info!(
        "payment initiated tran_id={} user_id={}",
        initiation.transaction.transaction_ref,
        principal.id
    );

    Ok(HttpResponse::Ok().json(InitiatePaymentResponse {
        transaction_ref: initiation.transaction.transaction_ref,
        redirect_url: initiation.redirect_url,
    }))
}
