// src/gateway.rs
//
// Outbound client for the hosted payment page (aamarPay-style JSON endpoint).
// The response body is opaque: it is stored verbatim and probed for a
// redirect link.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Response fields that may carry the payment page link, in probe order.
pub const REDIRECT_KEYS: [&str; 3] = ["payment_url", "redirect_url", "checkout_url"];

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway timeout: {0}")]
    Timeout(#[source] reqwest::Error),
    #[error("http error: {0}")]
    Http(#[source] reqwest::Error),
    #[error("gateway api error status={status} body={body}")]
    Api { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            Self::Timeout(value)
        } else {
            Self::Http(value)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentRequest {
    pub store_id: String,
    pub amount: String,
    pub payment_type: String,
    pub currency: String,
    #[serde(rename = "tran_id")]
    pub transaction_ref: String,
    pub success_url: String,
    pub fail_url: String,
    pub cancel_url: String,
    #[serde(flatten)]
    pub customer: CustomerFields,
    pub shipping_method: String,
    pub num_of_item: String,
    pub product_name: String,
    pub product_profile: String,
    pub product_category: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CustomerFields {
    pub cus_name: String,
    pub cus_email: String,
    pub cus_add1: String,
    pub cus_add2: String,
    pub cus_city: String,
    pub cus_country: String,
    pub cus_phone: String,
    pub cus_postcode: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Starts a payment and returns the gateway's raw JSON answer.
    async fn create_payment(&self, req: &PaymentRequest) -> Result<Value, GatewayError>;
}

pub struct HttpGateway {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpGateway {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn create_payment(&self, req: &PaymentRequest) -> Result<Value, GatewayError> {
        let resp = self.client.post(&self.endpoint).json(req).send().await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(GatewayError::Api {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str::<Value>(&body)
            .map_err(|e| GatewayError::InvalidResponse(format!("{e}; body={body}")))
    }
}

/// First non-empty string among [`REDIRECT_KEYS`].
pub fn redirect_url(response: &Value) -> Option<String> {
    REDIRECT_KEYS.iter().find_map(|key| {
        response
            .get(key)
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}
