// src/config.rs

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::payments::{PaymentSettings, TerminalPolicy};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has invalid value {value:?}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub enum BlobBackend {
    S3 {
        bucket: String,
        endpoint: Option<String>,
    },
    Local {
        root: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub jwt_secret: String,
    /// `None` runs on the in-memory store.
    pub database_url: Option<String>,
    pub blob_backend: BlobBackend,
    /// `None` runs on the in-process queue.
    pub rabbitmq_url: Option<String>,
    pub worker_concurrency: u16,
    pub dashboard_url: String,
    pub gateway_endpoint: String,
    pub gateway_timeout: Duration,
    pub payments: PaymentSettings,
    pub activity_window: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let jwt_secret = var("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let blob_backend = match var("S3_BUCKET") {
            Some(bucket) => BlobBackend::S3 {
                bucket,
                endpoint: var("S3_ENDPOINT"),
            },
            None => BlobBackend::Local {
                root: var("UPLOAD_DIR").unwrap_or_else(|| "./media".to_string()),
            },
        };

        let terminal_policy = match var("CALLBACK_TERMINAL_POLICY").as_deref() {
            None | Some("overwrite") => TerminalPolicy::Overwrite,
            Some("keep-first") => TerminalPolicy::KeepFirst,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "CALLBACK_TERMINAL_POLICY",
                    value: other.to_string(),
                })
            }
        };

        let callback_base_url =
            var("CALLBACK_BASE_URL").unwrap_or_else(|| "http://localhost:8065".to_string());

        let defaults = PaymentSettings::default();
        let payments = PaymentSettings {
            store_id: var("GATEWAY_STORE_ID").unwrap_or(defaults.store_id),
            amount: parsed_amount(var("PAYMENT_AMOUNT"))?.unwrap_or(defaults.amount),
            currency: var("PAYMENT_CURRENCY").unwrap_or(defaults.currency),
            default_method: var("PAYMENT_METHOD_DEFAULT").unwrap_or(defaults.default_method),
            callback_base_url,
            terminal_policy,
        };

        Ok(Self {
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8065".to_string()),
            jwt_secret,
            database_url: var("DATABASE_URL"),
            blob_backend,
            rabbitmq_url: var("RABBITMQ_URL"),
            worker_concurrency: parsed("WORKER_CONCURRENCY", var("WORKER_CONCURRENCY"))?
                .unwrap_or(2),
            dashboard_url: var("DASHBOARD_URL").unwrap_or_else(|| "/dashboard/".to_string()),
            gateway_endpoint: var("GATEWAY_ENDPOINT")
                .unwrap_or_else(|| "https://sandbox.aamarpay.com/jsonpost.php".to_string()),
            gateway_timeout: Duration::from_secs(
                parsed("GATEWAY_TIMEOUT_SECS", var("GATEWAY_TIMEOUT_SECS"))?.unwrap_or(10),
            ),
            payments,
            activity_window: parsed("ACTIVITY_WINDOW", var("ACTIVITY_WINDOW"))?.unwrap_or(10),
        })
    }
}

fn parsed<T: FromStr>(name: &'static str, value: Option<String>) -> Result<Option<T>, ConfigError> {
    value
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|_| ConfigError::Invalid { name, value: v })
        })
        .transpose()
}

fn parsed_amount(value: Option<String>) -> Result<Option<String>, ConfigError> {
    let Some(v) = value else {
        return Ok(None);
    };
    match v.trim().parse::<f64>() {
        Ok(amount) if amount > 0.0 => Ok(Some(v.trim().to_string())),
        _ => Err(ConfigError::Invalid {
            name: "PAYMENT_AMOUNT",
            value: v,
        }),
    }
}
