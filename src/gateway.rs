use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use utoipa::ToSchema;

use crate::config::GatewayConfig;
use crate::error::{AppError, AppResult};

type HmacSha256 = Hmac<Sha256>;

/// Thin client for the hosted payment gateway. The only write call is
/// session creation; everything else the gateway tells us arrives back
/// through the storefront as a signed (order id, payment id) pair.
#[derive(Debug, Clone)]
pub struct PaymentGateway {
    http: Client,
    config: GatewayConfig,
}

/// A gateway-side hold on an amount to be collected. This is exactly what
/// the storefront needs to open the payment widget; it carries the
/// publishable `key_id`, never the key secret.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GatewaySession {
    pub gateway_order_id: String,
    /// Amount in minor units, the way card processors count.
    pub amount_minor: i64,
    pub currency: String,
    pub receipt: String,
    pub status: String,
    pub key_id: String,
}

#[derive(Debug, Serialize)]
struct CreateSessionBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    status: Option<String>,
}

impl PaymentGateway {
    pub fn new(config: GatewayConfig) -> anyhow::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    /// Publishable key id the storefront embeds in the payment widget.
    pub fn key_id(&self) -> &str {
        &self.config.key_id
    }

    /// Open a payment session for an order.
    ///
    /// Network failures, timeouts and gateway 5xx all surface as
    /// `GatewayUnavailable` so callers leave the order untouched and let the
    /// client retry. A 4xx means the request itself was bad and retrying the
    /// same one will not help.
    pub async fn create_session(
        &self,
        order_number: &str,
        amount: Decimal,
        currency: &str,
    ) -> AppResult<GatewaySession> {
        let amount_minor = to_minor_units(amount)?;
        let url = format!("{}/v1/sessions", self.config.base_url.trim_end_matches('/'));
        let body = CreateSessionBody {
            amount: amount_minor,
            currency,
            receipt: order_number,
        };

        let res = self
            .http
            .post(&url)
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|err| {
                tracing::warn!(error = %err, "payment gateway unreachable");
                AppError::GatewayUnavailable
            })?;

        let status = res.status();
        if status.is_success() {
            let session: SessionResponse = res.json().await.map_err(|err| {
                tracing::warn!(error = %err, "payment gateway returned malformed session");
                AppError::GatewayUnavailable
            })?;
            Ok(GatewaySession {
                gateway_order_id: session.id,
                amount_minor,
                currency: currency.to_string(),
                receipt: order_number.to_string(),
                status: session.status.unwrap_or_else(|| "created".to_string()),
                key_id: self.config.key_id.clone(),
            })
        } else if status.is_server_error() {
            tracing::warn!(status = %status, "payment gateway error");
            Err(AppError::GatewayUnavailable)
        } else {
            let detail: String = res
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(200)
                .collect();
            Err(AppError::GatewayRejected(format!("{status} {detail}")))
        }
    }

    /// Rebuild the session view for an order that already holds a gateway
    /// order id, without another network call. Used when a client re-enters
    /// checkout mid-payment.
    pub fn resumed_session(
        &self,
        gateway_order_id: &str,
        order_number: &str,
        amount: Decimal,
        currency: &str,
    ) -> AppResult<GatewaySession> {
        Ok(GatewaySession {
            gateway_order_id: gateway_order_id.to_string(),
            amount_minor: to_minor_units(amount)?,
            currency: currency.to_string(),
            receipt: order_number.to_string(),
            status: "created".to_string(),
            key_id: self.config.key_id.clone(),
        })
    }

    /// Check the HMAC-SHA256 the gateway computes over
    /// `"{gateway_order_id}|{gateway_payment_id}"` with our key secret.
    /// The comparison is constant time. A mismatch is an expected outcome
    /// (the user's payment failed), so this returns `bool` instead of `Err`.
    pub fn verify_signature(
        &self,
        gateway_order_id: &str,
        gateway_payment_id: &str,
        signature: &str,
    ) -> bool {
        let Ok(raw) = hex::decode(signature) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(self.config.key_secret.as_bytes()) else {
            return false;
        };
        mac.update(gateway_order_id.as_bytes());
        mac.update(b"|");
        mac.update(gateway_payment_id.as_bytes());
        mac.verify_slice(&raw).is_ok()
    }
}

fn to_minor_units(amount: Decimal) -> AppResult<i64> {
    let minor = amount * Decimal::ONE_HUNDRED;
    if minor.fract() != Decimal::ZERO {
        return Err(AppError::GatewayRejected(
            "amount has sub-minor-unit precision".into(),
        ));
    }
    minor
        .to_i64()
        .ok_or_else(|| AppError::GatewayRejected("amount out of range".into()))
}
