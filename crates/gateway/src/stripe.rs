//! Stripe-compatible HTTP gateway adapter.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use common::Money;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;

use crate::{GatewayError, IntentCreated, IntentStatus, PaymentGateway, RefundCreated, Result};

/// Connection settings for the HTTP gateway.
#[derive(Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    /// Base URL, e.g. `https://api.stripe.com`.
    pub api_base: String,
    pub timeout: Duration,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct IntentResponse {
    id: String,
    #[serde(default)]
    client_secret: Option<String>,
    status: String,
}

#[derive(Debug, Deserialize)]
struct RefundResponse {
    id: String,
    amount: i64,
    currency: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type", default)]
    error_type: Option<String>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// A gateway failure as reported by the HTTP API.
enum ApiFailure {
    /// The card was declined. Only meaningful when confirming.
    Card(Option<String>),
    Other(GatewayError),
}

/// Gateway adapter speaking the Stripe REST API.
///
/// Amounts are sent as integer minor units; every request carries the
/// configured timeout.
#[derive(Clone)]
pub struct StripeGateway {
    client: Client,
    config: StripeConfig,
}

impl StripeGateway {
    /// Creates a gateway client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: StripeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| GatewayError::Unavailable(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn post(&self, path: &str) -> RequestBuilder {
        let base = self.config.api_base.trim_end_matches('/');
        self.client
            .post(format!("{base}{path}"))
            .bearer_auth(&self.config.secret_key)
    }

    async fn send<T: serde::de::DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> std::result::Result<T, ApiFailure> {
        let response = request.send().await.map_err(|e| {
            let reason = if e.is_timeout() {
                "request timed out".to_string()
            } else {
                e.to_string()
            };
            ApiFailure::Other(GatewayError::Unavailable(reason))
        })?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| ApiFailure::Other(GatewayError::Unavailable(e.to_string())));
        }

        let body = response.json::<ErrorResponse>().await.ok().map(|r| r.error);
        let message = body
            .as_ref()
            .and_then(|b| b.message.clone())
            .unwrap_or_else(|| format!("HTTP {status}"));

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ApiFailure::Other(GatewayError::Unavailable(message)));
        }
        if let Some(ref b) = body
            && b.error_type.as_deref() == Some("card_error")
        {
            return Err(ApiFailure::Card(b.code.clone().or(Some(message))));
        }
        Err(ApiFailure::Other(GatewayError::InvalidRequest(message)))
    }
}

/// Header Stripe uses to deduplicate retried requests.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

fn to_minor_units(amount: Money) -> Result<i64> {
    amount
        .to_minor_units()
        .ok_or_else(|| GatewayError::InvalidRequest(format!("amount {amount} is out of range")))
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[tracing::instrument(skip(self, metadata))]
    async fn create_intent(
        &self,
        amount: Money,
        currency: &str,
        metadata: &HashMap<String, String>,
    ) -> Result<IntentCreated> {
        let mut form = vec![
            ("amount".to_string(), to_minor_units(amount)?.to_string()),
            ("currency".to_string(), currency.to_lowercase()),
        ];
        for (key, value) in metadata {
            form.push((format!("metadata[{key}]"), value.clone()));
        }

        let intent: IntentResponse = self
            .send(self.post("/v1/payment_intents").form(&form))
            .await
            .map_err(|f| match f {
                ApiFailure::Card(reason) => {
                    GatewayError::InvalidRequest(reason.unwrap_or_default())
                }
                ApiFailure::Other(e) => e,
            })?;

        let client_secret = intent.client_secret.ok_or_else(|| {
            GatewayError::Unavailable("intent response is missing client_secret".to_string())
        })?;
        tracing::debug!(intent_id = %intent.id, "Payment intent created");

        Ok(IntentCreated {
            intent_id: intent.id,
            client_secret,
        })
    }

    #[tracing::instrument(skip(self, payment_method))]
    async fn confirm_intent(&self, intent_id: &str, payment_method: &str) -> Result<IntentStatus> {
        let form = [("payment_method", payment_method)];
        let result: std::result::Result<IntentResponse, ApiFailure> = self
            .send(
                self.post(&format!("/v1/payment_intents/{intent_id}/confirm"))
                    .form(&form),
            )
            .await;

        match result {
            Ok(intent) => Ok(IntentStatus::from_gateway_status(&intent.status)),
            Err(ApiFailure::Card(reason)) => Ok(IntentStatus::Failed { reason }),
            Err(ApiFailure::Other(e)) => Err(e),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn create_refund(
        &self,
        intent_id: &str,
        amount: Option<Money>,
        reason: Option<&str>,
        idempotency_key: Option<&str>,
    ) -> Result<RefundCreated> {
        let mut form = vec![("payment_intent".to_string(), intent_id.to_string())];
        if let Some(amount) = amount {
            form.push(("amount".to_string(), to_minor_units(amount)?.to_string()));
        }
        if let Some(reason) = reason {
            form.push(("reason".to_string(), reason.to_string()));
        }

        let mut request = self.post("/v1/refunds").form(&form);
        if let Some(key) = idempotency_key {
            request = request.header(IDEMPOTENCY_KEY_HEADER, key);
        }

        let refund: RefundResponse = self
            .send(request)
            .await
            .map_err(|f| match f {
                ApiFailure::Card(reason) => {
                    GatewayError::InvalidRequest(reason.unwrap_or_default())
                }
                ApiFailure::Other(e) => e,
            })?;

        Ok(RefundCreated {
            refund_id: refund.id,
            amount: Money::from_minor_units(refund.amount),
            currency: refund.currency,
            status: refund.status,
        })
    }
}
