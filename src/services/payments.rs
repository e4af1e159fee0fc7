use crate::{
    config::AppConfig,
    errors::ServiceError,
    events::{Event, EventSender},
};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{info, instrument, warn};

type HmacSha256 = Hmac<Sha256>;

/// A created payment intent, as surfaced to the client. `client_secret` is
/// what the browser hands to the processor's JS to collect the card.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
    pub amount: i64,
    pub currency: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: String,
}

/// Thin Stripe client over its form-encoded REST API. The base URL is
/// configurable so tests can point it at a local mock server.
#[derive(Clone)]
pub struct StripeGateway {
    http: reqwest::Client,
    secret_key: String,
    api_base: String,
}

impl StripeGateway {
    pub fn new(secret_key: String, api_base: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            secret_key,
            api_base,
        }
    }

    /// Creates a payment intent for the given minor-unit amount. The payment
    /// token travels in metadata so the webhook can find the order later.
    #[instrument(skip(self))]
    pub async fn create_payment_intent(
        &self,
        amount_minor: i64,
        currency: &str,
        payment_token: &str,
        order_number: &str,
        receipt_email: Option<&str>,
    ) -> Result<PaymentIntent, ServiceError> {
        let amount = amount_minor.to_string();
        let mut params: Vec<(&str, &str)> = vec![
            ("amount", amount.as_str()),
            ("currency", currency),
            ("metadata[payment_token]", payment_token),
            ("metadata[order_number]", order_number),
            ("automatic_payment_methods[enabled]", "true"),
        ];
        if let Some(email) = receipt_email {
            params.push(("receipt_email", email));
        }

        let response = self
            .http
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&params)
            .send()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("stripe request: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .json::<StripeErrorBody>()
                .await
                .map(|b| b.error.message)
                .unwrap_or_else(|_| format!("stripe returned {}", status));
            warn!(%status, "Payment intent creation rejected");
            return Err(ServiceError::PaymentFailed(message));
        }

        let intent: PaymentIntent = response
            .json()
            .await
            .map_err(|e| ServiceError::ExternalServiceError(format!("stripe response: {}", e)))?;

        info!(intent_id = %intent.id, "Created payment intent");
        Ok(intent)
    }
}

/// Payment broker. Wraps the gateway (absent when no secret key is
/// configured) and owns minor-unit conversion and event emission.
#[derive(Clone)]
pub struct PaymentService {
    gateway: Option<StripeGateway>,
    event_sender: Arc<EventSender>,
    currency: String,
}

impl PaymentService {
    pub fn new(gateway: Option<StripeGateway>, event_sender: Arc<EventSender>, currency: String) -> Self {
        Self {
            gateway,
            event_sender,
            currency,
        }
    }

    pub fn from_config(config: &AppConfig, event_sender: Arc<EventSender>) -> Self {
        let gateway = config
            .stripe_secret_key
            .clone()
            .map(|key| StripeGateway::new(key, config.stripe_api_base.clone()));
        Self::new(gateway, event_sender, config.currency.clone())
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Creates an intent for a major-unit amount, converting to minor units.
    /// Rejects non-positive amounts before touching the network.
    #[instrument(skip(self))]
    pub async fn create_intent(
        &self,
        amount: Decimal,
        payment_token: &str,
        order_number: &str,
        receipt_email: Option<&str>,
    ) -> Result<PaymentIntent, ServiceError> {
        if amount <= Decimal::ZERO {
            return Err(ServiceError::InvalidInput(
                "Payment amount must be positive".to_string(),
            ));
        }
        let amount_minor = super::pricing::to_minor_units(amount).ok_or_else(|| {
            ServiceError::InvalidInput("Payment amount out of range".to_string())
        })?;

        let gateway = self
            .gateway
            .as_ref()
            .ok_or(ServiceError::PaymentNotConfigured)?;

        let intent = gateway
            .create_payment_intent(
                amount_minor,
                &self.currency,
                payment_token,
                order_number,
                receipt_email,
            )
            .await?;

        self.event_sender
            .send_or_log(Event::PaymentIntentCreated {
                amount,
                currency: self.currency.clone(),
            })
            .await;

        Ok(intent)
    }
}

/// Verifies a `Stripe-Signature` header (`t=<unix>,v1=<hex hmac>`) against
/// the raw request body. The signed payload is `"{t}.{body}"`; timestamps
/// outside the tolerance window are rejected to blunt replay.
pub fn verify_stripe_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: u64,
    now: DateTime<Utc>,
) -> Result<(), ServiceError> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<&str> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = value.parse().ok(),
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp
        .ok_or_else(|| ServiceError::Unauthorized("Malformed webhook signature".to_string()))?;
    if candidates.is_empty() {
        return Err(ServiceError::Unauthorized(
            "Malformed webhook signature".to_string(),
        ));
    }
    if (now.timestamp() - timestamp).unsigned_abs() > tolerance_secs {
        return Err(ServiceError::Unauthorized(
            "Webhook timestamp outside tolerance".to_string(),
        ));
    }

    for candidate in candidates {
        let Ok(candidate_bytes) = hex::decode(candidate) else {
            continue;
        };
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| ServiceError::Unauthorized("Invalid webhook secret".to_string()))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        // verify_slice is constant time
        if mac.verify_slice(&candidate_bytes).is_ok() {
            return Ok(());
        }
    }

    Err(ServiceError::Unauthorized(
        "Webhook signature mismatch".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(payload: &[u8], secret: &str, timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.", timestamp).as_bytes());
        mac.update(payload);
        format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
    }

    #[test]
    fn test_valid_signature_is_accepted() {
        let now = Utc::now();
        let payload = br#"{"type":"payment_intent.succeeded"}"#;
        let header = sign(payload, "whsec_test", now.timestamp());
        assert!(verify_stripe_signature(payload, &header, "whsec_test", 300, now).is_ok());
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let now = Utc::now();
        let payload = b"{}";
        let header = sign(payload, "whsec_other", now.timestamp());
        assert!(verify_stripe_signature(payload, &header, "whsec_test", 300, now).is_err());
    }

    #[test]
    fn test_stale_timestamp_is_rejected() {
        let now = Utc::now();
        let payload = b"{}";
        let header = sign(payload, "whsec_test", now.timestamp() - 600);
        assert!(verify_stripe_signature(payload, &header, "whsec_test", 300, now).is_err());
    }

    #[test]
    fn test_tampered_payload_is_rejected() {
        let now = Utc::now();
        let header = sign(b"{\"amount\":100}", "whsec_test", now.timestamp());
        assert!(
            verify_stripe_signature(b"{\"amount\":999}", &header, "whsec_test", 300, now).is_err()
        );
    }

    #[test]
    fn test_malformed_header_is_rejected() {
        let now = Utc::now();
        assert!(verify_stripe_signature(b"{}", "garbage", "whsec_test", 300, now).is_err());
        assert!(verify_stripe_signature(b"{}", "t=abc,v1=", "whsec_test", 300, now).is_err());
    }
}
