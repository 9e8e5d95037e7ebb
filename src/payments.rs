use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

const STRIPE_PAYMENT_INTENTS_URL: &str = "https://api.stripe.com/v1/payment_intents";

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("gateway rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("simulated gateway failure")]
    Simulated,
}

/// PaymentGateway
///
/// Contract with the card processor. The server only ever creates payment
/// intents; confirmation happens client-side with the returned secret.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a card payment intent for `amount` minor units of `currency`
    /// and returns its client secret.
    async fn create_payment_intent(&self, amount: i64, currency: &str)
    -> Result<String, PaymentError>;
}

pub type PaymentState = Arc<dyn PaymentGateway>;

/// Converts a dollar price into cents. Rejects non-finite and non-positive amounts.
pub fn amount_in_cents(price: f64) -> Option<i64> {
    if !price.is_finite() || price <= 0.0 {
        return None;
    }
    Some((price * 100.0).round() as i64)
}

// --- Stripe ---

#[derive(Deserialize)]
struct StripePaymentIntent {
    client_secret: String,
}

/// StripeGateway
///
/// Creates payment intents through Stripe's form-encoded REST API.
#[derive(Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    secret_key: String,
}

impl StripeGateway {
    pub fn new(secret_key: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            secret_key: secret_key.into(),
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_payment_intent(
        &self,
        amount: i64,
        currency: &str,
    ) -> Result<String, PaymentError> {
        let amount = amount.to_string();
        let response = self
            .client
            .post(STRIPE_PAYMENT_INTENTS_URL)
            .bearer_auth(&self.secret_key)
            .form(&[
                ("amount", amount.as_str()),
                ("currency", currency),
                ("payment_method_types[]", "card"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let intent = response.json::<StripePaymentIntent>().await?;
        Ok(intent.client_secret)
    }
}

// --- Mock ---

/// MockPaymentGateway
///
/// In-process gateway for local runs without a Stripe key and for tests.
/// Secrets are deterministic so assertions can match them.
#[derive(Clone, Default)]
pub struct MockPaymentGateway {
    /// When true, every call fails with `PaymentError::Simulated`.
    pub should_fail: bool,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self { should_fail: false }
    }

    pub fn new_failing() -> Self {
        Self { should_fail: true }
    }
}

#[async_trait]
impl PaymentGateway for MockPaymentGateway {
    async fn create_payment_intent(
        &self,
        amount: i64,
        currency: &str,
    ) -> Result<String, PaymentError> {
        if self.should_fail {
            return Err(PaymentError::Simulated);
        }
        Ok(format!("pi_mock_{amount}_{currency}_secret"))
    }
}
