use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::config::MailgunConfig;

const ORDER_SUBJECT: &str = "Bistro Boss Order Confirmation";

#[derive(Error, Debug)]
pub enum MailError {
    #[error("mail request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("mail provider rejected the message with status {0}")]
    Rejected(u16),
}

/// OrderConfirmation
///
/// The one message this server sends: a thank-you carrying the transaction id.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderConfirmation {
    pub to: String,
    pub transaction_id: String,
}

impl OrderConfirmation {
    pub fn subject(&self) -> &'static str {
        ORDER_SUBJECT
    }

    pub fn text(&self) -> String {
        format!(
            "Thank you for your order. Your transaction id: {}",
            self.transaction_id
        )
    }

    pub fn html(&self) -> String {
        format!(
            "<div><h2>Thank You for your order</h2>\
             <h4>Your Transaction Id: <strong>{}</strong></h4>\
             <p>We would like to get your feedback about the food</p></div>",
            escape_html(&self.transaction_id)
        )
    }
}

/// The transaction id comes from the client; it must not inject markup.
fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Mailer
///
/// Outbound email contract. Callers run it in the background; a failed send
/// never fails the request that triggered it.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_order_confirmation(&self, message: &OrderConfirmation) -> Result<(), MailError>;
}

pub type MailerState = Arc<dyn Mailer>;

/// MailgunMailer
///
/// Sends through the Mailgun messages API with basic auth (`api:<key>`).
#[derive(Clone)]
pub struct MailgunMailer {
    client: reqwest::Client,
    config: MailgunConfig,
}

impl MailgunMailer {
    pub fn new(config: MailgunConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl Mailer for MailgunMailer {
    async fn send_order_confirmation(&self, message: &OrderConfirmation) -> Result<(), MailError> {
        let url = format!("https://api.mailgun.net/v3/{}/messages", self.config.domain);
        let text = message.text();
        let html = message.html();

        let response = self
            .client
            .post(url)
            .basic_auth("api", Some(&self.config.api_key))
            .form(&[
                ("from", self.config.from.as_str()),
                ("to", message.to.as_str()),
                ("subject", message.subject()),
                ("text", text.as_str()),
                ("html", html.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(MailError::Rejected(response.status().as_u16()));
        }
        Ok(())
    }
}

/// LogMailer
///
/// Local fallback when Mailgun is not configured: logs the message and
/// keeps nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_order_confirmation(&self, message: &OrderConfirmation) -> Result<(), MailError> {
        tracing::info!(to = %message.to, transaction_id = %message.transaction_id, "order confirmation (not sent)");
        Ok(())
    }
}

/// MockMailer
///
/// Keeps every message in memory so tests can inspect the outbox.
#[derive(Clone, Default)]
pub struct MockMailer {
    outbox: Arc<Mutex<Vec<OrderConfirmation>>>,
}

impl MockMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<OrderConfirmation> {
        self.outbox
            .lock()
            .map(|outbox| outbox.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send_order_confirmation(&self, message: &OrderConfirmation) -> Result<(), MailError> {
        tracing::debug!(to = %message.to, "order confirmation recorded");
        if let Ok(mut outbox) = self.outbox.lock() {
            outbox.push(message.clone());
        }
        Ok(())
    }
}
