/// Outbound notifications
///
/// [`Notifier`] is how the API and the worker tell users about things:
/// account emails (verification, password reset) and price alerts.
///
/// Two implementations ship with the crate:
///
/// - [`LogNotifier`]: writes every message to the tracing log. There is no
///   SMTP transport; deployments read delivery from logs.
/// - [`MemoryNotifier`]: keeps messages in memory for tests.

pub mod templates;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::product::Product;
use crate::models::user::User;

pub use templates::EmailContent;

/// Notification errors
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Failed to deliver notification: {0}")]
    Delivery(String),
}

/// Email ready to send
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
}

impl EmailMessage {
    pub fn new(to: impl Into<String>, content: EmailContent) -> Self {
        Self {
            to: to.into(),
            subject: content.subject,
            html: content.html,
        }
    }
}

/// A product reached its owner's target price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceAlert {
    pub product_id: Uuid,
    pub user_id: Uuid,
    pub user_email: String,
    pub user_name: String,
    pub title: String,
    pub url: String,
    pub price: f64,
    pub target_price: f64,
}

impl PriceAlert {
    /// Alert for `product` at its current price, addressed to `owner`
    pub fn for_product(product: &Product, owner: &User) -> Self {
        Self {
            product_id: product.id,
            user_id: owner.id,
            user_email: owner.email.clone(),
            user_name: owner.name.clone(),
            title: product.title.clone(),
            url: product.url.clone(),
            price: product.current_price,
            target_price: product.target_price,
        }
    }
}

/// Delivers notifications to users
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends one email
    async fn send_email(&self, message: EmailMessage) -> Result<(), NotifyError>;

    /// Tells a user their target price was reached
    async fn price_alert(&self, alert: &PriceAlert) -> Result<(), NotifyError> {
        tracing::info!(
            product_id = %alert.product_id,
            user_id = %alert.user_id,
            price = alert.price,
            target_price = alert.target_price,
            "Price alert: {} is at or below target",
            alert.title
        );

        let content = templates::price_alert_email(alert);
        self.send_email(EmailMessage::new(alert.user_email.clone(), content))
            .await
    }
}

/// Notifier that only logs
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_email(&self, message: EmailMessage) -> Result<(), NotifyError> {
        tracing::info!(to = %message.to, subject = %message.subject, "Email queued");
        tracing::debug!(to = %message.to, body = %message.html, "Email body");
        Ok(())
    }
}

/// Notifier that records messages in memory
#[derive(Debug, Default)]
pub struct MemoryNotifier {
    emails: Mutex<Vec<EmailMessage>>,
    alerts: Mutex<Vec<PriceAlert>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emails sent so far
    pub fn emails(&self) -> Vec<EmailMessage> {
        self.emails.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Price alerts raised so far
    pub fn alerts(&self) -> Vec<PriceAlert> {
        self.alerts.lock().map(|a| a.clone()).unwrap_or_default()
    }

    /// Most recent email to `to`
    pub fn last_email_to(&self, to: &str) -> Option<EmailMessage> {
        self.emails().into_iter().rev().find(|m| m.to == to)
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn send_email(&self, message: EmailMessage) -> Result<(), NotifyError> {
        self.emails
            .lock()
            .map_err(|_| NotifyError::Delivery("mailbox lock poisoned".to_string()))?
            .push(message);
        Ok(())
    }

    async fn price_alert(&self, alert: &PriceAlert) -> Result<(), NotifyError> {
        self.alerts
            .lock()
            .map_err(|_| NotifyError::Delivery("alert lock poisoned".to_string()))?
            .push(alert.clone());

        let content = templates::price_alert_email(alert);
        self.send_email(EmailMessage::new(alert.user_email.clone(), content))
            .await
    }
}

/// Extracts the `token` query parameter from a link in an email body
///
/// Used to follow verification and reset links.
pub fn token_from_link(html: &str) -> Option<String> {
    let start = html.find("token=")? + "token=".len();
    let token: String = html[start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();

    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert() -> PriceAlert {
        PriceAlert {
            product_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            user_email: "ada@example.com".to_string(),
            user_name: "Ada".to_string(),
            title: "Kettle".to_string(),
            url: "https://shop.example.com/kettle".to_string(),
            price: 20.0,
            target_price: 25.0,
        }
    }

    #[tokio::test]
    async fn test_log_notifier_accepts_everything() {
        let notifier = LogNotifier;
        notifier.price_alert(&alert()).await.unwrap();
        notifier
            .send_email(EmailMessage::new(
                "ada@example.com",
                templates::verification_email("Ada", "http://x/verify-email?token=abc"),
            ))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_memory_notifier_records() {
        let notifier = MemoryNotifier::new();

        notifier.price_alert(&alert()).await.unwrap();

        assert_eq!(notifier.alerts().len(), 1);
        let email = notifier.last_email_to("ada@example.com").unwrap();
        assert_eq!(email.subject, "Price alert: Kettle");
        assert!(notifier.last_email_to("bob@example.com").is_none());
    }

    #[test]
    fn test_token_from_link() {
        let content =
            templates::password_reset_email("Ada", "http://x/reset-password?token=AbC123");
        assert_eq!(token_from_link(&content.html).as_deref(), Some("AbC123"));
        assert_eq!(token_from_link("<p>no link</p>"), None);
    }
}
