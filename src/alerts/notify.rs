//! Outbound alert notifications
//!
//! Delivery failures are logged and swallowed here, never propagated: a dead
//! webhook endpoint or SMTP relay must not fail the evaluation cycle, and
//! the history row for the evaluation is written regardless.

use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde_json::json;

/// Everything needed to notify about one triggered alert
#[derive(Clone, Debug)]
pub struct AlertNotification {
    pub alert_id: i32,
    pub alert_name: String,
    pub email: Option<String>,
    pub webhook_url: Option<String>,
    /// Extra headers in configured order
    pub webhook_headers: IndexMap<String, String>,
    pub column: String,
    pub operator: String,
    pub threshold: f64,
    pub actual_value: f64,
    pub query_id: i32,
    pub query_name: String,
}

#[async_trait]
pub trait AlertNotifier: Send + Sync {
    /// Dispatch all configured channels for a triggered alert. Must not
    /// return errors; failures are the notifier's problem to log.
    async fn notify(&self, notification: &AlertNotification);
}

/// SMTP relay settings for email dispatch
#[derive(Clone, Debug)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

impl SmtpSettings {
    /// Read `MERIDIAN_SMTP_*` from the environment; None when unset
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("MERIDIAN_SMTP_HOST").ok()?;
        Some(Self {
            host,
            port: std::env::var("MERIDIAN_SMTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(587),
            username: std::env::var("MERIDIAN_SMTP_USERNAME").unwrap_or_default(),
            password: std::env::var("MERIDIAN_SMTP_PASSWORD").unwrap_or_default(),
            from_address: std::env::var("MERIDIAN_SMTP_FROM")
                .unwrap_or_else(|_| "alerts@meridian.local".to_string()),
        })
    }
}

/// Production notifier: email over SMTP, webhook over HTTP POST
pub struct DefaultNotifier {
    http: reqwest::Client,
    mailer: Option<(AsyncSmtpTransport<Tokio1Executor>, String)>,
}

impl DefaultNotifier {
    pub fn new(smtp: Option<SmtpSettings>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();

        let mailer = smtp.and_then(|settings| {
            match AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host) {
                Ok(builder) => {
                    let transport = builder
                        .port(settings.port)
                        .credentials(Credentials::new(
                            settings.username.clone(),
                            settings.password.clone(),
                        ))
                        .build();
                    Some((transport, settings.from_address))
                }
                Err(e) => {
                    tracing::warn!("SMTP relay configuration invalid, email disabled: {}", e);
                    None
                }
            }
        });

        Self { http, mailer }
    }

    async fn send_email(&self, notification: &AlertNotification, to: &str) {
        let Some((mailer, from)) = &self.mailer else {
            tracing::debug!(
                "No SMTP relay configured; skipping email for alert {}",
                notification.alert_id
            );
            return;
        };

        let body = format!(
            "Alert \"{}\" triggered.\n\nCondition: {} {} {}\nObserved value: {}\nQuery: {}\n",
            notification.alert_name,
            notification.column,
            notification.operator,
            notification.threshold,
            notification.actual_value,
            notification.query_name,
        );

        let message = Message::builder()
            .from(match from.parse() {
                Ok(addr) => addr,
                Err(e) => {
                    tracing::warn!("Invalid from address '{}': {}", from, e);
                    return;
                }
            })
            .to(match to.parse() {
                Ok(addr) => addr,
                Err(e) => {
                    tracing::warn!("Invalid recipient '{}': {}", to, e);
                    return;
                }
            })
            .subject(format!("[Alert] {} triggered", notification.alert_name))
            .header(ContentType::TEXT_PLAIN)
            .body(body);

        match message {
            Ok(message) => {
                if let Err(e) = mailer.send(message).await {
                    tracing::warn!(
                        "Email dispatch failed for alert {}: {}",
                        notification.alert_id,
                        e
                    );
                }
            }
            Err(e) => {
                tracing::warn!("Could not build email for alert {}: {}", notification.alert_id, e)
            }
        }
    }

    async fn post_webhook(&self, notification: &AlertNotification, url: &str) {
        let payload = webhook_payload(notification);

        let mut request = self.http.post(url).json(&payload);
        for (name, value) in &notification.webhook_headers {
            request = request.header(name.as_str(), value.as_str());
        }

        match request.send().await {
            Ok(response) if !response.status().is_success() => {
                tracing::warn!(
                    "Webhook for alert {} returned HTTP {}",
                    notification.alert_id,
                    response.status()
                );
            }
            Ok(_) => {
                tracing::info!("Webhook delivered for alert {}", notification.alert_id);
            }
            Err(e) => {
                tracing::warn!("Webhook dispatch failed for alert {}: {}", notification.alert_id, e);
            }
        }
    }
}

#[async_trait]
impl AlertNotifier for DefaultNotifier {
    async fn notify(&self, notification: &AlertNotification) {
        if let Some(email) = &notification.email {
            self.send_email(notification, email).await;
        }
        if let Some(url) = &notification.webhook_url {
            self.post_webhook(notification, url).await;
        }
    }
}

/// The wire payload external receivers integrate against
pub(crate) fn webhook_payload(notification: &AlertNotification) -> serde_json::Value {
    json!({
        "event": "alert_triggered",
        "alertId": notification.alert_id,
        "alertName": notification.alert_name,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "condition": {
            "column": notification.column,
            "operator": notification.operator,
            "threshold": notification.threshold,
            "actualValue": notification.actual_value,
        },
        "query": {
            "id": notification.query_id,
            "name": notification.query_name,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_webhook_payload_shape() {
        let notification = AlertNotification {
            alert_id: 3,
            alert_name: "Revenue dip".to_string(),
            email: None,
            webhook_url: Some("https://hooks.example.com/x".to_string()),
            webhook_headers: IndexMap::new(),
            column: "revenue".to_string(),
            operator: "<".to_string(),
            threshold: 1000.0,
            actual_value: 812.5,
            query_id: 9,
            query_name: "Daily revenue".to_string(),
        };

        let payload = webhook_payload(&notification);
        assert_eq!(payload["event"], "alert_triggered");
        assert_eq!(payload["alertId"], 3);
        assert_eq!(payload["condition"]["operator"], "<");
        assert_eq!(payload["condition"]["actualValue"], 812.5);
        assert_eq!(payload["query"]["id"], 9);
        assert!(payload["timestamp"].is_string());
    }
}
