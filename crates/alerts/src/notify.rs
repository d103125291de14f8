//! Notification channel fan-out for fired alerts.

use std::sync::Arc;

use async_trait::async_trait;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use metahub_core::{AlertChannel, AlertHistory, AlertRule, LogCategory, LogEntry, LogLevel};
use metahub_store::LogStore;
use tracing::{debug, warn};

use crate::error::AlertError;

/// Pluggable email delivery, so tests can observe sends without SMTP.
#[async_trait]
pub trait EmailBackend: Send + Sync {
    /// Send one alert email to the listed recipients.
    async fn send(&self, to: &[String], subject: &str, body: &str) -> Result<(), AlertError>;
}

/// SMTP configuration for the email channel.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    /// Relay hostname.
    pub host: String,
    /// Sender address.
    pub from_address: String,
    /// Optional relay credentials.
    pub credentials: Option<(String, String)>,
}

/// `lettre`-based SMTP email backend.
pub struct SmtpBackend {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpBackend {
    /// Build a backend from the relay configuration.
    pub fn new(config: &SmtpConfig) -> Result<Self, AlertError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| AlertError::Email(format!("relay setup failed: {e}")))?;
        if let Some((user, pass)) = &config.credentials {
            builder = builder.credentials(lettre::transport::smtp::authentication::Credentials::new(
                user.clone(),
                pass.clone(),
            ));
        }
        Ok(Self {
            transport: builder.build(),
            from_address: config.from_address.clone(),
        })
    }
}

#[async_trait]
impl EmailBackend for SmtpBackend {
    async fn send(&self, to: &[String], subject: &str, body: &str) -> Result<(), AlertError> {
        let mut builder = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|e| AlertError::Email(format!("bad sender address: {e}")))?,
            )
            .subject(subject);
        for recipient in to {
            builder = builder.to(recipient
                .parse()
                .map_err(|e| AlertError::Email(format!("bad recipient {recipient}: {e}")))?);
        }
        let message = builder
            .body(body.to_owned())
            .map_err(|e| AlertError::Email(e.to_string()))?;
        self.transport
            .send(message)
            .await
            .map_err(|e| AlertError::Email(e.to_string()))?;
        Ok(())
    }
}

/// Fans one fired alert out to the rule's channels, reporting which ones
/// actually accepted it.
pub struct Notifier {
    logs: Arc<dyn LogStore>,
    email: Option<Arc<dyn EmailBackend>>,
    http: reqwest::Client,
}

impl Notifier {
    /// Create a notifier with no email backend configured.
    #[must_use]
    pub fn new(logs: Arc<dyn LogStore>) -> Self {
        Self {
            logs,
            email: None,
            http: reqwest::Client::new(),
        }
    }

    /// Attach an email backend.
    #[must_use]
    pub fn with_email(mut self, email: Arc<dyn EmailBackend>) -> Self {
        self.email = Some(email);
        self
    }

    /// Attempt every channel of the rule. Returns the channels that
    /// accepted the notification; per-channel failures only log.
    pub async fn notify(&self, rule: &AlertRule, history: &AlertHistory) -> Vec<AlertChannel> {
        let mut reached = Vec::new();
        for channel in &rule.notify_channels {
            let accepted = match channel {
                AlertChannel::InApp => self.notify_in_app(rule, history).await,
                AlertChannel::Email => self.notify_email(rule, history).await,
                AlertChannel::Webhook => self.notify_webhook(rule, history).await,
            };
            if accepted {
                reached.push(*channel);
            }
        }
        reached
    }

    /// The in-app channel is a log sink row and always succeeds.
    async fn notify_in_app(&self, rule: &AlertRule, history: &AlertHistory) -> bool {
        let entry = LogEntry::new(
            rule.tenant.clone(),
            LogLevel::Warn,
            LogCategory::Alert,
            "alert.triggered",
            format!("Alert rule '{}' fired", rule.name),
        )
        .with_resource(history.id.to_string())
        .with_metadata(history.condition_snapshot.clone());
        if let Err(e) = self.logs.append(entry).await {
            warn!(error = %e, "in-app alert row failed to write");
        }
        true
    }

    async fn notify_email(&self, rule: &AlertRule, history: &AlertHistory) -> bool {
        let Some(backend) = &self.email else {
            debug!(rule = %rule.name, "email channel configured but no backend available");
            return false;
        };
        if rule.notify_config.email_to.is_empty() {
            return false;
        }
        let subject = format!("[MetaHub] Alert: {}", rule.name);
        let body = format!(
            "Alert rule '{}' fired at {}.\n\nMeasured values:\n{}",
            rule.name,
            history.triggered_at.to_rfc3339(),
            serde_json::to_string_pretty(&history.condition_snapshot).unwrap_or_default()
        );
        match backend.send(&rule.notify_config.email_to, &subject, &body).await {
            Ok(()) => true,
            Err(e) => {
                warn!(rule = %rule.name, error = %e, "alert email rejected");
                false
            }
        }
    }

    async fn notify_webhook(&self, rule: &AlertRule, history: &AlertHistory) -> bool {
        let Some(url) = &rule.notify_config.webhook_url else {
            return false;
        };
        match self.http.post(url).json(history).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(rule = %rule.name, status = %response.status(), "alert webhook rejected");
                false
            }
            Err(e) => {
                warn!(rule = %rule.name, error = %e, "alert webhook unreachable");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use metahub_core::{AlertCondition, NotifyConfig};
    use metahub_store_memory::MemoryLogStore;

    use super::*;

    struct RecordingEmail {
        sent: Mutex<Vec<(Vec<String>, String)>>,
        accept: bool,
    }

    #[async_trait]
    impl EmailBackend for RecordingEmail {
        async fn send(&self, to: &[String], subject: &str, _body: &str) -> Result<(), AlertError> {
            if self.accept {
                self.sent.lock().unwrap().push((to.to_vec(), subject.to_owned()));
                Ok(())
            } else {
                Err(AlertError::Email("mailbox full".into()))
            }
        }
    }

    fn rule(channels: Vec<AlertChannel>) -> AlertRule {
        AlertRule::new("ws-1", "dlq watch", AlertCondition::DlqThreshold { threshold: 1 })
            .with_channels(channels)
            .with_notify_config(NotifyConfig {
                email_to: vec!["ops@example.com".into()],
                webhook_url: None,
            })
    }

    #[tokio::test]
    async fn in_app_always_succeeds() {
        let logs = Arc::new(MemoryLogStore::new());
        let notifier = Notifier::new(logs.clone());
        let r = rule(vec![AlertChannel::InApp]);
        let history = AlertHistory::triggered(&r, serde_json::json!({"dlq_count": 2}));

        let reached = notifier.notify(&r, &history).await;
        assert_eq!(reached, vec![AlertChannel::InApp]);

        let rows = logs
            .query(&metahub_store::LogQuery::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].action, "alert.triggered");
    }

    #[tokio::test]
    async fn email_recorded_only_when_accepted() {
        let logs: Arc<dyn LogStore> = Arc::new(MemoryLogStore::new());
        let backend = Arc::new(RecordingEmail {
            sent: Mutex::new(Vec::new()),
            accept: true,
        });
        let notifier = Notifier::new(Arc::clone(&logs)).with_email(backend.clone());
        let r = rule(vec![AlertChannel::Email]);
        let history = AlertHistory::triggered(&r, serde_json::json!({}));

        assert_eq!(notifier.notify(&r, &history).await, vec![AlertChannel::Email]);
        assert_eq!(backend.sent.lock().unwrap().len(), 1);

        let rejecting = Notifier::new(logs).with_email(Arc::new(RecordingEmail {
            sent: Mutex::new(Vec::new()),
            accept: false,
        }));
        assert!(rejecting.notify(&r, &history).await.is_empty());
    }

    #[tokio::test]
    async fn email_without_backend_is_not_recorded() {
        let notifier = Notifier::new(Arc::new(MemoryLogStore::new()));
        let r = rule(vec![AlertChannel::Email, AlertChannel::InApp]);
        let history = AlertHistory::triggered(&r, serde_json::json!({}));
        // in_app still succeeds even when email cannot.
        assert_eq!(notifier.notify(&r, &history).await, vec![AlertChannel::InApp]);
    }
}
