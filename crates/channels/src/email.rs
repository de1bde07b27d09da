//! SMTP relay email adapter.
//!
//! Assembles the outbound payload and hands it to the configured relay.
//! In production the handoff is an SMTP transaction; this build logs the
//! payload and keeps a delivery ledger for inspection.

use dashmap::DashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{EmailAdapter, EmailMessage};

/// SMTP relay configuration.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub from_email: String,
    pub from_name: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 587,
            from_email: "no-reply@dispatch.express".to_string(),
            from_name: "DispatchExpress".to_string(),
        }
    }
}

/// Email provider speaking to an SMTP relay.
pub struct SmtpEmailAdapter {
    config: SmtpConfig,
    /// Ledger of handed-off messages keyed by provider message id.
    deliveries: DashMap<String, EmailMessage>,
}

impl SmtpEmailAdapter {
    pub fn new(config: SmtpConfig) -> Self {
        info!(
            host = %config.host,
            port = config.port,
            from = %config.from_email,
            "SMTP adapter initialized"
        );
        Self {
            config,
            deliveries: DashMap::new(),
        }
    }

    pub fn config(&self) -> &SmtpConfig {
        &self.config
    }

    pub fn delivery_count(&self) -> usize {
        self.deliveries.len()
    }
}

impl EmailAdapter for SmtpEmailAdapter {
    fn send_email(&self, message: &EmailMessage) -> anyhow::Result<()> {
        if message.to.is_empty() {
            anyhow::bail!("email message has empty recipient");
        }

        debug!(
            to = %message.to,
            subject = %message.subject,
            "Sending email via SMTP relay"
        );

        // Envelope assembly (stub — in production, an SMTP transaction).
        let _envelope = serde_json::json!({
            "from": {
                "email": self.config.from_email,
                "name": self.config.from_name,
            },
            "to": message.to,
            "subject": message.subject,
            "html": message.html_body,
            "text": message.text_body,
        });

        let provider_id = format!("smtp-{}", Uuid::new_v4());
        self.deliveries.insert(provider_id, message.clone());

        metrics::counter!("channels.emails_sent").increment(1);
        Ok(())
    }
}
