//! Twilio-style SMS adapter.

use dashmap::DashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{SmsAdapter, SmsMessage};

/// Twilio API configuration.
#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from_number: String,
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            account_sid: "AC_dev".to_string(),
            auth_token: "dev_token".to_string(),
            from_number: "+15550000000".to_string(),
        }
    }
}

/// SMS provider speaking the Twilio messages API.
pub struct TwilioSmsAdapter {
    config: TwilioConfig,
    /// Ledger of handed-off messages keyed by provider message SID.
    deliveries: DashMap<String, SmsMessage>,
}

impl TwilioSmsAdapter {
    pub fn new(config: TwilioConfig) -> Self {
        info!(from = %config.from_number, "Twilio adapter initialized");
        Self {
            config,
            deliveries: DashMap::new(),
        }
    }

    pub fn config(&self) -> &TwilioConfig {
        &self.config
    }

    pub fn delivery_count(&self) -> usize {
        self.deliveries.len()
    }
}

impl SmsAdapter for TwilioSmsAdapter {
    fn send_sms(&self, message: &SmsMessage) -> anyhow::Result<()> {
        if message.to.is_empty() {
            anyhow::bail!("sms message has empty recipient");
        }
        if message.body.is_empty() {
            anyhow::bail!("sms message has empty body");
        }

        debug!(to = %message.to, "Sending SMS via Twilio");

        // Request assembly (stub — in production, POST to
        // /2010-04-01/Accounts/{sid}/Messages.json).
        let _payload = serde_json::json!({
            "From": self.config.from_number,
            "To": message.to,
            "Body": message.body,
        });

        let sid = format!("SM{}", Uuid::new_v4().simple());
        self.deliveries.insert(sid, message.clone());

        metrics::counter!("channels.sms_sent").increment(1);
        Ok(())
    }
}
