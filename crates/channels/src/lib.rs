//! Channel adapters — the delivery boundary of the engine.
//!
//! Adapters expose a synchronous send contract with no retries or queuing
//! of their own; retry bookkeeping lives entirely in the queue processor.

pub mod email;
pub mod recording;
pub mod sms;

pub use email::{SmtpConfig, SmtpEmailAdapter};
pub use recording::{RecordingEmailAdapter, RecordingSmsAdapter};
pub use sms::{TwilioConfig, TwilioSmsAdapter};

/// A fully rendered email ready for handoff to a provider.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub text_body: Option<String>,
}

/// A fully rendered SMS ready for handoff to a provider.
#[derive(Debug, Clone)]
pub struct SmsMessage {
    pub to: String,
    pub body: String,
}

/// Email delivery contract. An `Err` means this attempt failed; the caller
/// decides whether to retry.
pub trait EmailAdapter: Send + Sync {
    fn send_email(&self, message: &EmailMessage) -> anyhow::Result<()>;
}

/// SMS delivery contract.
pub trait SmsAdapter: Send + Sync {
    fn send_sms(&self, message: &SmsMessage) -> anyhow::Result<()>;
}
