//! Recording adapters — capture every send for assertions, with an
//! optional scripted failure budget. Used by engine tests and demo wiring.

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::{EmailAdapter, EmailMessage, SmsAdapter, SmsMessage};

/// Email adapter that records sends in memory. The first `fail_first`
/// calls return an error, then delivery succeeds.
#[derive(Default)]
pub struct RecordingEmailAdapter {
    sent: Mutex<Vec<EmailMessage>>,
    fail_first: AtomicU32,
}

impl RecordingEmailAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next `n` sends to fail.
    pub fn failing(n: u32) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_first: AtomicU32::new(n),
        }
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

impl EmailAdapter for RecordingEmailAdapter {
    fn send_email(&self, message: &EmailMessage) -> anyhow::Result<()> {
        let remaining = self.fail_first.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first.store(remaining - 1, Ordering::SeqCst);
            anyhow::bail!("scripted email failure");
        }
        self.sent.lock().push(message.clone());
        Ok(())
    }
}

/// SMS adapter that records sends in memory.
#[derive(Default)]
pub struct RecordingSmsAdapter {
    sent: Mutex<Vec<SmsMessage>>,
    fail_first: AtomicU32,
}

impl RecordingSmsAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(n: u32) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_first: AtomicU32::new(n),
        }
    }

    pub fn sent(&self) -> Vec<SmsMessage> {
        self.sent.lock().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }
}

impl SmsAdapter for RecordingSmsAdapter {
    fn send_sms(&self, message: &SmsMessage) -> anyhow::Result<()> {
        let remaining = self.fail_first.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_first.store(remaining - 1, Ordering::SeqCst);
            anyhow::bail!("scripted sms failure");
        }
        self.sent.lock().push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_failures_then_success() {
        let adapter = RecordingEmailAdapter::failing(2);
        let message = EmailMessage {
            to: "ada@example.com".to_string(),
            subject: "s".to_string(),
            html_body: "b".to_string(),
            text_body: None,
        };
        assert!(adapter.send_email(&message).is_err());
        assert!(adapter.send_email(&message).is_err());
        assert!(adapter.send_email(&message).is_ok());
        assert_eq!(adapter.sent_count(), 1);
    }
}
