//! Queue processor — claims due messages and dispatches them through the
//! channel adapters.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info};

use dispatch_channels::{EmailAdapter, EmailMessage, SmsAdapter, SmsMessage};
use dispatch_core::types::{
    Channel, MessageStatus, QueueRunReport, ScheduledMessage, MAX_RETRIES,
};
use dispatch_core::{DispatchError, DispatchResult};
use dispatch_store::{MessageQueue, SendLog};

/// Drains due scheduled messages, one pass per invocation.
///
/// Correctness hinges on the queue's atomic claim: invocations may overlap,
/// and a row whose claim is lost to a concurrent pass is skipped here, never
/// retried within the same pass.
pub struct QueueProcessor {
    queue: Arc<MessageQueue>,
    send_log: Arc<SendLog>,
    email: Arc<dyn EmailAdapter>,
    sms: Arc<dyn SmsAdapter>,
}

impl QueueProcessor {
    pub fn new(
        queue: Arc<MessageQueue>,
        send_log: Arc<SendLog>,
        email: Arc<dyn EmailAdapter>,
        sms: Arc<dyn SmsAdapter>,
    ) -> Self {
        Self {
            queue,
            send_log,
            email,
            sms,
        }
    }

    /// Process up to `batch_limit` due messages as of `now`.
    ///
    /// Only the due-items selection is fatal; every per-item condition is
    /// caught and folded into the report, so one poisoned row never stalls
    /// the queue.
    pub fn process_due_messages(
        &self,
        now: DateTime<Utc>,
        batch_limit: usize,
    ) -> DispatchResult<QueueRunReport> {
        let due = self.queue.due(now, batch_limit);
        let mut report = QueueRunReport::default();

        for message in due {
            // Lost claims belong to a concurrent invocation; skip.
            if !self.queue.claim(&message.id, now) {
                continue;
            }
            report.processed += 1;

            match self.dispatch(&message) {
                Ok(()) => match self.queue.mark_sent(&message.id, now) {
                    Ok(()) => {
                        let mut sent = message.clone();
                        sent.sent_at = Some(now);
                        self.send_log.append(&sent, MessageStatus::Sent);
                        metrics::counter!("engine.messages_sent").increment(1);
                        report.sent += 1;
                    }
                    Err(e) => {
                        error!(message_id = %message.id, error = %e, "Failed to persist sent status");
                        report.errors.push(format!("message {}: {}", message.id, e));
                    }
                },
                Err(e) => {
                    report.failed += 1;
                    report.errors.push(format!("message {}: {}", message.id, e));
                    match self
                        .queue
                        .record_failure(&message.id, &e.to_string(), MAX_RETRIES, now)
                    {
                        Ok(MessageStatus::Failed) => {
                            // Terminal attempt; audit it.
                            if let Some(row) = self.queue.get(&message.id) {
                                self.send_log.append(&row, MessageStatus::Failed);
                            }
                            metrics::counter!("engine.messages_failed").increment(1);
                        }
                        Ok(_) => {}
                        Err(persist) => {
                            error!(
                                message_id = %message.id,
                                error = %persist,
                                "Failed to persist failure status"
                            );
                            report
                                .errors
                                .push(format!("message {}: {}", message.id, persist));
                        }
                    }
                }
            }
        }

        info!(
            processed = report.processed,
            sent = report.sent,
            failed = report.failed,
            errors = report.errors.len(),
            "Queue pass finished"
        );
        Ok(report)
    }

    /// Hand a claimed message to its channel adapter. A missing recipient
    /// field is a local dispatch error, not a crash.
    fn dispatch(&self, message: &ScheduledMessage) -> Result<(), DispatchError> {
        match message.channel {
            Channel::Email => {
                let to = message
                    .recipient
                    .email
                    .clone()
                    .ok_or_else(|| {
                        DispatchError::Dispatch(format!(
                            "email message {} has no recipient address",
                            message.id
                        ))
                    })?;
                let email = EmailMessage {
                    to,
                    subject: message.subject.clone().unwrap_or_default(),
                    html_body: message.body.clone(),
                    text_body: message.text_body.clone(),
                };
                self.email
                    .send_email(&email)
                    .map_err(|e| DispatchError::Dispatch(e.to_string()))
            }
            Channel::Sms => {
                let to = message.recipient.phone.clone().ok_or_else(|| {
                    DispatchError::Dispatch(format!(
                        "sms message {} has no recipient phone",
                        message.id
                    ))
                })?;
                let sms = SmsMessage {
                    to,
                    body: message.body.clone(),
                };
                self.sms
                    .send_sms(&sms)
                    .map_err(|e| DispatchError::Dispatch(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use dispatch_channels::{RecordingEmailAdapter, RecordingSmsAdapter};
    use dispatch_core::types::Recipient;
    use uuid::Uuid;

    struct Fixture {
        queue: Arc<MessageQueue>,
        send_log: Arc<SendLog>,
        email: Arc<RecordingEmailAdapter>,
        sms: Arc<RecordingSmsAdapter>,
        processor: QueueProcessor,
    }

    fn fixture(email: RecordingEmailAdapter, sms: RecordingSmsAdapter) -> Fixture {
        let queue = Arc::new(MessageQueue::new());
        let send_log = Arc::new(SendLog::new());
        let email = Arc::new(email);
        let sms = Arc::new(sms);
        let processor = QueueProcessor::new(
            queue.clone(),
            send_log.clone(),
            email.clone(),
            sms.clone(),
        );
        Fixture {
            queue,
            send_log,
            email,
            sms,
            processor,
        }
    }

    fn due_email(to: Option<&str>) -> ScheduledMessage {
        ScheduledMessage::new(
            Channel::Email,
            Recipient {
                email: to.map(str::to_string),
                ..Default::default()
            },
            Uuid::new_v4(),
            Some("Welcome".to_string()),
            "<p>Welcome</p>".to_string(),
            Some("Welcome".to_string()),
            Utc::now() - Duration::minutes(1),
        )
    }

    fn due_sms(phone: Option<&str>) -> ScheduledMessage {
        ScheduledMessage::new(
            Channel::Sms,
            Recipient {
                phone: phone.map(str::to_string),
                ..Default::default()
            },
            Uuid::new_v4(),
            None,
            "Your order shipped".to_string(),
            None,
            Utc::now() - Duration::minutes(1),
        )
    }

    #[test]
    fn test_successful_send_ends_sent_with_log_entry() {
        let f = fixture(RecordingEmailAdapter::new(), RecordingSmsAdapter::new());
        let id = f.queue.insert(due_email(Some("ada@example.com")));

        let now = Utc::now();
        let report = f.processor.process_due_messages(now, 50).unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.sent, 1);
        assert_eq!(report.failed, 0);

        let row = f.queue.get(&id).unwrap();
        assert_eq!(row.status, MessageStatus::Sent);
        assert_eq!(row.sent_at, Some(now));
        assert_eq!(f.email.sent_count(), 1);
        assert_eq!(f.send_log.for_recipient("ada@example.com").len(), 1);
    }

    #[test]
    fn test_sms_dispatch_uses_phone() {
        let f = fixture(RecordingEmailAdapter::new(), RecordingSmsAdapter::new());
        f.queue.insert(due_sms(Some("+15559876543")));

        let report = f.processor.process_due_messages(Utc::now(), 50).unwrap();
        assert_eq!(report.sent, 1);
        assert_eq!(f.sms.sent_count(), 1);
        assert_eq!(f.sms.sent()[0].body, "Your order shipped");
    }

    #[test]
    fn test_missing_recipient_is_a_dispatch_error() {
        let f = fixture(RecordingEmailAdapter::new(), RecordingSmsAdapter::new());
        let id = f.queue.insert(due_email(None));

        let report = f.processor.process_due_messages(Utc::now(), 50).unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.sent, 0);
        assert_eq!(report.failed, 1);
        assert_eq!(report.errors.len(), 1);

        // Back to pending for the next pass, with the error recorded.
        let row = f.queue.get(&id).unwrap();
        assert_eq!(row.status, MessageStatus::Pending);
        assert_eq!(row.retry_count, 1);
        assert!(row.error_message.is_some());
    }

    #[test]
    fn test_exhausted_retries_become_terminal_failed() {
        let f = fixture(RecordingEmailAdapter::failing(10), RecordingSmsAdapter::new());
        let id = f.queue.insert(due_email(Some("ada@example.com")));

        for _ in 0..MAX_RETRIES {
            f.processor.process_due_messages(Utc::now(), 50).unwrap();
        }

        let row = f.queue.get(&id).unwrap();
        assert_eq!(row.status, MessageStatus::Failed);
        assert_eq!(row.retry_count, MAX_RETRIES);
        assert!(row.error_message.is_some());
        assert!(row.sent_at.is_none());

        // Excluded from all subsequent selections.
        let report = f.processor.process_due_messages(Utc::now(), 50).unwrap();
        assert_eq!(report.processed, 0);

        // Terminal failure is audited.
        assert_eq!(f.send_log.for_recipient("ada@example.com").len(), 1);
    }

    #[test]
    fn test_transient_failure_then_recovery() {
        let f = fixture(RecordingEmailAdapter::failing(1), RecordingSmsAdapter::new());
        let id = f.queue.insert(due_email(Some("ada@example.com")));

        let first = f.processor.process_due_messages(Utc::now(), 50).unwrap();
        assert_eq!(first.failed, 1);

        let second = f.processor.process_due_messages(Utc::now(), 50).unwrap();
        assert_eq!(second.sent, 1);

        let row = f.queue.get(&id).unwrap();
        assert_eq!(row.status, MessageStatus::Sent);
        assert_eq!(row.retry_count, 1);
    }

    #[test]
    fn test_row_claimed_elsewhere_is_skipped() {
        let f = fixture(RecordingEmailAdapter::new(), RecordingSmsAdapter::new());
        let id = f.queue.insert(due_email(Some("ada@example.com")));

        // A concurrent invocation holds the claim.
        assert!(f.queue.claim(&id, Utc::now()));

        let report = f.processor.process_due_messages(Utc::now(), 50).unwrap();
        assert_eq!(report.processed, 0);
        assert_eq!(f.email.sent_count(), 0);
    }

    #[test]
    fn test_batch_limit_leaves_remainder_for_next_pass() {
        let f = fixture(RecordingEmailAdapter::new(), RecordingSmsAdapter::new());
        for _ in 0..5 {
            f.queue.insert(due_email(Some("ada@example.com")));
        }

        let first = f.processor.process_due_messages(Utc::now(), 3).unwrap();
        assert_eq!(first.processed, 3);

        let second = f.processor.process_due_messages(Utc::now(), 3).unwrap();
        assert_eq!(second.processed, 2);
    }

    #[test]
    fn test_one_bad_item_does_not_stall_the_batch() {
        let f = fixture(RecordingEmailAdapter::new(), RecordingSmsAdapter::new());
        f.queue.insert(due_email(None));
        f.queue.insert(due_email(Some("ada@example.com")));
        f.queue.insert(due_sms(Some("+15550001111")));

        let report = f.processor.process_due_messages(Utc::now(), 50).unwrap();
        assert_eq!(report.processed, 3);
        assert_eq!(report.sent, 2);
        assert_eq!(report.failed, 1);
    }
}
