//! Append-only audit trail of terminal send attempts.

use parking_lot::RwLock;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use dispatch_core::types::{Channel, MessageStatus, RelatedEntity, ScheduledMessage, SendLogEntry};

/// Append-only send log. Entries are immutable once written; external
/// CRM and audit viewers reconstruct delivery history from them.
pub struct SendLog {
    entries: RwLock<Vec<SendLogEntry>>,
}

impl SendLog {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Append an entry for a message's terminal send attempt.
    pub fn append(&self, message: &ScheduledMessage, status: MessageStatus) -> SendLogEntry {
        let recipient = match message.channel {
            Channel::Email => message.recipient.email.clone(),
            Channel::Sms => message.recipient.phone.clone(),
        }
        .unwrap_or_default();

        let entry = SendLogEntry {
            id: Uuid::new_v4(),
            message_id: message.id,
            channel: message.channel,
            recipient,
            subject: message.subject.clone(),
            status,
            related_entity: message.related_entity.clone(),
            logged_at: Utc::now(),
        };
        info!(
            message_id = %message.id,
            channel = ?message.channel,
            status = ?status,
            "Send logged"
        );
        self.entries.write().push(entry.clone());
        entry
    }

    /// All entries addressed to `recipient`, oldest first.
    pub fn for_recipient(&self, recipient: &str) -> Vec<SendLogEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.recipient == recipient)
            .cloned()
            .collect()
    }

    /// Entries correlated to an external entity.
    pub fn for_entity(&self, entity: &RelatedEntity) -> Vec<SendLogEntry> {
        self.entries
            .read()
            .iter()
            .filter(|e| e.related_entity.as_ref() == Some(entity))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SendLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_core::types::Recipient;

    fn email_message(to: &str) -> ScheduledMessage {
        ScheduledMessage::new(
            Channel::Email,
            Recipient {
                email: Some(to.to_string()),
                ..Default::default()
            },
            Uuid::new_v4(),
            Some("Receipt".to_string()),
            "<p>Thanks!</p>".to_string(),
            None,
            Utc::now(),
        )
    }

    #[test]
    fn test_append_and_query_by_recipient() {
        let log = SendLog::new();
        log.append(&email_message("ada@example.com"), MessageStatus::Sent);
        log.append(&email_message("grace@example.com"), MessageStatus::Sent);
        log.append(&email_message("ada@example.com"), MessageStatus::Failed);

        let entries = log.for_recipient("ada@example.com");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].status, MessageStatus::Sent);
        assert_eq!(entries[1].status, MessageStatus::Failed);
        assert_eq!(log.len(), 3);
    }

    #[test]
    fn test_query_by_entity() {
        let log = SendLog::new();
        let message = email_message("ada@example.com").with_related_entity("order", "ord-42");
        log.append(&message, MessageStatus::Sent);

        let entity = RelatedEntity {
            entity_type: "order".to_string(),
            entity_id: "ord-42".to_string(),
        };
        assert_eq!(log.for_entity(&entity).len(), 1);
    }
}
