//! Scheduled message queue — a durable table of send intents with a
//! status state machine and an atomic pending→processing claim.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use dispatch_core::types::{MessageStatus, ScheduledMessage};

/// Per-status row counts, surfaced on the operational API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub sent: u64,
    pub failed: u64,
}

/// Thread-safe message queue backed by `DashMap`. Rows are never deleted;
/// terminal rows stay for audit.
pub struct MessageQueue {
    messages: DashMap<Uuid, ScheduledMessage>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self {
            messages: DashMap::new(),
        }
    }

    /// Insert a new send intent and return its id.
    pub fn insert(&self, message: ScheduledMessage) -> Uuid {
        let id = message.id;
        info!(
            message_id = %id,
            channel = ?message.channel,
            scheduled_for = %message.scheduled_for,
            "Message enqueued"
        );
        self.messages.insert(id, message);
        id
    }

    pub fn get(&self, id: &Uuid) -> Option<ScheduledMessage> {
        self.messages.get(id).map(|r| r.clone())
    }

    /// Rows with `status=pending` and `scheduled_for <= now`, oldest first,
    /// capped at `limit`. The cap bounds per-invocation latency; any
    /// remainder is picked up by the next trigger.
    pub fn due(&self, now: DateTime<Utc>, limit: usize) -> Vec<ScheduledMessage> {
        let mut due: Vec<ScheduledMessage> = self
            .messages
            .iter()
            .filter(|r| r.status == MessageStatus::Pending && r.scheduled_for <= now)
            .map(|r| r.clone())
            .collect();
        due.sort_by_key(|m| m.scheduled_for);
        due.truncate(limit);
        due
    }

    /// Claim a row for dispatch: a single conditional pending→processing
    /// transition under the row's entry guard. Returns `false` when the row
    /// is absent or no longer pending (a concurrent invocation won the
    /// claim), in which case the caller must skip the row, not retry it.
    pub fn claim(&self, id: &Uuid, now: DateTime<Utc>) -> bool {
        match self.messages.get_mut(id) {
            Some(mut row) if row.status == MessageStatus::Pending => {
                row.status = MessageStatus::Processing;
                row.updated_at = now;
                true
            }
            _ => false,
        }
    }

    /// Record a successful dispatch. Only a `processing` row may be marked
    /// sent; anything else indicates a claim-protocol violation.
    pub fn mark_sent(&self, id: &Uuid, now: DateTime<Utc>) -> anyhow::Result<()> {
        let mut row = self
            .messages
            .get_mut(id)
            .ok_or_else(|| anyhow::anyhow!("message {} not found", id))?;
        if row.status != MessageStatus::Processing {
            anyhow::bail!("message {} marked sent while {:?}", id, row.status);
        }
        row.status = MessageStatus::Sent;
        row.sent_at = Some(now);
        row.error_message = None;
        row.updated_at = now;
        Ok(())
    }

    /// Record a failed dispatch attempt. Below `max_retries` the row goes
    /// back to `pending` and becomes eligible on the next pass (no backoff
    /// delay, by design); at the bound it becomes terminally `failed`.
    pub fn record_failure(
        &self,
        id: &Uuid,
        error: &str,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> anyhow::Result<MessageStatus> {
        let mut row = self
            .messages
            .get_mut(id)
            .ok_or_else(|| anyhow::anyhow!("message {} not found", id))?;
        row.retry_count += 1;
        row.error_message = Some(error.to_string());
        row.updated_at = now;
        if row.retry_count >= max_retries {
            row.status = MessageStatus::Failed;
            warn!(
                message_id = %id,
                retries = row.retry_count,
                error,
                "Message failed terminally"
            );
        } else {
            row.status = MessageStatus::Pending;
            warn!(
                message_id = %id,
                retries = row.retry_count,
                error,
                "Message dispatch failed, will retry next pass"
            );
        }
        Ok(row.status)
    }

    /// Return rows stuck in `processing` longer than `max_age_minutes` to
    /// `pending`. Such rows are orphans of an invocation that was killed
    /// mid-flight; reclaiming them restores at-least-once delivery.
    pub fn reclaim_stale(&self, now: DateTime<Utc>, max_age_minutes: u32) -> usize {
        let cutoff = now - Duration::minutes(i64::from(max_age_minutes));
        let mut reclaimed = 0usize;
        for mut row in self.messages.iter_mut() {
            if row.status == MessageStatus::Processing && row.updated_at < cutoff {
                row.status = MessageStatus::Pending;
                row.updated_at = now;
                reclaimed += 1;
                warn!(message_id = %row.id, "Reclaimed stale processing claim");
            }
        }
        reclaimed
    }

    pub fn stats(&self) -> QueueStats {
        let mut stats = QueueStats::default();
        for row in self.messages.iter() {
            match row.status {
                MessageStatus::Pending => stats.pending += 1,
                MessageStatus::Processing => stats.processing += 1,
                MessageStatus::Sent => stats.sent += 1,
                MessageStatus::Failed => stats.failed += 1,
            }
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_core::types::{Channel, Recipient, MAX_RETRIES};

    fn pending_message(scheduled_for: DateTime<Utc>) -> ScheduledMessage {
        ScheduledMessage::new(
            Channel::Email,
            Recipient {
                email: Some("ada@example.com".to_string()),
                ..Default::default()
            },
            Uuid::new_v4(),
            Some("Hello".to_string()),
            "<p>Hello</p>".to_string(),
            Some("Hello".to_string()),
            scheduled_for,
        )
    }

    #[test]
    fn test_due_selection_ordered_and_capped() {
        let queue = MessageQueue::new();
        let now = Utc::now();
        let late = pending_message(now - Duration::minutes(1));
        let early = pending_message(now - Duration::minutes(10));
        let future = pending_message(now + Duration::minutes(5));
        queue.insert(late.clone());
        queue.insert(early.clone());
        queue.insert(future);

        let due = queue.due(now, 10);
        assert_eq!(due.len(), 2);
        assert_eq!(due[0].id, early.id);
        assert_eq!(due[1].id, late.id);

        let capped = queue.due(now, 1);
        assert_eq!(capped.len(), 1);
        assert_eq!(capped[0].id, early.id);
    }

    #[test]
    fn test_claim_is_exclusive() {
        let queue = MessageQueue::new();
        let now = Utc::now();
        let msg = pending_message(now);
        let id = queue.insert(msg);

        assert!(queue.claim(&id, now));
        // Second claim observes "already processing" and loses.
        assert!(!queue.claim(&id, now));
        assert_eq!(queue.get(&id).unwrap().status, MessageStatus::Processing);
    }

    #[test]
    fn test_concurrent_claims_exactly_one_wins() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let queue = Arc::new(MessageQueue::new());
        let now = Utc::now();
        let id = queue.insert(pending_message(now));
        let wins = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let queue = queue.clone();
                let wins = wins.clone();
                std::thread::spawn(move || {
                    if queue.claim(&id, now) {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(wins.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_mark_sent_sets_sent_at() {
        let queue = MessageQueue::new();
        let now = Utc::now();
        let id = queue.insert(pending_message(now));
        assert!(queue.claim(&id, now));
        queue.mark_sent(&id, now).unwrap();

        let row = queue.get(&id).unwrap();
        assert_eq!(row.status, MessageStatus::Sent);
        assert_eq!(row.sent_at, Some(now));
    }

    #[test]
    fn test_mark_sent_rejects_unclaimed_row() {
        let queue = MessageQueue::new();
        let now = Utc::now();
        let id = queue.insert(pending_message(now));
        assert!(queue.mark_sent(&id, now).is_err());
    }

    #[test]
    fn test_failure_retries_then_terminal() {
        let queue = MessageQueue::new();
        let now = Utc::now();
        let id = queue.insert(pending_message(now));

        for attempt in 1..=MAX_RETRIES {
            assert!(queue.claim(&id, now));
            let status = queue
                .record_failure(&id, "smtp timeout", MAX_RETRIES, now)
                .unwrap();
            if attempt < MAX_RETRIES {
                assert_eq!(status, MessageStatus::Pending);
            } else {
                assert_eq!(status, MessageStatus::Failed);
            }
        }

        let row = queue.get(&id).unwrap();
        assert_eq!(row.status, MessageStatus::Failed);
        assert_eq!(row.retry_count, MAX_RETRIES);
        assert_eq!(row.error_message.as_deref(), Some("smtp timeout"));
        assert!(row.sent_at.is_none());
        // Terminal rows never reappear in the due selection.
        assert!(queue.due(now, 10).is_empty());
    }

    #[test]
    fn test_reclaim_stale_claims() {
        let queue = MessageQueue::new();
        let now = Utc::now();
        let stale_id = queue.insert(pending_message(now));
        let fresh_id = queue.insert(pending_message(now));

        let long_ago = now - Duration::minutes(30);
        assert!(queue.claim(&stale_id, long_ago));
        assert!(queue.claim(&fresh_id, now));

        let reclaimed = queue.reclaim_stale(now, 15);
        assert_eq!(reclaimed, 1);
        assert_eq!(queue.get(&stale_id).unwrap().status, MessageStatus::Pending);
        assert_eq!(
            queue.get(&fresh_id).unwrap().status,
            MessageStatus::Processing
        );
    }

    #[test]
    fn test_stats_counts_by_status() {
        let queue = MessageQueue::new();
        let now = Utc::now();
        let a = queue.insert(pending_message(now));
        queue.insert(pending_message(now));
        assert!(queue.claim(&a, now));
        queue.mark_sent(&a, now).unwrap();

        let stats = queue.stats();
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.processing, 0);
        assert_eq!(stats.failed, 0);
    }
}
