use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Retry bound for message dispatch. A message whose `retry_count` reaches
/// this value transitions to `Failed` and is never selected again.
pub const MAX_RETRIES: u32 = 3;

// ---------------------------------------------------------------------------
// Scheduled messages
// ---------------------------------------------------------------------------

/// Delivery channel for a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
}

/// Lifecycle status of a scheduled message.
///
/// `Pending` rows are eligible for selection; `Processing` marks a claimed
/// row mid-dispatch; `Sent` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Processing,
    Sent,
    Failed,
}

/// Who a message is addressed to. Email messages require `email`, SMS
/// messages require `phone`; the other fields are carried for audit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Recipient {
    pub email: Option<String>,
    pub phone: Option<String>,
    pub display_name: Option<String>,
    pub user_id: Option<String>,
}

/// Free-form correlation tag linking a message to an external entity
/// (an order, a lead, an enrollment, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedEntity {
    pub entity_type: String,
    pub entity_id: String,
}

/// One durable send intent. Created by external collaborators or by the
/// sequence engine; drained by the queue processor; never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledMessage {
    pub id: Uuid,
    pub channel: Channel,
    pub recipient: Recipient,
    pub template_id: Uuid,
    /// Rendered subject line (email only).
    pub subject: Option<String>,
    /// Rendered HTML body (email) or message body (SMS).
    pub body: String,
    /// Rendered plain-text alternative (email only).
    pub text_body: Option<String>,
    pub scheduled_for: DateTime<Utc>,
    pub status: MessageStatus,
    pub retry_count: u32,
    pub error_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub related_entity: Option<RelatedEntity>,
    pub created_at: DateTime<Utc>,
    /// Refreshed on every status transition; staleness anchor for the
    /// orphaned-claim reclaim sweep.
    pub updated_at: DateTime<Utc>,
}

impl ScheduledMessage {
    /// Builds a pending message due at `scheduled_for`.
    pub fn new(
        channel: Channel,
        recipient: Recipient,
        template_id: Uuid,
        subject: Option<String>,
        body: String,
        text_body: Option<String>,
        scheduled_for: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            channel,
            recipient,
            template_id,
            subject,
            body,
            text_body,
            scheduled_for,
            status: MessageStatus::Pending,
            retry_count: 0,
            error_message: None,
            sent_at: None,
            related_entity: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_related_entity(mut self, entity_type: &str, entity_id: &str) -> Self {
        self.related_entity = Some(RelatedEntity {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
        });
        self
    }
}

// ---------------------------------------------------------------------------
// Sequences
// ---------------------------------------------------------------------------

/// Lifecycle status of a sequence definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceStatus {
    Active,
    Paused,
    Archived,
}

/// A named multi-step campaign. Owns its ordered steps and aggregate
/// counters consumed by external reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    pub id: Uuid,
    pub name: String,
    pub status: SequenceStatus,
    pub steps: Vec<SequenceStep>,
    pub total_completed: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Sequence {
    pub fn new(name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            status: SequenceStatus::Active,
            steps: Vec::new(),
            total_completed: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Whether a step participates in advancement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Active,
    Inactive,
}

/// Anchor point for computing a step's eligible time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DelayFrom {
    /// Delay counts from the enrollment timestamp.
    Enrollment,
    /// Delay counts from the moment the previous step was processed.
    #[default]
    PreviousStep,
}

/// Declarative, data-dependent rule that suppresses a step's message
/// without halting enrollment advancement. Matches one row in an external
/// table against the enrollment's user reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipCondition {
    /// External table to consult.
    pub table: String,
    /// Column holding the user reference.
    pub user_field: String,
    /// Column compared against `check_value`.
    pub check_field: String,
    pub check_value: String,
}

/// One ordinal message definition within a sequence. `step_order` is
/// positive and unique per sequence; gaps are allowed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceStep {
    pub sequence_id: Uuid,
    pub step_order: u32,
    pub status: StepStatus,
    pub channel: Channel,
    pub template_id: Uuid,
    /// Overrides the template's subject when set (email only).
    pub subject_override: Option<String>,
    pub delay_minutes: u32,
    pub delay_from: DelayFrom,
    pub skip_condition: Option<SkipCondition>,
    /// Messages materialized from this step, for reporting.
    pub total_sent: u64,
}

// ---------------------------------------------------------------------------
// Enrollments
// ---------------------------------------------------------------------------

/// Runtime status of an enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    Completed,
    Cancelled,
}

/// One recipient's progress through one sequence. Created by an external
/// enrollment trigger; mutated exclusively by the sequence engine.
///
/// Invariant: `next_step_at` is `None` exactly when the enrollment is no
/// longer active, and `current_step_order` only increases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceEnrollment {
    pub id: Uuid,
    pub sequence_id: Uuid,
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub display_name: Option<String>,
    pub status: EnrollmentStatus,
    /// 0 means no step has been started yet.
    pub current_step_order: u32,
    pub next_step_at: Option<DateTime<Utc>>,
    pub enrolled_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Flat variable map substituted into step templates.
    pub metadata: HashMap<String, String>,
}

impl SequenceEnrollment {
    /// Builds an active enrollment due immediately.
    pub fn new(sequence_id: Uuid, user_id: Option<&str>, email: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            sequence_id,
            user_id: user_id.map(str::to_string),
            email: email.map(str::to_string),
            phone: None,
            display_name: None,
            status: EnrollmentStatus::Active,
            current_step_order: 0,
            next_step_at: Some(now),
            enrolled_at: now,
            completed_at: None,
            metadata: HashMap::new(),
        }
    }

    pub fn recipient(&self) -> Recipient {
        Recipient {
            email: self.email.clone(),
            phone: self.phone.clone(),
            display_name: self.display_name.clone(),
            user_id: self.user_id.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Send log
// ---------------------------------------------------------------------------

/// Append-only audit record written once a message reaches a terminal send
/// attempt. Immutable; consumed by external CRM/audit viewers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendLogEntry {
    pub id: Uuid,
    pub message_id: Uuid,
    pub channel: Channel,
    pub recipient: String,
    pub subject: Option<String>,
    pub status: MessageStatus,
    pub related_entity: Option<RelatedEntity>,
    pub logged_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Run reports
// ---------------------------------------------------------------------------

/// Outcome tally of one queue-processor pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueRunReport {
    pub processed: u64,
    pub sent: u64,
    pub failed: u64,
    pub errors: Vec<String>,
}

/// Outcome tally of one sequence-engine pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SequenceRunReport {
    pub processed: u64,
    pub sent: u64,
    pub completed: u64,
    pub skipped: u64,
    pub errors: Vec<String>,
}
