//! Sequence engine — advances enrollments through ordered campaign steps,
//! materializing new scheduled messages for the queue processor's next pass.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use dispatch_core::templates::{render, SharedTemplateStore};
use dispatch_core::types::{
    Channel, DelayFrom, ScheduledMessage, SequenceEnrollment, SequenceRunReport, SequenceStep,
};
use dispatch_core::DispatchResult;
use dispatch_store::{MessageQueue, RecordStore, SequenceStore};

use crate::skip::should_skip;

/// Outcome of advancing one enrollment; folded into the pass report.
enum StepOutcome {
    MessageQueued,
    Skipped,
    Completed,
}

/// Advances due enrollments, one step per pass each.
pub struct SequenceEngine {
    store: Arc<SequenceStore>,
    queue: Arc<MessageQueue>,
    templates: SharedTemplateStore,
    records: Arc<dyn RecordStore>,
}

impl SequenceEngine {
    pub fn new(
        store: Arc<SequenceStore>,
        queue: Arc<MessageQueue>,
        templates: SharedTemplateStore,
        records: Arc<dyn RecordStore>,
    ) -> Self {
        Self {
            store,
            queue,
            templates,
            records,
        }
    }

    /// Advance up to `batch_limit` due enrollments as of `now`.
    ///
    /// Messages created here are scheduled for `now` and therefore become
    /// eligible on the *next* queue-processor pass, never the current one.
    /// Per-enrollment failures are tallied and never abort the batch.
    pub fn advance_due_enrollments(
        &self,
        now: DateTime<Utc>,
        batch_limit: usize,
    ) -> DispatchResult<SequenceRunReport> {
        let due = self.store.due_enrollments(now, batch_limit);
        let mut report = SequenceRunReport::default();

        for enrollment in due {
            report.processed += 1;
            match self.advance_one(&enrollment, now) {
                Ok(outcomes) => {
                    for outcome in outcomes {
                        match outcome {
                            StepOutcome::MessageQueued => report.sent += 1,
                            StepOutcome::Skipped => report.skipped += 1,
                            StepOutcome::Completed => report.completed += 1,
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        enrollment_id = %enrollment.id,
                        error = %e,
                        "Enrollment advancement failed"
                    );
                    report
                        .errors
                        .push(format!("enrollment {}: {}", enrollment.id, e));
                }
            }
        }

        info!(
            processed = report.processed,
            sent = report.sent,
            completed = report.completed,
            skipped = report.skipped,
            errors = report.errors.len(),
            "Sequence pass finished"
        );
        Ok(report)
    }

    /// Process the single next step of one enrollment.
    fn advance_one(
        &self,
        enrollment: &SequenceEnrollment,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<StepOutcome>> {
        let next_order = enrollment.current_step_order + 1;
        let mut outcomes = Vec::new();

        let step = match self.store.active_step(&enrollment.sequence_id, next_order) {
            Some(step) => step,
            None => {
                // No such step: the enrollment has walked off the end.
                self.complete_enrollment(enrollment, next_order - 1, now)?;
                outcomes.push(StepOutcome::Completed);
                return Ok(outcomes);
            }
        };

        let skipped_by_condition = step
            .skip_condition
            .as_ref()
            .map(|c| should_skip(self.records.as_ref(), c, enrollment.user_id.as_deref()))
            .unwrap_or(false);

        if !skipped_by_condition {
            match self.materialize_message(&step, enrollment, now) {
                Some(message) => {
                    self.queue.insert(message);
                    metrics::counter!("engine.sequence_messages_queued").increment(1);
                    // Counter miss is logged, never fatal.
                    if let Err(e) = self
                        .store
                        .increment_step_total_sent(&enrollment.sequence_id, step.step_order)
                    {
                        warn!(
                            sequence_id = %enrollment.sequence_id,
                            step_order = step.step_order,
                            error = %e,
                            "Failed to bump step sent counter"
                        );
                    }
                    outcomes.push(StepOutcome::MessageQueued);
                }
                None => outcomes.push(StepOutcome::Skipped),
            }
        }

        // Advance regardless of which branch was taken above.
        match self
            .store
            .active_step(&enrollment.sequence_id, next_order + 1)
        {
            Some(following) => {
                let anchor = match following.delay_from {
                    DelayFrom::Enrollment => enrollment.enrolled_at,
                    DelayFrom::PreviousStep => now,
                };
                let next_at = anchor + Duration::minutes(i64::from(following.delay_minutes));
                self.store.advance(&enrollment.id, next_order, next_at)?;
            }
            None => {
                // Nothing left to wait for; complete now rather than on a
                // future pass.
                self.complete_enrollment(enrollment, next_order, now)?;
                outcomes.push(StepOutcome::Completed);
            }
        }

        Ok(outcomes)
    }

    fn complete_enrollment(
        &self,
        enrollment: &SequenceEnrollment,
        final_order: u32,
        now: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        self.store.complete(&enrollment.id, final_order, now)?;
        if let Err(e) = self
            .store
            .increment_total_completed(&enrollment.sequence_id)
        {
            warn!(
                sequence_id = %enrollment.sequence_id,
                error = %e,
                "Failed to bump completion counter"
            );
        }
        metrics::counter!("engine.enrollments_completed").increment(1);
        Ok(())
    }

    /// Resolve the step's template against the enrollment's metadata.
    /// A missing template yields `None` (counted as skipped upstream).
    fn materialize_message(
        &self,
        step: &SequenceStep,
        enrollment: &SequenceEnrollment,
        now: DateTime<Utc>,
    ) -> Option<ScheduledMessage> {
        let template = match self.templates.get(&step.template_id) {
            Some(t) => t,
            None => {
                warn!(
                    template_id = %step.template_id,
                    sequence_id = %step.sequence_id,
                    step_order = step.step_order,
                    "Step template not found, skipping step"
                );
                return None;
            }
        };

        let variables = &enrollment.metadata;
        let body = render(&template.body, variables);

        let (subject, text_body) = match step.channel {
            Channel::Email => {
                let raw_subject = step
                    .subject_override
                    .clone()
                    .or_else(|| template.subject.clone())
                    .unwrap_or_default();
                (
                    Some(render(&raw_subject, variables)),
                    template.text_body.as_deref().map(|t| render(t, variables)),
                )
            }
            Channel::Sms => (None, None),
        };

        Some(
            ScheduledMessage::new(
                step.channel,
                enrollment.recipient(),
                template.id,
                subject,
                body,
                text_body,
                now,
            )
            .with_related_entity("enrollment", &enrollment.id.to_string()),
        )
    }
}
