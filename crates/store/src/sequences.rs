//! Sequence definitions and per-recipient enrollments.
//!
//! Enrollment invariants are enforced here, in one place: an enrollment's
//! `current_step_order` only ever increases, and `next_step_at` is cleared
//! exactly when the enrollment leaves the `active` status.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::info;
use uuid::Uuid;

use dispatch_core::types::{
    EnrollmentStatus, Sequence, SequenceEnrollment, SequenceStep, StepStatus,
};

/// Thread-safe store for sequences (owning their steps) and enrollments.
pub struct SequenceStore {
    sequences: DashMap<Uuid, Sequence>,
    enrollments: DashMap<Uuid, SequenceEnrollment>,
}

impl SequenceStore {
    pub fn new() -> Self {
        Self {
            sequences: DashMap::new(),
            enrollments: DashMap::new(),
        }
    }

    // -- sequences ----------------------------------------------------------

    pub fn insert_sequence(&self, sequence: Sequence) -> Uuid {
        let id = sequence.id;
        info!(sequence_id = %id, name = %sequence.name, "Sequence stored");
        self.sequences.insert(id, sequence);
        id
    }

    pub fn get_sequence(&self, id: &Uuid) -> Option<Sequence> {
        self.sequences.get(id).map(|r| r.clone())
    }

    /// The `active` step at `(sequence_id, order)`. An inactive or absent
    /// step is "no such step" as far as the stepper is concerned.
    pub fn active_step(&self, sequence_id: &Uuid, order: u32) -> Option<SequenceStep> {
        let sequence = self.sequences.get(sequence_id)?;
        sequence
            .steps
            .iter()
            .find(|s| s.step_order == order && s.status == StepStatus::Active)
            .cloned()
    }

    /// Atomic increment of a sequence's completion counter. The whole
    /// read-modify-write happens under the row's entry guard, so concurrent
    /// invocations cannot lose updates.
    pub fn increment_total_completed(&self, sequence_id: &Uuid) -> anyhow::Result<()> {
        let mut sequence = self
            .sequences
            .get_mut(sequence_id)
            .ok_or_else(|| anyhow::anyhow!("sequence {} not found", sequence_id))?;
        sequence.total_completed += 1;
        sequence.updated_at = Utc::now();
        Ok(())
    }

    /// Atomic increment of a step's sent counter. Best-effort from the
    /// engine's perspective; a miss is logged, never fatal.
    pub fn increment_step_total_sent(&self, sequence_id: &Uuid, order: u32) -> anyhow::Result<()> {
        let mut sequence = self
            .sequences
            .get_mut(sequence_id)
            .ok_or_else(|| anyhow::anyhow!("sequence {} not found", sequence_id))?;
        let step = sequence
            .steps
            .iter_mut()
            .find(|s| s.step_order == order)
            .ok_or_else(|| anyhow::anyhow!("step {} not found in sequence {}", order, sequence_id))?;
        step.total_sent += 1;
        Ok(())
    }

    // -- enrollments --------------------------------------------------------

    pub fn enroll(&self, enrollment: SequenceEnrollment) -> Uuid {
        let id = enrollment.id;
        info!(
            enrollment_id = %id,
            sequence_id = %enrollment.sequence_id,
            "Enrollment stored"
        );
        self.enrollments.insert(id, enrollment);
        id
    }

    pub fn get_enrollment(&self, id: &Uuid) -> Option<SequenceEnrollment> {
        self.enrollments.get(id).map(|r| r.clone())
    }

    /// Active enrollments with `next_step_at <= now`, earliest first,
    /// capped at `limit`.
    pub fn due_enrollments(&self, now: DateTime<Utc>, limit: usize) -> Vec<SequenceEnrollment> {
        let mut due: Vec<SequenceEnrollment> = self
            .enrollments
            .iter()
            .filter(|r| {
                r.status == EnrollmentStatus::Active
                    && r.next_step_at.map(|t| t <= now).unwrap_or(false)
            })
            .map(|r| r.clone())
            .collect();
        due.sort_by_key(|e| e.next_step_at);
        due.truncate(limit);
        due
    }

    /// Move an enrollment forward to `new_order`, due again at `next_at`.
    pub fn advance(
        &self,
        id: &Uuid,
        new_order: u32,
        next_at: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let mut enrollment = self
            .enrollments
            .get_mut(id)
            .ok_or_else(|| anyhow::anyhow!("enrollment {} not found", id))?;
        if new_order < enrollment.current_step_order {
            anyhow::bail!(
                "enrollment {} cannot move backwards from {} to {}",
                id,
                enrollment.current_step_order,
                new_order
            );
        }
        enrollment.current_step_order = new_order;
        enrollment.next_step_at = Some(next_at);
        Ok(())
    }

    /// Terminate an enrollment as completed at `final_order`.
    pub fn complete(&self, id: &Uuid, final_order: u32, now: DateTime<Utc>) -> anyhow::Result<()> {
        let mut enrollment = self
            .enrollments
            .get_mut(id)
            .ok_or_else(|| anyhow::anyhow!("enrollment {} not found", id))?;
        if final_order < enrollment.current_step_order {
            anyhow::bail!(
                "enrollment {} cannot move backwards from {} to {}",
                id,
                enrollment.current_step_order,
                final_order
            );
        }
        enrollment.current_step_order = final_order;
        enrollment.status = EnrollmentStatus::Completed;
        enrollment.completed_at = Some(now);
        enrollment.next_step_at = None;
        info!(enrollment_id = %id, "Enrollment completed");
        Ok(())
    }
}

impl Default for SequenceStore {
    fn default() -> Self {
        Self::new()
    }
}
