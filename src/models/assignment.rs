use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AssignmentStatus {
    /// Created and waiting for the partner to accept.
    Created,
    Accepted,
    Picked,
    Rejected,
    /// Acceptance window elapsed.
    Timeout,
    /// Accepted but not picked up within the pickup window.
    PickupTimeout,
    Completed,
    Failed,
}

impl AssignmentStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(
            self,
            AssignmentStatus::Created | AssignmentStatus::Accepted | AssignmentStatus::Picked
        )
    }
}

/// Inputs to the assignment state machine: partner actions and fired deadlines.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AssignmentAction {
    Accept,
    Reject,
    Pickup,
    Deliver,
    AcceptanceDeadline,
    PickupDeadline,
    DeliveryDeadline,
}

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("cannot apply {action:?} to assignment in status {from:?}")]
pub struct InvalidTransition {
    pub from: AssignmentStatus,
    pub action: AssignmentAction,
}

impl AssignmentStatus {
    /// Total transition function. Every (status, action) pair either yields the
    /// next status or a typed rejection; deadline handlers treat the rejection
    /// as a stale fire, the boundary surfaces it as a conflict.
    pub fn advance(self, action: AssignmentAction) -> Result<AssignmentStatus, InvalidTransition> {
        use AssignmentAction as A;
        use AssignmentStatus as S;

        match (self, action) {
            (S::Created, A::Accept) => Ok(S::Accepted),
            (S::Created, A::Reject) => Ok(S::Rejected),
            (S::Created, A::AcceptanceDeadline) => Ok(S::Timeout),
            (S::Accepted, A::Pickup) => Ok(S::Picked),
            (S::Accepted, A::PickupDeadline) => Ok(S::PickupTimeout),
            // Delivery confirmation is honored from any live status, so a
            // partner who skipped the pickup ping can still complete; terminal
            // statuses stay rejected.
            (S::Created | S::Accepted | S::Picked, A::Deliver) => Ok(S::Completed),
            (S::Created | S::Accepted | S::Picked, A::DeliveryDeadline) => Ok(S::Failed),
            (from, action) => Err(InvalidTransition { from, action }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub partner_id: Uuid,
    pub status: AssignmentStatus,
    /// Which retry of the order this hand-off is; 0 for the first attempt.
    pub attempt: u32,
    pub assigned_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub picked_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Assignment {
    pub fn new(order_id: Uuid, partner_id: Uuid, attempt: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            order_id,
            partner_id,
            status: AssignmentStatus::Created,
            attempt,
            assigned_at: Utc::now(),
            accepted_at: None,
            picked_at: None,
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AssignmentEventKind {
    Created,
    Accepted,
    Rejected,
    PickedUp,
    Delivered,
    AcceptanceTimedOut,
    PickupTimedOut,
    DeliveryWindowExpired,
}

/// Broadcast to partner-facing subscribers whenever an assignment changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentEvent {
    pub kind: AssignmentEventKind,
    pub assignment: Assignment,
}
