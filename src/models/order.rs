use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderStatus {
    /// Placed, awaiting payment confirmation.
    Pending,
    /// Paid; eligible for dispatch.
    Confirmed,
    /// Handed off to a partner, waiting for acceptance.
    Assigned,
    /// Partner accepted, not yet picked up.
    Accepted,
    OutForDelivery,
    Delivered,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub status: OrderStatus,
    /// Invariant: `Some` iff status is Assigned, Accepted or OutForDelivery.
    pub assigned_partner: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub queued_at: Option<DateTime<Utc>>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub accepted_at: Option<DateTime<Utc>>,
    pub picked_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: OrderStatus::Pending,
            assigned_partner: None,
            created_at: now,
            queued_at: None,
            assigned_at: None,
            accepted_at: None,
            picked_at: None,
            delivered_at: None,
            updated_at: now,
        }
    }
}

impl Default for Order {
    fn default() -> Self {
        Self::new()
    }
}
