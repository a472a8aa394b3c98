use chrono::Utc;
use dashmap::DashMap;
use tracing::warn;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::order::{Order, OrderStatus};
use crate::models::partner::{GeoPoint, Partner, PartnerStatus};

/// Keyed order records with conditional update primitives. Each mutation runs
/// under the entry's shard lock, so the test-and-set in [`begin_handoff`] is
/// atomic: of two concurrent hand-offs for the same order, exactly one sees the
/// Confirmed/unassigned precondition.
///
/// [`begin_handoff`]: OrderStore::begin_handoff
#[derive(Debug, Default)]
pub struct OrderStore {
    inner: DashMap<Uuid, Order>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, order: Order) {
        self.inner.insert(order.id, order);
    }

    pub fn get(&self, id: Uuid) -> Option<Order> {
        self.inner.get(&id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Payment-confirmed trigger: Pending -> Confirmed, stamping `queued_at`.
    pub fn confirm(&self, id: Uuid) -> Result<Order, AppError> {
        let mut entry = self
            .inner
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("order {id} not found")))?;

        if entry.status != OrderStatus::Pending {
            return Err(AppError::Conflict(format!(
                "order {id} is not awaiting confirmation"
            )));
        }

        let now = Utc::now();
        entry.status = OrderStatus::Confirmed;
        entry.queued_at = Some(now);
        entry.updated_at = now;
        Ok(entry.clone())
    }

    /// The hand-off conditional write: succeeds only while the order is
    /// Confirmed with no partner assigned. `None` means the race was lost (or
    /// the order vanished) and the caller should put the work back.
    pub fn begin_handoff(&self, id: Uuid, partner_id: Uuid) -> Option<Order> {
        let mut entry = self.inner.get_mut(&id)?;

        if entry.status != OrderStatus::Confirmed || entry.assigned_partner.is_some() {
            return None;
        }

        let now = Utc::now();
        entry.status = OrderStatus::Assigned;
        entry.assigned_partner = Some(partner_id);
        entry.assigned_at = Some(now);
        entry.updated_at = now;
        Some(entry.clone())
    }

    /// Puts a reclaimed order back on the market: Confirmed, partner cleared.
    pub fn release_for_retry(&self, id: Uuid) {
        if let Some(mut entry) = self.inner.get_mut(&id) {
            entry.status = OrderStatus::Confirmed;
            entry.assigned_partner = None;
            entry.updated_at = Utc::now();
        }
    }

    pub fn mark_accepted(&self, id: Uuid) {
        if let Some(mut entry) = self.inner.get_mut(&id) {
            let now = Utc::now();
            entry.status = OrderStatus::Accepted;
            entry.accepted_at = Some(now);
            entry.updated_at = now;
        }
    }

    pub fn mark_picked(&self, id: Uuid) {
        if let Some(mut entry) = self.inner.get_mut(&id) {
            let now = Utc::now();
            entry.status = OrderStatus::OutForDelivery;
            entry.picked_at = Some(now);
            entry.updated_at = now;
        }
    }

    /// Terminal. Clears the partner reference; the assignment chain keeps it.
    pub fn mark_delivered(&self, id: Uuid) {
        if let Some(mut entry) = self.inner.get_mut(&id) {
            let now = Utc::now();
            entry.status = OrderStatus::Delivered;
            entry.assigned_partner = None;
            entry.delivered_at = Some(now);
            entry.updated_at = now;
        }
    }

    /// Terminal. Clears the partner reference.
    pub fn cancel(&self, id: Uuid) {
        if let Some(mut entry) = self.inner.get_mut(&id) {
            entry.status = OrderStatus::Cancelled;
            entry.assigned_partner = None;
            entry.updated_at = Utc::now();
        }
    }
}

/// Partner records plus the registry glue the coordinator drives. Only
/// [`mark_busy`] and [`free`] are called from the dispatch path; everything
/// else belongs to onboarding and the availability boundary.
///
/// [`mark_busy`]: PartnerDirectory::mark_busy
/// [`free`]: PartnerDirectory::free
#[derive(Debug, Default)]
pub struct PartnerDirectory {
    inner: DashMap<Uuid, Partner>,
}

impl PartnerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, partner: Partner) {
        self.inner.insert(partner.id, partner);
    }

    pub fn get(&self, id: Uuid) -> Option<Partner> {
        self.inner.get(&id).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn list(&self) -> Vec<Partner> {
        self.inner.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Snapshot of partners eligible for the availability scan.
    pub fn dispatchable(&self) -> Vec<Partner> {
        self.inner
            .iter()
            .filter(|entry| entry.value().is_dispatchable())
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn verify(&self, id: Uuid, approve: bool) -> Result<Partner, AppError> {
        let mut entry = self
            .inner
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("partner {id} not found")))?;

        entry.status = if approve {
            PartnerStatus::Verified
        } else {
            PartnerStatus::Suspended
        };
        entry.online = false;
        Ok(entry.clone())
    }

    pub fn set_availability(
        &self,
        id: Uuid,
        available: bool,
        location: Option<GeoPoint>,
    ) -> Result<Partner, AppError> {
        let mut entry = self
            .inner
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("partner {id} not found")))?;

        if !entry.status.is_verified() {
            return Err(AppError::PartnerNotVerified);
        }

        entry.online = available;
        if location.is_some() {
            entry.location = location;
        }
        entry.last_seen = Utc::now();
        entry.status = if available {
            PartnerStatus::Available
        } else {
            PartnerStatus::Active
        };
        Ok(entry.clone())
    }

    pub fn update_location(&self, id: Uuid, location: GeoPoint) -> Result<Partner, AppError> {
        let mut entry = self
            .inner
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("partner {id} not found")))?;

        entry.location = Some(location);
        entry.last_seen = Utc::now();
        Ok(entry.clone())
    }

    /// Takes the partner out of the availability pool after a hand-off.
    pub fn mark_busy(&self, id: Uuid) {
        match self.inner.get_mut(&id) {
            Some(mut entry) => {
                entry.online = false;
                entry.status = PartnerStatus::OnDelivery;
            }
            None => warn!(partner_id = %id, "mark_busy: partner not found"),
        }
    }

    /// Returns the partner to the pool after rejection, timeout or completion.
    pub fn free(&self, id: Uuid) {
        match self.inner.get_mut(&id) {
            Some(mut entry) => {
                entry.online = true;
                entry.status = PartnerStatus::Available;
            }
            None => warn!(partner_id = %id, "free: partner not found"),
        }
    }
}
