use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PartnerStatus {
    /// Applied but not yet approved.
    PendingVerification,
    /// Approved, never been online.
    Verified,
    /// Approved but currently offline.
    Active,
    /// Online and ready to take assignments.
    Available,
    /// Online but on a break.
    Unavailable,
    OnDelivery,
    Suspended,
}

impl PartnerStatus {
    pub fn is_verified(self) -> bool {
        !matches!(
            self,
            PartnerStatus::PendingVerification | PartnerStatus::Suspended
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partner {
    pub id: Uuid,
    pub name: String,
    pub status: PartnerStatus,
    pub online: bool,
    /// Max concurrent deliveries; bounds the availability drain loop.
    pub capacity: u32,
    pub location: Option<GeoPoint>,
    pub last_seen: DateTime<Utc>,
}

impl Partner {
    pub fn new(name: String, capacity: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            status: PartnerStatus::PendingVerification,
            online: false,
            capacity: capacity.max(1),
            location: None,
            last_seen: Utc::now(),
        }
    }

    /// In the pool for the availability scan: online and not busy or on break.
    pub fn is_dispatchable(&self) -> bool {
        self.online && self.status == PartnerStatus::Available
    }
}
