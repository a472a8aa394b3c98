use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::DispatchConfig;
use crate::engine::queue::WorkQueue;
use crate::engine::timeouts::TimeoutSupervisor;
use crate::models::assignment::{Assignment, AssignmentEvent};
use crate::observability::metrics::Metrics;
use crate::store::{OrderStore, PartnerDirectory};

pub struct AppState {
    pub orders: OrderStore,
    pub partners: PartnerDirectory,
    /// Append-only: assignments are never deleted, one per attempt.
    pub assignments: DashMap<Uuid, Assignment>,
    pub queue: WorkQueue,
    pub timeouts: TimeoutSupervisor,
    pub events_tx: broadcast::Sender<AssignmentEvent>,
    pub metrics: Metrics,
    pub dispatch: DispatchConfig,
}

impl AppState {
    pub fn new(dispatch: DispatchConfig, event_buffer_size: usize) -> Self {
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size);

        Self {
            orders: OrderStore::new(),
            partners: PartnerDirectory::new(),
            assignments: DashMap::new(),
            queue: WorkQueue::new(),
            timeouts: TimeoutSupervisor::new(),
            events_tx,
            metrics: Metrics::new(),
            dispatch,
        }
    }
}
