use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::AbortHandle;
use uuid::Uuid;

use crate::engine::coordinator;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeadlineKind {
    Acceptance,
    Pickup,
    Delivery,
}

impl DeadlineKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DeadlineKind::Acceptance => "acceptance",
            DeadlineKind::Pickup => "pickup",
            DeadlineKind::Delivery => "delivery",
        }
    }
}

/// One cancellable one-shot task per `(assignment, kind)`. Deadlines are
/// cancelled when the assignment advances early, but cancellation is best
/// effort: a task that already woke up slips past the abort, so every handler
/// re-validates the assignment status before mutating anything. Each deadline
/// runs in its own task; a panic there cannot take the others down.
#[derive(Debug, Default)]
pub struct TimeoutSupervisor {
    deadlines: DashMap<(Uuid, DeadlineKind), AbortHandle>,
}

impl TimeoutSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(
        &self,
        state: Arc<AppState>,
        assignment_id: Uuid,
        kind: DeadlineKind,
        after: Duration,
    ) {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            state.timeouts.deadlines.remove(&(assignment_id, kind));
            match kind {
                DeadlineKind::Acceptance => {
                    coordinator::handle_acceptance_timeout(&state, assignment_id)
                }
                DeadlineKind::Pickup => coordinator::handle_pickup_timeout(&state, assignment_id),
                DeadlineKind::Delivery => {
                    coordinator::handle_delivery_timeout(&state, assignment_id)
                }
            }
        });

        if let Some(stale) = self
            .deadlines
            .insert((assignment_id, kind), handle.abort_handle())
        {
            stale.abort();
        }
        // A near-zero deadline can fire before the insert above; its own
        // removal would then precede the insert and leak the entry.
        if handle.is_finished() {
            self.deadlines.remove(&(assignment_id, kind));
        }
    }

    pub fn cancel(&self, assignment_id: Uuid, kind: DeadlineKind) {
        if let Some((_, handle)) = self.deadlines.remove(&(assignment_id, kind)) {
            handle.abort();
        }
    }

    pub fn cancel_all(&self, assignment_id: Uuid) {
        for kind in [
            DeadlineKind::Acceptance,
            DeadlineKind::Pickup,
            DeadlineKind::Delivery,
        ] {
            self.cancel(assignment_id, kind);
        }
    }

    pub fn open_deadlines(&self) -> usize {
        self.deadlines.len()
    }

    /// Drain: after this returns no pending deadline will fire.
    pub fn shutdown(&self) {
        for entry in self.deadlines.iter() {
            entry.value().abort();
        }
        self.deadlines.clear();
    }
}
