use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::engine::queue::QueuedOrder;
use crate::engine::timeouts::DeadlineKind;
use crate::error::AppError;
use crate::models::assignment::{
    Assignment, AssignmentAction, AssignmentEvent, AssignmentEventKind, AssignmentStatus,
};
use crate::state::AppState;

/// Pops one queued order and attempts a race-free hand-off to the partner.
/// Returns true iff an assignment was created. A lost hand-off race puts the
/// work back at the head and reports false; the caller retries on the next
/// availability event.
pub fn try_assign_to_partner(state: &Arc<AppState>, partner_id: Uuid) -> bool {
    let Some(entry) = state.queue.pop_front() else {
        return false;
    };
    sync_queue_gauge(state);

    let Some(order) = state.orders.begin_handoff(entry.order_id, partner_id) else {
        debug!(
            order_id = %entry.order_id,
            partner_id = %partner_id,
            "hand-off lost: order no longer assignable"
        );
        state.queue.push_front(entry);
        sync_queue_gauge(state);
        return false;
    };

    let assignment = Assignment::new(order.id, partner_id, entry.attempt);
    state.assignments.insert(assignment.id, assignment.clone());
    state.partners.mark_busy(partner_id);

    // Duplicate entries can survive a retry storm; sweep them now that the
    // order is held.
    state.queue.remove_all(order.id);
    sync_queue_gauge(state);

    emit(state, AssignmentEventKind::Created, &assignment);
    state.timeouts.schedule(
        state.clone(),
        assignment.id,
        DeadlineKind::Acceptance,
        state.dispatch.acceptance_window,
    );

    info!(
        assignment_id = %assignment.id,
        order_id = %order.id,
        partner_id = %partner_id,
        attempt = assignment.attempt,
        "order assigned"
    );
    true
}

/// Drains the queue into every dispatchable partner, each up to its capacity.
/// Called after an order confirmation so fresh work does not sit idle waiting
/// for the next availability toggle.
pub fn scan_available_partners(state: &Arc<AppState>) {
    for partner in state.partners.dispatchable() {
        if state.queue.is_empty() {
            return;
        }
        drain_into_partner(state, partner.id, partner.capacity);
    }
}

/// Up-to-capacity assignment loop for one partner, stopping at the first
/// failed attempt.
pub fn drain_into_partner(state: &Arc<AppState>, partner_id: Uuid, capacity: u32) -> u32 {
    let mut assigned = 0;
    for _ in 0..capacity {
        if !try_assign_to_partner(state, partner_id) {
            break;
        }
        assigned += 1;
    }
    assigned
}

pub fn partner_accepts(
    state: &Arc<AppState>,
    assignment_id: Uuid,
    partner_id: Uuid,
) -> Result<(), AppError> {
    let assignment =
        apply_partner_action(state, assignment_id, partner_id, AssignmentAction::Accept)?;

    state.timeouts.cancel(assignment_id, DeadlineKind::Acceptance);
    state.orders.mark_accepted(assignment.order_id);
    emit(state, AssignmentEventKind::Accepted, &assignment);
    state.timeouts.schedule(
        state.clone(),
        assignment_id,
        DeadlineKind::Pickup,
        state.dispatch.pickup_window,
    );

    info!(assignment_id = %assignment_id, partner_id = %partner_id, "assignment accepted");
    Ok(())
}

pub fn partner_rejects(
    state: &Arc<AppState>,
    assignment_id: Uuid,
    partner_id: Uuid,
) -> Result<(), AppError> {
    let assignment =
        apply_partner_action(state, assignment_id, partner_id, AssignmentAction::Reject)?;

    state.timeouts.cancel(assignment_id, DeadlineKind::Acceptance);
    state.partners.free(partner_id);
    record_outcome(state, "rejected", &assignment);
    emit(state, AssignmentEventKind::Rejected, &assignment);
    requeue_for_retry(state, &assignment);

    info!(assignment_id = %assignment_id, partner_id = %partner_id, "assignment rejected");
    Ok(())
}

pub fn partner_picked(
    state: &Arc<AppState>,
    assignment_id: Uuid,
    partner_id: Uuid,
) -> Result<(), AppError> {
    let assignment =
        apply_partner_action(state, assignment_id, partner_id, AssignmentAction::Pickup)?;

    state.timeouts.cancel(assignment_id, DeadlineKind::Pickup);
    state.orders.mark_picked(assignment.order_id);
    emit(state, AssignmentEventKind::PickedUp, &assignment);
    state.timeouts.schedule(
        state.clone(),
        assignment_id,
        DeadlineKind::Delivery,
        state.dispatch.delivery_window,
    );

    info!(assignment_id = %assignment_id, partner_id = %partner_id, "order picked up");
    Ok(())
}

pub fn partner_delivered(
    state: &Arc<AppState>,
    assignment_id: Uuid,
    partner_id: Uuid,
) -> Result<(), AppError> {
    let assignment =
        apply_partner_action(state, assignment_id, partner_id, AssignmentAction::Deliver)?;

    state.timeouts.cancel_all(assignment_id);
    state.orders.mark_delivered(assignment.order_id);

    // The order is done; any duplicate queue entry must not resurrect it.
    state.queue.remove_all(assignment.order_id);
    sync_queue_gauge(state);

    state.partners.free(partner_id);
    record_outcome(state, "completed", &assignment);
    emit(state, AssignmentEventKind::Delivered, &assignment);

    info!(
        assignment_id = %assignment_id,
        order_id = %assignment.order_id,
        partner_id = %partner_id,
        "order delivered"
    );
    Ok(())
}

/// Acceptance window elapsed. Acts only if the assignment is still Created;
/// a fire that lost the race against accept/reject is a counted no-op.
pub(crate) fn handle_acceptance_timeout(state: &Arc<AppState>, assignment_id: Uuid) {
    let Some(assignment) = expire(
        state,
        assignment_id,
        AssignmentAction::AcceptanceDeadline,
        DeadlineKind::Acceptance,
    ) else {
        return;
    };

    warn!(
        assignment_id = %assignment_id,
        order_id = %assignment.order_id,
        partner_id = %assignment.partner_id,
        "acceptance window elapsed"
    );
    state.partners.free(assignment.partner_id);
    record_outcome(state, "timeout", &assignment);
    emit(state, AssignmentEventKind::AcceptanceTimedOut, &assignment);
    requeue_for_retry(state, &assignment);
}

/// Pickup window elapsed. Acts only if the assignment is still Accepted.
pub(crate) fn handle_pickup_timeout(state: &Arc<AppState>, assignment_id: Uuid) {
    let Some(assignment) = expire(
        state,
        assignment_id,
        AssignmentAction::PickupDeadline,
        DeadlineKind::Pickup,
    ) else {
        return;
    };

    warn!(
        assignment_id = %assignment_id,
        order_id = %assignment.order_id,
        partner_id = %assignment.partner_id,
        "pickup window elapsed"
    );
    state.partners.free(assignment.partner_id);
    record_outcome(state, "pickup_timeout", &assignment);
    emit(state, AssignmentEventKind::PickupTimedOut, &assignment);
    requeue_for_retry(state, &assignment);
}

/// Total delivery window elapsed. The one failure path that does not re-queue:
/// an overrun delivery is abandoned and the order cancelled.
pub(crate) fn handle_delivery_timeout(state: &Arc<AppState>, assignment_id: Uuid) {
    let Some(assignment) = expire(
        state,
        assignment_id,
        AssignmentAction::DeliveryDeadline,
        DeadlineKind::Delivery,
    ) else {
        return;
    };

    warn!(
        assignment_id = %assignment_id,
        order_id = %assignment.order_id,
        partner_id = %assignment.partner_id,
        "delivery window elapsed; abandoning order"
    );
    state.orders.cancel(assignment.order_id);
    state.metrics.orders_cancelled_total.inc();
    state.partners.free(assignment.partner_id);
    record_outcome(state, "failed", &assignment);
    emit(state, AssignmentEventKind::DeliveryWindowExpired, &assignment);
}

/// Validates and applies one partner action under the assignment's shard lock.
/// Any precondition failure leaves the assignment untouched.
fn apply_partner_action(
    state: &AppState,
    assignment_id: Uuid,
    partner_id: Uuid,
    action: AssignmentAction,
) -> Result<Assignment, AppError> {
    let mut entry = state
        .assignments
        .get_mut(&assignment_id)
        .ok_or_else(|| AppError::NotFound(format!("assignment {assignment_id} not found")))?;

    if entry.partner_id != partner_id {
        return Err(AppError::WrongPartner);
    }

    entry.status = entry.status.advance(action)?;

    let now = Utc::now();
    match entry.status {
        AssignmentStatus::Accepted => entry.accepted_at = Some(now),
        AssignmentStatus::Picked => entry.picked_at = Some(now),
        AssignmentStatus::Completed => entry.completed_at = Some(now),
        _ => {}
    }
    Ok(entry.clone())
}

/// Applies a deadline action, tolerating an archived assignment and a fire
/// that raced with a partner action. Returns the assignment only when the
/// deadline actually took effect.
fn expire(
    state: &AppState,
    assignment_id: Uuid,
    action: AssignmentAction,
    kind: DeadlineKind,
) -> Option<Assignment> {
    let stale = |state: &AppState| {
        state
            .metrics
            .deadline_fires_total
            .with_label_values(&[kind.as_str(), "stale"])
            .inc();
    };

    let Some(mut entry) = state.assignments.get_mut(&assignment_id) else {
        stale(state);
        return None;
    };

    match entry.status.advance(action) {
        Ok(next) => {
            entry.status = next;
            state
                .metrics
                .deadline_fires_total
                .with_label_values(&[kind.as_str(), "acted"])
                .inc();
            Some(entry.clone())
        }
        Err(rejected) => {
            debug!(
                assignment_id = %assignment_id,
                %rejected,
                "deadline fired after assignment advanced"
            );
            stale(state);
            None
        }
    }
}

/// Resets the order and re-queues it at the head for the next attempt, unless
/// the retry budget is spent, in which case the order is cancelled for good.
fn requeue_for_retry(state: &Arc<AppState>, assignment: &Assignment) {
    let next_attempt = assignment.attempt + 1;
    if next_attempt >= state.dispatch.max_attempts {
        warn!(
            order_id = %assignment.order_id,
            attempts = next_attempt,
            "retry budget exhausted; cancelling order"
        );
        state.orders.cancel(assignment.order_id);
        state.metrics.orders_cancelled_total.inc();
        return;
    }

    // Reset before re-queuing so a concurrent pop cannot observe the stale
    // Assigned status and burn a hand-off attempt.
    state.orders.release_for_retry(assignment.order_id);
    state.queue.push_front(QueuedOrder {
        order_id: assignment.order_id,
        attempt: next_attempt,
    });
    sync_queue_gauge(state);

    info!(
        order_id = %assignment.order_id,
        attempt = next_attempt,
        "order re-queued at head for retry"
    );
}

fn emit(state: &AppState, kind: AssignmentEventKind, assignment: &Assignment) {
    let event = AssignmentEvent {
        kind,
        assignment: assignment.clone(),
    };
    // Nobody listening is fine; the partner can still poll.
    if state.events_tx.send(event).is_err() {
        debug!(assignment_id = %assignment.id, "no subscribers for assignment event");
    }
}

fn record_outcome(state: &AppState, outcome: &str, assignment: &Assignment) {
    state
        .metrics
        .assignments_total
        .with_label_values(&[outcome])
        .inc();

    let cycle = (Utc::now() - assignment.assigned_at)
        .to_std()
        .unwrap_or_default();
    state
        .metrics
        .assignment_cycle_seconds
        .with_label_values(&[outcome])
        .observe(cycle.as_secs_f64());
}

fn sync_queue_gauge(state: &AppState) {
    state.metrics.orders_in_queue.set(state.queue.len() as i64);
}
