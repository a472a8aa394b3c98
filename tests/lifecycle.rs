use std::sync::Arc;
use std::time::Duration;

use delivery_dispatch::config::DispatchConfig;
use delivery_dispatch::engine::coordinator;
use delivery_dispatch::engine::timeouts::DeadlineKind;
use delivery_dispatch::models::assignment::{Assignment, AssignmentStatus};
use delivery_dispatch::models::order::{Order, OrderStatus};
use delivery_dispatch::models::partner::{Partner, PartnerStatus};
use delivery_dispatch::state::AppState;
use uuid::Uuid;

fn test_state() -> Arc<AppState> {
    Arc::new(AppState::new(DispatchConfig::default(), 64))
}

fn confirmed_order(state: &Arc<AppState>) -> Uuid {
    let order = Order::new();
    let id = order.id;
    state.orders.insert(order);
    state.orders.confirm(id).unwrap();
    state.queue.push_back(id);
    id
}

fn available_partner(state: &Arc<AppState>, capacity: u32) -> Uuid {
    let partner = Partner::new("partner-under-test".to_string(), capacity);
    let id = partner.id;
    state.partners.insert(partner);
    state.partners.verify(id, true).unwrap();
    state.partners.set_availability(id, true, None).unwrap();
    id
}

fn latest_assignment(state: &Arc<AppState>, order_id: Uuid) -> Assignment {
    state
        .assignments
        .iter()
        .filter(|entry| entry.value().order_id == order_id)
        .map(|entry| entry.value().clone())
        .max_by_key(|assignment| assignment.attempt)
        .expect("order has an assignment")
}

fn live_assignments(state: &Arc<AppState>, order_id: Uuid) -> usize {
    state
        .assignments
        .iter()
        .filter(|entry| {
            entry.value().order_id == order_id && !entry.value().status.is_terminal()
        })
        .count()
}

// Scenario A: no acceptance within the window reclaims the order.
#[tokio::test(start_paused = true)]
async fn acceptance_timeout_reclaims_and_requeues() {
    let state = test_state();
    let order_id = confirmed_order(&state);
    let partner_id = available_partner(&state, 1);

    assert!(coordinator::try_assign_to_partner(&state, partner_id));

    let a1 = latest_assignment(&state, order_id);
    assert_eq!(a1.status, AssignmentStatus::Created);
    assert_eq!(a1.attempt, 0);

    let assigned = state.orders.get(order_id).unwrap();
    assert_eq!(assigned.status, OrderStatus::Assigned);
    assert_eq!(assigned.assigned_partner, Some(partner_id));
    assert!(state.queue.is_empty());

    tokio::time::sleep(Duration::from_secs(76)).await;

    let a1 = latest_assignment(&state, order_id);
    assert_eq!(a1.status, AssignmentStatus::Timeout);

    let reclaimed = state.orders.get(order_id).unwrap();
    assert_eq!(reclaimed.status, OrderStatus::Confirmed);
    assert!(reclaimed.assigned_partner.is_none());

    let head = state.queue.pop_front().unwrap();
    assert_eq!(head.order_id, order_id);
    assert_eq!(head.attempt, 1);

    let partner = state.partners.get(partner_id).unwrap();
    assert_eq!(partner.status, PartnerStatus::Available);
    assert!(partner.online);
}

// Scenario B: accepted but never picked up.
#[tokio::test(start_paused = true)]
async fn pickup_timeout_reclaims_an_accepted_order() {
    let state = test_state();
    let order_id = confirmed_order(&state);
    let partner_id = available_partner(&state, 1);

    assert!(coordinator::try_assign_to_partner(&state, partner_id));
    let a1 = latest_assignment(&state, order_id);
    coordinator::partner_accepts(&state, a1.id, partner_id).unwrap();

    assert_eq!(
        state.orders.get(order_id).unwrap().status,
        OrderStatus::Accepted
    );

    tokio::time::sleep(Duration::from_secs(301)).await;

    let a1 = latest_assignment(&state, order_id);
    assert_eq!(a1.status, AssignmentStatus::PickupTimeout);

    let reclaimed = state.orders.get(order_id).unwrap();
    assert_eq!(reclaimed.status, OrderStatus::Confirmed);
    assert!(reclaimed.assigned_partner.is_none());
    assert_eq!(state.queue.pop_front().unwrap().attempt, 1);
    assert_eq!(
        state.partners.get(partner_id).unwrap().status,
        PartnerStatus::Available
    );
}

// Scenario C: the happy path, every action inside its window.
#[tokio::test(start_paused = true)]
async fn full_lifecycle_completes_within_windows() {
    let state = test_state();
    let order_id = confirmed_order(&state);
    let partner_id = available_partner(&state, 1);

    assert!(coordinator::try_assign_to_partner(&state, partner_id));
    let assignment = latest_assignment(&state, order_id);

    tokio::time::sleep(Duration::from_secs(10)).await;
    coordinator::partner_accepts(&state, assignment.id, partner_id).unwrap();

    tokio::time::sleep(Duration::from_secs(60)).await;
    coordinator::partner_picked(&state, assignment.id, partner_id).unwrap();
    assert_eq!(
        state.orders.get(order_id).unwrap().status,
        OrderStatus::OutForDelivery
    );

    tokio::time::sleep(Duration::from_secs(600)).await;
    coordinator::partner_delivered(&state, assignment.id, partner_id).unwrap();

    let done = latest_assignment(&state, order_id);
    assert_eq!(done.status, AssignmentStatus::Completed);
    assert!(done.completed_at.is_some());

    let order = state.orders.get(order_id).unwrap();
    assert_eq!(order.status, OrderStatus::Delivered);
    assert!(order.assigned_partner.is_none());
    assert!(order.delivered_at.is_some());

    assert_eq!(
        state.partners.get(partner_id).unwrap().status,
        PartnerStatus::Available
    );
    assert!(state.queue.is_empty());
    assert_eq!(state.timeouts.open_deadlines(), 0);

    // Every deadline was cancelled on advancement; nothing fires late.
    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(
        latest_assignment(&state, order_id).status,
        AssignmentStatus::Completed
    );
    assert_eq!(
        state.orders.get(order_id).unwrap().status,
        OrderStatus::Delivered
    );
}

// Scenario D: rejection re-queues at the head and a second partner picks the
// same order up as a fresh assignment.
#[tokio::test(start_paused = true)]
async fn rejection_requeues_for_a_second_partner() {
    let state = test_state();
    let order_id = confirmed_order(&state);
    let p1 = available_partner(&state, 1);
    let p2 = available_partner(&state, 1);

    assert!(coordinator::try_assign_to_partner(&state, p1));
    let a1 = latest_assignment(&state, order_id);
    coordinator::partner_rejects(&state, a1.id, p1).unwrap();

    assert_eq!(
        state
            .assignments
            .get(&a1.id)
            .map(|entry| entry.value().status),
        Some(AssignmentStatus::Rejected)
    );
    assert_eq!(
        state.partners.get(p1).unwrap().status,
        PartnerStatus::Available
    );
    assert_eq!(state.queue.len(), 1);

    assert!(coordinator::try_assign_to_partner(&state, p2));
    let a2 = latest_assignment(&state, order_id);
    assert_ne!(a2.id, a1.id);
    assert_eq!(a2.order_id, order_id);
    assert_eq!(a2.partner_id, p2);
    assert_eq!(a2.attempt, 1);
    assert_eq!(a2.status, AssignmentStatus::Created);

    // the terminal attempt stays on record; only one assignment is live
    assert_eq!(live_assignments(&state, order_id), 1);
    assert_eq!(
        state.orders.get(order_id).unwrap().assigned_partner,
        Some(p2)
    );
}

// Race property: one order, two concurrent hand-offs, exactly one winner.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_handoffs_assign_exactly_once() {
    for _ in 0..50 {
        let state = test_state();
        let order_id = confirmed_order(&state);
        let p1 = available_partner(&state, 1);
        let p2 = available_partner(&state, 1);

        let first = {
            let state = state.clone();
            tokio::spawn(async move { coordinator::try_assign_to_partner(&state, p1) })
        };
        let second = {
            let state = state.clone();
            tokio::spawn(async move { coordinator::try_assign_to_partner(&state, p2) })
        };

        let wins = [first.await.unwrap(), second.await.unwrap()]
            .iter()
            .filter(|won| **won)
            .count();

        assert_eq!(wins, 1);
        assert_eq!(live_assignments(&state, order_id), 1);
        state.timeouts.shutdown();
    }
}

#[tokio::test(start_paused = true)]
async fn delivered_twice_is_rejected_without_side_effects() {
    let state = test_state();
    let order_id = confirmed_order(&state);
    let partner_id = available_partner(&state, 1);

    assert!(coordinator::try_assign_to_partner(&state, partner_id));
    let assignment = latest_assignment(&state, order_id);
    coordinator::partner_accepts(&state, assignment.id, partner_id).unwrap();
    coordinator::partner_picked(&state, assignment.id, partner_id).unwrap();
    coordinator::partner_delivered(&state, assignment.id, partner_id).unwrap();

    let first_pass = state.orders.get(order_id).unwrap();
    coordinator::partner_delivered(&state, assignment.id, partner_id).unwrap_err();

    let order = state.orders.get(order_id).unwrap();
    assert_eq!(order.status, OrderStatus::Delivered);
    assert_eq!(order.delivered_at, first_pass.delivered_at);
    assert_eq!(
        latest_assignment(&state, order_id).status,
        AssignmentStatus::Completed
    );
    assert_eq!(
        state.partners.get(partner_id).unwrap().status,
        PartnerStatus::Available
    );
}

// A late confirmation may skip the pickup ping entirely, but only while the
// assignment is live.
#[tokio::test(start_paused = true)]
async fn delivery_confirmation_lands_from_accepted() {
    let state = test_state();
    let order_id = confirmed_order(&state);
    let partner_id = available_partner(&state, 1);

    assert!(coordinator::try_assign_to_partner(&state, partner_id));
    let assignment = latest_assignment(&state, order_id);
    coordinator::partner_accepts(&state, assignment.id, partner_id).unwrap();
    coordinator::partner_delivered(&state, assignment.id, partner_id).unwrap();

    assert_eq!(
        latest_assignment(&state, order_id).status,
        AssignmentStatus::Completed
    );
    assert_eq!(
        state.orders.get(order_id).unwrap().status,
        OrderStatus::Delivered
    );
}

#[tokio::test(start_paused = true)]
async fn delivery_window_expiry_abandons_the_order() {
    let state = test_state();
    let order_id = confirmed_order(&state);
    let partner_id = available_partner(&state, 1);

    assert!(coordinator::try_assign_to_partner(&state, partner_id));
    let assignment = latest_assignment(&state, order_id);
    coordinator::partner_accepts(&state, assignment.id, partner_id).unwrap();
    coordinator::partner_picked(&state, assignment.id, partner_id).unwrap();

    tokio::time::sleep(Duration::from_secs(1201)).await;

    assert_eq!(
        latest_assignment(&state, order_id).status,
        AssignmentStatus::Failed
    );

    let order = state.orders.get(order_id).unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert!(order.assigned_partner.is_none());

    // abandoned, not retried
    assert!(state.queue.is_empty());
    assert_eq!(
        state.partners.get(partner_id).unwrap().status,
        PartnerStatus::Available
    );
}

#[tokio::test(start_paused = true)]
async fn retry_budget_exhaustion_cancels_the_order() {
    let dispatch = DispatchConfig {
        max_attempts: 2,
        ..DispatchConfig::default()
    };
    let state = Arc::new(AppState::new(dispatch, 64));
    let order_id = confirmed_order(&state);
    let partner_id = available_partner(&state, 1);

    // attempt 0 times out and re-queues as attempt 1
    assert!(coordinator::try_assign_to_partner(&state, partner_id));
    tokio::time::sleep(Duration::from_secs(76)).await;
    assert_eq!(
        state.orders.get(order_id).unwrap().status,
        OrderStatus::Confirmed
    );

    // attempt 1 times out; attempt 2 would exceed the budget
    assert!(coordinator::try_assign_to_partner(&state, partner_id));
    assert_eq!(latest_assignment(&state, order_id).attempt, 1);
    tokio::time::sleep(Duration::from_secs(76)).await;

    let order = state.orders.get(order_id).unwrap();
    assert_eq!(order.status, OrderStatus::Cancelled);
    assert!(order.assigned_partner.is_none());
    assert!(state.queue.is_empty());
    assert_eq!(state.metrics.orders_cancelled_total.get(), 1);
}

// The recheck-on-fire safety net: a deadline that slips past cancellation must
// become a counted no-op, not a second state change.
#[tokio::test(start_paused = true)]
async fn stale_deadline_fire_is_a_noop() {
    let state = test_state();
    let order_id = confirmed_order(&state);
    let partner_id = available_partner(&state, 1);

    assert!(coordinator::try_assign_to_partner(&state, partner_id));
    let assignment = latest_assignment(&state, order_id);
    coordinator::partner_accepts(&state, assignment.id, partner_id).unwrap();

    // Simulate a fire that raced past the cancel: re-arm the already-cancelled
    // acceptance deadline and let it go off against the Accepted assignment.
    state.timeouts.schedule(
        state.clone(),
        assignment.id,
        DeadlineKind::Acceptance,
        Duration::from_millis(1),
    );
    tokio::time::sleep(Duration::from_millis(5)).await;

    assert_eq!(
        latest_assignment(&state, order_id).status,
        AssignmentStatus::Accepted
    );
    assert_eq!(
        state
            .metrics
            .deadline_fires_total
            .with_label_values(&["acceptance", "stale"])
            .get(),
        1
    );
    assert!(state.queue.is_empty());
}

#[tokio::test(start_paused = true)]
async fn capacity_bounds_the_availability_drain() {
    let state = test_state();
    let o1 = confirmed_order(&state);
    let o2 = confirmed_order(&state);
    let o3 = confirmed_order(&state);
    let partner_id = available_partner(&state, 2);

    let assigned = coordinator::drain_into_partner(&state, partner_id, 2);
    assert_eq!(assigned, 2);
    assert_eq!(state.queue.len(), 1);
    assert_eq!(state.queue.pop_front().unwrap().order_id, o3);

    for order_id in [o1, o2] {
        assert_eq!(
            state.orders.get(order_id).unwrap().assigned_partner,
            Some(partner_id)
        );
    }
}
