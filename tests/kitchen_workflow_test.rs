mod common;

use assert_matches::assert_matches;
use chrono::{DateTime, Duration, Utc};
use common::{reference_cart, TestApp};
use pos_core::{
    entities::order::OrderStatus,
    errors::ServiceError,
    services::kitchen::{KitchenFilter, URGENT_WAIT_MINUTES},
};
use rust_decimal_macros::dec;
use uuid::Uuid;

async fn place_order(app: &TestApp, at: DateTime<Utc>) -> Uuid {
    app.state
        .orders
        .create_order_at(reference_cart().checkout(dec!(0.10)).unwrap(), at)
        .await
        .unwrap()
        .order_id
}

#[tokio::test]
async fn board_lists_active_orders_oldest_first() {
    let app = TestApp::new().await;
    let now = Utc::now();

    let newest = place_order(&app, now - Duration::minutes(2)).await;
    let oldest = place_order(&app, now - Duration::minutes(25)).await;
    let middle = place_order(&app, now - Duration::minutes(10)).await;

    let board = app.state.kitchen.reload(now).await.unwrap();
    let ids: Vec<_> = board.tickets.iter().map(|t| t.order.id).collect();
    assert_eq!(ids, vec![oldest, middle, newest]);

    let first = &board.tickets[0];
    assert!(first.wait_minutes >= URGENT_WAIT_MINUTES);
    assert!(first.urgent);
    assert!(!board.tickets[1].urgent);
    assert_eq!(board.urgent_count(), 1);
    assert_eq!(first.items.len(), 2);
    assert_eq!(first.items[0].name, "Burger");
}

#[tokio::test]
async fn urgency_starts_at_the_threshold() {
    let app = TestApp::new().await;
    let now = Utc::now();
    place_order(&app, now - Duration::minutes(URGENT_WAIT_MINUTES)).await;
    place_order(&app, now - Duration::minutes(URGENT_WAIT_MINUTES - 1)).await;

    let board = app.state.kitchen.reload(now).await.unwrap();
    let flags: Vec<_> = board.tickets.iter().map(|t| t.urgent).collect();
    assert_eq!(flags, vec![true, false]);
}

#[tokio::test]
async fn counts_and_filters_follow_status() {
    let app = TestApp::new().await;
    let now = Utc::now();
    let a = place_order(&app, now - Duration::minutes(3)).await;
    let b = place_order(&app, now - Duration::minutes(2)).await;
    place_order(&app, now - Duration::minutes(1)).await;

    app.state.kitchen.bump(a, now).await.unwrap();
    app.state.kitchen.bump(b, now).await.unwrap();
    app.state.kitchen.bump(b, now).await.unwrap();

    let board = app.state.kitchen.reload(now).await.unwrap();
    let counts = board.counts();
    assert_eq!(counts[&OrderStatus::Pending], 1);
    assert_eq!(counts[&OrderStatus::Preparing], 1);
    assert_eq!(counts[&OrderStatus::Ready], 1);
    assert!(!counts.contains_key(&OrderStatus::Completed));

    let preparing = board.filter(KitchenFilter::Status(OrderStatus::Preparing));
    assert_eq!(preparing.len(), 1);
    assert_eq!(preparing[0].order.id, a);
    assert_eq!(board.filter(KitchenFilter::All).len(), 3);
}

#[tokio::test]
async fn kitchen_rejects_skipping_a_step() {
    let app = TestApp::new().await;
    let now = Utc::now();
    let id = place_order(&app, now).await;

    let result = app
        .state
        .kitchen
        .request_transition(id, OrderStatus::Ready, now)
        .await;
    assert_matches!(
        result,
        Err(ServiceError::InvalidTransition {
            from: OrderStatus::Pending,
            to: OrderStatus::Ready
        })
    );

    let order = app.state.orders.get_order(id).await.unwrap().order;
    assert_eq!(order.status, OrderStatus::Pending);

    let updated = app
        .state
        .kitchen
        .request_transition(id, OrderStatus::Preparing, now)
        .await
        .unwrap();
    assert_eq!(updated.status, OrderStatus::Preparing);
}

#[tokio::test]
async fn bumping_through_completion_clears_the_board() {
    let app = TestApp::new().await;
    let now = Utc::now();
    let id = place_order(&app, now - Duration::minutes(5)).await;

    let mut seen = Vec::new();
    for _ in 0..3 {
        seen.push(app.state.kitchen.bump(id, now).await.unwrap().status);
    }
    assert_eq!(
        seen,
        vec![OrderStatus::Preparing, OrderStatus::Ready, OrderStatus::Completed]
    );

    let board = app.state.kitchen.reload(now).await.unwrap();
    assert!(board.is_empty());

    let order = app.state.orders.get_order(id).await.unwrap().order;
    assert!(order.completed_at.is_some());

    assert_matches!(
        app.state.kitchen.bump(id, now).await,
        Err(ServiceError::InvalidTransition { from: OrderStatus::Completed, .. })
    );
}

#[tokio::test]
async fn unknown_order_cannot_be_bumped() {
    let app = TestApp::new().await;
    assert_matches!(
        app.state.kitchen.bump(Uuid::new_v4(), Utc::now()).await,
        Err(ServiceError::NotFound(_))
    );
}
