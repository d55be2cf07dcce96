mod common;

use assert_matches::assert_matches;
use chrono::{Duration, Local, Utc};
use common::{date, local_noon, raw_request, reference_cart, TestApp};
use pos_core::{
    entities::order::OrderStatus,
    errors::ServiceError,
    providers::SettingsProvider,
    services::{
        order_number::format_order_number,
        orders::{OrderFilter, SortDirection, DEFAULT_CUSTOMER_NAME, DEFAULT_PAYMENT_METHOD},
    },
};
use rstest::rstest;
use rust_decimal_macros::dec;
use uuid::Uuid;

#[tokio::test]
async fn reference_cart_is_persisted_with_reconciled_totals() {
    let app = TestApp::new().await;
    let tax_rate = app.state.settings.effective_tax_rate();
    assert_eq!(tax_rate, dec!(0.1));

    let request = reference_cart().checkout(tax_rate).unwrap();
    let created = app.state.orders.create_order(request).await.unwrap();

    let today = Local::now().date_naive();
    assert_eq!(created.order_number, format_order_number(today, 1));
    assert!(created.order_number.starts_with("ORD-"));

    let details = app.state.orders.get_order(created.order_id).await.unwrap();
    let order = &details.order;
    assert_eq!(order.subtotal, dec!(20.97));
    assert_eq!(order.tax_amount, dec!(2.10));
    assert_eq!(order.total_amount, dec!(23.07));
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.customer_name, DEFAULT_CUSTOMER_NAME);
    assert_eq!(order.payment_method, DEFAULT_PAYMENT_METHOD);
    assert!(order.completed_at.is_none());

    assert_eq!(details.items.len(), 2);
    assert_eq!(details.items[0].name, "Burger");
    assert_eq!(details.items[0].total_price, dec!(17.98));
    assert_eq!(details.items[1].unit_price, dec!(2.99));
}

#[tokio::test]
async fn zero_quantity_rejects_the_order_and_writes_nothing() {
    let app = TestApp::new().await;
    let request = raw_request(
        vec![(1, "Burger", 2, dec!(8.99)), (2, "Soda", 0, dec!(2.99))],
        dec!(0.10),
    );

    let result = app.state.orders.create_order(request).await;

    assert_matches!(result, Err(ServiceError::InvalidAmount(_)));
    assert_eq!(app.order_count().await, 0);
    assert_eq!(app.item_count().await, 0);
}

#[tokio::test]
async fn empty_and_unreconciled_carts_are_rejected() {
    let app = TestApp::new().await;

    let empty = raw_request(vec![], dec!(0.10));
    assert_matches!(
        app.state.orders.create_order(empty).await,
        Err(ServiceError::EmptyCart)
    );

    let mut tampered = raw_request(vec![(1, "Burger", 1, dec!(8.99))], dec!(0.10));
    tampered.total_amount = dec!(1.00);
    assert_matches!(
        app.state.orders.create_order(tampered).await,
        Err(ServiceError::InvalidAmount(_))
    );

    assert_eq!(app.order_count().await, 0);
}

#[tokio::test]
async fn out_of_range_amounts_fail_as_invalid_amount() {
    let app = TestApp::new().await;
    let huge = dec!(90000000000000000.00);

    let mut overflowing = raw_request(vec![(1, "Banquet", 1, huge)], dec!(0));
    overflowing.tax_amount = huge;
    assert_matches!(
        app.state.orders.create_order(overflowing).await,
        Err(ServiceError::InvalidAmount(_))
    );

    let mut unbounded = raw_request(vec![(1, "Banquet", 1, dec!(1.00))], dec!(0));
    unbounded.items[0].unit_price = rust_decimal::Decimal::MAX;
    assert_matches!(
        app.state.orders.create_order(unbounded).await,
        Err(ServiceError::InvalidAmount(_))
    );

    assert_eq!(app.order_count().await, 0);
    assert_eq!(app.item_count().await, 0);
}

#[rstest]
#[case(dec!(0.08))]
#[case(dec!(0.0725))]
#[case(dec!(0))]
#[tokio::test]
async fn total_matches_rounded_gross(#[case] rate: rust_decimal::Decimal) {
    let app = TestApp::new().await;
    let request = raw_request(
        vec![
            (1, "Burger", 3, dec!(8.99)),
            (2, "Soda", 2, dec!(2.99)),
            (3, "Fries", 1, dec!(3.49)),
        ],
        rate,
    );
    let created = app.state.orders.create_order(request).await.unwrap();
    let order = app.state.orders.get_order(created.order_id).await.unwrap().order;

    let gross = pos_core::money::round2(dec!(36.44) * (rust_decimal::Decimal::ONE + rate));
    assert!((order.total_amount - gross).abs() <= dec!(0.01));
    assert!(pos_core::money::reconciles(
        order.subtotal,
        order.tax_amount,
        order.total_amount
    ));
}

#[tokio::test]
async fn ready_order_cannot_move_back_to_pending() {
    let app = TestApp::new().await;
    let request = reference_cart().checkout(dec!(0.10)).unwrap();
    let created = app.state.orders.create_order(request).await.unwrap();

    app.state
        .orders
        .transition_status(created.order_id, OrderStatus::Ready)
        .await
        .unwrap();

    let result = app
        .state
        .orders
        .transition_status(created.order_id, OrderStatus::Pending)
        .await;
    assert_matches!(
        result,
        Err(ServiceError::InvalidTransition {
            from: OrderStatus::Ready,
            to: OrderStatus::Pending
        })
    );

    let order = app.state.orders.get_order(created.order_id).await.unwrap().order;
    assert_eq!(order.status, OrderStatus::Ready);
}

#[rstest]
#[case(OrderStatus::Preparing)]
#[case(OrderStatus::Ready)]
#[case(OrderStatus::Completed)]
#[tokio::test]
async fn pending_accepts_any_forward_status(#[case] target: OrderStatus) {
    let app = TestApp::new().await;
    let created = app
        .state
        .orders
        .create_order(reference_cart().checkout(dec!(0.10)).unwrap())
        .await
        .unwrap();

    let updated = app
        .state
        .orders
        .transition_status(created.order_id, target)
        .await
        .unwrap();
    assert_eq!(updated.status, target);
    assert_eq!(
        updated.completed_at.is_some(),
        target == OrderStatus::Completed
    );
}

#[rstest]
#[case(OrderStatus::Pending)]
#[case(OrderStatus::Preparing)]
#[case(OrderStatus::Ready)]
#[case(OrderStatus::Completed)]
#[tokio::test]
async fn completed_is_terminal(#[case] target: OrderStatus) {
    let app = TestApp::new().await;
    let created = app
        .state
        .orders
        .create_order(reference_cart().checkout(dec!(0.10)).unwrap())
        .await
        .unwrap();
    let completed = app
        .state
        .orders
        .transition_status(created.order_id, OrderStatus::Completed)
        .await
        .unwrap();

    let result = app
        .state
        .orders
        .transition_status(created.order_id, target)
        .await;
    assert_matches!(result, Err(ServiceError::InvalidTransition { from: OrderStatus::Completed, .. }));

    let order = app.state.orders.get_order(created.order_id).await.unwrap().order;
    assert_eq!(order.completed_at, completed.completed_at);
}

#[tokio::test]
async fn completion_stamps_completed_at_once() {
    let app = TestApp::new().await;
    let created_at = local_noon(date(2026, 5, 4));
    let created = app
        .state
        .orders
        .create_order_at(reference_cart().checkout(dec!(0.10)).unwrap(), created_at)
        .await
        .unwrap();

    let ready_at = created_at + Duration::minutes(8);
    let ready = app
        .state
        .orders
        .transition_status_at(created.order_id, OrderStatus::Ready, ready_at)
        .await
        .unwrap();
    assert!(ready.completed_at.is_none());

    let done_at = created_at + Duration::minutes(12);
    app.state
        .orders
        .transition_status_at(created.order_id, OrderStatus::Completed, done_at)
        .await
        .unwrap();

    let order = app.state.orders.get_order(created.order_id).await.unwrap().order;
    assert_eq!(order.created_at, created_at);
    assert_eq!(order.completed_at, Some(done_at));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_transitions_never_move_backwards() {
    let app = TestApp::concurrent().await;
    let targets = [
        OrderStatus::Preparing,
        OrderStatus::Ready,
        OrderStatus::Completed,
        OrderStatus::Ready,
    ];

    for _round in 0..10 {
        let created = app
            .state
            .orders
            .create_order(reference_cart().checkout(dec!(0.10)).unwrap())
            .await
            .unwrap();

        let mut tasks = Vec::new();
        for target in targets {
            let orders = app.state.orders.clone();
            let id = created.order_id;
            tasks.push(tokio::spawn(async move {
                orders.transition_status(id, target).await
            }));
        }

        let mut applied = Vec::new();
        for task in tasks {
            match task.await.unwrap() {
                Ok(order) => applied.push(order.status),
                Err(ServiceError::InvalidTransition { .. }) => {}
                Err(other) => panic!("unexpected error: {other}"),
            }
        }

        // each accepted status is distinct, so none was applied twice
        let mut distinct = applied.clone();
        distinct.sort();
        distinct.dedup();
        assert_eq!(distinct.len(), applied.len());
        assert_eq!(distinct.last(), Some(&OrderStatus::Completed));

        let order = app
            .state
            .orders
            .get_order(created.order_id)
            .await
            .unwrap()
            .order;
        assert_eq!(order.status, OrderStatus::Completed);
        assert!(order.completed_at.is_some());
    }
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let app = TestApp::new().await;
    let missing = Uuid::new_v4();

    assert_matches!(
        app.state.orders.get_order(missing).await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(
        app.state
            .orders
            .transition_status(missing, OrderStatus::Ready)
            .await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(
        app.state.orders.get_order_by_number("ORD-19990101-001").await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn list_orders_filters_and_sorts() {
    let app = TestApp::new().await;
    let day = date(2026, 6, 1);
    let base = local_noon(day);

    let mut ids = Vec::new();
    for minutes in [0, 10, 20, 30] {
        let created = app
            .state
            .orders
            .create_order_at(
                reference_cart().checkout(dec!(0.10)).unwrap(),
                base + Duration::minutes(minutes),
            )
            .await
            .unwrap();
        ids.push(created.order_id);
    }
    app.state
        .orders
        .transition_status(ids[1], OrderStatus::Completed)
        .await
        .unwrap();

    let all = app.state.orders.list_orders(&OrderFilter::default()).await.unwrap();
    let numbers: Vec<_> = all.iter().map(|o| o.order_number.clone()).collect();
    assert_eq!(
        numbers,
        (1..=4)
            .map(|n| format_order_number(day, n))
            .collect::<Vec<_>>()
    );

    let active = app.state.orders.list_orders(&OrderFilter::active()).await.unwrap();
    assert_eq!(active.len(), 3);
    assert!(active.iter().all(|o| o.id != ids[1]));

    let recent = app.state.orders.list_orders(&OrderFilter::recent(2)).await.unwrap();
    assert_eq!(
        recent.iter().map(|o| o.id).collect::<Vec<_>>(),
        vec![ids[3], ids[2]]
    );

    let window = OrderFilter::default()
        .created_between(base + Duration::minutes(5), base + Duration::minutes(20))
        .sorted(SortDirection::Descending);
    let windowed = app.state.orders.list_orders(&window).await.unwrap();
    assert_eq!(
        windowed.iter().map(|o| o.id).collect::<Vec<_>>(),
        vec![ids[2], ids[1]]
    );

    let with_items = app
        .state
        .orders
        .list_orders_with_items(&OrderFilter::active().limit(1))
        .await
        .unwrap();
    assert_eq!(with_items.len(), 1);
    assert_eq!(with_items[0].order.id, ids[0]);
    assert_eq!(with_items[0].items.len(), 2);

    let by_number = app
        .state
        .orders
        .get_order_by_number(&format_order_number(day, 3))
        .await
        .unwrap();
    assert_eq!(by_number.order.id, ids[2]);
    assert!(Utc::now() > by_number.order.created_at);
}
