#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use pos_core::{
    config::AppConfig,
    db,
    entities::{order, order::OrderType, order_item},
    money::{compute_tax, compute_total},
    services::{
        cart::Cart,
        order_number::local_midnight,
        orders::{CartLine, CreateOrderRequest},
    },
    AppState,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{EntityTrait, PaginatorTrait};
use tempfile::TempDir;

/// Order core backed by a fresh SQLite file with migrations applied.
pub struct TestApp {
    pub state: AppState,
    _dir: TempDir,
}

impl TestApp {
    /// Single pooled connection, so writers run strictly one after another.
    pub async fn new() -> Self {
        Self::with_pool_size(1).await
    }

    /// Pool sized like production, so concurrent writers genuinely race.
    pub async fn concurrent() -> Self {
        Self::with_pool_size(5).await
    }

    pub async fn with_pool_size(max_connections: u32) -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let path = dir.path().join("pos_test.db");

        let mut cfg = AppConfig::new(format!("sqlite://{}?mode=rwc", path.display()), "test");
        cfg.db_max_connections = max_connections;
        cfg.db_min_connections = 1;
        cfg.tax_rate = 0.10;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        Self {
            state: AppState::from_pool(Arc::new(pool), cfg),
            _dir: dir,
        }
    }

    pub async fn order_count(&self) -> u64 {
        order::Entity::find()
            .count(&*self.state.db)
            .await
            .expect("count orders")
    }

    pub async fn item_count(&self) -> u64 {
        order_item::Entity::find()
            .count(&*self.state.db)
            .await
            .expect("count order items")
    }
}

/// Noon local time on `date`, as UTC.
pub fn local_noon(date: NaiveDate) -> DateTime<Utc> {
    local_midnight(date) + Duration::hours(12)
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

/// Two burgers at 8.99 and one soda at 2.99.
pub fn reference_cart() -> Cart {
    let mut cart = Cart::new(OrderType::DineIn);
    cart.add_line(1, "Burger", 2, dec!(8.99), None)
        .expect("burger line");
    cart.add_line(2, "Soda", 1, dec!(2.99), None)
        .expect("soda line");
    cart
}

/// A request built without [`Cart`], for exercising store-side validation.
pub fn raw_request(lines: Vec<(i64, &str, i32, Decimal)>, tax_rate: Decimal) -> CreateOrderRequest {
    let items: Vec<CartLine> = lines
        .into_iter()
        .map(|(id, name, quantity, unit_price)| CartLine {
            menu_item_id: id,
            name: name.to_string(),
            quantity,
            unit_price,
            notes: None,
        })
        .collect();
    let subtotal: Decimal = items
        .iter()
        .map(|l| l.unit_price * Decimal::from(l.quantity))
        .sum();
    let tax_amount = compute_tax(subtotal, tax_rate);
    CreateOrderRequest {
        order_type: OrderType::Takeout,
        customer_name: None,
        payment_method: None,
        created_by: None,
        items,
        subtotal,
        tax_amount,
        total_amount: compute_total(subtotal, tax_amount),
    }
}
