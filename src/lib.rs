//! Point-of-sale order core
//!
//! Checkout, the kitchen workflow and sales reporting over a single
//! SQL store.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod migrator;
pub mod money;
pub mod providers;
pub mod services;

use std::sync::Arc;

use sea_orm::DatabaseConnection;
use tracing::info;

use crate::config::AppConfig;
use crate::errors::ServiceError;
use crate::providers::StaticSettings;
use crate::services::{kitchen::KitchenService, orders::OrderService, reports::ReportService};

/// Shared handles for one store: the connection pool plus the services built
/// on it.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: AppConfig,
    pub settings: StaticSettings,
    pub orders: OrderService,
    pub kitchen: KitchenService,
    pub reports: ReportService,
}

impl AppState {
    /// Wires the services around an existing pool.
    pub fn from_pool(db: Arc<DatabaseConnection>, config: AppConfig) -> Self {
        let orders = OrderService::new(db.clone());
        Self {
            settings: StaticSettings::from(&config),
            kitchen: KitchenService::new(orders.clone()),
            reports: ReportService::new(db.clone()),
            orders,
            db,
            config,
        }
    }

    /// Connects using `config`, applying migrations first when
    /// `auto_migrate` is set.
    pub async fn init(config: AppConfig) -> Result<Self, ServiceError> {
        let pool = db::establish_connection_from_app_config(&config).await?;
        if config.auto_migrate {
            db::run_migrations(&pool).await?;
        }
        db::check_connection(&pool).await?;
        info!(environment = %config.environment, "Order core ready");
        Ok(Self::from_pool(Arc::new(pool), config))
    }
}
