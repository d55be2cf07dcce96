use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::order::OrderStatus,
    errors::ServiceError,
    services::orders::{OrderFilter, OrderItemResponse, OrderResponse, OrderService},
};

/// Waiting this many minutes or longer flags a ticket as urgent.
pub const URGENT_WAIT_MINUTES: i64 = 20;

/// Whole minutes elapsed since `created_at`, never negative.
pub fn wait_minutes(created_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - created_at).num_seconds().max(0) / 60
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KitchenTicket {
    pub order: OrderResponse,
    pub items: Vec<OrderItemResponse>,
    pub wait_minutes: i64,
    pub urgent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KitchenFilter {
    All,
    Status(OrderStatus),
}

impl FromStr for KitchenFilter {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        if s == "all" {
            return Ok(KitchenFilter::All);
        }
        OrderStatus::from_str(&s)
            .map(KitchenFilter::Status)
            .map_err(|_| ServiceError::ValidationError(format!("Unknown kitchen filter '{}'", s)))
    }
}

/// Snapshot of every order still in the kitchen, oldest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KitchenBoard {
    pub generated_at: DateTime<Utc>,
    pub tickets: Vec<KitchenTicket>,
}

impl KitchenBoard {
    pub fn filter(&self, filter: KitchenFilter) -> Vec<&KitchenTicket> {
        self.tickets
            .iter()
            .filter(|t| match filter {
                KitchenFilter::All => true,
                KitchenFilter::Status(status) => t.order.status == status,
            })
            .collect()
    }

    /// Ticket count per active status, zero-filled.
    pub fn counts(&self) -> BTreeMap<OrderStatus, usize> {
        let mut counts: BTreeMap<OrderStatus, usize> =
            OrderStatus::ACTIVE.iter().map(|s| (*s, 0)).collect();
        for ticket in &self.tickets {
            *counts.entry(ticket.order.status).or_insert(0) += 1;
        }
        counts
    }

    pub fn urgent_count(&self) -> usize {
        self.tickets.iter().filter(|t| t.urgent).count()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }
}

/// Read-through view of the kitchen queue plus the staff actions on it.
/// Holds no order state between calls; callers poll [`reload`](Self::reload).
#[derive(Clone)]
pub struct KitchenService {
    orders: OrderService,
}

impl KitchenService {
    pub fn new(orders: OrderService) -> Self {
        Self { orders }
    }

    #[instrument(skip(self))]
    pub async fn reload(&self, now: DateTime<Utc>) -> Result<KitchenBoard, ServiceError> {
        let active = self
            .orders
            .list_orders_with_items(&OrderFilter::active())
            .await?;

        let tickets: Vec<KitchenTicket> = active
            .into_iter()
            .map(|details| {
                let wait = wait_minutes(details.order.created_at, now);
                KitchenTicket {
                    order: details.order,
                    items: details.items,
                    wait_minutes: wait,
                    urgent: wait >= URGENT_WAIT_MINUTES,
                }
            })
            .collect();

        debug!(tickets = tickets.len(), "Kitchen board reloaded");
        Ok(KitchenBoard {
            generated_at: now,
            tickets,
        })
    }

    /// Applies a staff action. Only the single next step from the current
    /// status is accepted here, even though the store allows skipping ahead.
    #[instrument(skip(self), fields(order_id = %order_id, target = %target))]
    pub async fn request_transition(
        &self,
        order_id: Uuid,
        target: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<OrderResponse, ServiceError> {
        let current = self.orders.get_order(order_id).await?.order.status;

        if current.next() != Some(target) {
            warn!(current = %current, "Kitchen action is not the next step");
            return Err(ServiceError::InvalidTransition {
                from: current,
                to: target,
            });
        }

        self.orders
            .transition_status_at(order_id, target, now)
            .await
    }

    /// Advances an order one step along the kitchen flow.
    pub async fn bump(
        &self,
        order_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<OrderResponse, ServiceError> {
        let current = self.orders.get_order(order_id).await?.order.status;
        let target = current.next().ok_or(ServiceError::InvalidTransition {
            from: current,
            to: current,
        })?;
        self.request_transition(order_id, target, now).await
    }
}
