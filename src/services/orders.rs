use crate::{
    db::{is_write_conflict, retry_backoff, DbPool},
    entities::order::{
        self, ActiveModel as OrderActiveModel, Entity as OrderEntity, Model as OrderModel,
        OrderStatus, OrderType,
    },
    entities::order_item::{
        self, ActiveModel as OrderItemActiveModel, Entity as OrderItemEntity,
        Model as OrderItemModel,
    },
    errors::ServiceError,
    money::{from_minor_units, to_minor_units},
    services::order_number::next_order_number,
};
use chrono::{DateTime, SubsecRound, Utc};
use metrics::{counter, histogram};
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveEnum, ColumnTrait, Condition, DatabaseTransaction, DbErr,
    EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Attempts made to allocate an order number before giving up.
pub const MAX_CREATE_ATTEMPTS: u32 = 5;

/// Attempts made to win the compare-and-swap on `status`.
pub const MAX_TRANSITION_ATTEMPTS: u32 = 5;

pub const DEFAULT_CUSTOMER_NAME: &str = "Walk-in Customer";
pub const DEFAULT_PAYMENT_METHOD: &str = "cash";

/// One cart line as submitted at checkout. `name` and `unit_price` are the
/// catalog values at that moment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub menu_item_id: i64,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateOrderRequest {
    pub order_type: OrderType,
    #[serde(default)]
    pub customer_name: Option<String>,
    #[serde(default)]
    pub payment_method: Option<String>,
    /// Opaque actor id of whoever rang the order up
    #[serde(default)]
    pub created_by: Option<String>,
    pub items: Vec<CartLine>,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedOrder {
    pub order_id: Uuid,
    pub order_number: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub customer_name: String,
    pub order_type: OrderType,
    pub payment_method: String,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItemResponse {
    pub id: Uuid,
    pub menu_item_id: i64,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub total_price: Decimal,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDetails {
    pub order: OrderResponse,
    pub items: Vec<OrderItemResponse>,
}

impl From<OrderModel> for OrderResponse {
    fn from(model: OrderModel) -> Self {
        Self {
            id: model.id,
            order_number: model.order_number,
            customer_name: model.customer_name,
            order_type: model.order_type,
            payment_method: model.payment_method,
            subtotal: from_minor_units(model.subtotal_cents),
            tax_amount: from_minor_units(model.tax_cents),
            total_amount: from_minor_units(model.total_cents),
            status: model.status,
            created_at: model.created_at,
            completed_at: model.completed_at,
            created_by: model.created_by,
        }
    }
}

impl From<OrderItemModel> for OrderItemResponse {
    fn from(model: OrderItemModel) -> Self {
        Self {
            id: model.id,
            menu_item_id: model.menu_item_id,
            name: model.name,
            quantity: model.quantity,
            unit_price: from_minor_units(model.unit_price_cents),
            total_price: from_minor_units(model.total_price_cents),
            notes: model.notes,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// Read filter for [`OrderService::list_orders`]. Empty `statuses` means any
/// status; both `created_*` bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFilter {
    pub statuses: Vec<OrderStatus>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub sort: SortDirection,
    pub limit: Option<u64>,
}

impl OrderFilter {
    /// Orders still in the kitchen.
    pub fn active() -> Self {
        Self::default().with_statuses(OrderStatus::ACTIVE)
    }

    /// Most recent orders first, capped at `limit`.
    pub fn recent(limit: u64) -> Self {
        Self {
            sort: SortDirection::Descending,
            limit: Some(limit),
            ..Default::default()
        }
    }

    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = OrderStatus>) -> Self {
        self.statuses = statuses.into_iter().collect();
        self
    }

    pub fn created_between(mut self, from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        self.created_from = Some(from);
        self.created_to = Some(to);
        self
    }

    pub fn sorted(mut self, sort: SortDirection) -> Self {
        self.sort = sort;
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    fn condition(&self) -> Condition {
        let mut cond = Condition::all();
        if !self.statuses.is_empty() {
            cond = cond.add(order::Column::Status.is_in(self.statuses.iter().copied()));
        }
        if let Some(from) = self.created_from {
            cond = cond.add(order::Column::CreatedAt.gte(from));
        }
        if let Some(to) = self.created_to {
            cond = cond.add(order::Column::CreatedAt.lte(to));
        }
        cond
    }
}

/// A checked cart, converted to minor units.
#[derive(Debug, Clone)]
struct ValidatedOrder {
    order_type: OrderType,
    customer_name: String,
    payment_method: String,
    created_by: Option<String>,
    lines: Vec<ValidatedLine>,
    subtotal_cents: i64,
    tax_cents: i64,
    total_cents: i64,
}

#[derive(Debug, Clone)]
struct ValidatedLine {
    menu_item_id: i64,
    name: String,
    quantity: i32,
    unit_price_cents: i64,
    total_price_cents: i64,
    notes: Option<String>,
}

fn validate_line(index: usize, line: &CartLine) -> Result<ValidatedLine, ServiceError> {
    if line.quantity <= 0 {
        return Err(ServiceError::InvalidAmount(format!(
            "line {}: quantity must be positive, got {}",
            index + 1,
            line.quantity
        )));
    }
    if line.unit_price < Decimal::ZERO {
        return Err(ServiceError::InvalidAmount(format!(
            "line {}: unit price must not be negative, got {}",
            index + 1,
            line.unit_price
        )));
    }
    let name = line.name.trim();
    if name.is_empty() {
        return Err(ServiceError::ValidationError(format!(
            "line {}: item name is required",
            index + 1
        )));
    }

    let unit_price_cents = to_minor_units(line.unit_price)?;
    let total_price_cents = unit_price_cents
        .checked_mul(i64::from(line.quantity))
        .ok_or_else(|| {
            ServiceError::InvalidAmount(format!("line {}: line total overflows", index + 1))
        })?;

    Ok(ValidatedLine {
        menu_item_id: line.menu_item_id,
        name: name.to_string(),
        quantity: line.quantity,
        unit_price_cents,
        total_price_cents,
        notes: line
            .notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string),
    })
}

/// Checks a checkout request without touching storage.
fn validate_request(request: &CreateOrderRequest) -> Result<ValidatedOrder, ServiceError> {
    if request.items.is_empty() {
        return Err(ServiceError::EmptyCart);
    }

    let lines = request
        .items
        .iter()
        .enumerate()
        .map(|(i, line)| validate_line(i, line))
        .collect::<Result<Vec<_>, _>>()?;

    let computed_subtotal = lines
        .iter()
        .try_fold(0i64, |acc, l| acc.checked_add(l.total_price_cents))
        .ok_or_else(|| ServiceError::InvalidAmount("subtotal overflows".into()))?;

    let subtotal_cents = to_minor_units(request.subtotal)?;
    let tax_cents = to_minor_units(request.tax_amount)?;
    let total_cents = to_minor_units(request.total_amount)?;

    if subtotal_cents < 0 || tax_cents < 0 || total_cents < 0 {
        return Err(ServiceError::InvalidAmount(
            "order amounts must not be negative".into(),
        ));
    }
    if subtotal_cents != computed_subtotal {
        return Err(ServiceError::InvalidAmount(format!(
            "subtotal {} does not match item lines {}",
            request.subtotal,
            from_minor_units(computed_subtotal)
        )));
    }
    // One minor unit of tolerance, same as money::reconciles
    let difference = subtotal_cents
        .checked_add(tax_cents)
        .and_then(|gross| gross.checked_sub(total_cents))
        .ok_or_else(|| ServiceError::InvalidAmount("order amounts overflow".into()))?;
    if difference.abs() > 1 {
        return Err(ServiceError::InvalidAmount(format!(
            "total {} does not reconcile with subtotal {} + tax {}",
            request.total_amount, request.subtotal, request.tax_amount
        )));
    }

    let customer_name = request
        .customer_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .unwrap_or(DEFAULT_CUSTOMER_NAME)
        .to_string();
    let payment_method = request
        .payment_method
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_PAYMENT_METHOD)
        .to_string();

    Ok(ValidatedOrder {
        order_type: request.order_type,
        customer_name,
        payment_method,
        created_by: request.created_by.clone(),
        lines,
        subtotal_cents,
        tax_cents,
        total_cents,
    })
}

/// Timestamps are kept at microsecond precision so they round-trip through
/// every backend unchanged.
pub(crate) fn storage_timestamp(now: DateTime<Utc>) -> DateTime<Utc> {
    now.trunc_subsecs(6)
}

/// Owner of the `orders` and `order_items` tables. All writes go through here.
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
}

impl OrderService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    pub fn db(&self) -> &DbPool {
        &self.db_pool
    }

    /// Creates an order stamped with the current time.
    pub async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> Result<CreatedOrder, ServiceError> {
        self.create_order_at(request, Utc::now()).await
    }

    /// Validates the cart, then mints an order number and inserts the order
    /// with all of its items in one transaction. Number collisions and lock
    /// contention are retried up to [`MAX_CREATE_ATTEMPTS`] times.
    #[instrument(skip(self, request), fields(items = request.items.len(), order_type = %request.order_type))]
    pub async fn create_order_at(
        &self,
        request: CreateOrderRequest,
        now: DateTime<Utc>,
    ) -> Result<CreatedOrder, ServiceError> {
        let validated = validate_request(&request).map_err(|e| {
            warn!(error = %e, "Rejected order before persistence");
            counter!("pos_orders.rejected", 1);
            e
        })?;

        let now = storage_timestamp(now);
        let start = Instant::now();

        for attempt in 1..=MAX_CREATE_ATTEMPTS {
            match self.try_create(&validated, now).await {
                Ok(created) => {
                    histogram!("pos_orders.create.duration", start.elapsed());
                    counter!("pos_orders.created", 1);
                    info!(
                        order_id = %created.order_id,
                        order_number = %created.order_number,
                        attempt,
                        "Order created successfully"
                    );
                    return Ok(created);
                }
                Err(e) if is_write_conflict(&e) => {
                    warn!(error = %e, attempt, "Order number allocation conflicted; retrying");
                    counter!("pos_orders.create.conflicts", 1);
                    tokio::time::sleep(retry_backoff(attempt)).await;
                }
                Err(e) => {
                    error!(error = %e, "Failed to create order");
                    return Err(ServiceError::Persistence(e));
                }
            }
        }

        error!(
            attempts = MAX_CREATE_ATTEMPTS,
            "Giving up on order creation after repeated conflicts"
        );
        Err(ServiceError::OrderNumberConflict {
            attempts: MAX_CREATE_ATTEMPTS,
        })
    }

    async fn try_create(
        &self,
        validated: &ValidatedOrder,
        now: DateTime<Utc>,
    ) -> Result<CreatedOrder, DbErr> {
        let txn = self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order creation");
            e
        })?;

        match Self::insert_order(&txn, validated, now).await {
            Ok(created) => {
                txn.commit().await.map_err(|e| {
                    error!(error = %e, order_id = %created.order_id, "Failed to commit order creation transaction");
                    e
                })?;
                Ok(created)
            }
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    error!(error = %rollback_err, "Failed to roll back order creation");
                }
                counter!("pos_db.transaction.rolled_back", 1);
                Err(e)
            }
        }
    }

    async fn insert_order(
        txn: &DatabaseTransaction,
        validated: &ValidatedOrder,
        now: DateTime<Utc>,
    ) -> Result<CreatedOrder, DbErr> {
        let order_id = Uuid::new_v4();
        let order_number = next_order_number(txn, now).await?;
        debug!(order_id = %order_id, order_number = %order_number, "Allocated order number");

        let order = OrderActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            customer_name: Set(validated.customer_name.clone()),
            order_type: Set(validated.order_type),
            payment_method: Set(validated.payment_method.clone()),
            subtotal_cents: Set(validated.subtotal_cents),
            tax_cents: Set(validated.tax_cents),
            total_cents: Set(validated.total_cents),
            status: Set(OrderStatus::Pending),
            created_at: Set(now),
            completed_at: Set(None),
            created_by: Set(validated.created_by.clone()),
        };
        OrderEntity::insert(order).exec(txn).await?;

        let items = validated
            .lines
            .iter()
            .enumerate()
            .map(|(line_no, line)| OrderItemActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                line_no: Set(line_no as i32),
                menu_item_id: Set(line.menu_item_id),
                name: Set(line.name.clone()),
                quantity: Set(line.quantity),
                unit_price_cents: Set(line.unit_price_cents),
                total_price_cents: Set(line.total_price_cents),
                notes: Set(line.notes.clone()),
            });
        OrderItemEntity::insert_many(items)
            .exec_without_returning(txn)
            .await?;

        Ok(CreatedOrder {
            order_id,
            order_number,
        })
    }

    pub async fn transition_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<OrderResponse, ServiceError> {
        self.transition_status_at(order_id, new_status, Utc::now())
            .await
    }

    /// Moves an order to a strictly later status. The write is a
    /// compare-and-swap on the status read just before, so concurrent callers
    /// can never move an order backwards. `completed_at` is stamped only on
    /// entry to `completed`.
    #[instrument(skip(self), fields(order_id = %order_id, new_status = %new_status))]
    pub async fn transition_status_at(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
        now: DateTime<Utc>,
    ) -> Result<OrderResponse, ServiceError> {
        let db = &*self.db_pool;
        let now = storage_timestamp(now);

        for attempt in 1..=MAX_TRANSITION_ATTEMPTS {
            let current = self.find_model(order_id).await?;

            if !current.status.can_transition_to(new_status) {
                warn!(
                    order_id = %order_id,
                    current_status = %current.status,
                    "Rejected non-forward status transition"
                );
                return Err(ServiceError::InvalidTransition {
                    from: current.status,
                    to: new_status,
                });
            }

            let completed_at = (new_status == OrderStatus::Completed).then_some(now);
            let mut update = OrderEntity::update_many()
                .col_expr(order::Column::Status, Expr::value(new_status.into_value()));
            if let Some(stamp) = completed_at {
                update = update.col_expr(order::Column::CompletedAt, Expr::value(stamp));
            }

            let result = update
                .filter(order::Column::Id.eq(order_id))
                .filter(order::Column::Status.eq(current.status))
                .exec(db)
                .await;

            match result {
                Ok(res) if res.rows_affected == 1 => {
                    counter!("pos_orders.status_changed", 1, "status" => new_status.to_string());
                    info!(
                        order_id = %order_id,
                        old_status = %current.status,
                        new_status = %new_status,
                        "Order status updated successfully"
                    );
                    let mut updated = current;
                    updated.status = new_status;
                    if completed_at.is_some() {
                        updated.completed_at = completed_at;
                    }
                    return Ok(updated.into());
                }
                Ok(_) => {
                    debug!(attempt, "Status changed underneath us; re-reading");
                }
                Err(e) if is_write_conflict(&e) => {
                    warn!(error = %e, attempt, "Status update hit lock contention; retrying");
                    tokio::time::sleep(retry_backoff(attempt)).await;
                }
                Err(e) => {
                    error!(error = %e, order_id = %order_id, "Failed to update order status");
                    return Err(ServiceError::Persistence(e));
                }
            }
        }

        error!(order_id = %order_id, "Status update kept losing the race");
        Err(ServiceError::persistence_message(format!(
            "status update for order {} did not settle after {} attempts",
            order_id, MAX_TRANSITION_ATTEMPTS
        )))
    }

    async fn find_model(&self, order_id: Uuid) -> Result<OrderModel, ServiceError> {
        OrderEntity::find_by_id(order_id)
            .one(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = %order_id, "Failed to fetch order from database");
                ServiceError::Persistence(e)
            })?
            .ok_or_else(|| {
                warn!(order_id = %order_id, "Order not found");
                ServiceError::NotFound(format!("Order {} not found", order_id))
            })
    }

    async fn load_items(&self, order_ids: &[Uuid]) -> Result<Vec<OrderItemModel>, ServiceError> {
        if order_ids.is_empty() {
            return Ok(Vec::new());
        }
        OrderItemEntity::find()
            .filter(order_item::Column::OrderId.is_in(order_ids.iter().copied()))
            .order_by_asc(order_item::Column::OrderId)
            .order_by_asc(order_item::Column::LineNo)
            .all(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to fetch order items");
                ServiceError::Persistence(e)
            })
    }

    #[instrument(skip(self), fields(order_id = %order_id))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderDetails, ServiceError> {
        let order = self.find_model(order_id).await?;
        let items = self.load_items(&[order_id]).await?;
        debug!(order_id = %order_id, items = items.len(), "Order retrieved");

        Ok(OrderDetails {
            order: order.into(),
            items: items.into_iter().map(Into::into).collect(),
        })
    }

    /// Looks an order up by its human-readable number.
    #[instrument(skip(self))]
    pub async fn get_order_by_number(
        &self,
        order_number: &str,
    ) -> Result<OrderDetails, ServiceError> {
        let order = OrderEntity::find()
            .filter(order::Column::OrderNumber.eq(order_number))
            .one(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, order_number, "Failed to fetch order by number");
                ServiceError::Persistence(e)
            })?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_number)))?;

        let items = self.load_items(&[order.id]).await?;
        Ok(OrderDetails {
            order: order.into(),
            items: items.into_iter().map(Into::into).collect(),
        })
    }

    async fn query_orders(&self, filter: &OrderFilter) -> Result<Vec<OrderModel>, ServiceError> {
        let mut query = OrderEntity::find().filter(filter.condition());
        query = match filter.sort {
            SortDirection::Ascending => query
                .order_by_asc(order::Column::CreatedAt)
                .order_by_asc(order::Column::OrderNumber),
            SortDirection::Descending => query
                .order_by_desc(order::Column::CreatedAt)
                .order_by_desc(order::Column::OrderNumber),
        };
        if let Some(limit) = filter.limit {
            query = query.limit(limit);
        }

        query.all(&*self.db_pool).await.map_err(|e| {
            error!(error = %e, "Failed to list orders");
            ServiceError::Persistence(e)
        })
    }

    #[instrument(skip(self))]
    pub async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<OrderResponse>, ServiceError> {
        let orders = self.query_orders(filter).await?;
        debug!(returned_count = orders.len(), "Orders listed");
        Ok(orders.into_iter().map(Into::into).collect())
    }

    /// Same as [`list_orders`](Self::list_orders) with each order's items.
    #[instrument(skip(self))]
    pub async fn list_orders_with_items(
        &self,
        filter: &OrderFilter,
    ) -> Result<Vec<OrderDetails>, ServiceError> {
        let orders = self.query_orders(filter).await?;
        let ids: Vec<Uuid> = orders.iter().map(|o| o.id).collect();

        let mut items_by_order: HashMap<Uuid, Vec<OrderItemResponse>> = HashMap::new();
        for item in self.load_items(&ids).await? {
            items_by_order
                .entry(item.order_id)
                .or_default()
                .push(item.into());
        }

        Ok(orders
            .into_iter()
            .map(|order| {
                let items = items_by_order.remove(&order.id).unwrap_or_default();
                OrderDetails {
                    order: order.into(),
                    items,
                }
            })
            .collect())
    }
}
