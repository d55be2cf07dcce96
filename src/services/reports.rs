use crate::{
    db::DbPool,
    entities::{order, order::OrderStatus, order_item},
    errors::ServiceError,
    money::{from_minor_units, round2},
    services::order_number::local_midnight,
};
use chrono::{
    DateTime, Datelike, Days, Duration, Local, Months, NaiveDate, Timelike, Utc, Weekday,
};
use metrics::histogram;
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument};

pub const CSV_HEADER: &str = "Item Name,Quantity Sold,Revenue";
pub const DAILY_CSV_HEADER: &str = "Date,Orders,Sales";

/// Weekday a weekly report starts on.
pub const WEEK_START: Weekday = Weekday::Sun;

/// Named reporting windows relative to a reference date.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReportPeriod {
    Daily,
    Weekly,
    Monthly,
}

impl ReportPeriod {
    /// Daily is the reference day, weekly runs Sunday through Saturday and
    /// monthly covers the whole calendar month.
    pub fn range_for(self, reference: NaiveDate) -> DateRange {
        match self {
            ReportPeriod::Daily => DateRange {
                start: reference,
                end: reference,
            },
            ReportPeriod::Weekly => {
                let offset = (7 + reference.weekday().num_days_from_sunday()
                    - WEEK_START.num_days_from_sunday())
                    % 7;
                let start = reference - Duration::days(i64::from(offset));
                DateRange {
                    start,
                    end: start + Duration::days(6),
                }
            }
            ReportPeriod::Monthly => {
                let start = reference.with_day(1).unwrap_or(reference);
                let end = start
                    .checked_add_months(Months::new(1))
                    .and_then(|next| next.pred_opt())
                    .unwrap_or(reference);
                DateRange { start, end }
            }
        }
    }
}

/// Inclusive range of local calendar dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, ServiceError> {
        if end < start {
            return Err(ServiceError::ValidationError(format!(
                "report range ends ({}) before it starts ({})",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    /// First and last representable instants of the range. Stored timestamps
    /// have microsecond precision, so the end is one microsecond before the
    /// following local midnight.
    pub fn to_utc_bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let after = self
            .end
            .checked_add_days(Days::new(1))
            .unwrap_or(self.end);
        (
            local_midnight(self.start),
            local_midnight(after) - Duration::microseconds(1),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSales {
    pub quantity: i64,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSalesRow {
    pub name: String,
    pub quantity: i64,
    pub revenue: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethodSales {
    pub orders: u64,
    pub total: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourlySales {
    pub orders: u64,
    pub total: Decimal,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySales {
    pub orders: u64,
    pub total: Decimal,
}

/// Sales totals over completed orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesReport {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub total_sales: Decimal,
    pub total_tax: Decimal,
    pub total_orders: u64,
    pub average_order_value: Decimal,
    /// Keyed by the item name captured at checkout
    pub items_sold: BTreeMap<String, ItemSales>,
    pub payment_methods: BTreeMap<String, PaymentMethodSales>,
    /// Keyed by local hour (0-23) of completion
    pub hourly: BTreeMap<u32, HourlySales>,
    /// Keyed by local date of completion; only days with sales appear
    pub daily: BTreeMap<NaiveDate, DailySales>,
}

impl SalesReport {
    /// Items by quantity sold, highest first; ties by name.
    pub fn item_rows(&self) -> Vec<ItemSalesRow> {
        let mut rows: Vec<ItemSalesRow> = self
            .items_sold
            .iter()
            .map(|(name, sales)| ItemSalesRow {
                name: name.clone(),
                quantity: sales.quantity,
                revenue: sales.revenue,
            })
            .collect();
        rows.sort_by(|a, b| b.quantity.cmp(&a.quantity).then_with(|| a.name.cmp(&b.name)));
        rows
    }

    pub fn top_items(&self, n: usize) -> Vec<ItemSalesRow> {
        let mut rows = self.item_rows();
        rows.truncate(n);
        rows
    }

    /// `Item Name,Quantity Sold,Revenue` followed by one row per item in
    /// [`item_rows`](Self::item_rows) order.
    pub fn to_csv(&self) -> String {
        let mut out = String::from(CSV_HEADER);
        out.push('\n');
        for row in self.item_rows() {
            out.push_str(&escape_field(&row.name));
            out.push(',');
            out.push_str(&row.quantity.to_string());
            out.push(',');
            out.push_str(&format!("{:.2}", row.revenue));
            out.push('\n');
        }
        out
    }

    /// `Date,Orders,Sales`, one row per day with completed orders, oldest
    /// first.
    pub fn daily_csv(&self) -> String {
        let mut out = String::from(DAILY_CSV_HEADER);
        out.push('\n');
        for (date, sales) in &self.daily {
            out.push_str(&format!("{},{},{:.2}\n", date, sales.orders, sales.total));
        }
        out
    }
}

fn escape_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r')
    {
        let escaped = value.replace('"', "\"\"");
        format!("\"{escaped}\"")
    } else {
        value.to_string()
    }
}

#[derive(Default)]
struct Totals {
    sales_cents: i64,
    tax_cents: i64,
    orders: u64,
    items: BTreeMap<String, (i64, i64)>,
    payment_methods: BTreeMap<String, (u64, i64)>,
    hourly: BTreeMap<u32, (u64, i64)>,
    daily: BTreeMap<NaiveDate, (u64, i64)>,
}

fn tally(slot: &mut (u64, i64), cents: i64) {
    slot.0 += 1;
    slot.1 = slot.1.saturating_add(cents);
}

impl Totals {
    fn add(&mut self, order: order::Model, items: Vec<order_item::Model>) {
        self.orders += 1;
        self.sales_cents = self.sales_cents.saturating_add(order.total_cents);
        self.tax_cents = self.tax_cents.saturating_add(order.tax_cents);

        tally(
            self.payment_methods
                .entry(order.payment_method.clone())
                .or_default(),
            order.total_cents,
        );

        if let Some(completed_at) = order.completed_at {
            let local = completed_at.with_timezone(&Local);
            tally(self.hourly.entry(local.hour()).or_default(), order.total_cents);
            tally(
                self.daily.entry(local.date_naive()).or_default(),
                order.total_cents,
            );
        }

        for item in items {
            let entry = self.items.entry(item.name).or_default();
            entry.0 = entry.0.saturating_add(i64::from(item.quantity));
            entry.1 = entry.1.saturating_add(item.total_price_cents);
        }
    }
}

/// Aggregates completed orders. Reads only.
#[derive(Clone)]
pub struct ReportService {
    db_pool: Arc<DbPool>,
}

impl ReportService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Report over orders completed within `[start, end]`.
    #[instrument(skip(self))]
    pub async fn sales_report(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<SalesReport, ServiceError> {
        if end < start {
            return Err(ServiceError::ValidationError(format!(
                "report range ends ({}) before it starts ({})",
                end, start
            )));
        }
        let started = Instant::now();

        let rows = order::Entity::find()
            .filter(order::Column::Status.eq(OrderStatus::Completed))
            .filter(order::Column::CompletedAt.gte(start))
            .filter(order::Column::CompletedAt.lte(end))
            .order_by_asc(order::Column::CompletedAt)
            .order_by_asc(order::Column::OrderNumber)
            .find_with_related(order_item::Entity)
            .all(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to load completed orders for sales report");
                ServiceError::Persistence(e)
            })?;

        let mut totals = Totals::default();
        for (order, items) in rows {
            totals.add(order, items);
        }

        let report = build_report(start, end, totals);
        histogram!("pos_reports.sales.duration", started.elapsed());
        info!(
            total_orders = report.total_orders,
            total_sales = %report.total_sales,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Sales report generated"
        );
        Ok(report)
    }

    /// Report over whole local calendar days.
    pub async fn sales_report_for(&self, range: DateRange) -> Result<SalesReport, ServiceError> {
        let (start, end) = range.to_utc_bounds();
        self.sales_report(start, end).await
    }

    pub async fn period_report(
        &self,
        period: ReportPeriod,
        reference: NaiveDate,
    ) -> Result<SalesReport, ServiceError> {
        self.sales_report_for(period.range_for(reference)).await
    }
}

fn build_report(start: DateTime<Utc>, end: DateTime<Utc>, totals: Totals) -> SalesReport {
    let total_sales = from_minor_units(totals.sales_cents);
    let average_order_value = if totals.orders == 0 {
        Decimal::ZERO
    } else {
        round2(total_sales / Decimal::from(totals.orders))
    };

    SalesReport {
        start,
        end,
        total_sales,
        total_tax: from_minor_units(totals.tax_cents),
        total_orders: totals.orders,
        average_order_value,
        items_sold: totals
            .items
            .into_iter()
            .map(|(name, (quantity, cents))| {
                (
                    name,
                    ItemSales {
                        quantity,
                        revenue: from_minor_units(cents),
                    },
                )
            })
            .collect(),
        payment_methods: totals
            .payment_methods
            .into_iter()
            .map(|(method, (orders, cents))| {
                (
                    method,
                    PaymentMethodSales {
                        orders,
                        total: from_minor_units(cents),
                    },
                )
            })
            .collect(),
        hourly: totals
            .hourly
            .into_iter()
            .map(|(hour, (orders, cents))| {
                (
                    hour,
                    HourlySales {
                        orders,
                        total: from_minor_units(cents),
                    },
                )
            })
            .collect(),
        daily: totals
            .daily
            .into_iter()
            .map(|(date, (orders, cents))| {
                (
                    date,
                    DailySales {
                        orders,
                        total: from_minor_units(cents),
                    },
                )
            })
            .collect(),
    }
}
