//! Human-readable order numbers of the form `ORD-YYYYMMDD-NNN`.
//!
//! `NNN` is one more than the number of orders created on the same local
//! calendar day. The count runs inside the order-creation transaction and the
//! UNIQUE constraint on `orders.order_number` catches the rare case where two
//! writers count the same value; the caller retries. Numbers are therefore
//! unique but not guaranteed dense.

use chrono::{DateTime, Days, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, PaginatorTrait, QueryFilter};

use crate::entities::order;

pub const ORDER_NUMBER_PREFIX: &str = "ORD";

/// `ORD-20261019-007`. Sequences past 999 simply grow wider.
pub fn format_order_number(date: NaiveDate, sequence: u64) -> String {
    format!(
        "{}-{}-{:03}",
        ORDER_NUMBER_PREFIX,
        date.format("%Y%m%d"),
        sequence
    )
}

/// Local midnight at the start of `date`, as UTC.
pub fn local_midnight(date: NaiveDate) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    Local
        .from_local_datetime(&naive)
        .earliest()
        // no local midnight on a DST-gap day; the UTC reading is close enough
        .unwrap_or_else(|| Local.from_utc_datetime(&naive))
        .with_timezone(&Utc)
}

/// `[start, end)` of the local calendar day containing `date`.
pub fn local_day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let next = date.checked_add_days(Days::new(1)).unwrap_or(date);
    (local_midnight(date), local_midnight(next))
}

pub fn local_date(at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&Local).date_naive()
}

/// Counts today's orders on `conn` and returns the next number. Call this
/// on the same transaction that inserts the order.
pub async fn next_order_number<C>(conn: &C, now: DateTime<Utc>) -> Result<String, DbErr>
where
    C: ConnectionTrait,
{
    let today = local_date(now);
    let (start, end) = local_day_bounds(today);

    let existing = order::Entity::find()
        .filter(order::Column::CreatedAt.gte(start))
        .filter(order::Column::CreatedAt.lt(end))
        .count(conn)
        .await?;

    Ok(format_order_number(today, existing + 1))
}
