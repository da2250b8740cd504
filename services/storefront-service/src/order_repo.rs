use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tokio::sync::Mutex;

use crate::lifecycle::{ConflictKind, OrderError, OrderStore};
use crate::models::{Cancellation, Order, OrderStatus, Review};

const UNIQUE_VIOLATION: &str = "23505";

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION))
}

impl From<sqlx::Error> for OrderError {
    fn from(value: sqlx::Error) -> Self {
        OrderError::store(value)
    }
}

#[derive(Debug, sqlx::FromRow)]
struct OrderRow {
    id: i64,
    user_id: i64,
    tenant_id: String,
    status: String,
    total_price: f64,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = OrderError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status = OrderStatus::parse(&row.status).ok_or_else(|| {
            OrderError::store(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("order {} has unknown status '{}'", row.id, row.status),
            ))
        })?;
        Ok(Order {
            id: row.id,
            owner_user_id: row.user_id,
            tenant_id: row.tenant_id,
            status,
            total_price: row.total_price,
            created_at: row.created_at,
        })
    }
}

fn collect_orders(rows: Vec<OrderRow>) -> Result<Vec<Order>, OrderError> {
    rows.into_iter().map(Order::try_from).collect()
}

// ---------------- Postgres Implementation ----------------

#[derive(Clone)]
pub struct PgOrderStore {
    db: PgPool,
}

impl PgOrderStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    async fn lock_owned(
        tx: &mut Transaction<'_, Postgres>,
        order_id: i64,
        user_id: i64,
    ) -> Result<Order, OrderError> {
        let row = sqlx::query_as::<_, OrderRow>(
            r#"SELECT id, user_id, tenant_id, status, total_price, created_at
               FROM orders WHERE id = $1 AND user_id = $2
               FOR UPDATE"#,
        )
        .bind(order_id)
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?;
        row.ok_or(OrderError::NotFound)?.try_into()
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn list_for_user(&self, user_id: i64, status: OrderStatus) -> Result<Vec<Order>, OrderError> {
        let rows = sqlx::query_as::<_, OrderRow>(
            r#"SELECT id, user_id, tenant_id, status, total_price, created_at
               FROM orders WHERE user_id = $1 AND status = $2
               ORDER BY created_at DESC, id DESC"#,
        )
        .bind(user_id)
        .bind(status.as_str())
        .fetch_all(&self.db)
        .await?;
        collect_orders(rows)
    }

    async fn list_for_tenant(&self, tenant: &str, status: OrderStatus) -> Result<Vec<Order>, OrderError> {
        let rows = sqlx::query_as::<_, OrderRow>(
            r#"SELECT id, user_id, tenant_id, status, total_price, created_at
               FROM orders WHERE tenant_id = $1 AND status = $2
               ORDER BY created_at DESC, id DESC"#,
        )
        .bind(tenant)
        .bind(status.as_str())
        .fetch_all(&self.db)
        .await?;
        collect_orders(rows)
    }

    async fn cancel(&self, order_id: i64, user_id: i64, reason: &str) -> Result<Order, OrderError> {
        let mut tx = self.db.begin().await?;
        let mut order = Self::lock_owned(&mut tx, order_id, user_id).await?;
        order.status.check_cancel()?;

        sqlx::query("INSERT INTO cancellations (order_id, user_id, reason) VALUES ($1, $2, $3)")
            .bind(order_id)
            .bind(user_id)
            .bind(reason)
            .execute(&mut *tx)
            .await?;
        sqlx::query("UPDATE orders SET status = $2 WHERE id = $1")
            .bind(order_id)
            .bind(OrderStatus::Cancelled.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        order.status = OrderStatus::Cancelled;
        Ok(order)
    }

    async fn insert_review(
        &self,
        order_id: i64,
        user_id: i64,
        rating: i16,
        comment: Option<&str>,
    ) -> Result<Review, OrderError> {
        let mut tx = self.db.begin().await?;
        let order = Self::lock_owned(&mut tx, order_id, user_id).await?;
        order.status.check_review()?;

        let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM reviews WHERE order_id = $1")
            .bind(order_id)
            .fetch_optional(&mut *tx)
            .await?;
        if existing.is_some() {
            return Err(OrderError::Conflict(ConflictKind::ReviewExists));
        }

        // The unique index on reviews(order_id) settles any race the row lock misses.
        let created_at: DateTime<Utc> = sqlx::query_scalar(
            r#"INSERT INTO reviews (order_id, user_id, rating, comment)
               VALUES ($1, $2, $3, $4)
               RETURNING created_at"#,
        )
        .bind(order_id)
        .bind(user_id)
        .bind(rating)
        .bind(comment)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                OrderError::Conflict(ConflictKind::ReviewExists)
            } else {
                OrderError::from(err)
            }
        })?;
        tx.commit().await?;

        Ok(Review {
            order_id,
            user_id,
            rating,
            comment: comment.map(str::to_owned),
            created_at,
        })
    }

    async fn transition(&self, order_id: i64, tenant: &str, target: OrderStatus) -> Result<Order, OrderError> {
        let mut tx = self.db.begin().await?;
        let row = sqlx::query_as::<_, OrderRow>(
            r#"SELECT id, user_id, tenant_id, status, total_price, created_at
               FROM orders WHERE id = $1 AND tenant_id = $2
               FOR UPDATE"#,
        )
        .bind(order_id)
        .bind(tenant)
        .fetch_optional(&mut *tx)
        .await?;
        let mut order: Order = row.ok_or(OrderError::NotFound)?.try_into()?;
        order.status.check_transition(target)?;

        sqlx::query("UPDATE orders SET status = $2 WHERE id = $1")
            .bind(order_id)
            .bind(target.as_str())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        order.status = target;
        Ok(order)
    }
}

// ---------------- In-Memory Implementation (Tests) ----------------

#[derive(Default)]
struct MemoryState {
    orders: HashMap<i64, Order>,
    cancellations: Vec<Cancellation>,
    reviews: HashMap<i64, Review>,
    fail_next: bool,
}

impl MemoryState {
    fn take_failure(&mut self) -> Result<(), OrderError> {
        if std::mem::take(&mut self.fail_next) {
            return Err(OrderError::store(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "simulated order store outage",
            )));
        }
        Ok(())
    }

    fn owned_mut(&mut self, order_id: i64, user_id: i64) -> Result<&mut Order, OrderError> {
        self.orders
            .get_mut(&order_id)
            .filter(|order| order.owner_user_id == user_id)
            .ok_or(OrderError::NotFound)
    }
}

/// Single mutex over all rows: each operation observes and writes a consistent snapshot,
/// which stands in for the row lock plus transaction of the Postgres store.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    inner: Arc<Mutex<MemoryState>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_order(&self, id: i64, owner_user_id: i64, tenant: &str, status: OrderStatus, total_price: f64) {
        let order = Order {
            id,
            owner_user_id,
            tenant_id: tenant.to_string(),
            status,
            total_price,
            created_at: Utc::now(),
        };
        self.inner.lock().await.orders.insert(id, order);
    }

    pub async fn order(&self, id: i64) -> Option<Order> {
        self.inner.lock().await.orders.get(&id).cloned()
    }

    pub async fn cancellations_for(&self, order_id: i64) -> Vec<Cancellation> {
        let guard = self.inner.lock().await;
        guard.cancellations.iter().filter(|c| c.order_id == order_id).cloned().collect()
    }

    pub async fn review_for(&self, order_id: i64) -> Option<Review> {
        self.inner.lock().await.reviews.get(&order_id).cloned()
    }

    pub async fn has_orders_for_tenant(&self, tenant: &str) -> bool {
        self.inner.lock().await.orders.values().any(|o| o.tenant_id == tenant)
    }

    /// Make the next store call fail as if the database were unreachable.
    pub async fn fail_next(&self) {
        self.inner.lock().await.fail_next = true;
    }
}

fn newest_first(mut orders: Vec<Order>) -> Vec<Order> {
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
    orders
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn list_for_user(&self, user_id: i64, status: OrderStatus) -> Result<Vec<Order>, OrderError> {
        let mut guard = self.inner.lock().await;
        guard.take_failure()?;
        let orders = guard
            .orders
            .values()
            .filter(|o| o.owner_user_id == user_id && o.status == status)
            .cloned()
            .collect();
        Ok(newest_first(orders))
    }

    async fn list_for_tenant(&self, tenant: &str, status: OrderStatus) -> Result<Vec<Order>, OrderError> {
        let mut guard = self.inner.lock().await;
        guard.take_failure()?;
        let orders = guard
            .orders
            .values()
            .filter(|o| o.tenant_id == tenant && o.status == status)
            .cloned()
            .collect();
        Ok(newest_first(orders))
    }

    async fn cancel(&self, order_id: i64, user_id: i64, reason: &str) -> Result<Order, OrderError> {
        let mut guard = self.inner.lock().await;
        guard.take_failure()?;
        let order = guard.owned_mut(order_id, user_id)?;
        order.status.check_cancel()?;
        order.status = OrderStatus::Cancelled;
        let order = order.clone();
        guard.cancellations.push(Cancellation {
            order_id,
            user_id,
            reason: reason.to_string(),
            created_at: Utc::now(),
        });
        Ok(order)
    }

    async fn insert_review(
        &self,
        order_id: i64,
        user_id: i64,
        rating: i16,
        comment: Option<&str>,
    ) -> Result<Review, OrderError> {
        let mut guard = self.inner.lock().await;
        guard.take_failure()?;
        guard.owned_mut(order_id, user_id)?.status.check_review()?;
        if guard.reviews.contains_key(&order_id) {
            return Err(OrderError::Conflict(ConflictKind::ReviewExists));
        }
        let review = Review {
            order_id,
            user_id,
            rating,
            comment: comment.map(str::to_owned),
            created_at: Utc::now(),
        };
        guard.reviews.insert(order_id, review.clone());
        Ok(review)
    }

    async fn transition(&self, order_id: i64, tenant: &str, target: OrderStatus) -> Result<Order, OrderError> {
        let mut guard = self.inner.lock().await;
        guard.take_failure()?;
        let order = guard
            .orders
            .get_mut(&order_id)
            .filter(|o| o.tenant_id == tenant)
            .ok_or(OrderError::NotFound)?;
        order.status.check_transition(target)?;
        order.status = target;
        Ok(order.clone())
    }
}
