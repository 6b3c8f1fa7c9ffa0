use std::time::Duration;

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::models::{NewReservation, Product, Storage};
use crate::schema::{products, reservations, storages};

pub type DbPool = Pool<AsyncPgConnection>;

/// Outcome of one batched reservation insert: which product ids got a new
/// row and which hit the (storage_id, product_id) uniqueness constraint.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct BatchInsert {
    pub inserted: Vec<i32>,
    pub conflicted: Vec<i32>,
}

/// Call contract against the product/storage catalog. Every operation is a
/// single round trip; callers bound each call with its own deadline by
/// wrapping the returned future in `tokio::time::timeout`.
#[async_trait]
pub trait Store: Send + Sync {
    /// One storage row with `available = true`, if any exists.
    async fn find_available_storage(&self) -> Result<Option<Storage>, StoreError>;

    /// Batched point lookup by product code. `None` means the store produced
    /// no result set at all (a protocol anomaly); `Some` with an empty vec is
    /// a genuine empty result. Callers must keep the two apart.
    async fn find_products_by_code(&self, codes: &[String])
        -> Result<Option<Vec<Product>>, StoreError>;

    /// Batched insert of one reservation row per product, absorbing per-row
    /// uniqueness violations and reporting them back distinguishably.
    async fn reserve_products(
        &self,
        storage_id: i32,
        products: &[Product],
    ) -> Result<BatchInsert, StoreError>;

    /// Batched delete of reservation rows joined on product id. Returns the
    /// number of rows actually deleted; zero is a valid outcome.
    async fn exempt_products(&self, products: &[Product]) -> Result<u64, StoreError>;

    /// Products currently reserved on one storage.
    async fn products_on_storage(&self, storage_id: i32) -> Result<Vec<Product>, StoreError>;
}

/// How stubbornly the initial database connection is attempted.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    /// Builds the connection pool and verifies a first checkout, retrying
    /// per `retry` so the service tolerates the database coming up after it.
    pub async fn connect(database_url: &str, retry: RetryPolicy) -> Result<Self, StoreError> {
        let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let pool = Pool::builder()
            .build(config)
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))?;

        let mut attempt = 1;
        loop {
            match pool.clone().get().await {
                Ok(_) => return Ok(Self { pool }),
                Err(err) if attempt < retry.max_attempts => {
                    warn!(attempt, "database not reachable yet: {err}");
                    tokio::time::sleep(retry.delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    return Err(StoreError::Pool(format!(
                        "database unreachable after {} attempts: {err}",
                        retry.max_attempts
                    )))
                }
            }
        }
    }

    async fn conn(&self) -> Result<PooledConnection<'_, AsyncPgConnection>, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))
    }
}

#[async_trait]
impl Store for PgStore {
    async fn find_available_storage(&self) -> Result<Option<Storage>, StoreError> {
        let mut conn = self.conn().await?;
        let storage = storages::table
            .filter(storages::available.eq(true))
            .select((storages::id.nullable(), storages::name, storages::available))
            .first::<Storage>(&mut conn)
            .await
            .optional()?;
        debug!(?storage, "available storage lookup");
        Ok(storage)
    }

    async fn find_products_by_code(
        &self,
        codes: &[String],
    ) -> Result<Option<Vec<Product>>, StoreError> {
        let mut conn = self.conn().await?;
        let found = products::table
            .filter(products::code.eq_any(codes))
            .load::<Product>(&mut conn)
            .await?;
        Ok(Some(found))
    }

    async fn reserve_products(
        &self,
        storage_id: i32,
        products: &[Product],
    ) -> Result<BatchInsert, StoreError> {
        let mut conn = self.conn().await?;
        let rows: Vec<NewReservation> = products
            .iter()
            .map(|p| NewReservation {
                storage_id,
                product_id: p.id,
            })
            .collect();

        let inserted: Vec<i32> = diesel::insert_into(reservations::table)
            .values(&rows)
            .on_conflict_do_nothing()
            .returning(reservations::product_id)
            .get_results(&mut conn)
            .await?;

        let conflicted = products
            .iter()
            .map(|p| p.id)
            .filter(|id| !inserted.contains(id))
            .collect();
        Ok(BatchInsert {
            inserted,
            conflicted,
        })
    }

    async fn exempt_products(&self, products: &[Product]) -> Result<u64, StoreError> {
        let mut conn = self.conn().await?;
        let ids: Vec<i32> = products.iter().map(|p| p.id).collect();
        let deleted =
            diesel::delete(reservations::table.filter(reservations::product_id.eq_any(ids)))
                .execute(&mut conn)
                .await?;
        Ok(deleted as u64)
    }

    async fn products_on_storage(&self, storage_id: i32) -> Result<Vec<Product>, StoreError> {
        let mut conn = self.conn().await?;
        let found = reservations::table
            .inner_join(products::table)
            .filter(reservations::storage_id.eq(storage_id))
            .select((
                products::id,
                products::code,
                products::name,
                products::size,
                products::count,
            ))
            .load::<Product>(&mut conn)
            .await?;
        Ok(found)
    }
}
