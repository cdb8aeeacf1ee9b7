//! Atomic stock reducer
//!
//! The reducer is the only code allowed to turn an allocation plan into real
//! quantity changes, and the only writer of the products.stock cache. It never
//! trusts a plan: plans are computed from unlocked snapshots, so every batch
//! is re-checked after its row lock is taken, and any mismatch aborts the
//! transaction with a retryable conflict instead of overselling.

use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use shared::allocation::{apply_plan, split_plan_by_items};
use shared::models::{
    AllocatedSale, AllocationPlan, MovementKind, MovementReference, ProductDemand, SaleRecord,
    StockBatch,
};

use crate::error::{AppError, AppResult};
use crate::services::batches::{BatchLedgerService, BatchRow};
use crate::services::movements::{MovementLogService, NewMovement};

/// Atomic applier of allocation plans; stateless, always runs inside the
/// caller's transaction
pub struct StockReducer;

/// Narrow an aggregate sum to the i32 range movements are recorded in
pub(crate) fn stock_level(total: i64) -> AppResult<i32> {
    i32::try_from(total).map_err(|_| {
        AppError::InvariantViolation(format!("aggregate stock {} exceeds 32-bit range", total))
    })
}

impl StockReducer {
    /// Serialize all stock writers for a product and return its cached stock.
    ///
    /// Every path that writes batches or movements takes this lock first;
    /// it is what keeps the movement chain linear per product.
    pub async fn lock_product(
        tx: &mut Transaction<'_, Postgres>,
        product_id: Uuid,
    ) -> AppResult<i32> {
        sqlx::query_scalar::<_, i32>("SELECT stock FROM products WHERE id = $1 FOR UPDATE")
            .bind(product_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Product".to_string()))
    }

    /// Sum of active batch remainders, read inside the transaction
    pub async fn active_stock(
        tx: &mut Transaction<'_, Postgres>,
        product_id: Uuid,
    ) -> AppResult<i64> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(quantity_remaining), 0) FROM stock_batches WHERE product_id = $1 AND status = 'active'",
        )
        .bind(product_id)
        .fetch_one(&mut **tx)
        .await?;

        Ok(total)
    }

    /// Recompute the product's cached stock from batch state.
    ///
    /// This is the only statement anywhere that writes products.stock; every
    /// mutation path calls it before committing.
    pub async fn refresh_product_stock(
        tx: &mut Transaction<'_, Postgres>,
        product_id: Uuid,
    ) -> AppResult<i32> {
        sqlx::query_scalar::<_, i32>(
            r#"
            UPDATE products
            SET stock = COALESCE((
                    SELECT SUM(quantity_remaining)
                    FROM stock_batches
                    WHERE product_id = products.id AND status = 'active'
                ), 0),
                updated_at = NOW()
            WHERE id = $1
            RETURNING stock
            "#,
        )
        .bind(product_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))
    }

    /// Rebuild a drifted stock cache from batch state, in its own transaction
    pub async fn repair_stock_cache(db: &PgPool, product_id: Uuid) -> AppResult<i32> {
        let mut tx = db.begin().await?;
        Self::lock_product(&mut tx, product_id).await?;
        let stock = Self::refresh_product_stock(&mut tx, product_id).await?;
        tx.commit().await?;
        Ok(stock)
    }

    /// Apply pre-computed allocation plans for one order, all or nothing.
    ///
    /// `planned` must be sorted by product id; together with the FIFO order
    /// inside each product that gives every concurrent caller the same lock
    /// acquisition order. Per product: take the product lock, re-read the
    /// plan's batches under row locks, re-validate, persist the reductions,
    /// append one consumed movement per plan entry, recompute the stock cache
    /// and materialize the sale records. Any conflict aborts the whole
    /// transaction; nothing partial ever commits.
    pub async fn apply(
        tx: &mut Transaction<'_, Postgres>,
        order_id: Uuid,
        planned: &[(ProductDemand, AllocationPlan)],
    ) -> AppResult<Vec<SaleRecord>> {
        let mut sales = Vec::new();

        for (demand, plan) in planned {
            if !plan.is_fulfilled() {
                return Err(AppError::InvariantViolation(format!(
                    "reducer received an unfulfilled plan for product {} (short {})",
                    plan.product_id, plan.shortage
                )));
            }

            Self::lock_product(tx, demand.product_id).await?;
            let mut stock = stock_level(Self::active_stock(tx, demand.product_id).await?)?;

            let mut batches = Self::lock_plan_batches(tx, plan).await?;
            apply_plan(&mut batches, plan)
                .map_err(|conflict| AppError::AllocationConflict(conflict.to_string()))?;

            for batch in &batches {
                BatchLedgerService::persist_batch(tx, batch).await?;
            }

            for entry in &plan.entries {
                if entry.quantity_taken == 0 {
                    continue;
                }
                let movement = MovementLogService::record(
                    tx,
                    NewMovement {
                        product_id: demand.product_id,
                        batch_id: Some(entry.batch_id),
                        kind: MovementKind::Consumed,
                        reference: MovementReference::Order(order_id),
                        quantity: -entry.quantity_taken,
                        stock_before: stock,
                    },
                )
                .await?;
                stock = movement.stock_after;
            }

            let cache = Self::refresh_product_stock(tx, demand.product_id).await?;
            if cache != stock {
                return Err(AppError::InvariantViolation(format!(
                    "stock cache for product {} recomputed to {} but the movement chain ends at {}",
                    demand.product_id, cache, stock
                )));
            }

            let allocated = split_plan_by_items(plan, &demand.items)
                .map_err(|e| AppError::InvariantViolation(e.to_string()))?;
            for sale in &allocated {
                sales.push(Self::insert_sale(tx, order_id, demand.product_id, sale).await?);
            }
        }

        Ok(sales)
    }

    /// Lock the plan's batches in FIFO order and map them into the domain
    async fn lock_plan_batches(
        tx: &mut Transaction<'_, Postgres>,
        plan: &AllocationPlan,
    ) -> AppResult<Vec<StockBatch>> {
        let ids: Vec<Uuid> = plan.entries.iter().map(|e| e.batch_id).collect();

        let rows = sqlx::query_as::<_, BatchRow>(
            r#"
            SELECT id, product_id, vendor_id, purchase_order_id, quantity_purchased,
                   quantity_remaining, purchase_price, selling_price, batch_date, status,
                   created_at, updated_at
            FROM stock_batches
            WHERE id = ANY($1)
            ORDER BY batch_date ASC, created_at ASC, id ASC
            FOR UPDATE
            "#,
        )
        .bind(&ids)
        .fetch_all(&mut **tx)
        .await?;

        rows.into_iter().map(StockBatch::try_from).collect()
    }

    async fn insert_sale(
        tx: &mut Transaction<'_, Postgres>,
        order_id: Uuid,
        product_id: Uuid,
        sale: &AllocatedSale,
    ) -> AppResult<SaleRecord> {
        let profit =
            SaleRecord::compute_profit(sale.selling_price, sale.purchase_price, sale.quantity);

        let row = sqlx::query_as::<_, (Uuid, DateTime<Utc>)>(
            r#"
            INSERT INTO sale_records (order_id, order_item_id, product_id, batch_id, quantity,
                                      selling_price, purchase_price, profit)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, created_at
            "#,
        )
        .bind(order_id)
        .bind(sale.order_item_id)
        .bind(product_id)
        .bind(sale.batch_id)
        .bind(sale.quantity)
        .bind(sale.selling_price)
        .bind(sale.purchase_price)
        .bind(profit)
        .fetch_one(&mut **tx)
        .await?;

        Ok(SaleRecord {
            id: row.0,
            order_id,
            order_item_id: sale.order_item_id,
            product_id,
            batch_id: sale.batch_id,
            quantity: sale.quantity,
            selling_price: sale.selling_price,
            purchase_price: sale.purchase_price,
            profit,
            created_at: row.1,
        })
    }
}
