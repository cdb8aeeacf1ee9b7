//! Stock batch ledger service
//!
//! Batches are the authoritative record of on-hand stock. This service owns
//! the FIFO reads and the manual mutation paths (restock, write-down, expiry).
//! Sales never touch batches through here; they go through the reducer.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use shared::models::{BatchError, BatchStatus, MovementKind, MovementReference, StockBatch};

use crate::error::{AppError, AppResult};
use crate::services::movements::{MovementLogService, NewMovement};
use crate::services::reducer::{stock_level, StockReducer};

/// Batch ledger service for authoritative stock reads and manual adjustments
#[derive(Clone)]
pub struct BatchLedgerService {
    db: PgPool,
}

/// Row for batch queries
#[derive(Debug, FromRow)]
pub(crate) struct BatchRow {
    id: Uuid,
    product_id: Uuid,
    vendor_id: Option<Uuid>,
    purchase_order_id: Option<Uuid>,
    quantity_purchased: i32,
    quantity_remaining: i32,
    purchase_price: Decimal,
    selling_price: Decimal,
    batch_date: NaiveDate,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BatchRow> for StockBatch {
    type Error = AppError;

    fn try_from(row: BatchRow) -> Result<Self, Self::Error> {
        let status = BatchStatus::from_str(&row.status).ok_or_else(|| {
            AppError::InvariantViolation(format!(
                "batch {} has unknown status '{}'",
                row.id, row.status
            ))
        })?;
        Ok(StockBatch {
            id: row.id,
            product_id: row.product_id,
            vendor_id: row.vendor_id,
            purchase_order_id: row.purchase_order_id,
            quantity_purchased: row.quantity_purchased,
            quantity_remaining: row.quantity_remaining,
            purchase_price: row.purchase_price,
            selling_price: row.selling_price,
            batch_date: row.batch_date,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

impl BatchLedgerService {
    /// Create a new BatchLedgerService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Get a batch by ID
    pub async fn get_batch(&self, batch_id: Uuid) -> AppResult<StockBatch> {
        let row = sqlx::query_as::<_, BatchRow>(
            r#"
            SELECT id, product_id, vendor_id, purchase_order_id, quantity_purchased,
                   quantity_remaining, purchase_price, selling_price, batch_date, status,
                   created_at, updated_at
            FROM stock_batches
            WHERE id = $1
            "#,
        )
        .bind(batch_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Batch".to_string()))?;

        row.try_into()
    }

    /// All batches of a product in consumption order, any status
    pub async fn list_batches(&self, product_id: Uuid) -> AppResult<Vec<StockBatch>> {
        let product_exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)",
        )
        .bind(product_id)
        .fetch_one(&self.db)
        .await?;

        if !product_exists {
            return Err(AppError::NotFound("Product".to_string()));
        }

        let rows = sqlx::query_as::<_, BatchRow>(
            r#"
            SELECT id, product_id, vendor_id, purchase_order_id, quantity_purchased,
                   quantity_remaining, purchase_price, selling_price, batch_date, status,
                   created_at, updated_at
            FROM stock_batches
            WHERE product_id = $1
            ORDER BY batch_date ASC, created_at ASC, id ASC
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(StockBatch::try_from).collect()
    }

    /// Active batches of a product in the order the allocator will drain them
    pub async fn active_batches_fifo(&self, product_id: Uuid) -> AppResult<Vec<StockBatch>> {
        let rows = sqlx::query_as::<_, BatchRow>(
            r#"
            SELECT id, product_id, vendor_id, purchase_order_id, quantity_purchased,
                   quantity_remaining, purchase_price, selling_price, batch_date, status,
                   created_at, updated_at
            FROM stock_batches
            WHERE product_id = $1 AND status = 'active'
            ORDER BY batch_date ASC, created_at ASC, id ASC
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(StockBatch::try_from).collect()
    }

    /// Authoritative stock for a product: the sum of active batch remainders
    pub async fn current_stock(&self, product_id: Uuid) -> AppResult<i64> {
        let product_exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)",
        )
        .bind(product_id)
        .fetch_one(&self.db)
        .await?;

        if !product_exists {
            return Err(AppError::NotFound("Product".to_string()));
        }

        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(quantity_remaining), 0) FROM stock_batches WHERE product_id = $1 AND status = 'active'",
        )
        .bind(product_id)
        .fetch_one(&self.db)
        .await?;

        Ok(total)
    }

    /// Put units back into a batch (customer return, counting correction).
    ///
    /// Reference says why: an order id for returns, a reason for corrections.
    pub async fn restock(
        &self,
        batch_id: Uuid,
        quantity: i32,
        reference: MovementReference,
    ) -> AppResult<StockBatch> {
        if quantity <= 0 {
            return Err(AppError::validation(
                "quantity",
                "Restock quantity must be positive",
            ));
        }
        match &reference {
            MovementReference::Adjustment(reason) if reason.trim().is_empty() => {
                return Err(AppError::validation(
                    "reason",
                    "Adjustment reason cannot be empty",
                ));
            }
            MovementReference::VendorPurchase(_) => {
                return Err(AppError::validation(
                    "reference",
                    "Restocks reference a returning order or a reason; vendor deliveries are recorded as purchases",
                ));
            }
            _ => {}
        }

        let mut tx = self.db.begin().await?;
        let (product_id, mut batch) = Self::lock_for_adjustment(&mut tx, batch_id).await?;
        let stock_before = stock_level(StockReducer::active_stock(&mut tx, product_id).await?)?;

        batch.restock(quantity).map_err(|e| match e {
            BatchError::RestockExpired(_) => AppError::InvalidStateTransition(e.to_string()),
            BatchError::RestockOverflow { .. } => {
                AppError::validation("quantity", &e.to_string())
            }
            other => AppError::InvariantViolation(other.to_string()),
        })?;

        let batch = Self::persist_batch(&mut tx, &batch).await?;

        MovementLogService::record(
            &mut tx,
            NewMovement {
                product_id,
                batch_id: Some(batch.id),
                kind: MovementKind::Adjusted,
                reference,
                quantity,
                stock_before,
            },
        )
        .await?;

        StockReducer::refresh_product_stock(&mut tx, product_id).await?;
        tx.commit().await?;

        Ok(batch)
    }

    /// Remove units that were damaged, spoiled or miscounted
    pub async fn write_down(
        &self,
        batch_id: Uuid,
        quantity: i32,
        reason: &str,
    ) -> AppResult<StockBatch> {
        if quantity <= 0 {
            return Err(AppError::validation(
                "quantity",
                "Write-down quantity must be positive",
            ));
        }
        if reason.trim().is_empty() {
            return Err(AppError::validation(
                "reason",
                "Adjustment reason cannot be empty",
            ));
        }

        let mut tx = self.db.begin().await?;
        let (product_id, mut batch) = Self::lock_for_adjustment(&mut tx, batch_id).await?;
        let stock_before = stock_level(StockReducer::active_stock(&mut tx, product_id).await?)?;

        batch.reduce(quantity).map_err(|e| match e {
            BatchError::InsufficientRemaining { .. } => {
                AppError::validation("quantity", &e.to_string())
            }
            BatchError::NotActive { .. } => AppError::InvalidStateTransition(e.to_string()),
            other => AppError::InvariantViolation(other.to_string()),
        })?;

        let batch = Self::persist_batch(&mut tx, &batch).await?;

        MovementLogService::record(
            &mut tx,
            NewMovement {
                product_id,
                batch_id: Some(batch.id),
                kind: MovementKind::Adjusted,
                reference: MovementReference::Adjustment(reason.trim().to_string()),
                quantity: -quantity,
                stock_before,
            },
        )
        .await?;

        StockReducer::refresh_product_stock(&mut tx, product_id).await?;
        tx.commit().await?;

        Ok(batch)
    }

    /// Close a batch whose goods went past their date.
    ///
    /// Remaining units stay on the row as a waste record; the movement log
    /// gets one adjusted entry taking them out of sellable stock.
    pub async fn expire_batch(&self, batch_id: Uuid) -> AppResult<StockBatch> {
        let mut tx = self.db.begin().await?;
        let (product_id, mut batch) = Self::lock_for_adjustment(&mut tx, batch_id).await?;

        if batch.status == BatchStatus::Expired {
            return Err(AppError::InvalidStateTransition(format!(
                "batch {} is already expired",
                batch.id
            )));
        }

        let stock_before = stock_level(StockReducer::active_stock(&mut tx, product_id).await?)?;
        let waste = if batch.status == BatchStatus::Active {
            batch.quantity_remaining
        } else {
            0
        };

        batch.status = BatchStatus::Expired;
        let batch = Self::persist_batch(&mut tx, &batch).await?;

        if waste > 0 {
            MovementLogService::record(
                &mut tx,
                NewMovement {
                    product_id,
                    batch_id: Some(batch.id),
                    kind: MovementKind::Adjusted,
                    reference: MovementReference::Adjustment("batch expired".to_string()),
                    quantity: -waste,
                    stock_before,
                },
            )
            .await?;
        }

        StockReducer::refresh_product_stock(&mut tx, product_id).await?;
        tx.commit().await?;

        tracing::info!(
            "Expired batch {} for product {}, wrote off {} units",
            batch.id,
            product_id,
            waste
        );

        Ok(batch)
    }

    /// Take the product lock, then the batch lock, in that order.
    ///
    /// The product id has to be read before any lock exists, so the batch row
    /// is re-read under FOR UPDATE afterwards.
    async fn lock_for_adjustment(
        tx: &mut Transaction<'_, Postgres>,
        batch_id: Uuid,
    ) -> AppResult<(Uuid, StockBatch)> {
        let product_id = sqlx::query_scalar::<_, Uuid>(
            "SELECT product_id FROM stock_batches WHERE id = $1",
        )
        .bind(batch_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Batch".to_string()))?;

        StockReducer::lock_product(tx, product_id).await?;

        let batch: StockBatch = sqlx::query_as::<_, BatchRow>(
            r#"
            SELECT id, product_id, vendor_id, purchase_order_id, quantity_purchased,
                   quantity_remaining, purchase_price, selling_price, batch_date, status,
                   created_at, updated_at
            FROM stock_batches
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(batch_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Batch".to_string()))?
        .try_into()?;

        Ok((product_id, batch))
    }

    /// Write a mutated batch back and return the persisted row
    pub(crate) async fn persist_batch(
        tx: &mut Transaction<'_, Postgres>,
        batch: &StockBatch,
    ) -> AppResult<StockBatch> {
        let row = sqlx::query_as::<_, BatchRow>(
            r#"
            UPDATE stock_batches
            SET quantity_remaining = $1, status = $2, updated_at = NOW()
            WHERE id = $3
            RETURNING id, product_id, vendor_id, purchase_order_id, quantity_purchased,
                      quantity_remaining, purchase_price, selling_price, batch_date, status,
                      created_at, updated_at
            "#,
        )
        .bind(batch.quantity_remaining)
        .bind(batch.status.as_str())
        .bind(batch.id)
        .fetch_one(&mut **tx)
        .await?;

        row.try_into()
    }
}
