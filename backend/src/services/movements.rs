//! Stock movement log service
//!
//! The movement log is the audit trail of every stock change. Rows are only
//! ever appended, inside the same transaction as the batch mutation they
//! describe, while the caller holds the product row lock. That lock is what
//! keeps the stock_before/stock_after chain linear per product.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

use shared::models::{MovementKind, MovementReference, StockMovement};
use shared::types::DateRange;
use shared::validation::{replay_movements, validate_movement};

use crate::error::{AppError, AppResult};

/// Movement log service for recording and auditing stock changes
#[derive(Clone)]
pub struct MovementLogService {
    db: PgPool,
}

/// Input for appending a movement row
#[derive(Debug, Clone)]
pub struct NewMovement {
    pub product_id: Uuid,
    pub batch_id: Option<Uuid>,
    pub kind: MovementKind,
    pub reference: MovementReference,
    /// Signed delta; the sign must match the kind
    pub quantity: i32,
    /// Product aggregate before this movement, read under the product lock
    pub stock_before: i32,
}

/// Row for movement queries
#[derive(Debug, FromRow)]
struct MovementRow {
    id: Uuid,
    product_id: Uuid,
    batch_id: Option<Uuid>,
    kind: String,
    reference_type: String,
    reference_id: Option<Uuid>,
    adjustment_reason: Option<String>,
    quantity: i32,
    stock_before: i32,
    stock_after: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<MovementRow> for StockMovement {
    type Error = AppError;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        let kind = MovementKind::from_str(&row.kind).ok_or_else(|| {
            AppError::InvariantViolation(format!(
                "movement {} has unknown kind '{}'",
                row.id, row.kind
            ))
        })?;
        let reference = MovementReference::from_parts(
            &row.reference_type,
            row.reference_id,
            row.adjustment_reason,
        )
        .ok_or_else(|| {
            AppError::InvariantViolation(format!(
                "movement {} has malformed reference type '{}'",
                row.id, row.reference_type
            ))
        })?;
        Ok(StockMovement {
            id: row.id,
            product_id: row.product_id,
            batch_id: row.batch_id,
            kind,
            reference,
            quantity: row.quantity,
            stock_before: row.stock_before,
            stock_after: row.stock_after,
            created_at: row.created_at,
        })
    }
}

/// Reconciliation verdict for one product
#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub product_id: Uuid,
    pub product_name: String,
    /// Denormalized products.stock value
    pub cached_stock: i32,
    /// Sum of active batch remainders, the authoritative number
    pub batch_stock: i64,
    /// Stock after replaying the full movement log, when the log is coherent
    pub replayed_stock: Option<i32>,
    /// First defect found while replaying, if any
    pub log_error: Option<String>,
    pub consistent: bool,
}

impl MovementLogService {
    /// Create a new MovementLogService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Append one movement row inside the caller's transaction.
    ///
    /// The row is validated before insert; a rejected row means the caller
    /// computed an impossible delta and the whole transaction must die.
    pub async fn record(
        tx: &mut Transaction<'_, Postgres>,
        input: NewMovement,
    ) -> AppResult<StockMovement> {
        let stock_after = input.stock_before + input.quantity;
        validate_movement(input.kind, input.quantity, input.stock_before, stock_after)
            .map_err(|msg| AppError::InvariantViolation(msg.to_string()))?;

        let row = sqlx::query_as::<_, MovementRow>(
            r#"
            INSERT INTO stock_movements (product_id, batch_id, kind, reference_type, reference_id,
                                         adjustment_reason, quantity, stock_before, stock_after)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, product_id, batch_id, kind, reference_type, reference_id,
                      adjustment_reason, quantity, stock_before, stock_after, created_at
            "#,
        )
        .bind(input.product_id)
        .bind(input.batch_id)
        .bind(input.kind.as_str())
        .bind(input.reference.reference_type())
        .bind(input.reference.reference_id())
        .bind(input.reference.adjustment_reason())
        .bind(input.quantity)
        .bind(input.stock_before)
        .bind(stock_after)
        .fetch_one(&mut **tx)
        .await?;

        row.try_into()
    }

    /// Movement history for a product within a date range, oldest first
    pub async fn history(
        &self,
        product_id: Uuid,
        range: &DateRange,
    ) -> AppResult<Vec<StockMovement>> {
        let product_exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)",
        )
        .bind(product_id)
        .fetch_one(&self.db)
        .await?;

        if !product_exists {
            return Err(AppError::NotFound("Product".to_string()));
        }

        let rows = sqlx::query_as::<_, MovementRow>(
            r#"
            SELECT id, product_id, batch_id, kind, reference_type, reference_id,
                   adjustment_reason, quantity, stock_before, stock_after, created_at
            FROM stock_movements
            WHERE product_id = $1
              AND created_at::date >= $2
              AND created_at::date <= $3
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(product_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(StockMovement::try_from).collect()
    }

    /// Full movement history for a product, oldest first
    pub async fn full_history(&self, product_id: Uuid) -> AppResult<Vec<StockMovement>> {
        let rows = sqlx::query_as::<_, MovementRow>(
            r#"
            SELECT id, product_id, batch_id, kind, reference_type, reference_id,
                   adjustment_reason, quantity, stock_before, stock_after, created_at
            FROM stock_movements
            WHERE product_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(product_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(StockMovement::try_from).collect()
    }

    /// Cross-check one product's cache, batches and movement log
    pub async fn reconcile_product(&self, product_id: Uuid) -> AppResult<ReconciliationReport> {
        let (product_name, cached_stock) = sqlx::query_as::<_, (String, i32)>(
            "SELECT name, stock FROM products WHERE id = $1",
        )
        .bind(product_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Product".to_string()))?;

        let batch_stock = sqlx::query_scalar::<_, i64>(
            "SELECT COALESCE(SUM(quantity_remaining), 0) FROM stock_batches WHERE product_id = $1 AND status = 'active'",
        )
        .bind(product_id)
        .fetch_one(&self.db)
        .await?;

        let movements = self.full_history(product_id).await?;
        let (replayed_stock, log_error) = match replay_movements(&movements) {
            Ok(stock) => (Some(stock), None),
            Err(msg) => (None, Some(msg.to_string())),
        };

        let consistent = log_error.is_none()
            && replayed_stock.map(i64::from) == Some(batch_stock)
            && i64::from(cached_stock) == batch_stock;

        Ok(ReconciliationReport {
            product_id,
            product_name,
            cached_stock,
            batch_stock,
            replayed_stock,
            log_error,
            consistent,
        })
    }

    /// Reconcile every product in the catalog
    pub async fn reconcile_all(&self) -> AppResult<Vec<ReconciliationReport>> {
        let product_ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM products ORDER BY name ASC, id ASC",
        )
        .fetch_all(&self.db)
        .await?;

        let mut reports = Vec::with_capacity(product_ids.len());
        for product_id in product_ids {
            reports.push(self.reconcile_product(product_id).await?);
        }
        Ok(reports)
    }
}
