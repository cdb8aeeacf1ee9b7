//! Vendor purchase intake service
//!
//! Receiving goods is the only way new sellable stock appears: every purchase
//! line becomes one batch and one added movement, in a single transaction.

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use uuid::Uuid;

use shared::models::{MovementKind, MovementReference, StockBatch};

use crate::error::{AppError, AppResult};
use crate::services::batches::BatchRow;
use crate::services::movements::{MovementLogService, NewMovement};
use crate::services::reducer::{stock_level, StockReducer};

/// Intake service for recording received vendor purchases
#[derive(Clone)]
pub struct VendorPurchaseService {
    db: PgPool,
}

/// Input for recording a received vendor purchase
#[derive(Debug, Deserialize)]
pub struct RecordPurchaseInput {
    pub vendor_id: Uuid,
    pub purchase_order_id: Uuid,
    /// Arrival date; defaults to today and drives FIFO order
    pub batch_date: Option<NaiveDate>,
    pub items: Vec<PurchaseItemInput>,
}

/// One received purchase line
#[derive(Debug, Deserialize)]
pub struct PurchaseItemInput {
    pub product_id: Uuid,
    pub quantity: i32,
    pub purchase_price: Decimal,
    pub selling_price: Decimal,
}

impl VendorPurchaseService {
    /// Create a new VendorPurchaseService instance
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    /// Record one received vendor purchase.
    ///
    /// Creates a full batch per line item and appends the matching added
    /// movements. Either every line lands or none of them do.
    pub async fn record_purchase(
        &self,
        input: RecordPurchaseInput,
    ) -> AppResult<Vec<StockBatch>> {
        if input.items.is_empty() {
            return Err(AppError::validation(
                "items",
                "At least one purchase line is required",
            ));
        }
        for item in &input.items {
            if item.quantity <= 0 {
                return Err(AppError::validation(
                    "quantity",
                    "Purchase quantity must be positive",
                ));
            }
            if item.purchase_price < Decimal::ZERO || item.selling_price < Decimal::ZERO {
                return Err(AppError::validation(
                    "price",
                    "Prices cannot be negative",
                ));
            }
        }

        for item in &input.items {
            let product_exists = sqlx::query_scalar::<_, bool>(
                "SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)",
            )
            .bind(item.product_id)
            .fetch_one(&self.db)
            .await?;

            if !product_exists {
                return Err(AppError::NotFound(format!("Product {}", item.product_id)));
            }
        }

        let batch_date = input.batch_date.unwrap_or_else(|| Utc::now().date_naive());

        // Ascending product order is the lock order shared with fulfillment
        let mut items = input.items;
        items.sort_by_key(|item| item.product_id);

        let mut tx = self.db.begin().await?;
        let mut batches = Vec::with_capacity(items.len());
        let mut locked: Option<Uuid> = None;

        for item in &items {
            if locked != Some(item.product_id) {
                StockReducer::lock_product(&mut tx, item.product_id).await?;
                locked = Some(item.product_id);
            }

            let stock_before =
                stock_level(StockReducer::active_stock(&mut tx, item.product_id).await?)?;

            let batch: StockBatch = sqlx::query_as::<_, BatchRow>(
                r#"
                INSERT INTO stock_batches (product_id, vendor_id, purchase_order_id,
                                           quantity_purchased, quantity_remaining,
                                           purchase_price, selling_price, batch_date, status)
                VALUES ($1, $2, $3, $4, $4, $5, $6, $7, 'active')
                RETURNING id, product_id, vendor_id, purchase_order_id, quantity_purchased,
                          quantity_remaining, purchase_price, selling_price, batch_date, status,
                          created_at, updated_at
                "#,
            )
            .bind(item.product_id)
            .bind(input.vendor_id)
            .bind(input.purchase_order_id)
            .bind(item.quantity)
            .bind(item.purchase_price)
            .bind(item.selling_price)
            .bind(batch_date)
            .fetch_one(&mut *tx)
            .await?
            .try_into()?;

            MovementLogService::record(
                &mut tx,
                NewMovement {
                    product_id: item.product_id,
                    batch_id: Some(batch.id),
                    kind: MovementKind::Added,
                    reference: MovementReference::VendorPurchase(input.purchase_order_id),
                    quantity: item.quantity,
                    stock_before,
                },
            )
            .await?;

            StockReducer::refresh_product_stock(&mut tx, item.product_id).await?;
            batches.push(batch);
        }

        tx.commit().await?;

        tracing::info!(
            "Recorded purchase order {} from vendor {}: {} batches",
            input.purchase_order_id,
            input.vendor_id,
            batches.len()
        );

        Ok(batches)
    }
}
