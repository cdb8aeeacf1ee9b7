//! FIFO allocator service
//!
//! Answers "which batches would this demand consume" from a snapshot of batch
//! state, without reserving or mutating anything. The reducer re-validates
//! every plan under row locks, so a plan going stale is safe, just retryable.

use sqlx::PgPool;
use uuid::Uuid;

use shared::allocation::plan_fifo;
use shared::models::{AllocationPlan, AllocationPreview};

use crate::error::{AppError, AppResult};
use crate::services::batches::BatchLedgerService;

/// Allocator service for FIFO consumption planning
#[derive(Clone)]
pub struct AllocatorService {
    db: PgPool,
    ledger: BatchLedgerService,
}

impl AllocatorService {
    /// Create a new AllocatorService instance
    pub fn new(db: PgPool) -> Self {
        let ledger = BatchLedgerService::new(db.clone());
        Self { db, ledger }
    }

    /// Compute a FIFO plan for `quantity` units from current batch state
    pub async fn plan(&self, product_id: Uuid, quantity: i32) -> AppResult<AllocationPlan> {
        if quantity <= 0 {
            return Err(AppError::validation(
                "quantity",
                "Requested quantity must be positive",
            ));
        }

        let product_exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM products WHERE id = $1)",
        )
        .bind(product_id)
        .fetch_one(&self.db)
        .await?;

        if !product_exists {
            return Err(AppError::NotFound("Product".to_string()));
        }

        let batches = self.ledger.active_batches_fifo(product_id).await?;
        Ok(plan_fifo(product_id, &batches, quantity))
    }

    /// Answer "could we sell this right now" without reserving anything
    pub async fn simulate(&self, product_id: Uuid, quantity: i32) -> AppResult<AllocationPreview> {
        let plan = self.plan(product_id, quantity).await?;
        Ok(plan.into())
    }
}
