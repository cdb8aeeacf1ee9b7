//! Order fulfillment orchestrator
//!
//! Composes the FIFO allocator and the stock reducer across every line item
//! of an order. Planning runs against an unlocked snapshot; application
//! re-validates under row locks and commits together with the order status
//! flip, so an order is either fully fulfilled or untouched.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use shared::allocation::merge_demands;
use shared::models::{
    AllocationPlan, FulfillmentState, Order, OrderItem, OrderStatus, ProductDemand, SaleRecord,
};

use crate::error::{AppError, AppResult};
use crate::services::allocation::AllocatorService;
use crate::services::reducer::StockReducer;

/// Orchestrates feasibility checks and atomic fulfillment for orders
#[derive(Clone)]
pub struct FulfillmentService {
    db: PgPool,
    allocator: AllocatorService,
}

/// Input for creating an order
#[derive(Debug, Deserialize)]
pub struct CreateOrderInput {
    /// Defaults to today
    pub order_date: Option<NaiveDate>,
    pub items: Vec<OrderItemInput>,
}

/// One requested product line
#[derive(Debug, Deserialize)]
pub struct OrderItemInput {
    pub product_id: Uuid,
    pub quantity: i32,
}

/// Record of a completed fulfillment
#[derive(Debug, Serialize)]
pub struct FulfillmentReceipt {
    pub order_id: Uuid,
    pub state: FulfillmentState,
    pub sales: Vec<SaleRecord>,
    pub total_profit: Decimal,
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    status: String,
    order_date: NaiveDate,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = AppError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let status = OrderStatus::from_str(&row.status).ok_or_else(|| {
            AppError::InvariantViolation(format!("unknown order status '{}'", row.status))
        })?;

        Ok(Order {
            id: row.id,
            status,
            order_date: row.order_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    created_at: DateTime<Utc>,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        OrderItem {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            quantity: row.quantity,
            created_at: row.created_at,
        }
    }
}

/// Walk one edge of the fulfillment state machine
fn advance(state: FulfillmentState, next: FulfillmentState) -> AppResult<FulfillmentState> {
    state.transition_to(next).map_err(|msg| {
        AppError::InvariantViolation(format!("{}: {} -> {}", msg, state, next))
    })
}

impl FulfillmentService {
    /// Create a new FulfillmentService instance
    pub fn new(db: PgPool) -> Self {
        Self {
            allocator: AllocatorService::new(db.clone()),
            db,
        }
    }

    /// Create a pending order with its line items
    pub async fn create_order(&self, input: CreateOrderInput) -> AppResult<Order> {
        if input.items.is_empty() {
            return Err(AppError::validation(
                "items",
                "At least one order item is required",
            ));
        }
        for item in &input.items {
            if item.quantity <= 0 {
                return Err(AppError::validation(
                    "quantity",
                    "Order item quantity must be positive",
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

        let order_date = input.order_date.unwrap_or_else(|| Utc::now().date_naive());

        let mut tx = self.db.begin().await?;

        let order: Order = sqlx::query_as::<_, OrderRow>(
            r#"
            INSERT INTO orders (status, order_date)
            VALUES ('pending', $1)
            RETURNING id, status, order_date, created_at, updated_at
            "#,
        )
        .bind(order_date)
        .fetch_one(&mut *tx)
        .await?
        .try_into()?;

        for item in &input.items {
            sqlx::query(
                "INSERT INTO order_items (order_id, product_id, quantity) VALUES ($1, $2, $3)",
            )
            .bind(order.id)
            .bind(item.product_id)
            .bind(item.quantity)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(order)
    }

    /// Get an order by ID
    pub async fn get_order(&self, order_id: Uuid) -> AppResult<Order> {
        let order = sqlx::query_as::<_, OrderRow>(
            "SELECT id, status, order_date, created_at, updated_at FROM orders WHERE id = $1",
        )
        .bind(order_id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Order {}", order_id)))?;

        order.try_into()
    }

    /// Line items of an order, in insertion order
    pub async fn order_items(&self, order_id: Uuid) -> AppResult<Vec<OrderItem>> {
        let rows = sqlx::query_as::<_, OrderItemRow>(
            r#"
            SELECT id, order_id, product_id, quantity, created_at
            FROM order_items
            WHERE order_id = $1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(OrderItem::from).collect())
    }

    /// Advisory check: could every line item be fulfilled right now?
    ///
    /// Simulates against an unlocked snapshot, so a `true` here can still
    /// lose the race. `fulfill` is the only authoritative answer.
    pub async fn can_fulfill(&self, order_id: Uuid) -> AppResult<bool> {
        let order = self.get_order(order_id).await?;
        if order.status != OrderStatus::Pending {
            return Ok(false);
        }

        let items = self.order_items(order_id).await?;
        if items.is_empty() {
            return Ok(false);
        }

        for demand in merge_demands(&items) {
            let preview = self
                .allocator
                .simulate(demand.product_id, demand.quantity)
                .await?;
            if !preview.fulfilled {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Fulfill a pending order, all line items or none.
    ///
    /// If a batch is drained by a concurrent fulfillment between planning and
    /// application, the whole attempt is re-planned against fresh state once
    /// before the conflict is surfaced.
    pub async fn fulfill(&self, order_id: Uuid) -> AppResult<FulfillmentReceipt> {
        let order = self.get_order(order_id).await?;
        if order.status != OrderStatus::Pending {
            return Err(AppError::InvalidStateTransition(format!(
                "Order {} is {} and cannot be fulfilled",
                order_id, order.status
            )));
        }

        let items = self.order_items(order_id).await?;
        if items.is_empty() {
            return Err(AppError::validation("items", "Order has no line items"));
        }

        let demands = merge_demands(&items);

        match self.attempt(order_id, &demands).await {
            Err(e) if e.is_retryable() => {
                tracing::warn!(
                    "Fulfillment of order {} hit a conflict, re-planning once: {}",
                    order_id,
                    e
                );
                self.attempt(order_id, &demands).await
            }
            outcome => outcome,
        }
    }

    /// One plan-then-apply pass over the whole order
    async fn attempt(
        &self,
        order_id: Uuid,
        demands: &[ProductDemand],
    ) -> AppResult<FulfillmentReceipt> {
        let mut state = FulfillmentState::Unchecked;

        // Plan every product from an unlocked snapshot. Demands arrive sorted
        // by product id, which is also the reducer's lock order.
        let mut planned = Vec::with_capacity(demands.len());
        for demand in demands {
            let plan = self
                .allocator
                .plan(demand.product_id, demand.quantity)
                .await?;

            if !plan.is_fulfilled() {
                state = advance(state, FulfillmentState::Infeasible)?;
                tracing::info!(
                    "Order {} is {}: product {} short by {}",
                    order_id,
                    state,
                    demand.product_id,
                    plan.shortage
                );
                return Err(AppError::InsufficientStock {
                    product_id: demand.product_id,
                    requested: demand.quantity,
                    available: plan.allocated(),
                    shortage: plan.shortage,
                });
            }

            planned.push((demand.clone(), plan));
        }
        state = advance(state, FulfillmentState::Feasible)?;

        let sales = match self.apply_and_confirm(order_id, &planned).await {
            Ok(sales) => sales,
            Err(e) => {
                state = advance(state, FulfillmentState::Failed)?;
                tracing::warn!("Order {} fulfillment {}: {}", order_id, state, e);
                return Err(e);
            }
        };

        state = advance(state, FulfillmentState::Fulfilled)?;
        let total_profit: Decimal = sales.iter().map(|s| s.profit).sum();

        tracing::info!(
            "Order {} {}: {} sale records, profit {}",
            order_id,
            state,
            sales.len(),
            total_profit
        );

        Ok(FulfillmentReceipt {
            order_id,
            state,
            sales,
            total_profit,
        })
    }

    /// Apply the plans and flip the order to confirmed in one transaction.
    ///
    /// The status predicate on the update makes double fulfillment
    /// impossible even if two workers got past the pending check: the second
    /// one matches zero rows and aborts, rolling back its stock mutations.
    async fn apply_and_confirm(
        &self,
        order_id: Uuid,
        planned: &[(ProductDemand, AllocationPlan)],
    ) -> AppResult<Vec<SaleRecord>> {
        let mut tx = self.db.begin().await?;

        let sales = StockReducer::apply(&mut tx, order_id, planned).await?;

        let updated = sqlx::query(
            "UPDATE orders SET status = 'confirmed', updated_at = NOW() WHERE id = $1 AND status = 'pending'",
        )
        .bind(order_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(AppError::InvalidStateTransition(format!(
                "Order {} is no longer pending",
                order_id
            )));
        }

        tx.commit().await?;
        Ok(sales)
    }
}
