//! Stock batch models
//!
//! A batch is one discrete intake of stock for a product (usually a vendor
//! purchase line). Batches are consumed oldest-first and are the authoritative
//! record of on-hand quantity.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Lifecycle status of a stock batch
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Active,
    Exhausted,
    Expired,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Active => "active",
            BatchStatus::Exhausted => "exhausted",
            BatchStatus::Expired => "expired",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(BatchStatus::Active),
            "exhausted" => Some(BatchStatus::Exhausted),
            "expired" => Some(BatchStatus::Expired),
            _ => None,
        }
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One discrete intake of stock for a product
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockBatch {
    pub id: Uuid,
    pub product_id: Uuid,
    /// Absent for opening-stock batches entered at product creation
    pub vendor_id: Option<Uuid>,
    pub purchase_order_id: Option<Uuid>,
    pub quantity_purchased: i32,
    pub quantity_remaining: i32,
    pub purchase_price: Decimal,
    pub selling_price: Decimal,
    /// Date the stock physically arrived; drives consumption order
    pub batch_date: NaiveDate,
    pub status: BatchStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Error raised when a batch cannot absorb a quantity change
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("quantity cannot be negative, got {0}")]
    NegativeQuantity(i32),
    #[error("batch {batch_id} has {remaining} units remaining, cannot reduce by {requested}")]
    InsufficientRemaining {
        batch_id: Uuid,
        requested: i32,
        remaining: i32,
    },
    #[error("batch {batch_id} is {status}, not active")]
    NotActive { batch_id: Uuid, status: BatchStatus },
    #[error("cannot restock expired batch {0}")]
    RestockExpired(Uuid),
    #[error("restocking batch {batch_id} by {requested} would exceed its purchased quantity of {purchased}")]
    RestockOverflow {
        batch_id: Uuid,
        requested: i32,
        purchased: i32,
    },
}

impl StockBatch {
    /// Whether this batch can supply the given quantity right now
    pub fn can_fulfill(&self, quantity: i32) -> bool {
        self.status == BatchStatus::Active && quantity >= 0 && self.quantity_remaining >= quantity
    }

    /// Decrement the remaining quantity, flipping to exhausted at zero.
    ///
    /// Reducing by zero is a no-op and never an error.
    pub fn reduce(&mut self, quantity: i32) -> Result<(), BatchError> {
        if quantity < 0 {
            return Err(BatchError::NegativeQuantity(quantity));
        }
        if quantity == 0 {
            return Ok(());
        }
        if self.status != BatchStatus::Active {
            return Err(BatchError::NotActive {
                batch_id: self.id,
                status: self.status,
            });
        }
        if quantity > self.quantity_remaining {
            return Err(BatchError::InsufficientRemaining {
                batch_id: self.id,
                requested: quantity,
                remaining: self.quantity_remaining,
            });
        }
        self.quantity_remaining -= quantity;
        if self.quantity_remaining == 0 {
            self.status = BatchStatus::Exhausted;
        }
        Ok(())
    }

    /// Put units back into the batch (customer return, correction).
    ///
    /// An exhausted batch becomes active again; expired batches stay closed.
    /// A batch can never hold more than was originally purchased.
    pub fn restock(&mut self, quantity: i32) -> Result<(), BatchError> {
        if quantity < 0 {
            return Err(BatchError::NegativeQuantity(quantity));
        }
        if quantity == 0 {
            return Ok(());
        }
        if self.status == BatchStatus::Expired {
            return Err(BatchError::RestockExpired(self.id));
        }
        if self.quantity_remaining + quantity > self.quantity_purchased {
            return Err(BatchError::RestockOverflow {
                batch_id: self.id,
                requested: quantity,
                purchased: self.quantity_purchased,
            });
        }
        self.quantity_remaining += quantity;
        self.status = BatchStatus::Active;
        Ok(())
    }
}
