//! Stock movement ledger models
//!
//! Every change to on-hand stock appends exactly one movement row. Rows are
//! never updated or deleted, so replaying them from the beginning must land on
//! the current stock level.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Direction class of a stock movement
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    /// Stock entered the shelf; quantity is strictly positive
    Added,
    /// Stock was sold; quantity is strictly negative
    Consumed,
    /// Manual correction, return, expiry write-off; either sign
    Adjusted,
}

impl MovementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementKind::Added => "added",
            MovementKind::Consumed => "consumed",
            MovementKind::Adjusted => "adjusted",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "added" => Some(MovementKind::Added),
            "consumed" => Some(MovementKind::Consumed),
            "adjusted" => Some(MovementKind::Adjusted),
            _ => None,
        }
    }
}

/// What caused a stock movement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MovementReference {
    /// Intake from a vendor, keyed by purchase order
    VendorPurchase(Uuid),
    /// Consumption by a customer order
    Order(Uuid),
    /// Manual change with a human-entered reason
    Adjustment(String),
}

impl MovementReference {
    pub fn reference_type(&self) -> &'static str {
        match self {
            MovementReference::VendorPurchase(_) => "vendor_purchase",
            MovementReference::Order(_) => "order",
            MovementReference::Adjustment(_) => "adjustment",
        }
    }

    pub fn reference_id(&self) -> Option<Uuid> {
        match self {
            MovementReference::VendorPurchase(id) | MovementReference::Order(id) => Some(*id),
            MovementReference::Adjustment(_) => None,
        }
    }

    pub fn adjustment_reason(&self) -> Option<&str> {
        match self {
            MovementReference::Adjustment(reason) => Some(reason),
            _ => None,
        }
    }

    /// Rebuild from the three persisted columns
    pub fn from_parts(
        reference_type: &str,
        reference_id: Option<Uuid>,
        adjustment_reason: Option<String>,
    ) -> Option<Self> {
        match reference_type {
            "vendor_purchase" => reference_id.map(MovementReference::VendorPurchase),
            "order" => reference_id.map(MovementReference::Order),
            "adjustment" => adjustment_reason.map(MovementReference::Adjustment),
            _ => None,
        }
    }
}

/// One append-only row in the stock movement log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockMovement {
    pub id: Uuid,
    pub product_id: Uuid,
    /// Absent only for movements recorded before batch tracking existed
    pub batch_id: Option<Uuid>,
    pub kind: MovementKind,
    pub reference: MovementReference,
    /// Signed delta; zero is never recorded
    pub quantity: i32,
    /// Product-level aggregate before this movement
    pub stock_before: i32,
    /// Product-level aggregate after; always `stock_before + quantity`
    pub stock_after: i32,
    pub created_at: DateTime<Utc>,
}
