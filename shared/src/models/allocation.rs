//! Allocation plan models
//!
//! A plan is an ephemeral, side-effect-free answer to "which batches would
//! this demand consume, and how much from each". Plans are never persisted;
//! they are recomputed from batch state whenever needed.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One slice of demand taken from a specific batch
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanEntry {
    pub batch_id: Uuid,
    pub quantity_taken: i32,
    /// Captured from the batch so sale records price at batch cost
    pub purchase_price: Decimal,
    pub selling_price: Decimal,
}

/// Ordered consumption plan for one product's demand
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllocationPlan {
    pub product_id: Uuid,
    pub requested: i32,
    /// Entries in consumption order, oldest batch first
    pub entries: Vec<PlanEntry>,
    /// Units the active batches could not cover; zero means fulfillable
    pub shortage: i32,
}

impl AllocationPlan {
    pub fn is_fulfilled(&self) -> bool {
        self.shortage == 0
    }

    /// Total units the plan takes across all batches
    pub fn allocated(&self) -> i32 {
        self.entries.iter().map(|e| e.quantity_taken).sum()
    }
}

/// Read-only preview of an allocation, for availability checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationPreview {
    pub product_id: Uuid,
    pub requested: i32,
    pub fulfilled: bool,
    pub shortage: i32,
    pub entries: Vec<PlanEntry>,
}

impl From<AllocationPlan> for AllocationPreview {
    fn from(plan: AllocationPlan) -> Self {
        Self {
            product_id: plan.product_id,
            requested: plan.requested,
            fulfilled: plan.shortage == 0,
            shortage: plan.shortage,
            entries: plan.entries,
        }
    }
}

/// Demand for one product aggregated from the line items that request it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProductDemand {
    pub product_id: Uuid,
    /// Sum of the item quantities below
    pub quantity: i32,
    /// Contributing line items in their original order
    pub items: Vec<ItemDemand>,
}

/// One order line item's share of a product demand
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemDemand {
    pub order_item_id: Uuid,
    pub quantity: i32,
}

/// A fulfilled plan slice attributed back to a single line item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllocatedSale {
    pub order_item_id: Uuid,
    pub batch_id: Uuid,
    pub quantity: i32,
    pub purchase_price: Decimal,
    pub selling_price: Decimal,
}
