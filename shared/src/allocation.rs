//! FIFO allocation over stock batches
//!
//! Planning is separated from application on purpose: a plan is computed from
//! a snapshot of batch state without side effects, and the backend re-validates
//! it against locked rows before any quantity actually moves. The same
//! application logic runs here in memory so it can be tested without a
//! database.

use std::cmp::Ordering;

use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    AllocatedSale, AllocationPlan, BatchStatus, ItemDemand, OrderItem, PlanEntry, ProductDemand,
    StockBatch,
};

/// Conflict found while re-validating a plan against current batch state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanConflict {
    #[error("batch {batch_id} referenced by the plan was not loaded")]
    BatchMissing { batch_id: Uuid },
    #[error(
        "batch {batch_id} can no longer supply {requested} units ({remaining} remaining, status {status})"
    )]
    BatchChanged {
        batch_id: Uuid,
        requested: i32,
        remaining: i32,
        status: BatchStatus,
    },
}

/// Mismatch between a plan and the line items it should be attributed to
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("plan allocates {allocated} units but line items demand {demanded}")]
pub struct PlanSplitError {
    pub allocated: i32,
    pub demanded: i32,
}

fn fifo_cmp(a: &StockBatch, b: &StockBatch) -> Ordering {
    a.batch_date
        .cmp(&b.batch_date)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Sort batches into consumption order: oldest batch date first, then
/// insertion order, with the id as a stable final tie-break.
pub fn sort_fifo(batches: &mut [StockBatch]) {
    batches.sort_by(fifo_cmp);
}

/// Plan consumption of `requested` units of a product, oldest batch first.
///
/// Pure function of its inputs: nothing is mutated, and two calls over the
/// same state always produce the same plan. Batches belonging to other
/// products, non-active batches and empty batches are ignored. A request the
/// active batches cannot cover still returns a plan; the caller decides what
/// a non-zero shortage means.
pub fn plan_fifo(product_id: Uuid, batches: &[StockBatch], requested: i32) -> AllocationPlan {
    let mut candidates: Vec<&StockBatch> = batches
        .iter()
        .filter(|b| {
            b.product_id == product_id
                && b.status == BatchStatus::Active
                && b.quantity_remaining > 0
        })
        .collect();
    candidates.sort_by(|a, b| fifo_cmp(a, b));

    let mut remaining = requested.max(0);
    let mut entries = Vec::new();
    for batch in candidates {
        if remaining == 0 {
            break;
        }
        let take = remaining.min(batch.quantity_remaining);
        entries.push(PlanEntry {
            batch_id: batch.id,
            quantity_taken: take,
            purchase_price: batch.purchase_price,
            selling_price: batch.selling_price,
        });
        remaining -= take;
    }

    AllocationPlan {
        product_id,
        requested,
        entries,
        shortage: remaining,
    }
}

/// Re-validate `plan` against the current batch rows and apply it in memory.
///
/// `batches` must contain every batch the plan references; extra batches are
/// left alone. On success all referenced batches have been reduced (and
/// flipped to exhausted where they hit zero). On conflict nothing is mutated,
/// so the caller can re-plan against the same rows.
pub fn apply_plan(batches: &mut [StockBatch], plan: &AllocationPlan) -> Result<(), PlanConflict> {
    let mut working: Vec<StockBatch> = batches.to_vec();

    for entry in &plan.entries {
        if entry.quantity_taken == 0 {
            continue;
        }
        let idx = working
            .iter()
            .position(|b| b.id == entry.batch_id)
            .ok_or(PlanConflict::BatchMissing {
                batch_id: entry.batch_id,
            })?;
        if working[idx].reduce(entry.quantity_taken).is_err() {
            return Err(PlanConflict::BatchChanged {
                batch_id: entry.batch_id,
                requested: entry.quantity_taken,
                remaining: working[idx].quantity_remaining,
                status: working[idx].status,
            });
        }
    }

    batches.clone_from_slice(&working);
    Ok(())
}

/// Group line items by product, summing quantities per product.
///
/// Demands come back ordered by ascending product id. That ordering doubles
/// as the lock acquisition order during fulfillment, so concurrent orders
/// over the same products never deadlock.
pub fn merge_demands(items: &[OrderItem]) -> Vec<ProductDemand> {
    let mut demands: Vec<ProductDemand> = Vec::new();
    for item in items {
        let share = ItemDemand {
            order_item_id: item.id,
            quantity: item.quantity,
        };
        match demands.iter_mut().find(|d| d.product_id == item.product_id) {
            Some(demand) => {
                demand.quantity += item.quantity;
                demand.items.push(share);
            }
            None => demands.push(ProductDemand {
                product_id: item.product_id,
                quantity: item.quantity,
                items: vec![share],
            }),
        }
    }
    demands.sort_by(|a, b| a.product_id.cmp(&b.product_id));
    demands
}

/// Attribute a fulfilled plan's entries back to the line items that demanded
/// them, preserving both item order and batch order.
///
/// Walks items and plan entries as two cursors, so an item spanning several
/// batches yields several sales and a batch covering several items is split
/// between them. Fails unless the plan covers the item quantities exactly.
pub fn split_plan_by_items(
    plan: &AllocationPlan,
    items: &[ItemDemand],
) -> Result<Vec<AllocatedSale>, PlanSplitError> {
    let demanded: i32 = items.iter().map(|i| i.quantity.max(0)).sum();
    if plan.allocated() != demanded {
        return Err(PlanSplitError {
            allocated: plan.allocated(),
            demanded,
        });
    }

    let mut sales = Vec::new();
    let mut entry_idx = 0usize;
    let mut entry_left = plan.entries.first().map(|e| e.quantity_taken).unwrap_or(0);

    for item in items {
        let mut needed = item.quantity.max(0);
        while needed > 0 {
            while entry_left == 0 {
                entry_idx += 1;
                match plan.entries.get(entry_idx) {
                    Some(entry) => entry_left = entry.quantity_taken,
                    None => {
                        return Err(PlanSplitError {
                            allocated: plan.allocated(),
                            demanded,
                        })
                    }
                }
            }
            let entry = &plan.entries[entry_idx];
            let take = needed.min(entry_left);
            sales.push(AllocatedSale {
                order_item_id: item.order_item_id,
                batch_id: entry.batch_id,
                quantity: take,
                purchase_price: entry.purchase_price,
                selling_price: entry.selling_price,
            });
            needed -= take;
            entry_left -= take;
        }
    }

    Ok(sales)
}
