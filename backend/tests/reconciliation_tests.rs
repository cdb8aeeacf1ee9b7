//! Stock reconciliation tests
//!
//! Tests for the three-way consistency check behind the reconcile job:
//! - Movement row validation (sign and chain rules)
//! - Full-history replay
//! - Agreement between the batch ledger, the replayed log and the cache

use chrono::{NaiveDate, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::str::FromStr;
use uuid::Uuid;

use shared::allocation::{apply_plan, plan_fifo};
use shared::models::{
    BatchStatus, MovementKind, MovementReference, StockBatch, StockMovement,
};
use shared::validation::{ledger_stock, replay_movements, validate_movement};

// Helper to create Decimal from string
fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// Active batch holding `remaining` units, dated to keep FIFO order stable
fn active_batch(product_id: Uuid, day: u32, remaining: i32) -> StockBatch {
    let date = NaiveDate::from_ymd_opt(2025, 6, day).unwrap();
    let created_at = Utc.from_utc_datetime(&date.and_hms_opt(8, 0, 0).unwrap());
    StockBatch {
        id: Uuid::new_v4(),
        product_id,
        vendor_id: Some(Uuid::new_v4()),
        purchase_order_id: Some(Uuid::new_v4()),
        quantity_purchased: remaining,
        quantity_remaining: remaining,
        purchase_price: dec("60.00"),
        selling_price: dec("100.00"),
        batch_date: date,
        status: BatchStatus::Active,
        created_at,
        updated_at: created_at,
    }
}

/// Movement row with `stock_after` derived from the chain rule
fn movement(
    product_id: Uuid,
    kind: MovementKind,
    quantity: i32,
    stock_before: i32,
) -> StockMovement {
    let reference = match kind {
        MovementKind::Added => MovementReference::VendorPurchase(Uuid::new_v4()),
        MovementKind::Consumed => MovementReference::Order(Uuid::new_v4()),
        MovementKind::Adjusted => MovementReference::Adjustment("manual count".to_string()),
    };
    StockMovement {
        id: Uuid::new_v4(),
        product_id,
        batch_id: Some(Uuid::new_v4()),
        kind,
        reference,
        quantity,
        stock_before,
        stock_after: stock_before + quantity,
        created_at: Utc::now(),
    }
}

// ============================================================================
// Movement Validation Tests
// ============================================================================

#[cfg(test)]
mod movement_validation_tests {
    use super::*;

    /// Zero never appears in the log, whatever the kind
    #[test]
    fn test_zero_quantity_rejected() {
        for kind in [
            MovementKind::Added,
            MovementKind::Consumed,
            MovementKind::Adjusted,
        ] {
            assert!(validate_movement(kind, 0, 5, 5).is_err());
        }
    }

    /// Added rows are positive, consumed rows are negative, adjusted rows
    /// may go either way
    #[test]
    fn test_sign_rules() {
        assert!(validate_movement(MovementKind::Added, 10, 0, 10).is_ok());
        assert!(validate_movement(MovementKind::Added, -10, 10, 0).is_err());

        assert!(validate_movement(MovementKind::Consumed, -4, 10, 6).is_ok());
        assert!(validate_movement(MovementKind::Consumed, 4, 6, 10).is_err());

        assert!(validate_movement(MovementKind::Adjusted, 3, 5, 8).is_ok());
        assert!(validate_movement(MovementKind::Adjusted, -3, 5, 2).is_ok());
    }

    /// The before and after levels are product aggregates and never negative
    #[test]
    fn test_negative_levels_rejected() {
        assert!(validate_movement(MovementKind::Added, 5, -1, 4).is_err());
        assert!(validate_movement(MovementKind::Consumed, -5, 3, -2).is_err());
    }

    /// stock_after must equal stock_before plus the signed quantity
    #[test]
    fn test_chain_arithmetic_enforced() {
        assert_eq!(
            validate_movement(MovementKind::Added, 5, 10, 16),
            Err("Stock after must equal stock before plus quantity")
        );
    }
}

// ============================================================================
// Replay Tests
// ============================================================================

#[cfg(test)]
mod replay_tests {
    use super::*;

    /// Replaying an unbroken chain lands on the last row's stock_after
    #[test]
    fn test_replay_walks_the_chain() {
        let product = Uuid::new_v4();
        let log = vec![
            movement(product, MovementKind::Added, 10, 0),
            movement(product, MovementKind::Consumed, -4, 10),
            movement(product, MovementKind::Adjusted, -1, 6),
        ];

        assert_eq!(replay_movements(&log), Ok(5));
    }

    /// A product with no history replays to zero
    #[test]
    fn test_replay_empty_log() {
        assert_eq!(replay_movements(&[]), Ok(0));
    }

    /// The first row of a product's history always starts from zero
    #[test]
    fn test_replay_rejects_nonzero_start() {
        let product = Uuid::new_v4();
        let log = vec![movement(product, MovementKind::Added, 10, 3)];

        assert_eq!(replay_movements(&log), Err("Movement log chain is broken"));
    }

    /// A gap between one row's after and the next row's before breaks replay
    #[test]
    fn test_replay_rejects_broken_chain() {
        let product = Uuid::new_v4();
        let log = vec![
            movement(product, MovementKind::Added, 10, 0),
            movement(product, MovementKind::Consumed, -2, 9),
        ];

        assert_eq!(replay_movements(&log), Err("Movement log chain is broken"));
    }

    /// Rows that violate their own sign or arithmetic poison the whole replay
    #[test]
    fn test_replay_rejects_invalid_rows() {
        let product = Uuid::new_v4();

        let mut wrong_sign = movement(product, MovementKind::Added, 10, 0);
        wrong_sign.quantity = -10;
        wrong_sign.stock_after = -10;
        assert!(replay_movements(&[wrong_sign]).is_err());

        let mut wrong_sum = movement(product, MovementKind::Added, 10, 0);
        wrong_sum.stock_after = 11;
        assert_eq!(
            replay_movements(&[wrong_sum]),
            Err("Stock after must equal stock before plus quantity")
        );
    }
}

// ============================================================================
// Drift Detection Tests
// ============================================================================

#[cfg(test)]
mod drift_tests {
    use super::*;

    /// A consistent product agrees across the ledger, the log and the cache
    #[test]
    fn test_consistent_product() {
        let product = Uuid::new_v4();
        let mut batches = vec![active_batch(product, 1, 10)];

        let plan = plan_fifo(product, &batches, 4);
        apply_plan(&mut batches, &plan).unwrap();

        let log = vec![
            movement(product, MovementKind::Added, 10, 0),
            movement(product, MovementKind::Consumed, -4, 10),
        ];
        let cache = 6i32;

        assert_eq!(ledger_stock(&batches), 6);
        assert_eq!(replay_movements(&log), Ok(6));
        assert_eq!(i64::from(cache), ledger_stock(&batches));
    }

    /// A stale cache disagrees with the ledger while the log still matches;
    /// refreshing the cache from the ledger is enough
    #[test]
    fn test_cache_drift() {
        let product = Uuid::new_v4();
        let batches = vec![active_batch(product, 1, 6)];
        let log = vec![movement(product, MovementKind::Added, 6, 0)];
        let cache = 7i32;

        assert_eq!(ledger_stock(&batches), 6);
        assert_eq!(replay_movements(&log), Ok(6));
        assert_ne!(i64::from(cache), ledger_stock(&batches));
    }

    /// A writer that touched batches without appending a movement leaves
    /// the replayed log ahead of the ledger, which no refresh can fix
    #[test]
    fn test_bypassed_ledger() {
        let product = Uuid::new_v4();
        let mut batches = vec![active_batch(product, 1, 10)];

        let plan = plan_fifo(product, &batches, 4);
        apply_plan(&mut batches, &plan).unwrap();

        // The consumption was never logged
        let log = vec![movement(product, MovementKind::Added, 10, 0)];

        assert_eq!(ledger_stock(&batches), 6);
        assert_eq!(replay_movements(&log), Ok(10));
        assert_ne!(
            replay_movements(&log).map(i64::from),
            Ok(ledger_stock(&batches))
        );
    }
}

// ============================================================================
// Ledger Simulation
// ============================================================================

#[cfg(test)]
mod simulation {
    use super::*;

    /// One operation against a product's stock
    #[derive(Debug, Clone, Copy)]
    pub enum StockOp {
        Purchase(i32),
        Consume(i32),
        WriteOff(i32),
    }

    /// Apply one operation to the batch ledger and the movement log in
    /// lockstep, the way the real writers do. Operations the ledger cannot
    /// cover are skipped, mirroring an order that gets refused.
    pub fn apply_op(
        product_id: Uuid,
        batches: &mut Vec<StockBatch>,
        log: &mut Vec<StockMovement>,
        next_day: &mut u32,
        op: StockOp,
    ) {
        let before = ledger_stock(batches) as i32;
        match op {
            StockOp::Purchase(quantity) => {
                batches.push(active_batch(product_id, *next_day, quantity));
                *next_day = (*next_day % 28) + 1;
                log.push(movement(product_id, MovementKind::Added, quantity, before));
            }
            StockOp::Consume(quantity) => {
                let plan = plan_fifo(product_id, batches, quantity);
                if !plan.is_fulfilled() {
                    return;
                }
                apply_plan(batches, &plan).unwrap();
                let mut running = before;
                for entry in &plan.entries {
                    log.push(movement(
                        product_id,
                        MovementKind::Consumed,
                        -entry.quantity_taken,
                        running,
                    ));
                    running -= entry.quantity_taken;
                }
            }
            StockOp::WriteOff(quantity) => {
                let plan = plan_fifo(product_id, batches, quantity);
                if !plan.is_fulfilled() {
                    return;
                }
                apply_plan(batches, &plan).unwrap();
                let mut running = before;
                for entry in &plan.entries {
                    log.push(movement(
                        product_id,
                        MovementKind::Adjusted,
                        -entry.quantity_taken,
                        running,
                    ));
                    running -= entry.quantity_taken;
                }
            }
        }
    }

    /// Purchases and consumptions interleaved by hand stay consistent
    #[test]
    fn test_interleaved_operations() {
        let product = Uuid::new_v4();
        let mut batches = Vec::new();
        let mut log = Vec::new();
        let mut day = 1;

        let ops = [
            StockOp::Purchase(10),
            StockOp::Consume(4),
            StockOp::Purchase(5),
            StockOp::Consume(8),
            StockOp::WriteOff(2),
        ];
        for op in ops {
            apply_op(product, &mut batches, &mut log, &mut day, op);
        }

        assert_eq!(ledger_stock(&batches), 1);
        assert_eq!(replay_movements(&log), Ok(1));
    }

    /// A consumption spanning two batches writes one movement per batch,
    /// and the chain still holds
    #[test]
    fn test_consumption_spanning_batches() {
        let product = Uuid::new_v4();
        let mut batches = Vec::new();
        let mut log = Vec::new();
        let mut day = 1;

        apply_op(product, &mut batches, &mut log, &mut day, StockOp::Purchase(3));
        apply_op(product, &mut batches, &mut log, &mut day, StockOp::Purchase(4));
        apply_op(product, &mut batches, &mut log, &mut day, StockOp::Consume(5));

        assert_eq!(log.len(), 4);
        assert_eq!(log[2].quantity, -3);
        assert_eq!(log[3].quantity, -2);
        assert_eq!(replay_movements(&log), Ok(2));
        assert_eq!(ledger_stock(&batches), 2);
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

#[cfg(test)]
mod property_tests {
    use super::*;
    use crate::simulation::{apply_op, StockOp};
    use shared::validation::validate_batch;

    fn op_strategy() -> impl Strategy<Value = StockOp> {
        prop_oneof![
            (1i32..=20).prop_map(StockOp::Purchase),
            (1i32..=20).prop_map(StockOp::Consume),
            (1i32..=5).prop_map(StockOp::WriteOff),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// However operations interleave, the sum of active batch remainders
        /// always equals the replayed movement log
        #[test]
        fn prop_ledger_and_log_agree(ops in prop::collection::vec(op_strategy(), 1..30)) {
            let product = Uuid::new_v4();
            let mut batches = Vec::new();
            let mut log = Vec::new();
            let mut day = 1;

            for op in ops {
                apply_op(product, &mut batches, &mut log, &mut day, op);
            }

            let replayed = replay_movements(&log);
            prop_assert!(replayed.is_ok());
            prop_assert_eq!(replayed.unwrap() as i64, ledger_stock(&batches));
        }

        /// The simulation never leaves a batch in an invalid state
        #[test]
        fn prop_batches_stay_valid(ops in prop::collection::vec(op_strategy(), 1..30)) {
            let product = Uuid::new_v4();
            let mut batches = Vec::new();
            let mut log = Vec::new();
            let mut day = 1;

            for op in ops {
                apply_op(product, &mut batches, &mut log, &mut day, op);
            }

            for batch in &batches {
                prop_assert!(validate_batch(batch).is_ok());
            }
        }

        /// Stock levels recorded in the log never dip below zero
        #[test]
        fn prop_log_levels_non_negative(ops in prop::collection::vec(op_strategy(), 1..30)) {
            let product = Uuid::new_v4();
            let mut batches = Vec::new();
            let mut log = Vec::new();
            let mut day = 1;

            for op in ops {
                apply_op(product, &mut batches, &mut log, &mut day, op);
            }

            for row in &log {
                prop_assert!(row.stock_before >= 0);
                prop_assert!(row.stock_after >= 0);
            }
        }
    }
}
