//! Ledger invariant checks for the Mart Operations platform
//!
//! The movement log is append-only, so the only way to keep it trustworthy is
//! to refuse bad rows at the door. These checks run before every insert and
//! again during reconciliation replay.

use crate::models::{BatchStatus, MovementKind, StockBatch, StockMovement};

// ============================================================================
// Movement Validations
// ============================================================================

/// Validate the sign rule for a movement quantity
///
/// `added` rows are strictly positive, `consumed` rows strictly negative,
/// `adjusted` rows may carry either sign. Zero is never a movement.
pub fn validate_movement_quantity(kind: MovementKind, quantity: i32) -> Result<(), &'static str> {
    if quantity == 0 {
        return Err("Movement quantity cannot be zero");
    }
    match kind {
        MovementKind::Added if quantity < 0 => Err("Added movements must be positive"),
        MovementKind::Consumed if quantity > 0 => Err("Consumed movements must be negative"),
        _ => Ok(()),
    }
}

/// Validate a full movement row before it is appended
pub fn validate_movement(
    kind: MovementKind,
    quantity: i32,
    stock_before: i32,
    stock_after: i32,
) -> Result<(), &'static str> {
    validate_movement_quantity(kind, quantity)?;
    if stock_before < 0 {
        return Err("Stock before a movement cannot be negative");
    }
    if stock_after < 0 {
        return Err("Stock after a movement cannot be negative");
    }
    if stock_after != stock_before + quantity {
        return Err("Stock after must equal stock before plus quantity");
    }
    Ok(())
}

// ============================================================================
// Batch Validations
// ============================================================================

/// Validate the quantity and status invariants of a batch row
pub fn validate_batch(batch: &StockBatch) -> Result<(), &'static str> {
    if batch.quantity_purchased <= 0 {
        return Err("Batch purchased quantity must be positive");
    }
    if batch.quantity_remaining < 0 {
        return Err("Batch remaining quantity cannot be negative");
    }
    if batch.quantity_remaining > batch.quantity_purchased {
        return Err("Batch remaining quantity cannot exceed purchased quantity");
    }
    match batch.status {
        BatchStatus::Active if batch.quantity_remaining == 0 => {
            Err("Active batch cannot have zero remaining")
        }
        BatchStatus::Exhausted if batch.quantity_remaining != 0 => {
            Err("Exhausted batch must have zero remaining")
        }
        _ => Ok(()),
    }
}

/// Authoritative stock for a product: the sum of active batch remainders
pub fn ledger_stock(batches: &[StockBatch]) -> i64 {
    batches
        .iter()
        .filter(|b| b.status == BatchStatus::Active)
        .map(|b| i64::from(b.quantity_remaining))
        .sum()
}

// ============================================================================
// Replay
// ============================================================================

/// Replay a product's full movement history and return the resulting stock.
///
/// The rows must be in chronological order and must form an unbroken chain:
/// the first row starts from zero and each row's `stock_before` equals the
/// previous row's `stock_after`. Any break means the log was tampered with or
/// a writer bypassed the ledger.
pub fn replay_movements(movements: &[StockMovement]) -> Result<i32, &'static str> {
    let mut running = 0i32;
    for movement in movements {
        validate_movement(
            movement.kind,
            movement.quantity,
            movement.stock_before,
            movement.stock_after,
        )?;
        if movement.stock_before != running {
            return Err("Movement log chain is broken");
        }
        running = movement.stock_after;
    }
    Ok(running)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    use super::*;
    use crate::models::MovementReference;

    fn test_movement(kind: MovementKind, quantity: i32, stock_before: i32) -> StockMovement {
        StockMovement {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            batch_id: None,
            kind,
            reference: MovementReference::Adjustment("test".to_string()),
            quantity,
            stock_before,
            stock_after: stock_before + quantity,
            created_at: Utc::now(),
        }
    }

    fn test_batch(remaining: i32, purchased: i32, status: BatchStatus) -> StockBatch {
        StockBatch {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            vendor_id: None,
            purchase_order_id: None,
            quantity_purchased: purchased,
            quantity_remaining: remaining,
            purchase_price: Decimal::new(500, 2),
            selling_price: Decimal::new(750, 2),
            batch_date: Utc::now().date_naive(),
            status,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    // ========================================================================
    // Movement Validation Tests
    // ========================================================================

    #[test]
    fn test_added_must_be_positive() {
        assert!(validate_movement_quantity(MovementKind::Added, 5).is_ok());
        assert!(validate_movement_quantity(MovementKind::Added, -5).is_err());
    }

    #[test]
    fn test_consumed_must_be_negative() {
        assert!(validate_movement_quantity(MovementKind::Consumed, -3).is_ok());
        assert!(validate_movement_quantity(MovementKind::Consumed, 3).is_err());
    }

    #[test]
    fn test_adjusted_takes_either_sign() {
        assert!(validate_movement_quantity(MovementKind::Adjusted, 4).is_ok());
        assert!(validate_movement_quantity(MovementKind::Adjusted, -4).is_ok());
    }

    #[test]
    fn test_zero_quantity_is_never_a_movement() {
        assert!(validate_movement_quantity(MovementKind::Added, 0).is_err());
        assert!(validate_movement_quantity(MovementKind::Consumed, 0).is_err());
        assert!(validate_movement_quantity(MovementKind::Adjusted, 0).is_err());
    }

    #[test]
    fn test_stock_after_must_match_arithmetic() {
        assert!(validate_movement(MovementKind::Added, 5, 10, 15).is_ok());
        assert!(validate_movement(MovementKind::Added, 5, 10, 14).is_err());
        assert!(validate_movement(MovementKind::Consumed, -5, 10, 5).is_ok());
        assert!(validate_movement(MovementKind::Consumed, -5, 10, 6).is_err());
    }

    #[test]
    fn test_stock_levels_cannot_be_negative() {
        assert!(validate_movement(MovementKind::Consumed, -5, 3, -2).is_err());
        assert!(validate_movement(MovementKind::Adjusted, 5, -1, 4).is_err());
    }

    // ========================================================================
    // Batch Validation Tests
    // ========================================================================

    #[test]
    fn test_valid_active_batch() {
        assert!(validate_batch(&test_batch(10, 20, BatchStatus::Active)).is_ok());
        assert!(validate_batch(&test_batch(20, 20, BatchStatus::Active)).is_ok());
    }

    #[test]
    fn test_exhausted_means_empty() {
        assert!(validate_batch(&test_batch(0, 20, BatchStatus::Exhausted)).is_ok());
        assert!(validate_batch(&test_batch(3, 20, BatchStatus::Exhausted)).is_err());
        assert!(validate_batch(&test_batch(0, 20, BatchStatus::Active)).is_err());
    }

    #[test]
    fn test_expired_batch_may_keep_remainder() {
        // Remaining units on an expired batch are waste, not sellable stock
        assert!(validate_batch(&test_batch(7, 20, BatchStatus::Expired)).is_ok());
        assert!(validate_batch(&test_batch(0, 20, BatchStatus::Expired)).is_ok());
    }

    #[test]
    fn test_remaining_bounded_by_purchased() {
        assert!(validate_batch(&test_batch(21, 20, BatchStatus::Active)).is_err());
        assert!(validate_batch(&test_batch(-1, 20, BatchStatus::Active)).is_err());
        assert!(validate_batch(&test_batch(5, 0, BatchStatus::Active)).is_err());
    }

    #[test]
    fn test_ledger_stock_counts_only_active_batches() {
        let batches = vec![
            test_batch(10, 20, BatchStatus::Active),
            test_batch(5, 5, BatchStatus::Active),
            test_batch(0, 8, BatchStatus::Exhausted),
            test_batch(7, 20, BatchStatus::Expired),
        ];
        assert_eq!(ledger_stock(&batches), 15);
    }

    // ========================================================================
    // Replay Tests
    // ========================================================================

    #[test]
    fn test_replay_empty_log_is_zero() {
        assert_eq!(replay_movements(&[]), Ok(0));
    }

    #[test]
    fn test_replay_follows_the_chain() {
        let movements = vec![
            test_movement(MovementKind::Added, 20, 0),
            test_movement(MovementKind::Consumed, -8, 20),
            test_movement(MovementKind::Added, 10, 12),
            test_movement(MovementKind::Adjusted, -2, 22),
        ];
        assert_eq!(replay_movements(&movements), Ok(20));
    }

    #[test]
    fn test_replay_rejects_broken_chain() {
        let movements = vec![
            test_movement(MovementKind::Added, 20, 0),
            // Previous row ended at 20, this one claims 25
            test_movement(MovementKind::Consumed, -8, 25),
        ];
        assert!(replay_movements(&movements).is_err());
    }

    #[test]
    fn test_replay_rejects_nonzero_start() {
        let movements = vec![test_movement(MovementKind::Added, 5, 3)];
        assert!(replay_movements(&movements).is_err());
    }

    #[test]
    fn test_replay_rejects_bad_row() {
        let mut movement = test_movement(MovementKind::Added, 5, 0);
        movement.stock_after = 99;
        assert!(replay_movements(&[movement]).is_err());
    }

    // ========================================================================
    // Property Tests
    // ========================================================================

    proptest! {
        #[test]
        fn replay_tracks_any_valid_history(deltas in proptest::collection::vec(-5i32..=10, 0..40)) {
            let mut running = 0i32;
            let mut movements = Vec::new();
            for delta in deltas {
                if delta == 0 || running + delta < 0 {
                    continue;
                }
                let kind = if delta > 0 {
                    MovementKind::Added
                } else {
                    MovementKind::Consumed
                };
                movements.push(test_movement(kind, delta, running));
                running += delta;
            }
            prop_assert_eq!(replay_movements(&movements), Ok(running));
        }

        #[test]
        fn corrupting_any_row_breaks_replay(
            len in 2usize..20,
            victim in 0usize..20,
        ) {
            let mut running = 0i32;
            let mut movements = Vec::new();
            for _ in 0..len {
                movements.push(test_movement(MovementKind::Added, 5, running));
                running += 5;
            }
            let victim = victim % len;
            movements[victim].quantity += 1;
            prop_assert!(replay_movements(&movements).is_err());
        }
    }
}
