//! Sale record models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One (order line item, batch) pair actually consumed at fulfillment
///
/// Prices are copied from the batch at the moment of sale, so margin reports
/// stay correct even if later intakes arrive at different prices.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaleRecord {
    pub id: Uuid,
    pub order_id: Uuid,
    pub order_item_id: Uuid,
    pub product_id: Uuid,
    pub batch_id: Uuid,
    pub quantity: i32,
    pub selling_price: Decimal,
    pub purchase_price: Decimal,
    pub profit: Decimal,
    pub created_at: DateTime<Utc>,
}

impl SaleRecord {
    /// Per-row margin: `(selling - purchase) * quantity`
    pub fn compute_profit(selling_price: Decimal, purchase_price: Decimal, quantity: i32) -> Decimal {
        (selling_price - purchase_price) * Decimal::from(quantity)
    }
}
