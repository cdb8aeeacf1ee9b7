//! Product catalog models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A product sold by the mart
///
/// The `stock` column is a denormalized aggregate maintained by the stock
/// reducer. The authoritative quantity is always the sum of active batch
/// remainders; `stock` exists so list screens never have to join batches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    /// Unique stock-keeping code (e.g., "MILK-UHT-1L")
    pub sku: String,
    /// Cached aggregate of active batch remainders, not authoritative
    pub stock: i32,
    pub minimum_stock_threshold: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn is_low_stock(&self) -> bool {
        self.stock <= self.minimum_stock_threshold
    }
}
