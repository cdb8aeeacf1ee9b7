//! Common types used across the platform

use serde::{Deserialize, Serialize};

/// Date range for queries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateRange {
    pub start: chrono::NaiveDate,
    pub end: chrono::NaiveDate,
}

impl DateRange {
    pub fn new(start: chrono::NaiveDate, end: chrono::NaiveDate) -> Self {
        Self { start, end }
    }

    /// Inclusive on both ends
    pub fn contains(&self, date: chrono::NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}
