//! Customer order models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted status of a customer order
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(OrderStatus::Pending),
            "confirmed" => Some(OrderStatus::Confirmed),
            "cancelled" => Some(OrderStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A customer order awaiting or past fulfillment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub status: OrderStatus,
    pub order_date: NaiveDate,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One product line on an order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
}

/// Progress of a single fulfillment attempt, in memory only
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentState {
    Unchecked,
    Feasible,
    Infeasible,
    Fulfilled,
    Failed,
}

impl FulfillmentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FulfillmentState::Unchecked => "unchecked",
            FulfillmentState::Feasible => "feasible",
            FulfillmentState::Infeasible => "infeasible",
            FulfillmentState::Fulfilled => "fulfilled",
            FulfillmentState::Failed => "failed",
        }
    }

    /// Legal edges of the fulfillment state machine
    pub fn can_transition_to(&self, next: FulfillmentState) -> bool {
        matches!(
            (self, next),
            (FulfillmentState::Unchecked, FulfillmentState::Feasible)
                | (FulfillmentState::Unchecked, FulfillmentState::Infeasible)
                | (FulfillmentState::Feasible, FulfillmentState::Fulfilled)
                | (FulfillmentState::Feasible, FulfillmentState::Failed)
        )
    }

    /// Move to `next`, or report the illegal edge
    pub fn transition_to(self, next: FulfillmentState) -> Result<FulfillmentState, &'static str> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err("illegal fulfillment state transition")
        }
    }
}

impl std::fmt::Display for FulfillmentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
