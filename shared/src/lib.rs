//! Shared types and domain logic for the Mart Operations platform
//!
//! This crate contains the models and the pure allocation/ledger logic shared
//! between the backend services and operational tooling. Nothing in here talks
//! to a database; everything is deterministic and testable in isolation.

pub mod allocation;
pub mod models;
pub mod types;
pub mod validation;

pub use allocation::*;
pub use models::*;
pub use types::*;
pub use validation::*;
