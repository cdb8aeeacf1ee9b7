//! Mart Operations - inventory allocation and fulfillment engine
//!
//! The engine owns four things: FIFO allocation of demand onto stock batches,
//! atomic application of those allocations with oversell prevention, the
//! append-only stock movement log, and the denormalized per-product stock
//! cache. Everything is exposed as in-process services over a `PgPool`; there
//! is no network surface here.

pub mod config;
pub mod error;
pub mod models;
pub mod services;

pub use config::Config;
pub use error::{AppError, AppResult};
