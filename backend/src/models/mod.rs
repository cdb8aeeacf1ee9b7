//! Database models for the Mart Operations platform
//!
//! The backend persists exactly the shared domain models; services keep
//! their private row types next to the queries that read them.

pub use shared::models::*;
