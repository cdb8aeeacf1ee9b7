//! Business logic services for the Mart Operations inventory engine

pub mod allocation;
pub mod batches;
pub mod fulfillment;
pub mod intake;
pub mod movements;
pub mod products;
pub mod reducer;

pub use allocation::AllocatorService;
pub use batches::BatchLedgerService;
pub use fulfillment::FulfillmentService;
pub use intake::VendorPurchaseService;
pub use movements::MovementLogService;
pub use products::ProductService;
pub use reducer::StockReducer;
