//! Domain models for the Mart Operations platform

mod allocation;
mod batch;
mod movement;
mod order;
mod product;
mod sale;

pub use allocation::*;
pub use batch::*;
pub use movement::*;
pub use order::*;
pub use product::*;
pub use sale::*;
