//! Garage-isolated read model storage abstractions.

pub mod garage_store;

pub use garage_store::{GarageStore, InMemoryGarageStore};
