//! Core order lifecycle for the courier fulfillment system.
//!
//! This crate turns carts into priced orders, reconciles asynchronous payment
//! events, enforces the order status machine and lets riders claim ready
//! orders under a one-active-order-per-rider rule. All coordination state
//! lives in the store and every mutation is a conditional write, so HTTP
//! handlers and the payment consumer can run concurrently in any number of
//! processes.

pub mod builder;
pub mod catalog;
pub mod engine;
pub mod error;
pub mod geo;
pub mod handlers;
pub mod pricing;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

pub use builder::{BuilderError, CourierBuilder, CourierFactories};
pub use catalog::{Catalog, CatalogError, StorageCatalog};
pub use engine::{CourierEngine, EngineError};
pub use error::OrderError;
pub use handlers::{LifecycleHandler, PaymentHandler, RiderHandler, RiderProgress};
pub use pricing::{OrderPricer, PricingError};
pub use state::{OrderStore, RiderAssignments, RiderContact};
