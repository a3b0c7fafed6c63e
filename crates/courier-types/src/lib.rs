//! Common types module for the courier fulfillment system.
//!
//! This module defines the core data types shared by every courier crate:
//! the order aggregate and its status machine, the catalog snapshots read at
//! order creation, queue and notification payloads, and the HTTP API types.

/// API types for HTTP endpoints and request/response structures.
pub mod api;
/// Read-only snapshots of entities owned by the catalog services.
pub mod catalog;
/// Queue envelopes and realtime notification events.
pub mod events;
/// The order aggregate, its status machine and pricing breakdown.
pub mod order;
/// Registry trait for self-registering backend implementations.
pub mod registry;
/// Secret string wrapper for shared internal keys.
pub mod secret_string;
/// Storage namespaces for persisted records.
pub mod storage;
/// Small helpers used across crates.
pub mod utils;
/// Configuration validation types for backend-specific TOML tables.
pub mod validation;

pub use api::*;
pub use catalog::*;
pub use events::*;
pub use order::*;
pub use registry::ImplementationRegistry;
pub use secret_string::SecretString;
pub use storage::*;
pub use utils::{current_timestamp, truncate_id};
pub use validation::*;
