//! Persistent order state.
//!
//! Every mutation of an order or a rider hold is a single conditional write
//! against the store. Nothing here reads a record and then writes it back
//! unconditionally.

pub mod assignment;
pub mod order;

pub use assignment::{HoldOutcome, RiderAssignments, RiderHold};
pub use order::{OrderStore, OrderStoreError, Outcome, Rejection, RiderContact};
