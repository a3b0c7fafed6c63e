//! Controllers for the order lifecycle.
//!
//! The lifecycle handler serves buyers and restaurant owners, the rider
//! handler serves the rider service, and the payment handler consumes
//! payment outcome events from the broker.

pub mod lifecycle;
pub mod payment;
pub mod rider;

pub use lifecycle::{LifecycleHandler, RiderProgress};
pub use payment::{PaymentHandler, Settlement};
pub use rider::RiderHandler;

use courier_types::Order;

/// Full order body used as the payload of rider notifications.
pub(crate) fn order_payload(order: &Order) -> serde_json::Value {
	serde_json::to_value(order).unwrap_or_else(|e| {
		tracing::warn!(error = %e, "Failed to encode order payload");
		serde_json::json!({ "orderId": order.id, "status": order.status })
	})
}
