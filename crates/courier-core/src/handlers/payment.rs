//! Payment outcome consumer.
//!
//! Reconciles `PAYMENT_SUCCESS` events into the order store. The broker
//! delivers at least once; `mark_paid` only applies to an unpaid order, so a
//! duplicate event is acknowledged without a second notification. A message
//! is settled only after reconciliation has finished.

use crate::error::OrderError;
use crate::state::OrderStore;
use courier_notify::NotificationService;
use courier_queue::Delivery;
use courier_types::{
	notification_events, truncate_id, PaymentEventData, QueueEnvelope, Room, PAYMENT_SUCCESS,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// How a delivery was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
	Acked,
	/// Unreadable message, dropped without requeue.
	Rejected,
	/// Processing failed, handed back for redelivery.
	Requeued,
}

/// Handler for payment outcome events.
pub struct PaymentHandler {
	orders: Arc<OrderStore>,
	notifier: Arc<NotificationService>,
}

impl PaymentHandler {
	pub fn new(orders: Arc<OrderStore>, notifier: Arc<NotificationService>) -> Self {
		Self { orders, notifier }
	}

	/// Processes one delivery and settles it with the broker.
	pub async fn handle(&self, delivery: Delivery) -> Settlement {
		let settlement = self.process(&delivery.payload, delivery.redelivered).await;
		let result = match settlement {
			Settlement::Acked => delivery.ack().await,
			Settlement::Rejected => delivery.nack(false).await,
			Settlement::Requeued => delivery.nack(true).await,
		};
		if let Err(e) = result {
			warn!(?settlement, error = %e, "Failed to settle payment event");
		}
		settlement
	}

	async fn process(&self, payload: &[u8], redelivered: bool) -> Settlement {
		let envelope: QueueEnvelope = match serde_json::from_slice(payload) {
			Ok(envelope) => envelope,
			Err(e) => {
				warn!(error = %e, "Dropping unreadable payment event");
				return Settlement::Rejected;
			},
		};
		if envelope.event_type != PAYMENT_SUCCESS {
			debug!(event_type = %envelope.event_type, "Ignoring payment event");
			return Settlement::Acked;
		}
		let data: PaymentEventData = match serde_json::from_value(envelope.data) {
			Ok(data) => data,
			Err(e) => {
				warn!(error = %e, "Dropping payment event without order id");
				return Settlement::Rejected;
			},
		};

		match self.reconcile(&data.order_id).await {
			Ok(_) => Settlement::Acked,
			Err(e) => {
				error!(
					order_id = %truncate_id(&data.order_id),
					redelivered,
					error = %e,
					"Failed to reconcile payment, requeueing"
				);
				Settlement::Requeued
			},
		}
	}

	/// Marks the order paid and tells its restaurant. Returns whether the
	/// payment was applied by this call.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn reconcile(&self, order_id: &str) -> Result<bool, OrderError> {
		let Some(order) = self.orders.mark_paid(order_id).await? else {
			info!("Payment already applied or order gone");
			return Ok(false);
		};
		info!(total = %order.total_amount, "Payment confirmed");

		self.notifier
			.notify(
				notification_events::ORDER_NEW,
				Room::Restaurant(order.restaurant_id.clone()),
				json!({ "orderId": order.id }),
			)
			.await;
		Ok(true)
	}
}
