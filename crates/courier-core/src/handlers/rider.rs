//! Rider assignment handler.
//!
//! A claim first takes the rider's hold, then claims the order with a
//! compare-and-swap. The hold makes "one active order per rider" atomic and
//! the order claim makes "one rider per order" atomic.

use crate::error::OrderError;
use crate::handlers::order_payload;
use crate::state::{HoldOutcome, OrderStore, Outcome, RiderAssignments, RiderContact};
use courier_notify::NotificationService;
use courier_types::{notification_events, truncate_id, Order, Room};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Handler for rider claims and rider lookups.
pub struct RiderHandler {
	orders: Arc<OrderStore>,
	assignments: Arc<RiderAssignments>,
	notifier: Arc<NotificationService>,
}

impl RiderHandler {
	pub fn new(
		orders: Arc<OrderStore>,
		assignments: Arc<RiderAssignments>,
		notifier: Arc<NotificationService>,
	) -> Self {
		Self {
			orders,
			assignments,
			notifier,
		}
	}

	/// Makes `rider` the exclusive holder of `order_id`.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id), rider_id = %truncate_id(&rider.rider_id)))]
	pub async fn claim_order(
		&self,
		order_id: &str,
		rider: RiderContact,
	) -> Result<Order, OrderError> {
		if order_id.is_empty() || rider.rider_id.is_empty() {
			return Err(OrderError::Validation(
				"order id and rider id are required".into(),
			));
		}

		match self.assignments.acquire(&rider.rider_id, order_id).await? {
			HoldOutcome::Acquired => {},
			HoldOutcome::Busy(active) => {
				info!(active_order = %truncate_id(&active), "Rider is busy");
				return Err(OrderError::PreconditionFailed(
					"rider already has an active order".into(),
				));
			},
		}

		let outcome = match self.orders.claim_for_rider(order_id, &rider).await {
			Ok(outcome) => outcome,
			Err(e) => {
				self.release(&rider.rider_id, order_id).await;
				return Err(e.into());
			},
		};
		let order = match outcome {
			Outcome::Applied(order) => order,
			Outcome::Rejected(reason) => {
				self.release(&rider.rider_id, order_id).await;
				info!(?reason, "Claim rejected");
				return Err(reason.into());
			},
		};
		info!("Rider assigned");

		let payload = order_payload(&order);
		self.notifier
			.notify(
				notification_events::ORDER_RIDER_ASSIGNED,
				Room::User(order.user_id.clone()),
				payload.clone(),
			)
			.await;
		self.notifier
			.notify(
				notification_events::ORDER_RIDER_ASSIGNED,
				Room::Restaurant(order.restaurant_id.clone()),
				payload,
			)
			.await;

		Ok(order)
	}

	/// The order the rider currently carries.
	pub async fn current_order(&self, rider_id: &str) -> Result<Order, OrderError> {
		if rider_id.is_empty() {
			return Err(OrderError::Validation("rider id is required".into()));
		}
		self.assignments
			.current_order(rider_id)
			.await?
			.ok_or_else(|| OrderError::NotFound("order not found".into()))
	}

	async fn release(&self, rider_id: &str, order_id: &str) {
		if let Err(e) = self.assignments.release(rider_id, order_id).await {
			warn!(error = %e, "Failed to release rider hold");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::Harness;
	use courier_types::OrderStatus;

	fn contact(id: &str) -> RiderContact {
		RiderContact {
			rider_id: id.into(),
			name: Some("Ravi".into()),
			phone: Some("9111111111".into()),
		}
	}

	#[tokio::test]
	async fn test_claim_notifies_buyer_and_restaurant() {
		let harness = Harness::new(true).await;
		let order = harness.ready_order().await;

		let claimed = harness
			.riders
			.claim_order(&order.id, contact("d-1"))
			.await
			.unwrap();
		assert_eq!(claimed.status, OrderStatus::RiderAssigned);
		assert_eq!(claimed.rider_phone.as_deref(), Some("9111111111"));

		let events = harness
			.notifier
			.events_named(notification_events::ORDER_RIDER_ASSIGNED)
			.await;
		let rooms: Vec<_> = events.iter().map(|e| e.room.as_str()).collect();
		assert_eq!(rooms, vec!["user:u-1", "restaurant:r-1"]);
		assert_eq!(events[0].payload["riderId"], "d-1");

		let current = harness.riders.current_order("d-1").await.unwrap();
		assert_eq!(current.id, order.id);
	}

	#[tokio::test]
	async fn test_rider_with_active_order_is_rejected() {
		let harness = Harness::new(true).await;
		let first = harness.claimed_order("d-1").await;
		let second = harness.ready_order().await;

		let result = harness.riders.claim_order(&second.id, contact("d-1")).await;
		assert!(matches!(
			result,
			Err(OrderError::PreconditionFailed(ref m)) if m == "rider already has an active order"
		));

		// The second order is still up for grabs and the first is untouched.
		let other = harness.riders.claim_order(&second.id, contact("d-2")).await;
		assert!(other.is_ok());
		assert_eq!(
			harness.riders.current_order("d-1").await.unwrap().id,
			first.id
		);
	}

	#[tokio::test]
	async fn test_taken_order_reports_conflict_and_frees_rider() {
		let harness = Harness::new(true).await;
		let taken = harness.claimed_order("d-1").await;
		let free = harness.ready_order().await;

		let result = harness.riders.claim_order(&taken.id, contact("d-2")).await;
		assert!(matches!(result, Err(OrderError::Conflict(ref m)) if m == "order already taken"));

		// The lost claim must not leave d-2 blocked.
		assert!(harness.riders.claim_order(&free.id, contact("d-2")).await.is_ok());
	}

	#[tokio::test]
	async fn test_retry_after_interrupted_claim_succeeds() {
		let harness = Harness::new(true).await;
		let order = harness.ready_order().await;
		// A dropped request can leave the hold without the order write.
		harness.assignments.acquire("d-1", &order.id).await.unwrap();

		let claimed = harness
			.riders
			.claim_order(&order.id, contact("d-1"))
			.await
			.unwrap();
		assert_eq!(claimed.status, OrderStatus::RiderAssigned);
		assert_eq!(
			harness.riders.current_order("d-1").await.unwrap().id,
			order.id
		);
	}

	#[tokio::test]
	async fn test_unready_order_cannot_be_claimed() {
		let harness = Harness::new(true).await;
		let order = harness.paid_order().await;

		let result = harness.riders.claim_order(&order.id, contact("d-1")).await;
		assert!(matches!(result, Err(OrderError::PreconditionFailed(_))));
		assert!(matches!(
			harness.riders.current_order("d-1").await,
			Err(OrderError::NotFound(_))
		));
		assert!(matches!(
			harness.riders.claim_order("missing", contact("d-1")).await,
			Err(OrderError::NotFound(_))
		));
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_concurrent_claims_one_success() {
		let harness = Harness::new(true).await;
		let order = harness.ready_order().await;
		let riders = harness.riders.clone();

		let mut tasks = Vec::new();
		for i in 0..6 {
			let riders = riders.clone();
			let order_id = order.id.clone();
			tasks.push(tokio::spawn(async move {
				riders
					.claim_order(&order_id, contact(&format!("d-{}", i)))
					.await
			}));
		}

		let mut successes = 0;
		for task in tasks {
			match task.await.unwrap() {
				Ok(_) => successes += 1,
				Err(e) => assert!(matches!(e, OrderError::Conflict(_)), "{:?}", e),
			}
		}
		assert_eq!(successes, 1);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_same_rider_racing_two_orders_gets_one() {
		let harness = Harness::new(true).await;
		let a = harness.ready_order().await;
		let b = harness.ready_order().await;

		let (ra, rb) = tokio::join!(
			harness.riders.claim_order(&a.id, contact("d-1")),
			harness.riders.claim_order(&b.id, contact("d-1")),
		);
		assert_eq!(ra.is_ok() as u8 + rb.is_ok() as u8, 1);
	}
}
