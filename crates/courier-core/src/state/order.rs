//! Order store with atomic conditional updates.
//!
//! Orders are created pending payment with a time-to-live equal to the
//! payment window, so an unpaid order disappears on its own. Confirming the
//! payment rewrites the record without expiry. Each status change re-checks
//! its precondition against the stored value inside a compare-and-swap, and
//! a caller whose precondition fails gets a definitive [`Rejection`].

use courier_storage::{StorageError, StorageService};
use courier_types::{
	current_timestamp, truncate_id, Actor, Order, OrderStatus, PaymentStatus, StorageKey,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during order persistence.
#[derive(Debug, Error)]
pub enum OrderStoreError {
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Contention error: {0}")]
	Contention(String),
	/// Stored data is unreadable or an id collided.
	#[error("Integrity error: {0}")]
	Integrity(String),
}

impl From<StorageError> for OrderStoreError {
	fn from(err: StorageError) -> Self {
		match err {
			StorageError::Contention(msg) => OrderStoreError::Contention(msg),
			StorageError::Serialization(msg) => OrderStoreError::Integrity(msg),
			other => OrderStoreError::Storage(other.to_string()),
		}
	}
}

/// Why a conditional update did not apply.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
	/// Absent, or pending past its payment window.
	NotFound,
	AlreadyPaid,
	NotPaid,
	/// The order belongs to another restaurant.
	NotOwner,
	/// The order is not held by the acting rider.
	NotHolder,
	AlreadyClaimed,
	InvalidTransition { from: OrderStatus, to: OrderStatus },
	/// The rider ratchet has no step from this status.
	NoRiderStep { status: OrderStatus },
}

/// Result of a conditional update.
#[derive(Debug)]
pub enum Outcome {
	Applied(Order),
	Rejected(Rejection),
}

/// Rider identity and contact details written on claim.
#[derive(Debug, Clone)]
pub struct RiderContact {
	pub rider_id: String,
	pub name: Option<String>,
	pub phone: Option<String>,
}

const ORDERS: &str = StorageKey::Orders.as_str();

/// Paid orders never expire.
const PERMANENT: Option<Duration> = Some(Duration::ZERO);

/// Persistent order entity and its conditional operations.
pub struct OrderStore {
	storage: Arc<StorageService>,
	payment_window: Duration,
}

impl OrderStore {
	pub fn new(storage: Arc<StorageService>, payment_window: Duration) -> Self {
		Self {
			storage,
			payment_window,
		}
	}

	/// Inserts a new order as `placed` and pending payment, expiring after
	/// the payment window.
	pub async fn create(&self, mut order: Order) -> Result<Order, OrderStoreError> {
		let now = current_timestamp();
		order.status = OrderStatus::Placed;
		order.payment_status = PaymentStatus::Pending;
		order.rider_id = None;
		order.rider_name = None;
		order.rider_phone = None;
		order.expires_at = Some(now.saturating_add(self.payment_window.as_secs()));
		order.created_at = now;
		order.updated_at = now;

		let inserted = self
			.storage
			.insert_if_absent(ORDERS, &order.id, &order, Some(self.payment_window))
			.await?;
		if !inserted {
			return Err(OrderStoreError::Integrity(format!(
				"order id {} already in use",
				order.id
			)));
		}
		tracing::debug!(order_id = %truncate_id(&order.id), "Stored pending order");
		Ok(order)
	}

	/// Returns a live order. Pending orders past their window count as absent.
	pub async fn get(&self, order_id: &str) -> Result<Option<Order>, OrderStoreError> {
		match self.storage.retrieve::<Order>(ORDERS, order_id).await {
			Ok(order) if order.is_payment_expired(current_timestamp()) => Ok(None),
			Ok(order) => Ok(Some(order)),
			Err(StorageError::NotFound) => Ok(None),
			Err(e) => Err(e.into()),
		}
	}

	/// Confirms payment. Returns the updated order, or `None` when the order
	/// was already paid, has expired, or never existed.
	pub async fn mark_paid(&self, order_id: &str) -> Result<Option<Order>, OrderStoreError> {
		let outcome = self
			.apply(order_id, |order| {
				if order.payment_status == PaymentStatus::Paid {
					return Err(Rejection::AlreadyPaid);
				}
				if !OrderStatus::allowed(order.status, OrderStatus::Placed, Actor::Payment) {
					return Err(Rejection::InvalidTransition {
						from: order.status,
						to: OrderStatus::Placed,
					});
				}
				order.payment_status = PaymentStatus::Paid;
				order.status = OrderStatus::Placed;
				order.expires_at = None;
				Ok(())
			})
			.await?;

		match outcome {
			Outcome::Applied(order) => Ok(Some(order)),
			Outcome::Rejected(reason) => {
				tracing::debug!(order_id = %truncate_id(order_id), ?reason, "Payment not applied");
				Ok(None)
			},
		}
	}

	/// Moves a paid order of `restaurant_id` to `to` if the restaurant may
	/// make that move from the current status.
	pub async fn transition_status(
		&self,
		order_id: &str,
		restaurant_id: &str,
		to: OrderStatus,
	) -> Result<Outcome, OrderStoreError> {
		self.apply(order_id, |order| {
			if order.restaurant_id != restaurant_id {
				return Err(Rejection::NotOwner);
			}
			if order.payment_status != PaymentStatus::Paid {
				return Err(Rejection::NotPaid);
			}
			if !OrderStatus::allowed(order.status, to, Actor::Restaurant) {
				return Err(Rejection::InvalidTransition {
					from: order.status,
					to,
				});
			}
			order.status = to;
			Ok(())
		})
		.await
	}

	/// Assigns an unclaimed, paid, ready order to a rider.
	pub async fn claim_for_rider(
		&self,
		order_id: &str,
		rider: &RiderContact,
	) -> Result<Outcome, OrderStoreError> {
		self.apply(order_id, |order| {
			if order.rider_id.is_some() {
				return Err(Rejection::AlreadyClaimed);
			}
			if order.payment_status != PaymentStatus::Paid {
				return Err(Rejection::NotPaid);
			}
			if !OrderStatus::allowed(order.status, OrderStatus::RiderAssigned, Actor::Rider) {
				return Err(Rejection::InvalidTransition {
					from: order.status,
					to: OrderStatus::RiderAssigned,
				});
			}
			order.rider_id = Some(rider.rider_id.clone());
			order.rider_name = rider.name.clone();
			order.rider_phone = rider.phone.clone();
			order.status = OrderStatus::RiderAssigned;
			Ok(())
		})
		.await
	}

	/// Advances the rider ratchet by one step. When `rider_id` is given the
	/// order must be held by that rider.
	pub async fn rider_advance(
		&self,
		order_id: &str,
		rider_id: Option<&str>,
	) -> Result<Outcome, OrderStoreError> {
		self.apply(order_id, |order| {
			if let Some(rider_id) = rider_id {
				if order.rider_id.as_deref() != Some(rider_id) {
					return Err(Rejection::NotHolder);
				}
			}
			let next = order.status.rider_next().ok_or(Rejection::NoRiderStep {
				status: order.status,
			})?;
			if !OrderStatus::allowed(order.status, next, Actor::Rider) {
				return Err(Rejection::InvalidTransition {
					from: order.status,
					to: next,
				});
			}
			order.status = next;
			Ok(())
		})
		.await
	}

	/// Paid orders placed by `user_id`, newest first.
	pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Order>, OrderStoreError> {
		self.list_paid(|order| order.user_id == user_id, None).await
	}

	/// Paid orders of `restaurant_id`, newest first, at most `limit` when
	/// `limit` is positive.
	pub async fn list_for_restaurant(
		&self,
		restaurant_id: &str,
		limit: Option<usize>,
	) -> Result<Vec<Order>, OrderStoreError> {
		self.list_paid(|order| order.restaurant_id == restaurant_id, limit)
			.await
	}

	async fn list_paid<F>(&self, filter: F, limit: Option<usize>) -> Result<Vec<Order>, OrderStoreError>
	where
		F: Fn(&Order) -> bool,
	{
		let mut orders: Vec<Order> = self
			.storage
			.list::<Order>(ORDERS)
			.await?
			.into_iter()
			.filter(|order| order.payment_status == PaymentStatus::Paid && filter(order))
			.collect();
		orders.sort_by(|a, b| {
			b.created_at
				.cmp(&a.created_at)
				.then_with(|| b.id.cmp(&a.id))
		});
		if let Some(limit) = limit.filter(|limit| *limit > 0) {
			orders.truncate(limit);
		}
		Ok(orders)
	}

	/// Runs `check` against the stored order inside a compare-and-swap and
	/// persists the order if it returns `Ok`.
	async fn apply<F>(&self, order_id: &str, mut check: F) -> Result<Outcome, OrderStoreError>
	where
		F: FnMut(&mut Order) -> Result<(), Rejection> + Send,
	{
		let now = current_timestamp();
		let mut rejection = None;
		let result = self
			.storage
			.update_if(ORDERS, order_id, PERMANENT, |order: &mut Order| {
				if order.is_payment_expired(now) {
					rejection = Some(Rejection::NotFound);
					return false;
				}
				match check(order) {
					Ok(()) => {
						order.updated_at = now;
						true
					},
					Err(reason) => {
						rejection = Some(reason);
						false
					},
				}
			})
			.await;

		match result {
			Ok(Some(order)) => Ok(Outcome::Applied(order)),
			Ok(None) => Ok(Outcome::Rejected(rejection.unwrap_or(Rejection::NotFound))),
			Err(StorageError::NotFound) => Ok(Outcome::Rejected(Rejection::NotFound)),
			Err(e) => Err(e.into()),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{memory_storage, sample_order};

	fn store() -> OrderStore {
		OrderStore::new(memory_storage(), Duration::from_secs(15 * 60))
	}

	fn rider(id: &str) -> RiderContact {
		RiderContact {
			rider_id: id.to_string(),
			name: Some(format!("Rider {}", id)),
			phone: Some("9000000000".into()),
		}
	}

	async fn paid_at(store: &OrderStore, id: &str, status: OrderStatus) -> Order {
		store.create(sample_order(id, "u-1", "r-1")).await.unwrap();
		let order = store.mark_paid(id).await.unwrap().unwrap();
		if status == OrderStatus::Placed {
			return order;
		}
		match store.transition_status(id, "r-1", status).await.unwrap() {
			Outcome::Applied(order) => order,
			Outcome::Rejected(reason) => panic!("setup transition rejected: {:?}", reason),
		}
	}

	#[tokio::test]
	async fn test_create_sets_pending_window() {
		let store = store();
		let order = store.create(sample_order("o-1", "u-1", "r-1")).await.unwrap();
		assert_eq!(order.status, OrderStatus::Placed);
		assert_eq!(order.payment_status, PaymentStatus::Pending);
		assert_eq!(order.expires_at, Some(order.created_at + 15 * 60));
		assert_eq!(store.get("o-1").await.unwrap().unwrap(), order);
	}

	#[tokio::test]
	async fn test_mark_paid_is_idempotent() {
		let store = store();
		store.create(sample_order("o-1", "u-1", "r-1")).await.unwrap();

		let paid = store.mark_paid("o-1").await.unwrap().unwrap();
		assert_eq!(paid.payment_status, PaymentStatus::Paid);
		assert_eq!(paid.status, OrderStatus::Placed);
		assert_eq!(paid.expires_at, None);

		assert!(store.mark_paid("o-1").await.unwrap().is_none());
		assert!(store.mark_paid("missing").await.unwrap().is_none());
	}

	#[tokio::test(start_paused = true)]
	async fn test_unpaid_order_expires_and_paid_order_stays() {
		let store = store();
		store.create(sample_order("o-unpaid", "u-1", "r-1")).await.unwrap();
		store.create(sample_order("o-paid", "u-1", "r-1")).await.unwrap();
		store.mark_paid("o-paid").await.unwrap().unwrap();

		tokio::time::advance(Duration::from_secs(16 * 60)).await;

		assert!(store.get("o-unpaid").await.unwrap().is_none());
		assert!(store.mark_paid("o-unpaid").await.unwrap().is_none());
		assert!(store.get("o-paid").await.unwrap().is_some());
	}

	#[tokio::test]
	async fn test_transition_requires_payment_and_owner() {
		let store = store();
		store.create(sample_order("o-1", "u-1", "r-1")).await.unwrap();

		let outcome = store
			.transition_status("o-1", "r-1", OrderStatus::Accepted)
			.await
			.unwrap();
		assert!(matches!(outcome, Outcome::Rejected(Rejection::NotPaid)));

		store.mark_paid("o-1").await.unwrap();
		let outcome = store
			.transition_status("o-1", "r-2", OrderStatus::Accepted)
			.await
			.unwrap();
		assert!(matches!(outcome, Outcome::Rejected(Rejection::NotOwner)));

		let outcome = store
			.transition_status("o-1", "r-1", OrderStatus::Preparing)
			.await
			.unwrap();
		assert!(matches!(outcome, Outcome::Applied(ref o) if o.status == OrderStatus::Preparing));

		let outcome = store
			.transition_status("o-1", "r-1", OrderStatus::Accepted)
			.await
			.unwrap();
		assert!(matches!(
			outcome,
			Outcome::Rejected(Rejection::InvalidTransition {
				from: OrderStatus::Preparing,
				to: OrderStatus::Accepted
			})
		));
	}

	#[tokio::test]
	async fn test_claim_requires_ready_order() {
		let store = store();
		paid_at(&store, "o-1", OrderStatus::Preparing).await;

		let outcome = store.claim_for_rider("o-1", &rider("d-1")).await.unwrap();
		assert!(matches!(
			outcome,
			Outcome::Rejected(Rejection::InvalidTransition { .. })
		));

		store
			.transition_status("o-1", "r-1", OrderStatus::ReadyForRider)
			.await
			.unwrap();
		let outcome = store.claim_for_rider("o-1", &rider("d-1")).await.unwrap();
		let Outcome::Applied(order) = outcome else {
			panic!("claim should apply");
		};
		assert_eq!(order.rider_id.as_deref(), Some("d-1"));
		assert_eq!(order.rider_name.as_deref(), Some("Rider d-1"));
		assert_eq!(order.status, OrderStatus::RiderAssigned);

		let outcome = store.claim_for_rider("o-1", &rider("d-2")).await.unwrap();
		assert!(matches!(outcome, Outcome::Rejected(Rejection::AlreadyClaimed)));
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn test_concurrent_claims_have_one_winner() {
		let store = Arc::new(store());
		paid_at(&store, "o-1", OrderStatus::ReadyForRider).await;

		let mut tasks = Vec::new();
		for i in 0..8 {
			let store = store.clone();
			tasks.push(tokio::spawn(async move {
				store
					.claim_for_rider("o-1", &rider(&format!("d-{}", i)))
					.await
					.unwrap()
			}));
		}

		let mut winners = 0;
		for task in tasks {
			if let Outcome::Applied(_) = task.await.unwrap() {
				winners += 1;
			}
		}
		assert_eq!(winners, 1);
	}

	#[tokio::test]
	async fn test_rider_ratchet() {
		let store = store();
		paid_at(&store, "o-1", OrderStatus::ReadyForRider).await;

		let outcome = store.rider_advance("o-1", None).await.unwrap();
		assert!(matches!(
			outcome,
			Outcome::Rejected(Rejection::NoRiderStep {
				status: OrderStatus::ReadyForRider
			})
		));

		store.claim_for_rider("o-1", &rider("d-1")).await.unwrap();
		let outcome = store.rider_advance("o-1", Some("d-2")).await.unwrap();
		assert!(matches!(outcome, Outcome::Rejected(Rejection::NotHolder)));

		for expected in [OrderStatus::PickedUp, OrderStatus::Delivered] {
			let Outcome::Applied(order) = store.rider_advance("o-1", Some("d-1")).await.unwrap()
			else {
				panic!("ratchet should advance");
			};
			assert_eq!(order.status, expected);
		}

		let outcome = store.rider_advance("o-1", Some("d-1")).await.unwrap();
		assert!(matches!(outcome, Outcome::Rejected(Rejection::NoRiderStep { .. })));
	}

	#[tokio::test]
	async fn test_lists_only_paid_newest_first() {
		let store = store();
		for (id, user) in [("o-1", "u-1"), ("o-2", "u-1"), ("o-3", "u-2")] {
			store.create(sample_order(id, user, "r-1")).await.unwrap();
		}
		store.mark_paid("o-1").await.unwrap();
		store.mark_paid("o-3").await.unwrap();

		let mine = store.list_for_user("u-1").await.unwrap();
		assert_eq!(mine.len(), 1);
		assert_eq!(mine[0].id, "o-1");

		let all = store.list_for_restaurant("r-1", None).await.unwrap();
		assert_eq!(all.len(), 2);
		let limited = store.list_for_restaurant("r-1", Some(1)).await.unwrap();
		assert_eq!(limited.len(), 1);
		assert_eq!(limited[0].id, all[0].id);
		assert_eq!(store.list_for_restaurant("r-1", Some(0)).await.unwrap().len(), 2);
	}
}
