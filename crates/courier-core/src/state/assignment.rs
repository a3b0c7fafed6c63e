//! Rider hold index.
//!
//! `rider_assignments:<riderId>` names the one order a rider is working on.
//! A rider takes the hold with a create-if-absent write before claiming an
//! order, so two claims by the same rider cannot both get past this point.
//! The hold is released when the claim loses or the order is delivered.

use crate::state::{OrderStore, OrderStoreError};
use courier_storage::{Snapshot, StorageError, StorageService};
use courier_types::{current_timestamp, truncate_id, Order, OrderStatus, StorageKey};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const HOLDS: &str = StorageKey::RiderAssignments.as_str();

/// How long a hold may point at an order that is still unclaimed before it
/// is considered abandoned.
const CLAIM_GRACE_SECONDS: u64 = 60;

const MAX_ACQUIRE_ATTEMPTS: usize = 8;

/// Stored hold record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RiderHold {
	pub rider_id: String,
	pub order_id: String,
	/// Unix seconds at which the hold was taken.
	pub since: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum HoldOutcome {
	Acquired,
	/// The rider already holds the named order.
	Busy(String),
}

/// Per-rider single-active-order guard.
pub struct RiderAssignments {
	storage: Arc<StorageService>,
	orders: Arc<OrderStore>,
}

impl RiderAssignments {
	pub fn new(storage: Arc<StorageService>, orders: Arc<OrderStore>) -> Self {
		Self { storage, orders }
	}

	/// Takes the rider's hold for `order_id`. A hold on the same order is
	/// kept as is. A hold left behind by a finished or lost claim is replaced.
	pub async fn acquire(
		&self,
		rider_id: &str,
		order_id: &str,
	) -> Result<HoldOutcome, OrderStoreError> {
		let hold = RiderHold {
			rider_id: rider_id.to_string(),
			order_id: order_id.to_string(),
			since: current_timestamp(),
		};

		for _ in 0..MAX_ACQUIRE_ATTEMPTS {
			if self
				.storage
				.insert_if_absent(HOLDS, rider_id, &hold, Some(Duration::ZERO))
				.await?
			{
				return Ok(HoldOutcome::Acquired);
			}

			let current: Snapshot<RiderHold> =
				match self.storage.retrieve_snapshot(HOLDS, rider_id).await {
					Ok(snapshot) => snapshot,
					Err(StorageError::NotFound) => continue,
					Err(e) => return Err(e.into()),
				};

			// A retry after an interrupted claim finds its own hold.
			if current.value.order_id == order_id {
				return Ok(HoldOutcome::Acquired);
			}

			if !self.is_stale(&current.value, hold.since).await? {
				return Ok(HoldOutcome::Busy(current.value.order_id));
			}

			tracing::debug!(
				rider_id = %truncate_id(rider_id),
				stale_order = %truncate_id(&current.value.order_id),
				"Replacing stale rider hold"
			);
			if self
				.storage
				.swap(HOLDS, rider_id, Some(&current), Some(&hold), Some(Duration::ZERO))
				.await?
			{
				return Ok(HoldOutcome::Acquired);
			}
		}

		Err(OrderStoreError::Contention(format!(
			"rider hold for {} kept changing",
			rider_id
		)))
	}

	/// Drops the rider's hold if it still points at `order_id`.
	pub async fn release(&self, rider_id: &str, order_id: &str) -> Result<(), OrderStoreError> {
		let current: Snapshot<RiderHold> =
			match self.storage.retrieve_snapshot(HOLDS, rider_id).await {
				Ok(snapshot) => snapshot,
				Err(StorageError::NotFound) => return Ok(()),
				Err(e) => return Err(e.into()),
			};
		if current.value.order_id != order_id {
			return Ok(());
		}
		self.storage
			.swap(HOLDS, rider_id, Some(&current), None, None)
			.await?;
		Ok(())
	}

	/// The order the rider is currently carrying, if any.
	pub async fn current_order(&self, rider_id: &str) -> Result<Option<Order>, OrderStoreError> {
		let hold: RiderHold = match self.storage.retrieve(HOLDS, rider_id).await {
			Ok(hold) => hold,
			Err(StorageError::NotFound) => return Ok(None),
			Err(e) => return Err(e.into()),
		};
		Ok(self
			.orders
			.get(&hold.order_id)
			.await?
			.filter(|order| order.is_held_by(rider_id)))
	}

	async fn is_stale(&self, hold: &RiderHold, now: u64) -> Result<bool, OrderStoreError> {
		let Some(order) = self.orders.get(&hold.order_id).await? else {
			return Ok(true);
		};
		if order.is_held_by(&hold.rider_id) {
			return Ok(false);
		}
		// A claim may still be between taking the hold and writing the order.
		if order.rider_id.is_none() && order.status == OrderStatus::ReadyForRider {
			return Ok(now >= hold.since + CLAIM_GRACE_SECONDS);
		}
		Ok(true)
	}
}
