//! Order aggregate types for the courier system.
//!
//! An [`Order`] is created from a buyer's cart, waits for a payment event,
//! and is then driven through its status machine by the restaurant and the
//! rider. Line items, fees and the delivery address are value snapshots taken
//! at creation time and are never re-read from the catalog afterwards.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The central order aggregate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
	/// Unique identifier, immutable once created.
	pub id: String,
	/// Buyer that placed the order.
	pub user_id: String,
	/// Restaurant that fulfils the order.
	pub restaurant_id: String,
	/// Restaurant name at creation time.
	pub restaurant_name: String,
	/// Rider holding the order, set atomically with the contact fields.
	pub rider_id: Option<String>,
	pub rider_name: Option<String>,
	pub rider_phone: Option<String>,
	/// Great-circle distance between restaurant and delivery address in km.
	pub distance: f64,
	/// Payout owed to the rider for this delivery.
	pub rider_amount: Decimal,
	pub items: Vec<OrderItem>,
	pub subtotal: Decimal,
	pub delivery_fee: Decimal,
	pub platform_fee: Decimal,
	pub total_amount: Decimal,
	/// Catalog address the delivery snapshot was taken from.
	pub address_id: String,
	pub delivery_address: DeliveryAddress,
	pub status: OrderStatus,
	pub payment_method: PaymentMethod,
	pub payment_status: PaymentStatus,
	/// Unix seconds after which an unpaid order is dropped. Only present
	/// while `payment_status` is pending.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub expires_at: Option<u64>,
	pub created_at: u64,
	pub updated_at: u64,
}

impl Order {
	/// Whether the order is still waiting for payment and its window has passed.
	pub fn is_payment_expired(&self, now: u64) -> bool {
		self.payment_status == PaymentStatus::Pending
			&& self.expires_at.is_some_and(|deadline| now >= deadline)
	}

	/// Whether `rider_id` currently holds this order in a non-terminal state.
	pub fn is_held_by(&self, rider_id: &str) -> bool {
		self.rider_id.as_deref() == Some(rider_id) && self.status.is_rider_held()
	}
}

/// A line item captured from the cart at creation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
	pub item_id: String,
	pub name: String,
	pub price: Decimal,
	pub quantity: u32,
}

/// Delivery target captured from the buyer's address at creation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryAddress {
	pub formatted_address: String,
	pub mobile: String,
	pub latitude: f64,
	pub longitude: f64,
}

/// Price breakdown of an order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderPricing {
	pub subtotal: Decimal,
	pub delivery_fee: Decimal,
	pub platform_fee: Decimal,
	pub total_amount: Decimal,
	pub rider_amount: Decimal,
	pub distance: f64,
}

/// Fulfillment status of an order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
	Placed,
	Accepted,
	Preparing,
	ReadyForRider,
	RiderAssigned,
	PickedUp,
	Delivered,
	Cancelled,
}

/// The party attempting a status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
	/// Restaurant owner preparing the order.
	Restaurant,
	/// Rider claiming or carrying the order.
	Rider,
	/// Payment reconciliation re-affirming the initial status.
	Payment,
}

impl OrderStatus {
	/// Statuses a restaurant may request through the advance entry point.
	pub const RESTAURANT_TARGETS: [OrderStatus; 3] = [
		OrderStatus::Accepted,
		OrderStatus::Preparing,
		OrderStatus::ReadyForRider,
	];

	/// Position of the status along the forward path. `Cancelled` sits
	/// outside the path and has no rank.
	fn rank(self) -> Option<u8> {
		match self {
			OrderStatus::Placed => Some(0),
			OrderStatus::Accepted => Some(1),
			OrderStatus::Preparing => Some(2),
			OrderStatus::ReadyForRider => Some(3),
			OrderStatus::RiderAssigned => Some(4),
			OrderStatus::PickedUp => Some(5),
			OrderStatus::Delivered => Some(6),
			OrderStatus::Cancelled => None,
		}
	}

	/// Terminal statuses are never left.
	pub fn is_terminal(self) -> bool {
		matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
	}

	/// Statuses in which a rider holds the order and may not claim another.
	pub fn is_rider_held(self) -> bool {
		matches!(self, OrderStatus::RiderAssigned | OrderStatus::PickedUp)
	}

	/// Statuses that require an assigned rider.
	pub fn requires_rider(self) -> bool {
		matches!(
			self,
			OrderStatus::RiderAssigned | OrderStatus::PickedUp | OrderStatus::Delivered
		)
	}

	/// The single next status of the rider ratchet, if any.
	pub fn rider_next(self) -> Option<OrderStatus> {
		match self {
			OrderStatus::RiderAssigned => Some(OrderStatus::PickedUp),
			OrderStatus::PickedUp => Some(OrderStatus::Delivered),
			_ => None,
		}
	}

	/// Total transition table: whether `actor` may move an order from `from` to `to`.
	pub fn allowed(from: OrderStatus, to: OrderStatus, actor: Actor) -> bool {
		if from.is_terminal() || to == OrderStatus::Cancelled {
			return false;
		}
		match actor {
			Actor::Restaurant => {
				let forward = match (from.rank(), to.rank()) {
					(Some(a), Some(b)) => b > a,
					_ => false,
				};
				forward
					&& matches!(
						from,
						OrderStatus::Placed | OrderStatus::Accepted | OrderStatus::Preparing
					) && Self::RESTAURANT_TARGETS.contains(&to)
			}
			Actor::Rider => matches!(
				(from, to),
				(OrderStatus::ReadyForRider, OrderStatus::RiderAssigned)
					| (OrderStatus::RiderAssigned, OrderStatus::PickedUp)
					| (OrderStatus::PickedUp, OrderStatus::Delivered)
			),
			Actor::Payment => from == OrderStatus::Placed && to == OrderStatus::Placed,
		}
	}

	pub fn as_str(self) -> &'static str {
		match self {
			OrderStatus::Placed => "placed",
			OrderStatus::Accepted => "accepted",
			OrderStatus::Preparing => "preparing",
			OrderStatus::ReadyForRider => "ready_for_rider",
			OrderStatus::RiderAssigned => "rider_assigned",
			OrderStatus::PickedUp => "picked_up",
			OrderStatus::Delivered => "delivered",
			OrderStatus::Cancelled => "cancelled",
		}
	}

	/// Returns an iterator over all statuses.
	pub fn all() -> impl Iterator<Item = Self> {
		[
			Self::Placed,
			Self::Accepted,
			Self::Preparing,
			Self::ReadyForRider,
			Self::RiderAssigned,
			Self::PickedUp,
			Self::Delivered,
			Self::Cancelled,
		]
		.into_iter()
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for OrderStatus {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::all()
			.find(|status| status.as_str() == s)
			.ok_or_else(|| format!("unknown order status '{}'", s))
	}
}

/// Payment state of an order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
	Pending,
	Paid,
	Failed,
}

impl fmt::Display for PaymentStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			PaymentStatus::Pending => write!(f, "pending"),
			PaymentStatus::Paid => write!(f, "paid"),
			PaymentStatus::Failed => write!(f, "failed"),
		}
	}
}

/// Payment gateway chosen by the buyer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
	Razorpay,
	Stripe,
}

impl FromStr for PaymentMethod {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"razorpay" => Ok(PaymentMethod::Razorpay),
			"stripe" => Ok(PaymentMethod::Stripe),
			other => Err(format!("unsupported payment method '{}'", other)),
		}
	}
}
