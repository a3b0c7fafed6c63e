//! Event types exchanged with other services.
//!
//! Two families live here: JSON envelopes carried over the message broker
//! (`{type, data}`), and realtime notifications posted to the delivery
//! service (`{event, room, payload}`).

use crate::GeoLocation;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Envelope type of a successful payment.
pub const PAYMENT_SUCCESS: &str = "PAYMENT_SUCCESS";
/// Envelope type published when an order waits for a rider.
pub const ORDER_READY_FOR_RIDER: &str = "ORDER_READY_FOR_RIDER";

/// Generic queue message body.
///
/// `data` stays untyped until `event_type` has been matched, so unknown
/// event types can be acknowledged without failing to parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEnvelope<T = serde_json::Value> {
	#[serde(rename = "type")]
	pub event_type: String,
	pub data: T,
}

impl<T> QueueEnvelope<T> {
	pub fn new(event_type: impl Into<String>, data: T) -> Self {
		Self {
			event_type: event_type.into(),
			data,
		}
	}
}

/// Payload of a `PAYMENT_SUCCESS` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEventData {
	pub order_id: String,
}

/// Payload of an `ORDER_READY_FOR_RIDER` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RiderDispatchData {
	pub order_id: String,
	pub restaurant_id: String,
	pub location: GeoLocation,
}

/// Realtime event names.
pub mod notification_events {
	pub const ORDER_NEW: &str = "order:new";
	pub const ORDER_UPDATE: &str = "order:update";
	pub const ORDER_RIDER_ASSIGNED: &str = "order:rider_assigned";
}

/// Room a realtime event is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Room {
	Restaurant(String),
	User(String),
}

impl fmt::Display for Room {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Room::Restaurant(id) => write!(f, "restaurant:{}", id),
			Room::User(id) => write!(f, "user:{}", id),
		}
	}
}

/// Body posted to the realtime service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationEvent {
	pub event: String,
	pub room: String,
	pub payload: serde_json::Value,
}

impl NotificationEvent {
	pub fn new(event: &str, room: Room, payload: serde_json::Value) -> Self {
		Self {
			event: event.to_string(),
			room: room.to_string(),
			payload,
		}
	}
}
