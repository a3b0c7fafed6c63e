//! API types for the courier HTTP API.
//!
//! Request and response bodies use camelCase field names to stay compatible
//! with the gateway and the payment and rider services that call us.

use crate::Order;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Body of `POST /api/order/new`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
	pub address_id: Option<String>,
	pub payment_method: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderResponse {
	pub message: String,
	pub order_id: String,
	pub amount: Decimal,
}

/// Order summary handed to the payment service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOrderResponse {
	pub order_id: String,
	pub amount: Decimal,
	pub currency: String,
}

/// Body of `PUT /api/order/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateOrderStatusRequest {
	pub status: String,
}

/// Response carrying a single order and a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderUpdateResponse {
	pub message: String,
	pub order: Order,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrdersResponse {
	pub success: bool,
	pub count: usize,
	pub orders: Vec<Order>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MyOrdersResponse {
	pub orders: Vec<Order>,
}

/// Query of `GET /api/order/restaurant/{restaurantId}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestaurantOrdersQuery {
	pub limit: Option<usize>,
}

/// Body of `PUT /api/order/assign/rider`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRiderRequest {
	pub order_id: Option<String>,
	pub rider_id: Option<String>,
	pub rider_name: Option<String>,
	pub rider_phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignRiderResponse {
	pub message: String,
	pub success: bool,
	pub order: Order,
}

/// Query of `GET /api/order/current/rider`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentRiderQuery {
	pub rider_id: Option<String>,
}

/// Body of `PUT /api/order/update/status/rider`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiderStatusRequest {
	pub order_id: Option<String>,
	#[serde(default)]
	pub rider_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiderStatusResponse {
	pub message: String,
	pub updated: bool,
	pub order: Order,
}

/// API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Error type/code
	pub error: String,
	/// Human-readable description
	pub message: String,
	/// Additional error context
	pub details: Option<serde_json::Value>,
	/// Suggested retry delay in seconds
	#[serde(rename = "retryAfter")]
	pub retry_after: Option<u64>,
}

/// Structured API error type with HTTP status mapping.
#[derive(Debug)]
pub enum APIError {
	/// Missing or malformed input (400)
	BadRequest { error_type: String, message: String },
	/// No verified identity on the request (401)
	Unauthorized { error_type: String, message: String },
	/// Identity present but not allowed (403)
	Forbidden { error_type: String, message: String },
	/// Entity absent (404)
	NotFound { error_type: String, message: String },
	/// Lost an atomic race, safe to retry against fresh state (409)
	Conflict { error_type: String, message: String },
	/// Business precondition failed (422)
	UnprocessableEntity { error_type: String, message: String },
	/// Dependency unavailable (503)
	ServiceUnavailable {
		error_type: String,
		message: String,
		retry_after: Option<u64>,
	},
	/// Internal server error (500)
	InternalServerError { error_type: String, message: String },
}

impl APIError {
	/// Get the HTTP status code for this error.
	pub fn status_code(&self) -> u16 {
		match self {
			APIError::BadRequest { .. } => 400,
			APIError::Unauthorized { .. } => 401,
			APIError::Forbidden { .. } => 403,
			APIError::NotFound { .. } => 404,
			APIError::Conflict { .. } => 409,
			APIError::UnprocessableEntity { .. } => 422,
			APIError::ServiceUnavailable { .. } => 503,
			APIError::InternalServerError { .. } => 500,
		}
	}

	fn parts(&self) -> (&str, &str) {
		match self {
			APIError::BadRequest { error_type, message }
			| APIError::Unauthorized { error_type, message }
			| APIError::Forbidden { error_type, message }
			| APIError::NotFound { error_type, message }
			| APIError::Conflict { error_type, message }
			| APIError::UnprocessableEntity { error_type, message }
			| APIError::ServiceUnavailable { error_type, message, .. }
			| APIError::InternalServerError { error_type, message } => {
				(error_type.as_str(), message.as_str())
			},
		}
	}

	/// Convert to ErrorResponse for JSON serialization.
	pub fn to_error_response(&self) -> ErrorResponse {
		let (error_type, message) = self.parts();
		let retry_after = match self {
			APIError::ServiceUnavailable { retry_after, .. } => *retry_after,
			_ => None,
		};
		ErrorResponse {
			error: error_type.to_string(),
			message: message.to_string(),
			details: None,
			retry_after,
		}
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let (error_type, message) = self.parts();
		write!(f, "{} ({}): {}", self.status_code(), error_type, message)
	}
}

impl std::error::Error for APIError {}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for APIError {
	fn into_response(self) -> axum::response::Response {
		use axum::{http::StatusCode, response::Json};

		let status =
			StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		(status, Json(self.to_error_response())).into_response()
	}
}
