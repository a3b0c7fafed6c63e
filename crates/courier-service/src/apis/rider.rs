//! Rider service endpoints.
//!
//! Called by the rider service with the internal key: claim a ready order,
//! look up the rider's active order and advance pickup and delivery.

use super::{api_error, required};
use courier_core::{CourierEngine, RiderContact};
use courier_types::{
	APIError, AssignRiderRequest, AssignRiderResponse, CurrentRiderQuery, Order,
	RiderStatusRequest, RiderStatusResponse,
};

pub async fn assign_rider(
	engine: &CourierEngine,
	request: AssignRiderRequest,
) -> Result<AssignRiderResponse, APIError> {
	let order_id = required(request.order_id, "orderId")?;
	let rider = RiderContact {
		rider_id: required(request.rider_id, "riderId")?,
		name: request.rider_name,
		phone: request.rider_phone,
	};

	let order = engine
		.riders()
		.claim_order(&order_id, rider)
		.await
		.map_err(api_error)?;
	Ok(AssignRiderResponse {
		message: "Rider Assigned Successfully".into(),
		success: true,
		order,
	})
}

pub async fn current_order(
	engine: &CourierEngine,
	query: CurrentRiderQuery,
) -> Result<Order, APIError> {
	let rider_id = required(query.rider_id, "riderId")?;
	engine
		.riders()
		.current_order(&rider_id)
		.await
		.map_err(api_error)
}

/// Advances pickup or delivery. An order outside the rider stages is
/// returned unchanged with `updated: false`.
pub async fn update_status(
	engine: &CourierEngine,
	request: RiderStatusRequest,
) -> Result<RiderStatusResponse, APIError> {
	let order_id = required(request.order_id, "orderId")?;
	let rider_id = request
		.rider_id
		.map(|id| id.trim().to_string())
		.filter(|id| !id.is_empty());

	let progress = engine
		.lifecycle()
		.rider_advance(&order_id, rider_id.as_deref())
		.await
		.map_err(api_error)?;

	let message = if progress.updated {
		"Order updated Successfully"
	} else {
		"Order status unchanged"
	};
	Ok(RiderStatusResponse {
		message: message.into(),
		updated: progress.updated,
		order: progress.order,
	})
}
