//! Buyer and restaurant order endpoints.
//!
//! Buyers create orders from their cart and read their own orders.
//! Restaurant owners list the paid orders of their restaurant and move them
//! through preparation. The payment service fetches the amount to charge.

use super::{api_error, required};
use crate::auth::{Identity, Role};
use courier_core::CourierEngine;
use courier_types::{
	APIError, CreateOrderRequest, CreateOrderResponse, MyOrdersResponse, Order,
	OrderUpdateResponse, OrdersResponse, PaymentOrderResponse, RestaurantOrdersQuery,
	UpdateOrderStatusRequest,
};
use tracing::debug;

/// Creates a pending order from the caller's cart.
pub async fn create_order(
	engine: &CourierEngine,
	identity: &Identity,
	request: CreateOrderRequest,
) -> Result<CreateOrderResponse, APIError> {
	let order = engine
		.lifecycle()
		.create_from_cart(&identity.user_id, &request)
		.await
		.map_err(api_error)?;

	Ok(CreateOrderResponse {
		message: "Order created successfully".into(),
		order_id: order.id,
		amount: order.total_amount,
	})
}

/// Paid orders of the caller.
pub async fn my_orders(
	engine: &CourierEngine,
	identity: &Identity,
) -> Result<MyOrdersResponse, APIError> {
	let orders = engine
		.lifecycle()
		.list_for_user(&identity.user_id)
		.await
		.map_err(api_error)?;
	Ok(MyOrdersResponse { orders })
}

pub async fn get_order(
	engine: &CourierEngine,
	identity: &Identity,
	order_id: &str,
) -> Result<Order, APIError> {
	engine
		.lifecycle()
		.get_for_user(order_id, &identity.user_id)
		.await
		.map_err(api_error)
}

/// Amount and currency for the payment service. Internal callers only.
pub async fn order_for_payment(
	engine: &CourierEngine,
	order_id: &str,
) -> Result<PaymentOrderResponse, APIError> {
	engine
		.lifecycle()
		.fetch_for_payment(order_id)
		.await
		.map_err(api_error)
}

/// Paid orders of a restaurant the caller owns.
pub async fn restaurant_orders(
	engine: &CourierEngine,
	identity: &Identity,
	restaurant_id: &str,
	query: RestaurantOrdersQuery,
) -> Result<OrdersResponse, APIError> {
	identity.require(Role::Seller)?;
	let restaurant_id = required(Some(restaurant_id.to_string()), "restaurant id")?;
	debug!(
		restaurant_id = %restaurant_id,
		claimed_restaurant = ?identity.restaurant_id,
		"Listing restaurant orders"
	);

	let orders = engine
		.lifecycle()
		.list_for_restaurant(&restaurant_id, &identity.user_id, query.limit)
		.await
		.map_err(api_error)?;
	Ok(OrdersResponse {
		success: true,
		count: orders.len(),
		orders,
	})
}

/// Moves an order to the requested preparation status.
pub async fn update_status(
	engine: &CourierEngine,
	identity: &Identity,
	order_id: &str,
	request: UpdateOrderStatusRequest,
) -> Result<OrderUpdateResponse, APIError> {
	identity.require(Role::Seller)?;
	let order = engine
		.lifecycle()
		.advance_status(order_id, &identity.user_id, &request.status)
		.await
		.map_err(api_error)?;

	Ok(OrderUpdateResponse {
		message: "order status updated successfully".into(),
		order,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::test_support::{engine_with_catalog, paid_order_id};
	use courier_types::OrderStatus;
	use rust_decimal::Decimal;

	fn buyer() -> Identity {
		Identity {
			user_id: "u-1".into(),
			role: Role::Customer,
			restaurant_id: None,
		}
	}

	fn seller(user_id: &str) -> Identity {
		Identity {
			user_id: user_id.into(),
			role: Role::Seller,
			restaurant_id: Some("r-1".into()),
		}
	}

	#[tokio::test]
	async fn test_create_order_reports_total() {
		let engine = engine_with_catalog(true).await;
		let response = create_order(
			&engine,
			&buyer(),
			CreateOrderRequest {
				address_id: Some("a-1".into()),
				payment_method: None,
			},
		)
		.await
		.unwrap();

		assert_eq!(response.amount, Decimal::from(307));
		assert_eq!(response.message, "Order created successfully");
	}

	#[tokio::test]
	async fn test_seller_role_required_for_restaurant_paths() {
		let engine = engine_with_catalog(true).await;
		let order_id = paid_order_id(&engine).await;

		let err = update_status(
			&engine,
			&buyer(),
			&order_id,
			UpdateOrderStatusRequest {
				status: "accepted".into(),
			},
		)
		.await
		.unwrap_err();
		assert_eq!(err.status_code(), 403);

		let err = restaurant_orders(&engine, &buyer(), "r-1", RestaurantOrdersQuery::default())
			.await
			.unwrap_err();
		assert_eq!(err.status_code(), 403);
	}

	#[tokio::test]
	async fn test_owner_advances_and_lists() {
		let engine = engine_with_catalog(true).await;
		let order_id = paid_order_id(&engine).await;

		let response = update_status(
			&engine,
			&seller("seller-1"),
			&order_id,
			UpdateOrderStatusRequest {
				status: "preparing".into(),
			},
		)
		.await
		.unwrap();
		assert_eq!(response.order.status, OrderStatus::Preparing);

		let listed = restaurant_orders(
			&engine,
			&seller("seller-1"),
			"r-1",
			RestaurantOrdersQuery { limit: Some(5) },
		)
		.await
		.unwrap();
		assert!(listed.success);
		assert_eq!(listed.count, 1);
		assert_eq!(listed.orders[0].id, order_id);
	}

	#[tokio::test]
	async fn test_other_seller_cannot_touch_order() {
		let engine = engine_with_catalog(true).await;
		let order_id = paid_order_id(&engine).await;

		let err = update_status(
			&engine,
			&seller("seller-2"),
			&order_id,
			UpdateOrderStatusRequest {
				status: "accepted".into(),
			},
		)
		.await
		.unwrap_err();
		assert_eq!(err.status_code(), 422);

		let err = restaurant_orders(&engine, &seller("seller-2"), "r-1", Default::default())
			.await
			.unwrap_err();
		assert_eq!(err.status_code(), 422);
	}

	#[tokio::test]
	async fn test_payment_fetch_rejects_paid_order() {
		let engine = engine_with_catalog(true).await;
		let order_id = paid_order_id(&engine).await;

		let err = order_for_payment(&engine, &order_id).await.unwrap_err();
		assert_eq!(err.status_code(), 422);
		assert_eq!(err.to_error_response().message, "order already paid");

		let err = order_for_payment(&engine, "missing").await.unwrap_err();
		assert_eq!(err.status_code(), 404);
	}
}
