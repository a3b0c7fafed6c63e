//! Order lifecycle handler.
//!
//! Creates orders from carts and drives them through the restaurant and
//! rider transitions. Every transition is committed before its side effects
//! run, and a failed notification or publication never rolls it back.

use crate::catalog::Catalog;
use crate::error::OrderError;
use crate::geo;
use crate::handlers::order_payload;
use crate::pricing::OrderPricer;
use crate::state::{OrderStore, Outcome, Rejection, RiderAssignments};
use courier_notify::NotificationService;
use courier_queue::QueueService;
use courier_types::{
	notification_events, truncate_id, CreateOrderRequest, DeliveryAddress, Order, OrderItem,
	OrderStatus, PaymentMethod, PaymentOrderResponse, PaymentStatus, QueueEnvelope,
	RiderDispatchData, Room, ORDER_READY_FOR_RIDER,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Result of a rider advance request.
#[derive(Debug, Clone)]
pub struct RiderProgress {
	/// Whether the ratchet moved.
	pub updated: bool,
	pub order: Order,
}

/// Handler for order creation, restaurant transitions and order queries.
pub struct LifecycleHandler {
	orders: Arc<OrderStore>,
	assignments: Arc<RiderAssignments>,
	catalog: Arc<dyn Catalog>,
	pricer: OrderPricer,
	queue: Arc<QueueService>,
	notifier: Arc<NotificationService>,
	rider_queue: String,
	currency: String,
}

impl LifecycleHandler {
	#[allow(clippy::too_many_arguments)]
	pub fn new(
		orders: Arc<OrderStore>,
		assignments: Arc<RiderAssignments>,
		catalog: Arc<dyn Catalog>,
		pricer: OrderPricer,
		queue: Arc<QueueService>,
		notifier: Arc<NotificationService>,
		rider_queue: String,
		currency: String,
	) -> Self {
		Self {
			orders,
			assignments,
			catalog,
			pricer,
			queue,
			notifier,
			rider_queue,
			currency,
		}
	}

	/// Turns the buyer's cart into a pending order and clears the cart.
	#[instrument(skip_all, fields(user_id = %truncate_id(user_id)))]
	pub async fn create_from_cart(
		&self,
		user_id: &str,
		request: &CreateOrderRequest,
	) -> Result<Order, OrderError> {
		let address_id = request
			.address_id
			.as_deref()
			.filter(|id| !id.is_empty())
			.ok_or_else(|| OrderError::Validation("address is required".into()))?;
		let payment_method = match request.payment_method.as_deref() {
			None => PaymentMethod::Razorpay,
			Some(method) => method.parse().map_err(OrderError::Validation)?,
		};

		let address = self.catalog.get_address(user_id, address_id).await?;
		let cart = self.catalog.get_cart(user_id).await?;
		let first = cart
			.first()
			.ok_or_else(|| OrderError::Validation("cart is empty".into()))?;
		let restaurant = self.catalog.get_restaurant(&first.restaurant_id).await?;
		if !restaurant.is_open {
			return Err(OrderError::PreconditionFailed("restaurant is closed".into()));
		}

		let distance = geo::distance_km(
			(
				restaurant.auto_location.latitude(),
				restaurant.auto_location.longitude(),
			),
			(address.location.latitude(), address.location.longitude()),
		);
		let pricing = self.pricer.price(&cart, distance)?;

		let order = Order {
			id: Uuid::new_v4().to_string(),
			user_id: user_id.to_string(),
			restaurant_id: restaurant.id.clone(),
			restaurant_name: restaurant.name.clone(),
			rider_id: None,
			rider_name: None,
			rider_phone: None,
			distance: pricing.distance,
			rider_amount: pricing.rider_amount,
			items: cart
				.iter()
				.map(|line| OrderItem {
					item_id: line.item.id.clone(),
					name: line.item.name.clone(),
					price: line.item.price,
					quantity: line.quantity,
				})
				.collect(),
			subtotal: pricing.subtotal,
			delivery_fee: pricing.delivery_fee,
			platform_fee: pricing.platform_fee,
			total_amount: pricing.total_amount,
			address_id: address.id.clone(),
			delivery_address: DeliveryAddress {
				formatted_address: address.formatted_address.clone(),
				mobile: address.mobile.clone(),
				latitude: address.location.latitude(),
				longitude: address.location.longitude(),
			},
			status: OrderStatus::Placed,
			payment_method,
			payment_status: PaymentStatus::Pending,
			expires_at: None,
			created_at: 0,
			updated_at: 0,
		};
		let order = self.orders.create(order).await?;

		if let Err(e) = self.catalog.clear_cart(user_id).await {
			warn!(order_id = %truncate_id(&order.id), error = %e, "Failed to clear cart");
		}

		info!(
			order_id = %truncate_id(&order.id),
			total = %order.total_amount,
			distance = order.distance,
			"Order created"
		);
		Ok(order)
	}

	/// Moves an order to `status` on behalf of the restaurant owner
	/// `user_id`. Only accepted, preparing and ready_for_rider are valid
	/// targets.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn advance_status(
		&self,
		order_id: &str,
		user_id: &str,
		status: &str,
	) -> Result<Order, OrderError> {
		let target = status
			.parse::<OrderStatus>()
			.ok()
			.filter(|target| OrderStatus::RESTAURANT_TARGETS.contains(target))
			.ok_or_else(|| OrderError::Validation(format!("invalid status '{}'", status)))?;

		let order = self.require(order_id).await?;
		let restaurant = self.catalog.get_restaurant(&order.restaurant_id).await?;
		if restaurant.owner_id != user_id {
			return Err(OrderError::PreconditionFailed(
				"you are not allowed to update this order".into(),
			));
		}

		let order = match self
			.orders
			.transition_status(order_id, &restaurant.id, target)
			.await?
		{
			Outcome::Applied(order) => order,
			Outcome::Rejected(reason) => return Err(reason.into()),
		};
		info!(status = %order.status, "Order status updated");

		self.notifier
			.notify(
				notification_events::ORDER_UPDATE,
				Room::User(order.user_id.clone()),
				json!({ "orderId": order.id, "status": order.status }),
			)
			.await;

		if target == OrderStatus::ReadyForRider {
			let envelope = QueueEnvelope::new(
				ORDER_READY_FOR_RIDER,
				RiderDispatchData {
					order_id: order.id.clone(),
					restaurant_id: restaurant.id.clone(),
					location: restaurant.auto_location.clone(),
				},
			);
			match self.queue.publish_event(&self.rider_queue, &envelope).await {
				Ok(()) => info!(queue = %self.rider_queue, "Published rider dispatch"),
				Err(e) => warn!(
					queue = %self.rider_queue,
					error = %e,
					"Failed to publish rider dispatch"
				),
			}
		}

		Ok(order)
	}

	/// Advances the rider ratchet: rider_assigned to picked_up, picked_up to
	/// delivered. Any other status is left alone and reported as not updated.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn rider_advance(
		&self,
		order_id: &str,
		rider_id: Option<&str>,
	) -> Result<RiderProgress, OrderError> {
		let order = match self.orders.rider_advance(order_id, rider_id).await? {
			Outcome::Applied(order) => order,
			Outcome::Rejected(Rejection::NoRiderStep { status }) => {
				info!(%status, "Rider advance is a no-op");
				let order = self.require(order_id).await?;
				return Ok(RiderProgress {
					updated: false,
					order,
				});
			},
			Outcome::Rejected(reason) => return Err(reason.into()),
		};
		info!(status = %order.status, "Rider advanced order");

		let payload = order_payload(&order);
		self.notifier
			.notify(
				notification_events::ORDER_RIDER_ASSIGNED,
				Room::Restaurant(order.restaurant_id.clone()),
				payload.clone(),
			)
			.await;
		self.notifier
			.notify(
				notification_events::ORDER_RIDER_ASSIGNED,
				Room::User(order.user_id.clone()),
				payload,
			)
			.await;

		if order.status == OrderStatus::Delivered {
			if let Some(rider_id) = order.rider_id.as_deref() {
				if let Err(e) = self.assignments.release(rider_id, &order.id).await {
					warn!(error = %e, "Failed to release rider hold");
				}
			}
		}

		Ok(RiderProgress {
			updated: true,
			order,
		})
	}

	/// Paid orders of the buyer, newest first.
	pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Order>, OrderError> {
		Ok(self.orders.list_for_user(user_id).await?)
	}

	/// A single order, visible only to the buyer who placed it.
	pub async fn get_for_user(&self, order_id: &str, user_id: &str) -> Result<Order, OrderError> {
		let order = self.require(order_id).await?;
		if order.user_id != user_id {
			return Err(OrderError::PreconditionFailed(
				"you are not allowed to view this order".into(),
			));
		}
		Ok(order)
	}

	/// Paid orders of a restaurant owned by `user_id`, newest first.
	pub async fn list_for_restaurant(
		&self,
		restaurant_id: &str,
		user_id: &str,
		limit: Option<usize>,
	) -> Result<Vec<Order>, OrderError> {
		let restaurant = self.catalog.get_restaurant(restaurant_id).await?;
		if restaurant.owner_id != user_id {
			return Err(OrderError::PreconditionFailed(
				"you are not allowed to view these orders".into(),
			));
		}
		Ok(self
			.orders
			.list_for_restaurant(restaurant_id, limit)
			.await?)
	}

	/// Amount the payment service should charge for a pending order.
	pub async fn fetch_for_payment(
		&self,
		order_id: &str,
	) -> Result<PaymentOrderResponse, OrderError> {
		let order = self.require(order_id).await?;
		if order.payment_status != PaymentStatus::Pending {
			return Err(Rejection::AlreadyPaid.into());
		}
		Ok(PaymentOrderResponse {
			order_id: order.id,
			amount: order.total_amount,
			currency: self.currency.clone(),
		})
	}

	async fn require(&self, order_id: &str) -> Result<Order, OrderError> {
		self.orders
			.get(order_id)
			.await?
			.ok_or_else(|| Rejection::NotFound.into())
	}
}
