//! Fixtures shared by the unit tests of this crate.

use crate::catalog::StorageCatalog;
use crate::handlers::{LifecycleHandler, RiderHandler};
use crate::pricing::OrderPricer;
use crate::state::{OrderStore, Outcome, RiderAssignments, RiderContact};
use courier_config::PricingConfig;
use courier_notify::{implementations::memory::MemoryNotifier, NotificationService};
use courier_queue::{implementations::memory::MemoryQueue, QueueService};
use courier_storage::{implementations::memory::MemoryStorage, StorageService};
use courier_types::{
	Address, CartEntry, DeliveryAddress, GeoLocation, MenuItem, Order, OrderItem, OrderStatus,
	PaymentMethod, PaymentStatus, Restaurant, StorageKey,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

/// Configuration selecting the in-memory backend for every concern.
pub(crate) const MEMORY_CONFIG: &str = r#"
[service]
id = "courier-test"
internal_key = "secret"

[storage]
primary = "memory"
cleanup_interval_seconds = 60
[storage.implementations.memory]

[queue]
primary = "memory"
[queue.implementations.memory]

[notification]
primary = "memory"
[notification.implementations.memory]
"#;

pub(crate) fn memory_storage() -> Arc<StorageService> {
	Arc::new(StorageService::new(Box::new(MemoryStorage::new())))
}

/// A pending order worth 307 from restaurant `restaurant_id`.
pub(crate) fn sample_order(id: &str, user_id: &str, restaurant_id: &str) -> Order {
	Order {
		id: id.to_string(),
		user_id: user_id.to_string(),
		restaurant_id: restaurant_id.to_string(),
		restaurant_name: "Udupi Grand".into(),
		rider_id: None,
		rider_name: None,
		rider_phone: None,
		distance: 3.2,
		rider_amount: Decimal::from(68),
		items: vec![OrderItem {
			item_id: "m-1".into(),
			name: "Masala Dosa".into(),
			price: Decimal::from(150),
			quantity: 2,
		}],
		subtotal: Decimal::from(300),
		delivery_fee: Decimal::ZERO,
		platform_fee: Decimal::from(7),
		total_amount: Decimal::from(307),
		address_id: "a-1".into(),
		delivery_address: DeliveryAddress {
			formatted_address: "12 MG Road".into(),
			mobile: "9800000000".into(),
			latitude: 12.9756,
			longitude: 77.6050,
		},
		status: OrderStatus::Placed,
		payment_method: PaymentMethod::Razorpay,
		payment_status: PaymentStatus::Pending,
		expires_at: None,
		created_at: 0,
		updated_at: 0,
	}
}

/// Seeds restaurant `r-1` owned by `seller-1`, buyer `u-1` with address
/// `a-1`, and a cart of two 150-priced dosas.
pub(crate) async fn seed_catalog(storage: &StorageService, open: bool) {
	let restaurant = Restaurant {
		id: "r-1".into(),
		name: "Udupi Grand".into(),
		owner_id: "seller-1".into(),
		phone: Some("8000000000".into()),
		is_open: open,
		auto_location: GeoLocation::point(12.9756, 77.6050),
	};
	storage
		.store(StorageKey::Restaurants.as_str(), "r-1", &restaurant)
		.await
		.unwrap();

	let address = Address {
		id: "a-1".into(),
		user_id: "u-1".into(),
		mobile: "9800000000".into(),
		formatted_address: "80 Feet Road, Koramangala".into(),
		location: GeoLocation::point(12.9352, 77.6245),
	};
	storage
		.store(StorageKey::Addresses.as_str(), "a-1", &address)
		.await
		.unwrap();

	let item = MenuItem {
		id: "m-1".into(),
		restaurant_id: "r-1".into(),
		name: "Masala Dosa".into(),
		price: Decimal::from(150),
	};
	storage
		.store(StorageKey::MenuItems.as_str(), "m-1", &item)
		.await
		.unwrap();

	let cart = vec![CartEntry {
		restaurant_id: "r-1".into(),
		item_id: "m-1".into(),
		quantity: 2,
	}];
	storage
		.store(StorageKey::Carts.as_str(), "u-1", &cart)
		.await
		.unwrap();
}

/// Controllers wired over in-memory backends with a seeded catalog.
pub(crate) struct Harness {
	pub storage: Arc<StorageService>,
	pub orders: Arc<OrderStore>,
	pub assignments: Arc<RiderAssignments>,
	pub lifecycle: Arc<LifecycleHandler>,
	pub riders: Arc<RiderHandler>,
	pub notifier: MemoryNotifier,
	pub queue_service: Arc<QueueService>,
}

impl Harness {
	pub async fn new(restaurant_open: bool) -> Self {
		let storage = memory_storage();
		seed_catalog(&storage, restaurant_open).await;

		let orders = Arc::new(OrderStore::new(storage.clone(), Duration::from_secs(900)));
		let assignments = Arc::new(RiderAssignments::new(storage.clone(), orders.clone()));
		let notifier = MemoryNotifier::new();
		let notifications = Arc::new(NotificationService::new(Box::new(notifier.clone())));
		let queue_service = Arc::new(QueueService::new(Box::new(MemoryQueue::new())));

		let lifecycle = Arc::new(LifecycleHandler::new(
			orders.clone(),
			assignments.clone(),
			Arc::new(StorageCatalog::new(storage.clone())),
			OrderPricer::new(&PricingConfig::default()),
			queue_service.clone(),
			notifications.clone(),
			"rider_queue".into(),
			"INR".into(),
		));
		let riders = Arc::new(RiderHandler::new(
			orders.clone(),
			assignments.clone(),
			notifications,
		));

		Self {
			storage,
			orders,
			assignments,
			lifecycle,
			riders,
			notifier,
			queue_service,
		}
	}

	/// A fresh paid order of `u-1` at `r-1`, still `placed`.
	pub async fn paid_order(&self) -> Order {
		let id = uuid::Uuid::new_v4().to_string();
		self.orders
			.create(sample_order(&id, "u-1", "r-1"))
			.await
			.unwrap();
		self.orders.mark_paid(&id).await.unwrap().unwrap()
	}

	/// A fresh paid order waiting for a rider.
	pub async fn ready_order(&self) -> Order {
		let order = self.paid_order().await;
		match self
			.orders
			.transition_status(&order.id, "r-1", OrderStatus::ReadyForRider)
			.await
			.unwrap()
		{
			Outcome::Applied(order) => order,
			Outcome::Rejected(reason) => panic!("setup transition rejected: {:?}", reason),
		}
	}

	/// A fresh order claimed by `rider_id` through the rider handler.
	pub async fn claimed_order(&self, rider_id: &str) -> Order {
		let order = self.ready_order().await;
		self.riders
			.claim_order(
				&order.id,
				RiderContact {
					rider_id: rider_id.to_string(),
					name: Some("Ravi".into()),
					phone: None,
				},
			)
			.await
			.unwrap()
	}
}
