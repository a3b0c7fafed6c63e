//! Engine fixtures for the API tests.

use courier_config::Config;
use courier_core::CourierEngine;
use courier_storage::StorageService;
use courier_types::{
	Address, CartEntry, CreateOrderRequest, GeoLocation, MenuItem, Restaurant, StorageKey,
};
use rust_decimal::Decimal;

/// Memory backends everywhere, API enabled on an ephemeral port.
pub const MEMORY_CONFIG: &str = r#"
[service]
id = "courier-http-test"
internal_key = "internal-secret"

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

[api]
enabled = true
host = "127.0.0.1"
port = 0
"#;

pub const INTERNAL_KEY: &str = "internal-secret";

/// Restaurant `r-1` owned by `seller-1`, buyer `u-1` with address `a-1`.
async fn seed_catalog(storage: &StorageService, open: bool) {
	let restaurant = Restaurant {
		id: "r-1".into(),
		name: "Udupi Grand".into(),
		owner_id: "seller-1".into(),
		phone: None,
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

	fill_cart(storage).await;
}

/// Puts two dosas in the cart of `u-1`.
pub async fn fill_cart(storage: &StorageService) {
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

pub async fn engine_with_catalog(restaurant_open: bool) -> CourierEngine {
	let config: Config = MEMORY_CONFIG.parse().unwrap();
	let engine = crate::build_engine(config).await.unwrap();
	seed_catalog(engine.storage(), restaurant_open).await;
	engine
}

/// Creates an order for `u-1` and reconciles its payment.
pub async fn paid_order_id(engine: &CourierEngine) -> String {
	fill_cart(engine.storage()).await;
	let order = engine
		.lifecycle()
		.create_from_cart(
			"u-1",
			&CreateOrderRequest {
				address_id: Some("a-1".into()),
				payment_method: None,
			},
		)
		.await
		.unwrap();
	assert!(engine.payments().reconcile(&order.id).await.unwrap());
	order.id
}

/// A paid order the restaurant has marked ready for pickup.
pub async fn ready_order_id(engine: &CourierEngine) -> String {
	let order_id = paid_order_id(engine).await;
	engine
		.lifecycle()
		.advance_status(&order_id, "seller-1", "ready_for_rider")
		.await
		.unwrap();
	order_id
}
